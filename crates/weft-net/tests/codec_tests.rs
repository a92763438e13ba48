// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! CBOR round-trip tests for the wire-protocol types and the framed codec.

use futures::io::Cursor;
use libp2p::{identity::Keypair, request_response::Codec as _};
use weft_core::{Cid, Record, ServiceKey, ThreadId};
use weft_net::protocol::{
    codec::{self, SyncCodec, SYNC_PROTO},
    sign::sign_request,
    types::{
        EdgeReply, ErrorReply, ExchangeEdgesBody, ExchangeEdgesReply, GetLogsBody, GetLogsReply,
        GetRecordsBody, GetRecordsReply, LogOffset, LogRecords, PushLogBody, PushRecordBody,
        StatusCode, SyncRequest, SyncResponse, ThreadEdges, WireLog, WireRecord,
    },
};

fn roundtrip<T>(value: &T) -> T
where
    T: serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug + PartialEq,
{
    let bytes = codec::encode(value).expect("encode");
    codec::decode(&bytes).expect("decode")
}

fn wire_log(keypair: &Keypair) -> WireLog {
    WireLog {
        id: keypair.public().to_peer_id().to_bytes(),
        pub_key: keypair.public().encode_protobuf(),
        addrs: vec!["/ip4/127.0.0.1/tcp/4001".into()],
        head: Some(Cid::of(b"head")),
    }
}

fn wire_record() -> WireRecord {
    let keypair = Keypair::generate_ed25519();
    let record = Record::new(
        &keypair,
        &ServiceKey::random(),
        b"event".to_vec(),
        b"header".to_vec(),
        b"body".to_vec(),
        None,
    )
    .unwrap();
    WireRecord::from_record(&record)
}

// ── Bodies ────────────────────────────────────────────────────────────────────

#[test]
fn get_logs_body_roundtrip() {
    let body = GetLogsBody {
        thread_id: ThreadId::random(),
        service_key: ServiceKey::random(),
    };
    assert_eq!(body, roundtrip(&body));
}

#[test]
fn push_log_body_roundtrip() {
    let keypair = Keypair::generate_ed25519();
    let body = PushLogBody {
        thread_id: ThreadId::random(),
        log: wire_log(&keypair),
        service_key: Some(ServiceKey::random()),
        read_key: None,
    };
    assert_eq!(body, roundtrip(&body));
}

#[test]
fn get_records_body_roundtrip() {
    let keypair = Keypair::generate_ed25519();
    let body = GetRecordsBody {
        thread_id: ThreadId::random(),
        service_key: ServiceKey::random(),
        logs: vec![LogOffset {
            log_id: keypair.public().to_peer_id().to_bytes(),
            offset: Some(Cid::of(b"offset")),
            limit: 128,
        }],
    };
    assert_eq!(body, roundtrip(&body));
}

#[test]
fn push_record_body_roundtrip() {
    let keypair = Keypair::generate_ed25519();
    let body = PushRecordBody {
        thread_id: ThreadId::random(),
        log_id: keypair.public().to_peer_id().to_bytes(),
        record: wire_record(),
    };
    assert_eq!(body, roundtrip(&body));
}

#[test]
fn exchange_edges_roundtrip() {
    let body = ExchangeEdgesBody {
        threads: vec![ThreadEdges {
            thread_id: ThreadId::random(),
            address_edge: 0xfeed_beef_dead_cafe,
            heads_edge: 42,
        }],
    };
    assert_eq!(body, roundtrip(&body));

    let reply = ExchangeEdgesReply {
        edges: vec![
            EdgeReply {
                thread_id: ThreadId::random(),
                exists: true,
                address_edge: Some(1),
                heads_edge: Some(2),
            },
            EdgeReply {
                thread_id: ThreadId::random(),
                exists: false,
                address_edge: None,
                heads_edge: None,
            },
        ],
    };
    assert_eq!(reply, roundtrip(&reply));
}

// ── Wire log and record conversions ───────────────────────────────────────────

#[test]
fn wire_log_info_roundtrip() {
    let keypair = Keypair::generate_ed25519();
    let log = wire_log(&keypair);
    let info = log.to_info().unwrap();
    assert_eq!(WireLog::from_info(&info), log);
}

#[test]
fn wire_record_preserves_record_identity() {
    let keypair = Keypair::generate_ed25519();
    let service_key = ServiceKey::random();
    let record = Record::new(
        &keypair,
        &service_key,
        b"event".to_vec(),
        Vec::new(),
        Vec::new(),
        None,
    )
    .unwrap();
    let wire = WireRecord::from_record(&record);
    let restored = wire.to_record(&service_key).unwrap();
    assert_eq!(record, restored);
    assert!(restored.verify(&keypair.public()));
}

// ── Envelopes ─────────────────────────────────────────────────────────────────

#[test]
fn signed_request_envelope_roundtrip() {
    let keypair = Keypair::generate_ed25519();
    let body = GetLogsBody {
        thread_id: ThreadId::random(),
        service_key: ServiceKey::random(),
    };
    let req = SyncRequest::GetLogs(sign_request(&keypair, body).unwrap());
    assert_eq!(req, roundtrip(&req));
}

#[test]
fn response_envelope_roundtrip() {
    let keypair = Keypair::generate_ed25519();
    let resp = SyncResponse::GetRecords(GetRecordsReply {
        logs: vec![LogRecords {
            log_id: keypair.public().to_peer_id().to_bytes(),
            records: vec![wire_record()],
            log: Some(wire_log(&keypair)),
        }],
    });
    assert_eq!(resp, roundtrip(&resp));

    let error = SyncResponse::Error(ErrorReply {
        code: StatusCode::NotFound,
        message: "thread not found".into(),
    });
    match roundtrip(&error) {
        SyncResponse::Error(e) => assert_eq!(e.code, StatusCode::NotFound),
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn same_value_encodes_identically() {
    let body = GetLogsBody {
        thread_id: ThreadId::random(),
        service_key: ServiceKey::random(),
    };
    let a = codec::encode(&body).unwrap();
    let b = codec::encode(&body).unwrap();
    assert_eq!(a, b, "canonical encoding must be deterministic");
}

// ── Framed codec ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn framed_request_roundtrip() {
    let keypair = Keypair::generate_ed25519();
    let body = GetLogsBody {
        thread_id: ThreadId::random(),
        service_key: ServiceKey::random(),
    };
    let req = SyncRequest::GetLogs(sign_request(&keypair, body).unwrap());

    let mut codec = SyncCodec;
    let mut buf = Cursor::new(Vec::new());
    codec
        .write_request(&SYNC_PROTO, &mut buf, req.clone())
        .await
        .unwrap();
    let mut rd = Cursor::new(buf.into_inner());
    let decoded = codec.read_request(&SYNC_PROTO, &mut rd).await.unwrap();
    assert_eq!(req, decoded);
}

#[tokio::test]
async fn framed_response_roundtrip() {
    let resp = SyncResponse::GetLogs(GetLogsReply { logs: vec![] });

    let mut codec = SyncCodec;
    let mut buf = Cursor::new(Vec::new());
    codec
        .write_response(&SYNC_PROTO, &mut buf, resp.clone())
        .await
        .unwrap();
    let mut rd = Cursor::new(buf.into_inner());
    let decoded = codec.read_response(&SYNC_PROTO, &mut rd).await.unwrap();
    assert_eq!(resp, decoded);
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let mut rd = Cursor::new(vec![0xff, 0xff, 0xff, 0xff]);
    let mut codec = SyncCodec;
    let err = codec.read_request(&SYNC_PROTO, &mut rd).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}
