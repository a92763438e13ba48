// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Wire-protocol types for the sync service.
//!
//! All types derive `Serialize`/`Deserialize` and are encoded as CBOR on the
//! wire. Peer and log identities travel as raw `PeerId` bytes, public keys
//! in protobuf encoding and multiaddresses as strings, so the wire layer
//! never depends on in-memory representations.

use libp2p::{identity::PublicKey, Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use weft_core::{Cid, LogId, LogInfo, ReadKey, Record, ServiceKey, ThreadId};

use crate::error::NetError;

// ── Signed request envelope ───────────────────────────────────────────────────

/// Detached authentication of a request body.
///
/// `pub_key` is the caller's protobuf-encoded public key; `signature` covers
/// the canonical CBOR bytes of the body. The caller's peer identity is
/// derived from the key after verification, there is no separate session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Header {
    pub pub_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// A request as it travels on the wire. Header and body are optional at the
/// wire level; requests missing either are rejected before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedRequest<B> {
    pub header: Option<Header>,
    pub body: Option<B>,
}

pub type GetLogsRequest = SignedRequest<GetLogsBody>;
pub type PushLogRequest = SignedRequest<PushLogBody>;
pub type GetRecordsRequest = SignedRequest<GetRecordsBody>;
pub type PushRecordRequest = SignedRequest<PushRecordBody>;
pub type ExchangeEdgesRequest = SignedRequest<ExchangeEdgesBody>;

// ── Logs ──────────────────────────────────────────────────────────────────────

/// A log descriptor on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireLog {
    /// Raw `PeerId` bytes of the author.
    pub id: Vec<u8>,
    /// Protobuf-encoded public key of the author.
    pub pub_key: Vec<u8>,
    pub addrs: Vec<String>,
    pub head: Option<Cid>,
}

impl WireLog {
    pub fn from_info(info: &LogInfo) -> Self {
        WireLog {
            id: info.id.to_bytes(),
            pub_key: info.pub_key.encode_protobuf(),
            addrs: info.addrs.iter().map(Multiaddr::to_string).collect(),
            head: info.head,
        }
    }

    pub fn to_info(&self) -> Result<LogInfo, NetError> {
        let id = log_id_from_bytes(&self.id)?;
        let pub_key = PublicKey::try_decode_protobuf(&self.pub_key)
            .map_err(|e| NetError::InvalidArgument(format!("undecodable log public key: {e}")))?;
        let addrs = self
            .addrs
            .iter()
            .map(|a| a.parse::<Multiaddr>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| NetError::InvalidArgument(format!("unparseable log address: {e}")))?;
        Ok(LogInfo {
            id,
            pub_key,
            addrs,
            head: self.head,
        })
    }
}

/// Decode a wire log identity.
pub fn log_id_from_bytes(bytes: &[u8]) -> Result<LogId, NetError> {
    PeerId::from_bytes(bytes)
        .map_err(|e| NetError::InvalidArgument(format!("unparseable log id: {e}")))
}

// ── Records ───────────────────────────────────────────────────────────────────

/// A record's four blocks as shipped between peers. The record node is
/// sealed under the thread's service key; the other three are opaque.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireRecord {
    pub record_node: Vec<u8>,
    pub event_node: Vec<u8>,
    pub header_node: Vec<u8>,
    pub body_node: Vec<u8>,
}

impl WireRecord {
    pub fn from_record(record: &Record) -> Self {
        WireRecord {
            record_node: record.sealed_node().to_vec(),
            event_node: record.event_node().to_vec(),
            header_node: record.header_node().to_vec(),
            body_node: record.body_node().to_vec(),
        }
    }

    pub fn to_record(&self, service_key: &ServiceKey) -> Result<Record, weft_core::RecordError> {
        Record::from_sealed(
            service_key,
            self.record_node.clone(),
            self.event_node.clone(),
            self.header_node.clone(),
            self.body_node.clone(),
        )
    }
}

// ── Request bodies and replies ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetLogsBody {
    pub thread_id: ThreadId,
    pub service_key: ServiceKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetLogsReply {
    pub logs: Vec<WireLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushLogBody {
    pub thread_id: ThreadId,
    pub log: WireLog,
    pub service_key: Option<ServiceKey>,
    pub read_key: Option<ReadKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushLogReply {}

/// Per-log cursor in a `get_records` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogOffset {
    pub log_id: Vec<u8>,
    /// Most recent record the caller already holds; `None` pulls from the
    /// chain start.
    pub offset: Option<Cid>,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetRecordsBody {
    pub thread_id: ThreadId,
    pub service_key: ServiceKey,
    pub logs: Vec<LogOffset>,
}

/// Records of one log in a `get_records` reply. `log` carries the full
/// descriptor when the caller did not know this log existed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecords {
    pub log_id: Vec<u8>,
    pub records: Vec<WireRecord>,
    pub log: Option<WireLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetRecordsReply {
    pub logs: Vec<LogRecords>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushRecordBody {
    pub thread_id: ThreadId,
    pub log_id: Vec<u8>,
    pub record: WireRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushRecordReply {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThreadEdges {
    pub thread_id: ThreadId,
    pub address_edge: u64,
    pub heads_edge: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeEdgesBody {
    pub threads: Vec<ThreadEdges>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EdgeReply {
    pub thread_id: ThreadId,
    pub exists: bool,
    pub address_edge: Option<u64>,
    pub heads_edge: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeEdgesReply {
    pub edges: Vec<EdgeReply>,
}

// ── Wire envelope ─────────────────────────────────────────────────────────────

/// Top-level request sent from one peer to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SyncRequest {
    GetLogs(GetLogsRequest),
    PushLog(PushLogRequest),
    GetRecords(GetRecordsRequest),
    PushRecord(PushRecordRequest),
    ExchangeEdges(ExchangeEdgesRequest),
}

/// Top-level response sent back in reply to a [`SyncRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SyncResponse {
    GetLogs(GetLogsReply),
    PushLog(PushLogReply),
    GetRecords(GetRecordsReply),
    PushRecord(PushRecordReply),
    ExchangeEdges(ExchangeEdgesReply),
    Error(ErrorReply),
}

/// Canonical status carried by error replies; a non-`Error` response variant
/// is implicitly `OK`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    InvalidArgument,
    Unauthenticated,
    NotFound,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReply {
    pub code: StatusCode,
    pub message: String,
}

impl From<&NetError> for ErrorReply {
    fn from(e: &NetError) -> Self {
        let code = match e {
            NetError::InvalidArgument(_) => StatusCode::InvalidArgument,
            NetError::Unauthenticated(_) => StatusCode::Unauthenticated,
            NetError::NotFound(_) => StatusCode::NotFound,
            NetError::Internal(_) => StatusCode::Internal,
        };
        ErrorReply {
            code,
            message: e.to_string(),
        }
    }
}
