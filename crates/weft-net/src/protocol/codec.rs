// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! CBOR codec for the libp2p `request_response` protocol.
//!
//! Every message is one frame: a 4-byte big-endian payload length followed
//! by the CBOR payload. Frames above [`MAX_FRAME_BYTES`] are refused in both
//! directions; a full `get_records` reply stays under the cap because
//! `max_pull_limit` bounds the record count.

use std::io;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::{request_response, StreamProtocol};
use serde::{de::DeserializeOwned, Serialize};

use super::types::{SyncRequest, SyncResponse};

pub const SYNC_PROTO: StreamProtocol = StreamProtocol::new("/weft/sync/1.0.0");

/// Upper bound on one frame's payload.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Canonical CBOR encoding of a wire value. Struct fields are emitted in
/// declaration order, so the same value always encodes to the same bytes;
/// request signatures are computed over exactly this encoding.
pub fn encode<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(128);
    ciborium::into_writer(value, &mut bytes).map_err(invalid)?;
    Ok(bytes)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> io::Result<T> {
    ciborium::from_reader(bytes).map_err(invalid)
}

fn invalid(reason: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.to_string())
}

// ── Codec implementation ──────────────────────────────────────────────────────

/// libp2p `request_response::Codec` exchanging CBOR-framed [`SyncRequest`] /
/// [`SyncResponse`] messages.
#[derive(Clone, Default, Debug)]
pub struct SyncCodec;

#[async_trait]
impl request_response::Codec for SyncCodec {
    type Protocol = StreamProtocol;
    type Request = SyncRequest;
    type Response = SyncResponse;

    async fn read_request<T>(&mut self, _proto: &StreamProtocol, io: &mut T) -> io::Result<SyncRequest>
    where T: AsyncRead + Unpin + Send {
        recv_frame(io).await
    }

    async fn read_response<T>(&mut self, _proto: &StreamProtocol, io: &mut T) -> io::Result<SyncResponse>
    where T: AsyncRead + Unpin + Send {
        recv_frame(io).await
    }

    async fn write_request<T>(&mut self, _proto: &StreamProtocol, io: &mut T, req: SyncRequest) -> io::Result<()>
    where T: AsyncWrite + Unpin + Send {
        send_frame(io, &req).await
    }

    async fn write_response<T>(&mut self, _proto: &StreamProtocol, io: &mut T, resp: SyncResponse) -> io::Result<()>
    where T: AsyncWrite + Unpin + Send {
        send_frame(io, &resp).await
    }
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// Serialize `value` into a frame and write it out in one piece.
///
/// The length prefix is reserved up front and patched once the payload size
/// is known, so the whole frame leaves in a single `write_all`.
async fn send_frame<W, T>(io: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize,
{
    let mut frame = vec![0u8; 4];
    ciborium::into_writer(value, &mut frame).map_err(invalid)?;
    let payload_len = frame.len() - 4;
    if payload_len > MAX_FRAME_BYTES {
        return Err(invalid(format!("{payload_len} byte payload exceeds the frame cap")));
    }
    frame[..4].copy_from_slice(&(payload_len as u32).to_be_bytes());
    io.write_all(&frame).await?;
    io.close().await
}

/// Read one length-prefixed frame and decode its payload.
async fn recv_frame<R, T>(io: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin + Send,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; 4];
    io.read_exact(&mut prefix).await?;
    let announced = u32::from_be_bytes(prefix) as usize;
    if announced > MAX_FRAME_BYTES {
        return Err(invalid(format!("{announced} byte payload exceeds the frame cap")));
    }

    // Bound the read by the announced length rather than trusting the
    // stream to end; a short stream surfaces as UnexpectedEof.
    let mut payload = Vec::with_capacity(announced);
    let got = io.take(announced as u64).read_to_end(&mut payload).await?;
    if got < announced {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
    }
    decode(&payload)
}
