// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Thread and content identifiers.
//!
//! A thread is identified by 32 random bytes minted by whoever created it.
//! A log is identified by its author's libp2p `PeerId`. Content IDs are the
//! SHA-256 digest of the block they address; for records the addressed block
//! is the *sealed* record node, so two peers agree on a record's `Cid`
//! without holding the read key.

use std::fmt;
use std::str::FromStr;

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A log is named after the peer that writes it.
pub type LogId = libp2p::PeerId;

/// Serde adaptor for 32-byte identifiers: raw bytes on the wire, not arrays
/// of integers.
pub(crate) mod bytes32 {
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    struct Bytes32Visitor;

    impl<'de> de::Visitor<'de> for Bytes32Visitor {
        type Value = [u8; 32];

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("32 raw bytes")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            v.try_into()
                .map_err(|_| E::invalid_length(v.len(), &self))
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            self.visit_bytes(&v)
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut buf = Vec::with_capacity(32);
            while let Some(b) = seq.next_element::<u8>()? {
                buf.push(b);
            }
            self.visit_bytes(&buf)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        d.deserialize_bytes(Bytes32Visitor)
    }
}

/// Error parsing an identifier from its hex form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier: {0}")]
pub struct ParseIdError(String);

fn parse_hex32(s: &str) -> Result<[u8; 32], ParseIdError> {
    let bytes = hex::decode(s).map_err(|e| ParseIdError(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ParseIdError(format!("expected 32 bytes, got {}", bytes.len())))
}

// ── ThreadId ──────────────────────────────────────────────────────────────────

/// Identifies one thread across all peers that replicate it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(#[serde(with = "bytes32")] [u8; 32]);

impl ThreadId {
    /// Mint a fresh thread identifier from the OS CSPRNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        ThreadId(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ThreadId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({self})")
    }
}

impl FromStr for ThreadId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(ThreadId)
    }
}

// ── Cid ───────────────────────────────────────────────────────────────────────

/// Content identifier: the SHA-256 digest of the addressed block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cid(#[serde(with = "bytes32")] [u8; 32]);

impl Cid {
    /// The content ID of `block`.
    pub fn of(block: &[u8]) -> Self {
        Cid(Sha256::digest(block).into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Cid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({self})")
    }
}

impl FromStr for Cid {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Cid)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
