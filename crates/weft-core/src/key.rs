// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Thread key set.
//!
//! The *service key* gates metadata-level access to a thread: a peer holding
//! it may relay logs and records (a follower). The *read key* additionally
//! gates payload decryption, which this crate never performs; it only
//! stores and forwards the key on behalf of the data-model layer.
//!
//! Key comparisons are constant-time; a sync handler comparing an attacker's
//! guess against the stored key must not leak a byte-prefix timing oracle.

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::id::bytes32;

/// Error constructing a key from raw bytes of the wrong length.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid key length: expected 32 bytes, got {0}")]
pub struct InvalidKeyLength(pub usize);

fn random_bytes() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

// ── ServiceKey ────────────────────────────────────────────────────────────────

/// Symmetric key authorizing metadata-level sync access to a thread.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceKey(#[serde(with = "bytes32")] [u8; 32]);

impl ServiceKey {
    /// Generate a fresh key from the OS CSPRNG.
    pub fn random() -> Self {
        ServiceKey(random_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidKeyLength> {
        bytes
            .try_into()
            .map(ServiceKey)
            .map_err(|_| InvalidKeyLength(bytes.len()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for ServiceKey {}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceKey(..)")
    }
}

// ── ReadKey ───────────────────────────────────────────────────────────────────

/// Symmetric key gating record-body decryption. Opaque to this crate.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReadKey(#[serde(with = "bytes32")] [u8; 32]);

impl ReadKey {
    /// Generate a fresh key from the OS CSPRNG.
    pub fn random() -> Self {
        ReadKey(random_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidKeyLength> {
        bytes
            .try_into()
            .map(ReadKey)
            .map_err(|_| InvalidKeyLength(bytes.len()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialEq for ReadKey {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for ReadKey {}

impl fmt::Debug for ReadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReadKey(..)")
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_keys_differ() {
        assert_ne!(ServiceKey::random(), ServiceKey::random());
        assert_ne!(ReadKey::random(), ReadKey::random());
    }

    #[test]
    fn key_equality_is_bytewise() {
        let key = ServiceKey::random();
        let copy = ServiceKey::from_bytes(key.as_bytes()).unwrap();
        assert_eq!(key, copy);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        assert_eq!(ServiceKey::from_bytes(&[0u8; 16]), Err(InvalidKeyLength(16)));
        assert_eq!(ReadKey::from_bytes(&[]), Err(InvalidKeyLength(0)));
    }

    #[test]
    fn debug_never_prints_key_material() {
        let key = ServiceKey::random();
        assert_eq!(format!("{key:?}"), "ServiceKey(..)");
    }
}
