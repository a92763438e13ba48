// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The record envelope.
//!
//! A record is one signed entry in a writer's chain. Its *record node*
//! carries the hash link (`prev`), the author's signature and the content ID
//! of the event node; the node is sealed with the thread's service key so
//! that a relay-only peer can verify chain structure without reading event
//! payloads. The event/header/body nodes themselves are opaque blocks owned
//! by the data-model layer; this crate never opens them.
//!
//! The record's `Cid` addresses the sealed node bytes, so all peers holding
//! the service key derive the same ID for the same record.

use aes_siv::{
    aead::{Aead, KeyInit},
    Aes128SivAead, Nonce,
};
use libp2p::identity::{Keypair, PublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{id::Cid, key::ServiceKey};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record node could not be sealed")]
    Seal,

    #[error("record node could not be unsealed (wrong service key or corrupt block)")]
    Unseal,

    #[error("malformed record node: {0}")]
    Malformed(String),

    #[error("record signing failed: {0}")]
    Signing(String),
}

/// Plaintext layout of a record node.
#[derive(Debug, Serialize, Deserialize)]
struct RecordNode {
    block: Cid,
    prev: Option<Cid>,
    sig: Vec<u8>,
}

/// One verified entry of a log chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    cid: Cid,
    block: Cid,
    prev: Option<Cid>,
    sig: Vec<u8>,
    sealed_node: Vec<u8>,
    event_node: Vec<u8>,
    header_node: Vec<u8>,
    body_node: Vec<u8>,
}

impl Record {
    /// Author a new record extending `prev` and seal it under `service_key`.
    pub fn new(
        author: &Keypair,
        service_key: &ServiceKey,
        event_node: Vec<u8>,
        header_node: Vec<u8>,
        body_node: Vec<u8>,
        prev: Option<Cid>,
    ) -> Result<Self, RecordError> {
        let block = Cid::of(&event_node);
        let sig = author
            .sign(&signed_payload(&block, prev.as_ref()))
            .map_err(|e| RecordError::Signing(e.to_string()))?;

        let node = RecordNode {
            block,
            prev,
            sig: sig.clone(),
        };
        let mut plain = Vec::new();
        ciborium::into_writer(&node, &mut plain)
            .map_err(|e| RecordError::Malformed(e.to_string()))?;
        let sealed_node = seal(service_key, &plain)?;
        let cid = Cid::of(&sealed_node);

        Ok(Record {
            cid,
            block,
            prev,
            sig,
            sealed_node,
            event_node,
            header_node,
            body_node,
        })
    }

    /// Reconstruct a record from its wire blocks, unsealing the record node
    /// with the thread's service key.
    pub fn from_sealed(
        service_key: &ServiceKey,
        sealed_node: Vec<u8>,
        event_node: Vec<u8>,
        header_node: Vec<u8>,
        body_node: Vec<u8>,
    ) -> Result<Self, RecordError> {
        let plain = unseal(service_key, &sealed_node)?;
        let node: RecordNode = ciborium::from_reader(plain.as_slice())
            .map_err(|e| RecordError::Malformed(e.to_string()))?;
        let cid = Cid::of(&sealed_node);

        Ok(Record {
            cid,
            block: node.block,
            prev: node.prev,
            sig: node.sig,
            sealed_node,
            event_node,
            header_node,
            body_node,
        })
    }

    /// Check the author's signature against the log's public key.
    pub fn verify(&self, pub_key: &PublicKey) -> bool {
        pub_key.verify(&signed_payload(&self.block, self.prev.as_ref()), &self.sig)
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    /// Content ID of the event node.
    pub fn block(&self) -> &Cid {
        &self.block
    }

    /// Hash link to the preceding record; `None` for the first in a chain.
    pub fn prev(&self) -> Option<Cid> {
        self.prev
    }

    pub fn sig(&self) -> &[u8] {
        &self.sig
    }

    pub fn sealed_node(&self) -> &[u8] {
        &self.sealed_node
    }

    pub fn event_node(&self) -> &[u8] {
        &self.event_node
    }

    pub fn header_node(&self) -> &[u8] {
        &self.header_node
    }

    pub fn body_node(&self) -> &[u8] {
        &self.body_node
    }
}

/// Canonical bytes covered by the record signature: the event-node CID
/// followed by the previous record's CID when present.
fn signed_payload(block: &Cid, prev: Option<&Cid>) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(block.as_bytes());
    if let Some(prev) = prev {
        out.extend_from_slice(prev.as_bytes());
    }
    out
}

// Fixed nonce: sealing must be deterministic so the same node produces the
// same ciphertext (and therefore the same Cid) on every peer.
fn seal(key: &ServiceKey, plain: &[u8]) -> Result<Vec<u8>, RecordError> {
    let cipher = Aes128SivAead::new_from_slice(key.as_bytes()).map_err(|_| RecordError::Seal)?;
    cipher
        .encrypt(&Nonce::default(), plain)
        .map_err(|_| RecordError::Seal)
}

fn unseal(key: &ServiceKey, sealed: &[u8]) -> Result<Vec<u8>, RecordError> {
    let cipher = Aes128SivAead::new_from_slice(key.as_bytes()).map_err(|_| RecordError::Unseal)?;
    cipher
        .decrypt(&Nonce::default(), sealed)
        .map_err(|_| RecordError::Unseal)
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> Keypair {
        Keypair::generate_ed25519()
    }

    fn sample(prev: Option<Cid>) -> (Record, Keypair, ServiceKey) {
        let keypair = author();
        let service_key = ServiceKey::random();
        let record = Record::new(
            &keypair,
            &service_key,
            b"event".to_vec(),
            b"header".to_vec(),
            b"body".to_vec(),
            prev,
        )
        .unwrap();
        (record, keypair, service_key)
    }

    #[test]
    fn new_record_verifies_against_author_key() {
        let (record, keypair, _) = sample(None);
        assert!(record.verify(&keypair.public()));
    }

    #[test]
    fn verify_rejects_foreign_key() {
        let (record, _, _) = sample(None);
        assert!(!record.verify(&author().public()));
    }

    #[test]
    fn sealed_round_trip_preserves_identity() {
        let (record, _, service_key) = sample(None);
        let restored = Record::from_sealed(
            &service_key,
            record.sealed_node().to_vec(),
            record.event_node().to_vec(),
            record.header_node().to_vec(),
            record.body_node().to_vec(),
        )
        .unwrap();
        assert_eq!(record, restored);
    }

    #[test]
    fn unseal_with_wrong_key_fails() {
        let (record, _, _) = sample(None);
        let wrong = ServiceKey::random();
        let err = Record::from_sealed(
            &wrong,
            record.sealed_node().to_vec(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, RecordError::Unseal));
    }

    #[test]
    fn chain_links_by_cid() {
        let keypair = author();
        let service_key = ServiceKey::random();
        let first = Record::new(
            &keypair,
            &service_key,
            b"one".to_vec(),
            Vec::new(),
            Vec::new(),
            None,
        )
        .unwrap();
        let second = Record::new(
            &keypair,
            &service_key,
            b"two".to_vec(),
            Vec::new(),
            Vec::new(),
            Some(*first.cid()),
        )
        .unwrap();
        assert_eq!(second.prev(), Some(*first.cid()));
        assert_ne!(first.cid(), second.cid());
    }

    #[test]
    fn tampered_link_breaks_verification() {
        let keypair = author();
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
        // Re-sealing the node with a different prev must invalidate the
        // original signature.
        let forged = Record::new(
            &keypair,
            &service_key,
            b"event".to_vec(),
            Vec::new(),
            Vec::new(),
            Some(Cid::of(b"somewhere else")),
        )
        .unwrap();
        let mut spliced = forged.clone();
        spliced.sig = record.sig().to_vec();
        assert!(!spliced.verify(&keypair.public()));
    }
}
