// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Thread edge fingerprints.
//!
//! An edge is a 64-bit summary of one aspect of a thread: the address edge
//! covers the set of `(log, sorted addresses)` pairs, the heads edge the set
//! of `(log, head)` pairs. Peers compare edges to detect divergence without
//! shipping full metadata. Each entry is hashed independently and the entry
//! hashes are XOR-folded, so the result does not depend on iteration order.
//! The empty set hashes to [`EMPTY_EDGE`].

use libp2p::Multiaddr;
use sha2::{Digest, Sha256};

use crate::{
    id::{Cid, LogId},
    store::LogInfo,
};

/// Edge value of a thread with no contributing entries.
pub const EMPTY_EDGE: u64 = 0;

/// Fingerprint of the `(log, addresses)` set of a thread.
///
/// Addresses are canonicalized by string form and sorted, so two peers
/// holding the same address set in different order agree on the edge.
pub fn addrs_edge(logs: &[LogInfo]) -> u64 {
    logs.iter().fold(EMPTY_EDGE, |acc, log| {
        let mut addrs: Vec<String> = log.addrs.iter().map(Multiaddr::to_string).collect();
        addrs.sort_unstable();
        addrs.dedup();

        let mut entry = Vec::new();
        push_chunk(&mut entry, &log.id.to_bytes());
        for addr in &addrs {
            push_chunk(&mut entry, addr.as_bytes());
        }
        acc ^ entry_hash(&entry)
    })
}

/// Fingerprint of a `(log, head)` set.
pub fn heads_edge(heads: &[(LogId, Cid)]) -> u64 {
    heads.iter().fold(EMPTY_EDGE, |acc, (id, head)| {
        let mut entry = Vec::new();
        push_chunk(&mut entry, &id.to_bytes());
        push_chunk(&mut entry, head.as_bytes());
        acc ^ entry_hash(&entry)
    })
}

// Length-prefixed chunks keep entry encoding unambiguous.
fn push_chunk(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn entry_hash(entry: &[u8]) -> u64 {
    let digest = Sha256::digest(entry);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use libp2p::identity::Keypair;

    use super::*;

    fn log(addrs: &[&str]) -> LogInfo {
        let key = Keypair::generate_ed25519();
        LogInfo {
            id: key.public().to_peer_id(),
            pub_key: key.public(),
            addrs: addrs.iter().map(|a| a.parse().unwrap()).collect(),
            head: None,
        }
    }

    #[test]
    fn empty_sets_hash_to_zero() {
        assert_eq!(addrs_edge(&[]), EMPTY_EDGE);
        assert_eq!(heads_edge(&[]), EMPTY_EDGE);
    }

    #[test]
    fn addrs_edge_ignores_log_order() {
        let a = log(&["/ip4/127.0.0.1/tcp/4001"]);
        let b = log(&["/ip4/10.0.0.2/tcp/4002"]);
        let forward = addrs_edge(&[a.clone(), b.clone()]);
        let backward = addrs_edge(&[b, a]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn addrs_edge_ignores_address_order() {
        let mut one = log(&["/ip4/127.0.0.1/tcp/4001", "/ip4/10.0.0.2/tcp/4002"]);
        let mut two = one.clone();
        two.addrs.reverse();
        let left = addrs_edge(std::slice::from_ref(&one));
        let right = addrs_edge(std::slice::from_ref(&two));
        assert_eq!(left, right);
        one.addrs.pop();
        assert_ne!(addrs_edge(&[one]), left);
    }

    #[test]
    fn heads_edge_tracks_head_movement() {
        let id = Keypair::generate_ed25519().public().to_peer_id();
        let before = heads_edge(&[(id, Cid::of(b"first"))]);
        let after = heads_edge(&[(id, Cid::of(b"second"))]);
        assert_ne!(before, after);
    }

    #[test]
    fn heads_edge_ignores_order() {
        let a = (Keypair::generate_ed25519().public().to_peer_id(), Cid::of(b"a"));
        let b = (Keypair::generate_ed25519().public().to_peer_id(), Cid::of(b"b"));
        assert_eq!(heads_edge(&[a, b]), heads_edge(&[b, a]));
    }
}
