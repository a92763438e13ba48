// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Logstore abstraction.
//!
//! `Logstore` is the single seam between the replication engine and whatever
//! persistence backend is used (an embedded database in production, the
//! in-memory map for tests). The caller constructs the concrete
//! implementation and hands it around as an `Arc<dyn Logstore>`.
//!
//! Head pointers are advanced only by [`Logstore::put_record`]; log metadata
//! learned from remote peers never carries a head with it. This keeps the
//! heads edge an exact reflection of the records actually held locally.

pub mod memory;

use async_trait::async_trait;
use libp2p::{identity::PublicKey, Multiaddr};
use thiserror::Error;

use crate::{
    id::{Cid, LogId, ThreadId},
    key::{ReadKey, ServiceKey},
    record::Record,
};

/// One writer's log within a thread, as known locally.
#[derive(Debug, Clone)]
pub struct LogInfo {
    /// The author's peer identity.
    pub id: LogId,
    /// The author's public key; record signatures verify against it.
    pub pub_key: PublicKey,
    /// Addresses the author (or a relay) is reachable at.
    pub addrs: Vec<Multiaddr>,
    /// Most recent record held locally; `None` for a log with no records.
    pub head: Option<Cid>,
}

/// A thread's locally-known metadata.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub logs: Vec<LogInfo>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("thread {0} not found")]
    ThreadNotFound(ThreadId),

    #[error("log {0} not found in thread {1}")]
    LogNotFound(LogId, ThreadId),

    /// Sentinel for an unknown thread when computing the address edge.
    #[error("no addresses for thread {0}")]
    NoAddrs(ThreadId),

    /// Sentinel for a known thread in which no log has a head yet.
    #[error("no heads for thread {0}")]
    NoHeads(ThreadId),

    /// The caller's offset is not part of the locally-held chain.
    #[error("offset {0} not found in local chain")]
    OffsetMissing(Cid),

    /// The record does not extend the current head and is not already known.
    #[error("record {0} does not link to the current head")]
    MissingLink(Cid),

    #[error("log rejected: {0}")]
    InvalidLog(String),

    #[error("storage backend: {0}")]
    Backend(String),
}

/// Result of [`Logstore::put_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record was stored and the head advanced to it.
    Inserted,
    /// The record was already present; nothing changed.
    Known,
}

/// Persistence seam for thread, log, key and record state.
#[async_trait]
pub trait Logstore: Send + Sync + 'static {
    /// Metadata of a thread, or `ThreadNotFound`.
    async fn thread(&self, id: &ThreadId) -> Result<ThreadInfo, StoreError>;

    /// The thread's service key, `None` when the thread is unknown or keyless.
    async fn service_key(&self, id: &ThreadId) -> Result<Option<ServiceKey>, StoreError>;

    /// The thread's read key, if any.
    async fn read_key(&self, id: &ThreadId) -> Result<Option<ReadKey>, StoreError>;

    /// Persist a service key, creating the thread entry when unknown.
    async fn add_service_key(&self, id: &ThreadId, key: &ServiceKey) -> Result<(), StoreError>;

    /// Persist a read key for an existing thread.
    async fn add_read_key(&self, id: &ThreadId, key: &ReadKey) -> Result<(), StoreError>;

    /// Public key of a log, `None` when thread or log is unknown.
    async fn log_pub_key(&self, id: &ThreadId, log: &LogId) -> Result<Option<PublicKey>, StoreError>;

    /// Upsert a log learned from a remote peer. Creates the log when absent;
    /// for an existing log only merges previously-unseen addresses (remote
    /// pushes are addressing hints, never an overwrite of identity or head).
    async fn create_external_log_if_not_exist(
        &self,
        id: &ThreadId,
        log: &LogInfo,
    ) -> Result<(), StoreError>;

    /// Address edge of a thread; `NoAddrs` when the thread is unknown.
    async fn addrs_edge(&self, id: &ThreadId) -> Result<u64, StoreError>;

    /// Heads edge of a thread; `ThreadNotFound` when unknown, `NoHeads` when
    /// known but no log has a record yet.
    async fn heads_edge(&self, id: &ThreadId) -> Result<u64, StoreError>;

    /// Current head of a log.
    async fn head(&self, id: &ThreadId, log: &LogId) -> Result<Option<Cid>, StoreError>;

    /// Whether the record `cid` is held for `(id, log)`.
    async fn has_record(&self, id: &ThreadId, log: &LogId, cid: &Cid) -> Result<bool, StoreError>;

    /// Records of a log strictly after `offset` (or from the chain start when
    /// `None`), oldest first, at most `limit` of them. `OffsetMissing` when
    /// the offset is not held locally.
    async fn records_after(
        &self,
        id: &ThreadId,
        log: &LogId,
        offset: Option<&Cid>,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError>;

    /// Store a record and advance the head. Accepts only a record that
    /// extends the current head (`MissingLink` otherwise); storing a record
    /// that is already present is a no-op reported as `Known`.
    async fn put_record(
        &self,
        id: &ThreadId,
        log: &LogId,
        record: &Record,
    ) -> Result<PutOutcome, StoreError>;
}
