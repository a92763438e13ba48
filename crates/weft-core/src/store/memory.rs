// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! In-memory `Logstore` implementation, suitable for tests, local demos and
//! any scenario where durability is not required.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use libp2p::{identity::PublicKey, Multiaddr};

use crate::{
    edge,
    id::{Cid, LogId, ThreadId},
    key::{ReadKey, ServiceKey},
    record::Record,
};

use super::{LogInfo, Logstore, PutOutcome, StoreError, ThreadInfo};

#[derive(Debug)]
struct LogState {
    pub_key: PublicKey,
    addrs: Vec<Multiaddr>,
    head: Option<Cid>,
    records: HashMap<Cid, Record>,
}

impl LogState {
    fn info(&self, id: LogId) -> LogInfo {
        LogInfo {
            id,
            pub_key: self.pub_key.clone(),
            addrs: self.addrs.clone(),
            head: self.head,
        }
    }
}

#[derive(Debug, Default)]
struct ThreadState {
    service_key: Option<ServiceKey>,
    read_key: Option<ReadKey>,
    logs: HashMap<LogId, LogState>,
}

#[derive(Debug, Default)]
struct Inner {
    threads: HashMap<ThreadId, ThreadState>,
}

/// Thread-safe in-memory logstore.
///
/// Clones share the same underlying state, so a service under test and the
/// test body observe the same threads.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogstore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryLogstore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Logstore for MemoryLogstore {
    async fn thread(&self, id: &ThreadId) -> Result<ThreadInfo, StoreError> {
        let g = self.inner.lock().unwrap();
        let thread = g.threads.get(id).ok_or(StoreError::ThreadNotFound(*id))?;
        Ok(ThreadInfo {
            id: *id,
            logs: thread.logs.iter().map(|(lid, ls)| ls.info(*lid)).collect(),
        })
    }

    async fn service_key(&self, id: &ThreadId) -> Result<Option<ServiceKey>, StoreError> {
        let g = self.inner.lock().unwrap();
        Ok(g.threads.get(id).and_then(|t| t.service_key.clone()))
    }

    async fn read_key(&self, id: &ThreadId) -> Result<Option<ReadKey>, StoreError> {
        let g = self.inner.lock().unwrap();
        Ok(g.threads.get(id).and_then(|t| t.read_key.clone()))
    }

    async fn add_service_key(&self, id: &ThreadId, key: &ServiceKey) -> Result<(), StoreError> {
        let mut g = self.inner.lock().unwrap();
        g.threads.entry(*id).or_default().service_key = Some(key.clone());
        Ok(())
    }

    async fn add_read_key(&self, id: &ThreadId, key: &ReadKey) -> Result<(), StoreError> {
        let mut g = self.inner.lock().unwrap();
        let thread = g
            .threads
            .get_mut(id)
            .ok_or(StoreError::ThreadNotFound(*id))?;
        thread.read_key = Some(key.clone());
        Ok(())
    }

    async fn log_pub_key(&self, id: &ThreadId, log: &LogId) -> Result<Option<PublicKey>, StoreError> {
        let g = self.inner.lock().unwrap();
        Ok(g.threads
            .get(id)
            .and_then(|t| t.logs.get(log))
            .map(|l| l.pub_key.clone()))
    }

    async fn create_external_log_if_not_exist(
        &self,
        id: &ThreadId,
        log: &LogInfo,
    ) -> Result<(), StoreError> {
        if log.pub_key.to_peer_id() != log.id {
            return Err(StoreError::InvalidLog(format!(
                "log id {} does not match its public key",
                log.id
            )));
        }
        let mut g = self.inner.lock().unwrap();
        let thread = g
            .threads
            .get_mut(id)
            .ok_or(StoreError::ThreadNotFound(*id))?;
        match thread.logs.get_mut(&log.id) {
            // Existing log: merge new addresses only. The head is advanced by
            // put_record and the identity is fixed by the log id.
            Some(existing) => {
                for addr in &log.addrs {
                    if !existing.addrs.contains(addr) {
                        existing.addrs.push(addr.clone());
                    }
                }
            }
            None => {
                thread.logs.insert(
                    log.id,
                    LogState {
                        pub_key: log.pub_key.clone(),
                        addrs: log.addrs.clone(),
                        head: None,
                        records: HashMap::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn addrs_edge(&self, id: &ThreadId) -> Result<u64, StoreError> {
        let g = self.inner.lock().unwrap();
        let thread = g.threads.get(id).ok_or(StoreError::NoAddrs(*id))?;
        let logs: Vec<LogInfo> = thread.logs.iter().map(|(lid, ls)| ls.info(*lid)).collect();
        Ok(edge::addrs_edge(&logs))
    }

    async fn heads_edge(&self, id: &ThreadId) -> Result<u64, StoreError> {
        let g = self.inner.lock().unwrap();
        let thread = g.threads.get(id).ok_or(StoreError::ThreadNotFound(*id))?;
        let heads: Vec<(LogId, Cid)> = thread
            .logs
            .iter()
            .filter_map(|(lid, ls)| ls.head.map(|h| (*lid, h)))
            .collect();
        if heads.is_empty() {
            return Err(StoreError::NoHeads(*id));
        }
        Ok(edge::heads_edge(&heads))
    }

    async fn head(&self, id: &ThreadId, log: &LogId) -> Result<Option<Cid>, StoreError> {
        let g = self.inner.lock().unwrap();
        Ok(g.threads.get(id).and_then(|t| t.logs.get(log)).and_then(|l| l.head))
    }

    async fn has_record(&self, id: &ThreadId, log: &LogId, cid: &Cid) -> Result<bool, StoreError> {
        let g = self.inner.lock().unwrap();
        Ok(g.threads
            .get(id)
            .and_then(|t| t.logs.get(log))
            .is_some_and(|l| l.records.contains_key(cid)))
    }

    async fn records_after(
        &self,
        id: &ThreadId,
        log: &LogId,
        offset: Option<&Cid>,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let g = self.inner.lock().unwrap();
        let thread = g.threads.get(id).ok_or(StoreError::ThreadNotFound(*id))?;
        let state = thread
            .logs
            .get(log)
            .ok_or(StoreError::LogNotFound(*log, *id))?;

        if let Some(off) = offset {
            if !state.records.contains_key(off) {
                return Err(StoreError::OffsetMissing(*off));
            }
        }

        // Walk the chain back from the head to the offset, then hand out the
        // oldest records first so the caller extends its chain in order.
        let mut newest_first = Vec::new();
        let mut cursor = state.head;
        while let Some(cid) = cursor {
            if offset == Some(&cid) {
                break;
            }
            let record = state
                .records
                .get(&cid)
                .ok_or_else(|| StoreError::Backend(format!("chain broken at {cid}")))?;
            newest_first.push(record.clone());
            cursor = record.prev();
        }
        newest_first.reverse();
        newest_first.truncate(limit);
        Ok(newest_first)
    }

    async fn put_record(
        &self,
        id: &ThreadId,
        log: &LogId,
        record: &Record,
    ) -> Result<PutOutcome, StoreError> {
        let mut g = self.inner.lock().unwrap();
        let thread = g
            .threads
            .get_mut(id)
            .ok_or(StoreError::ThreadNotFound(*id))?;
        let state = thread
            .logs
            .get_mut(log)
            .ok_or(StoreError::LogNotFound(*log, *id))?;

        if state.records.contains_key(record.cid()) {
            return Ok(PutOutcome::Known);
        }
        if record.prev() != state.head {
            return Err(StoreError::MissingLink(*record.cid()));
        }
        state.records.insert(*record.cid(), record.clone());
        state.head = Some(*record.cid());
        Ok(PutOutcome::Inserted)
    }
}
