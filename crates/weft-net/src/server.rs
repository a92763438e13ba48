// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Server side of the sync protocol.
//!
//! The five handlers mutate state only through the logstore and schedule all
//! long-running follow-up work on the call queue, so an RPC reply is never
//! blocked on synchronization. Every handler starts by verifying the
//! request signature and deriving the caller's peer identity from the
//! embedded public key.

use std::{collections::HashMap, sync::Arc};

use libp2p::PeerId;
use weft_core::{
    edge, Cid, LogId, Logstore, ServiceKey, StoreError, ThreadId,
};

use crate::{
    config::NetConfig,
    error::NetError,
    protocol::{
        sign,
        types::{
            log_id_from_bytes, EdgeReply, ExchangeEdgesReply, ExchangeEdgesRequest, GetLogsReply,
            GetLogsRequest, GetRecordsReply, GetRecordsRequest, LogRecords, PushLogReply,
            PushLogRequest, PushRecordReply, PushRecordRequest, SyncRequest, SyncResponse,
            WireLog, WireRecord,
        },
    },
    pubsub::Pubsub,
    queue::{CallQueue, Priority, SyncCall},
    semaphore::SemaphorePool,
    status::{SyncStatus, ThreadStatusRegistry},
};

/// The replication service. The network layer owns it and dispatches
/// inbound sync requests to its handlers; the handlers reach back out only
/// through the queues and seams handed in here.
pub struct Service {
    store: Arc<dyn Logstore>,
    queue: Arc<CallQueue>,
    semaphores: Arc<SemaphorePool>,
    status: Option<Arc<ThreadStatusRegistry>>,
    pubsub: Option<Arc<dyn Pubsub>>,
    config: NetConfig,
}

impl Service {
    pub fn new(
        store: Arc<dyn Logstore>,
        queue: Arc<CallQueue>,
        semaphores: Arc<SemaphorePool>,
        config: NetConfig,
    ) -> Self {
        Service {
            store,
            queue,
            semaphores,
            status: None,
            pubsub: None,
            config,
        }
    }

    /// Attach a status registry. Legal to omit; handlers check presence.
    pub fn with_status(mut self, status: Arc<ThreadStatusRegistry>) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the gossip topic-membership seam.
    pub fn with_pubsub(mut self, pubsub: Arc<dyn Pubsub>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    /// Dispatch one wire request to its handler and fold errors into the
    /// wire error reply.
    pub async fn handle(&self, request: SyncRequest) -> SyncResponse {
        match request {
            SyncRequest::GetLogs(req) => match self.get_logs(req).await {
                Ok(reply) => SyncResponse::GetLogs(reply),
                Err(e) => SyncResponse::Error((&e).into()),
            },
            SyncRequest::PushLog(req) => match self.push_log(req).await {
                Ok(reply) => SyncResponse::PushLog(reply),
                Err(e) => SyncResponse::Error((&e).into()),
            },
            SyncRequest::GetRecords(req) => match self.get_records(req).await {
                Ok(reply) => SyncResponse::GetRecords(reply),
                Err(e) => SyncResponse::Error((&e).into()),
            },
            SyncRequest::PushRecord(req) => match self.push_record(req).await {
                Ok(reply) => SyncResponse::PushRecord(reply),
                Err(e) => SyncResponse::Error((&e).into()),
            },
            SyncRequest::ExchangeEdges(req) => match self.exchange_edges(req).await {
                Ok(reply) => SyncResponse::ExchangeEdges(reply),
                Err(e) => SyncResponse::Error((&e).into()),
            },
        }
    }

    // ── get_logs ─────────────────────────────────────────────────────────────

    /// Return every local log of a thread to an authorized caller.
    pub async fn get_logs(&self, req: GetLogsRequest) -> Result<GetLogsReply, NetError> {
        let (caller, body) = sign::verify_request(req).await?;
        self.check_service_key(&body.thread_id, &body.service_key)
            .await?;

        let info = self.store.thread(&body.thread_id).await?;
        tracing::debug!(thread = %body.thread_id, peer = %caller, logs = info.logs.len(), "get_logs");
        Ok(GetLogsReply {
            logs: info.logs.iter().map(WireLog::from_info).collect(),
        })
    }

    // ── push_log ─────────────────────────────────────────────────────────────

    /// Accept a log announcement, taking up any keys we lack, and schedule a
    /// background pull of the log's records from the caller.
    pub async fn push_log(&self, req: PushLogRequest) -> Result<PushLogReply, NetError> {
        let (caller, body) = sign::verify_request(req).await?;
        let thread_id = body.thread_id;

        // Best-effort key uptake: a service key makes an unknown thread
        // followable, a read key upgrades an existing unreadable one.
        let mut keyed_now = false;
        if self.store.service_key(&thread_id).await?.is_none() {
            if let Some(service_key) = &body.service_key {
                self.store.add_service_key(&thread_id, service_key).await?;
                keyed_now = true;
            }
        }
        if self.store.service_key(&thread_id).await?.is_some()
            && self.store.read_key(&thread_id).await?.is_none()
        {
            if let Some(read_key) = &body.read_key {
                self.store.add_read_key(&thread_id, read_key).await?;
            }
        }
        if self.store.service_key(&thread_id).await?.is_none() {
            return Err(NetError::NotFound(format!("thread {thread_id} not found")));
        }

        let info = body.log.to_info()?;
        self.store
            .create_external_log_if_not_exist(&thread_id, &info)
            .await?;
        tracing::debug!(thread = %thread_id, log = %info.id, peer = %caller, "push_log accepted");

        if keyed_now {
            if let Some(pubsub) = &self.pubsub {
                pubsub.subscribe(&thread_id);
            }
        }

        // The reply does not wait for the records themselves.
        self.queue
            .schedule(caller, thread_id, Priority::Low, SyncCall::UpdateRecords);
        Ok(PushLogReply {})
    }

    // ── get_records ──────────────────────────────────────────────────────────

    /// Return records the caller is missing, per log, bounded by
    /// `max_pull_limit` across the whole reply.
    pub async fn get_records(&self, req: GetRecordsRequest) -> Result<GetRecordsReply, NetError> {
        let (caller, body) = sign::verify_request(req).await?;
        self.check_service_key(&body.thread_id, &body.service_key)
            .await?;
        let thread_id = body.thread_id;

        let mut requested: HashMap<LogId, (Option<Cid>, usize)> = HashMap::new();
        let mut offsets: Vec<(LogId, Cid)> = Vec::new();
        for cursor in &body.logs {
            let log_id = log_id_from_bytes(&cursor.log_id)?;
            if let Some(offset) = cursor.offset {
                offsets.push((log_id, offset));
            }
            requested.insert(log_id, (cursor.offset, cursor.limit));
        }

        // Fast path: when the heads the caller already holds fingerprint to
        // our own heads edge, there is nothing to send.
        let expected = edge::heads_edge(&offsets);
        let local = match self.store.heads_edge(&thread_id).await {
            Ok(edge) => edge,
            Err(StoreError::NoHeads(_)) => edge::EMPTY_EDGE,
            Err(StoreError::ThreadNotFound(_)) => {
                // Let the caller discover us via exchange_edges first.
                return Ok(GetRecordsReply { logs: Vec::new() });
            }
            Err(e) => return Err(e.into()),
        };
        if local == expected {
            tracing::debug!(thread = %thread_id, peer = %caller, "get_records: heads edges equal");
            return Ok(GetRecordsReply { logs: Vec::new() });
        }

        let info = self.store.thread(&thread_id).await?;
        if info.logs.is_empty() {
            return Ok(GetRecordsReply { logs: Vec::new() });
        }
        // Each log's share of the pull budget; zero when the thread has more
        // logs than the budget covers. A zero-share log still reports its
        // descriptor below if the caller did not know it.
        let per_log_limit = self.config.max_pull_limit / info.logs.len();

        // Fan out one fetch per log; results are merged after the join.
        let fetches = info.logs.into_iter().map(|log| {
            let store = Arc::clone(&self.store);
            let (offset, limit, known_to_caller) = match requested.get(&log.id) {
                Some((offset, caller_limit)) => {
                    (*offset, (*caller_limit).min(per_log_limit), true)
                }
                None => (None, per_log_limit, false),
            };
            async move {
                match store
                    .records_after(&thread_id, &log.id, offset.as_ref(), limit)
                    .await
                {
                    Ok(records) => Ok(LogRecords {
                        log_id: log.id.to_bytes(),
                        records: records.iter().map(WireRecord::from_record).collect(),
                        log: (!known_to_caller).then(|| WireLog::from_info(&log)),
                    }),
                    Err(e) => Err((log.id, e)),
                }
            }
        });
        let results = futures::future::join_all(fetches).await;

        let mut failures = 0usize;
        let mut entries = Vec::new();
        for result in results {
            match result {
                // Nothing new and nothing the caller did not know about.
                Ok(entry) if entry.records.is_empty() && entry.log.is_none() => {}
                Ok(entry) => entries.push(entry),
                Err((log_id, StoreError::OffsetMissing(offset))) => {
                    // The caller is ahead of us on this log, not behind.
                    failures += 1;
                    tracing::debug!(
                        thread = %thread_id, log = %log_id, %offset,
                        "get_records: caller offset unknown locally; scheduling pull"
                    );
                    self.queue
                        .schedule(caller, thread_id, Priority::High, SyncCall::UpdateRecords);
                }
                Err((log_id, e)) => {
                    failures += 1;
                    tracing::warn!(thread = %thread_id, log = %log_id, error = %e, "get_records: log fetch failed");
                }
            }
        }

        // Answering a pull cleanly is an upload from our point of view.
        if failures == 0 {
            self.apply_status(caller, thread_id, SyncStatus::UploadDone);
        }
        Ok(GetRecordsReply { logs: entries })
    }

    // ── push_record ──────────────────────────────────────────────────────────

    /// Accept one record for a known log. Repeated deliveries of the same
    /// record are idempotent.
    pub async fn push_record(&self, req: PushRecordRequest) -> Result<PushRecordReply, NetError> {
        let (caller, body) = sign::verify_request(req).await?;
        let thread_id = body.thread_id;
        let log_id = log_id_from_bytes(&body.log_id)?;

        let pub_key = self
            .store
            .log_pub_key(&thread_id, &log_id)
            .await?
            .ok_or_else(|| NetError::NotFound("log not found".into()))?;
        // The log is known, so a missing service key is a local invariant
        // violation rather than the caller's mistake.
        let service_key = self
            .store
            .service_key(&thread_id)
            .await?
            .ok_or_else(|| NetError::Internal(format!("no service key for thread {thread_id}")))?;

        let record = body
            .record
            .to_record(&service_key)
            .map_err(|e| NetError::Internal(format!("record decode: {e}")))?;

        if self.store.has_record(&thread_id, &log_id, record.cid()).await? {
            self.apply_status(caller, thread_id, SyncStatus::DownloadDone);
            return Ok(PushRecordReply {});
        }

        if !record.verify(&pub_key) {
            return Err(NetError::Unauthenticated("invalid record signature".into()));
        }

        self.apply_status(caller, thread_id, SyncStatus::DownloadStarted);
        // Every exit path below emits a terminal status: failure unless
        // explicitly promoted just before the successful return.
        let mut terminal = StatusGuard::new(self.status.clone(), caller, thread_id);

        let semaphore = self.semaphores.get(thread_id);
        let _token = semaphore.acquire_guard().await;
        match self.store.put_record(&thread_id, &log_id, &record).await {
            Ok(_) => {} // Inserted, or Known when a concurrent push won the race.
            Err(StoreError::MissingLink(cid)) => {
                // A gap: the caller has records we never saw. Reconcile in
                // the background instead of failing the push.
                tracing::debug!(
                    thread = %thread_id, log = %log_id, %cid,
                    "push_record: record does not extend local head; scheduling pull"
                );
                self.queue
                    .schedule(caller, thread_id, Priority::High, SyncCall::UpdateRecords);
                return Ok(PushRecordReply {});
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(thread = %thread_id, log = %log_id, cid = %record.cid(), peer = %caller, "record stored");
        terminal.succeed();
        Ok(PushRecordReply {})
    }

    // ── exchange_edges ───────────────────────────────────────────────────────

    /// Compare per-thread fingerprints with the caller's and schedule the
    /// cheapest reconciliation that covers each mismatch.
    pub async fn exchange_edges(
        &self,
        req: ExchangeEdgesRequest,
    ) -> Result<ExchangeEdgesReply, NetError> {
        let (caller, body) = sign::verify_request(req).await?;

        let mut edges = Vec::with_capacity(body.threads.len());
        for entry in &body.threads {
            let thread_id = entry.thread_id;
            let local_addrs = match self.store.addrs_edge(&thread_id).await {
                Ok(edge) => edge,
                Err(StoreError::NoAddrs(_)) => {
                    // A thread we never heard of: fetch its logs and join
                    // its topic, ahead of routine reconciliation.
                    tracing::debug!(thread = %thread_id, peer = %caller, "exchange_edges: unknown thread announced");
                    self.queue.schedule(
                        caller,
                        thread_id,
                        Priority::High,
                        SyncCall::UpdateLogsAndSubscribe,
                    );
                    edges.push(EdgeReply {
                        thread_id,
                        exists: false,
                        address_edge: None,
                        heads_edge: None,
                    });
                    continue;
                }
                Err(e) => {
                    return Err(NetError::Internal(format!(
                        "address edge for thread {thread_id}: {e}"
                    )))
                }
            };

            let local_heads = match self.store.heads_edge(&thread_id).await {
                Ok(edge) => edge,
                Err(StoreError::NoHeads(_)) => {
                    // We know the thread but hold no records at all yet.
                    self.queue
                        .schedule(caller, thread_id, Priority::Low, SyncCall::UpdateRecords);
                    edges.push(EdgeReply {
                        thread_id,
                        exists: false,
                        address_edge: None,
                        heads_edge: None,
                    });
                    continue;
                }
                Err(e) => {
                    return Err(NetError::Internal(format!(
                        "heads edge for thread {thread_id}: {e}"
                    )))
                }
            };

            let addrs_equal = local_addrs == entry.address_edge;
            let heads_equal = local_heads == entry.heads_edge;
            if addrs_equal && heads_equal {
                self.apply_status(caller, thread_id, SyncStatus::DownloadDone);
                self.apply_status(caller, thread_id, SyncStatus::UploadDone);
            }
            if !addrs_equal {
                self.queue
                    .schedule(caller, thread_id, Priority::Low, SyncCall::UpdateLogs);
            }
            if !heads_equal {
                self.queue
                    .schedule(caller, thread_id, Priority::Low, SyncCall::UpdateRecords);
            }
            edges.push(EdgeReply {
                thread_id,
                exists: true,
                address_edge: Some(local_addrs),
                heads_edge: Some(local_heads),
            });
        }
        Ok(ExchangeEdgesReply { edges })
    }

    // ── pubsub ───────────────────────────────────────────────────────────────

    /// Entry point for records delivered over a gossip topic. An unknown log
    /// is not an error here: the direct RPC copy is the durable path.
    pub async fn handle_pubsub_record(&self, req: PushRecordRequest) {
        match self.push_record(req).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "pubsub record for unknown log dropped; direct push will follow");
            }
            Err(e) => {
                tracing::warn!(error = %e, "pubsub record rejected");
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Service-key authorization: no local key means the thread does not
    /// exist for the caller; a byte-wise mismatch means it exists but the
    /// caller is not entitled to it.
    async fn check_service_key(
        &self,
        thread: &ThreadId,
        provided: &ServiceKey,
    ) -> Result<(), NetError> {
        match self.store.service_key(thread).await? {
            None => Err(NetError::NotFound(format!("thread {thread} not found"))),
            // ServiceKey equality is constant-time.
            Some(local) if local == *provided => Ok(()),
            Some(_) => Err(NetError::Unauthenticated("wrong service key".into())),
        }
    }

    fn apply_status(&self, peer: PeerId, thread: ThreadId, status: SyncStatus) {
        if let Some(registry) = &self.status {
            registry.apply(peer, thread, status);
        }
    }
}

/// Emits a terminal download status on every exit path; created as
/// `DownloadFailed` and promoted to `DownloadDone` just before a successful
/// return.
struct StatusGuard {
    status: Option<Arc<ThreadStatusRegistry>>,
    peer: PeerId,
    thread: ThreadId,
    terminal: SyncStatus,
}

impl StatusGuard {
    fn new(status: Option<Arc<ThreadStatusRegistry>>, peer: PeerId, thread: ThreadId) -> Self {
        StatusGuard {
            status,
            peer,
            thread,
            terminal: SyncStatus::DownloadFailed,
        }
    }

    fn succeed(&mut self) {
        self.terminal = SyncStatus::DownloadDone;
    }
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        if let Some(registry) = &self.status {
            registry.apply(self.peer, self.thread, self.terminal);
        }
    }
}
