// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Thread-status observability.
//!
//! Handlers report sync transitions per `(peer, thread)`; a fold task
//! collapses them into the latest known download/upload state. The sink is
//! lossy by design: `apply` never blocks the RPC path, and transitions
//! beyond the buffer are dropped with a debug log. Observability, not
//! durability.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
};

use libp2p::PeerId;
use tokio::sync::mpsc;
use weft_core::ThreadId;

/// A sync transition reported by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    UploadStarted,
    UploadDone,
    UploadFailed,
    DownloadStarted,
    DownloadDone,
    DownloadFailed,
}

/// Folded state of one direction of sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Unknown,
    InProgress,
    Failed,
    Done,
}

/// Latest known sync state for a `(peer, thread)` pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerThreadStatus {
    pub down: SyncState,
    pub up: SyncState,
    /// When either direction last completed successfully.
    pub last_done: Option<Instant>,
}

impl PeerThreadStatus {
    fn apply(&mut self, status: SyncStatus) {
        match status {
            SyncStatus::DownloadStarted => self.down = SyncState::InProgress,
            SyncStatus::DownloadFailed => self.down = SyncState::Failed,
            SyncStatus::DownloadDone => {
                self.down = SyncState::Done;
                self.last_done = Some(Instant::now());
            }
            SyncStatus::UploadStarted => self.up = SyncState::InProgress,
            SyncStatus::UploadFailed => self.up = SyncState::Failed,
            SyncStatus::UploadDone => {
                self.up = SyncState::Done;
                self.last_done = Some(Instant::now());
            }
        }
    }
}

type Table = Arc<Mutex<HashMap<(PeerId, ThreadId), PeerThreadStatus>>>;

/// Non-blocking sink for sync transitions.
#[derive(Debug)]
pub struct ThreadStatusRegistry {
    tx: mpsc::Sender<(PeerId, ThreadId, SyncStatus)>,
    table: Table,
}

/// Consumer half of the registry; run it on a background task.
#[derive(Debug)]
pub struct StatusWorker {
    rx: mpsc::Receiver<(PeerId, ThreadId, SyncStatus)>,
    table: Table,
}

/// Create a registry with room for `buffer` in-flight transitions.
pub fn registry(buffer: usize) -> (Arc<ThreadStatusRegistry>, StatusWorker) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let table: Table = Arc::new(Mutex::new(HashMap::new()));
    (
        Arc::new(ThreadStatusRegistry {
            tx,
            table: Arc::clone(&table),
        }),
        StatusWorker { rx, table },
    )
}

impl ThreadStatusRegistry {
    /// Record a transition. Never blocks; drops under back-pressure.
    pub fn apply(&self, peer: PeerId, thread: ThreadId, status: SyncStatus) {
        if self.tx.try_send((peer, thread, status)).is_err() {
            tracing::debug!(%peer, %thread, ?status, "status transition dropped: registry backlog full");
        }
    }

    /// Latest folded state for a `(peer, thread)` pair.
    pub fn get(&self, peer: &PeerId, thread: &ThreadId) -> Option<PeerThreadStatus> {
        let table = self.table.lock().unwrap();
        table.get(&(*peer, *thread)).copied()
    }

    /// All known `(peer, thread)` states.
    pub fn snapshot(&self) -> Vec<((PeerId, ThreadId), PeerThreadStatus)> {
        let table = self.table.lock().unwrap();
        table.iter().map(|(k, v)| (*k, *v)).collect()
    }
}

impl StatusWorker {
    /// Fold incoming transitions until every registry handle is dropped.
    pub async fn run(mut self) {
        while let Some((peer, thread, status)) = self.rx.recv().await {
            let mut table = self.table.lock().unwrap();
            table.entry((peer, thread)).or_default().apply(status);
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> PeerId {
        libp2p::identity::Keypair::generate_ed25519()
            .public()
            .to_peer_id()
    }

    #[tokio::test]
    async fn transitions_fold_into_latest_state() {
        let (registry, worker) = registry(16);
        let handle = tokio::spawn(worker.run());
        let (p, t) = (peer(), ThreadId::random());

        registry.apply(p, t, SyncStatus::DownloadStarted);
        registry.apply(p, t, SyncStatus::DownloadDone);
        registry.apply(p, t, SyncStatus::UploadFailed);

        // The worker owns the only receiver; yield until it has drained.
        tokio::task::yield_now().await;
        let status = loop {
            match registry.get(&p, &t) {
                Some(s) if s.up == SyncState::Failed => break s,
                _ => tokio::task::yield_now().await,
            }
        };
        assert_eq!(status.down, SyncState::Done);
        assert!(status.last_done.is_some());
        drop(registry);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn apply_is_lossy_when_backlogged() {
        // No worker draining: the buffer fills and excess drops silently.
        let (registry, _worker) = registry(1);
        let (p, t) = (peer(), ThreadId::random());
        for _ in 0..16 {
            registry.apply(p, t, SyncStatus::DownloadStarted);
        }
        assert!(registry.get(&p, &t).is_none());
    }
}
