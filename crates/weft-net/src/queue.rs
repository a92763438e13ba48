// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Background sync scheduling.
//!
//! Remote-initiated handlers must reply quickly, but their consequences
//! (pulling logs or records from the peer that told us about them) are
//! long-running. The call queue absorbs those follow-ups: work is keyed by
//! `(peer, thread, call)`, duplicates collapse into one entry, a queued
//! entry's priority may be upgraded but never downgraded, and at most one
//! invocation per key is in flight at any time. Work scheduled while its key
//! is running is parked and re-queued when the running invocation finishes.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use libp2p::PeerId;
use tokio::sync::Notify;
use weft_core::ThreadId;

/// Scheduling class of a queue entry. `High` entries always dequeue first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    High,
}

/// Identity of the background function to invoke. Two schedules with the
/// same call (and peer and thread) are the same work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncCall {
    /// Pull the peer's log metadata for the thread.
    UpdateLogs,
    /// Pull new records for the thread from the peer.
    UpdateRecords,
    /// Pull logs, then join the thread's pubsub topic. Queued when a peer
    /// announces a thread we did not know existed.
    UpdateLogsAndSubscribe,
}

/// The work the queue drives. Implemented by the network layer's client
/// side; the queue only guarantees deduplication and ordering.
#[async_trait]
pub trait SyncHandler: Send + Sync + 'static {
    async fn handle(&self, call: SyncCall, peer: PeerId, thread: ThreadId);
}

type Key = (PeerId, ThreadId, SyncCall);

#[derive(Debug, Clone, Copy)]
enum EntryState {
    /// Waiting in one of the deques.
    Queued(Priority),
    /// An invocation is in flight and nothing further is pending.
    Running,
    /// In flight, with another round requested while running.
    RunningQueued(Priority),
}

#[derive(Debug, Default)]
struct Inner {
    state: HashMap<Key, EntryState>,
    high: VecDeque<Key>,
    low: VecDeque<Key>,
}

/// Deduplicating two-priority scheduler for background sync work.
#[derive(Debug)]
pub struct CallQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    closed: AtomicBool,
}

impl Default for CallQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CallQueue {
    pub fn new() -> Self {
        CallQueue {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Request `call` for `(peer, thread)`. Returns `true` iff this request
    /// changed the queue: a new entry, an upgraded priority, or a pending
    /// round behind a running invocation. Equal or lower priority against an
    /// existing entry is a no-op.
    pub fn schedule(
        &self,
        peer: PeerId,
        thread: ThreadId,
        priority: Priority,
        call: SyncCall,
    ) -> bool {
        let key = (peer, thread, call);
        let mut inner = self.inner.lock().unwrap();
        let changed = match inner.state.get(&key).copied() {
            None => {
                inner.state.insert(key, EntryState::Queued(priority));
                inner.deque(priority).push_back(key);
                true
            }
            Some(EntryState::Queued(current)) if priority > current => {
                inner.state.insert(key, EntryState::Queued(priority));
                // The stale low-deque entry is skipped when popped.
                inner.deque(priority).push_back(key);
                true
            }
            Some(EntryState::Queued(_)) => false,
            Some(EntryState::Running) => {
                inner.state.insert(key, EntryState::RunningQueued(priority));
                true
            }
            Some(EntryState::RunningQueued(current)) if priority > current => {
                inner.state.insert(key, EntryState::RunningQueued(priority));
                true
            }
            Some(EntryState::RunningQueued(_)) => false,
        };
        drop(inner);
        if changed {
            tracing::debug!(%peer, %thread, ?call, ?priority, "sync call scheduled");
            self.notify.notify_one();
        }
        changed
    }

    /// Pop the next runnable key, high priority first. Stale deque entries
    /// (upgraded or already running) are discarded along the way.
    fn pop(&self) -> Option<Key> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let key = inner.high.pop_front().or_else(|| inner.low.pop_front())?;
            // Upgrades leave a stale copy behind in the low deque; anything
            // not recorded as Queued is such a leftover and is dropped here.
            if !matches!(inner.state.get(&key), Some(EntryState::Queued(_))) {
                continue;
            }
            inner.state.insert(key, EntryState::Running);
            return Some(key);
        }
    }

    /// Mark an invocation finished, re-queueing any round that was requested
    /// while it ran.
    fn finish(&self, key: Key) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state.get(&key).copied() {
            Some(EntryState::RunningQueued(priority)) => {
                inner.state.insert(key, EntryState::Queued(priority));
                inner.deque(priority).push_back(key);
                drop(inner);
                self.notify.notify_one();
            }
            _ => {
                inner.state.remove(&key);
            }
        }
    }

    /// Stop the worker loop after in-flight invocations complete.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Worker loop: dequeue in priority order and spawn one task per
    /// invocation. At most one invocation per key runs at a time; separate
    /// keys run in parallel.
    pub async fn run(self: Arc<Self>, handler: Arc<dyn SyncHandler>) {
        loop {
            while let Some((peer, thread, call)) = self.pop() {
                let queue = Arc::clone(&self);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler.handle(call, peer, thread).await;
                    queue.finish((peer, thread, call));
                });
            }
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            self.notify.notified().await;
        }
    }
}

impl Inner {
    fn deque(&mut self, priority: Priority) -> &mut VecDeque<Key> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Low => &mut self.low,
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
