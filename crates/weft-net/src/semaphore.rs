// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-thread semaphores.
//!
//! Every thread gets one bounded counting semaphore, created on first use.
//! Mutators of a thread (record insertion, primarily) hold a token for the
//! duration of their transaction; work on different threads proceeds in
//! parallel. [`SemaphorePool::stop`] drains every semaphore and never
//! releases, so all further mutators block and the system quiesces.
//!
//! A token is a unit value in a bounded channel: acquiring sends, releasing
//! receives. Releasing a token that was never acquired is a programming
//! error and panics.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::mpsc;
use weft_core::ThreadId;

/// Bounded counting semaphore for one thread.
#[derive(Debug)]
pub struct ThreadSemaphore {
    capacity: usize,
    tx: mpsc::Sender<()>,
    rx: Mutex<mpsc::Receiver<()>>,
}

impl ThreadSemaphore {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        ThreadSemaphore {
            capacity: capacity.max(1),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Take a token, waiting until one is available.
    pub async fn acquire(&self) {
        self.tx.send(()).await.expect("semaphore channel closed");
    }

    /// Take a token without waiting. Returns `false` when none is free.
    pub fn try_acquire(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    /// Return a token.
    ///
    /// # Panics
    ///
    /// Panics when no token is currently held.
    pub fn release(&self) {
        let mut rx = self.rx.lock().unwrap();
        if rx.try_recv().is_err() {
            panic!("thread semaphore released without a matching acquire");
        }
    }

    /// Take a token and return a guard that releases it on drop, so a
    /// cancelled holder cannot leave the thread locked.
    pub async fn acquire_guard(&self) -> SemaphoreGuard<'_> {
        self.acquire().await;
        SemaphoreGuard { semaphore: self }
    }
}

/// Held token; released on drop.
#[derive(Debug)]
pub struct SemaphoreGuard<'a> {
    semaphore: &'a ThreadSemaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// Lazily-populated map of thread semaphores.
#[derive(Debug)]
pub struct SemaphorePool {
    capacity: usize,
    stopped: AtomicBool,
    semaphores: Mutex<HashMap<ThreadId, Arc<ThreadSemaphore>>>,
}

impl SemaphorePool {
    pub fn new(capacity: usize) -> Self {
        SemaphorePool {
            capacity,
            stopped: AtomicBool::new(false),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    /// The semaphore of `thread`, creating it on first use.
    pub fn get(&self, thread: ThreadId) -> Arc<ThreadSemaphore> {
        let mut map = self.semaphores.lock().unwrap();
        let semaphore = map
            .entry(thread)
            .or_insert_with(|| {
                let sem = ThreadSemaphore::new(self.capacity);
                // After stop() every semaphore starts out fully drained.
                if self.stopped.load(Ordering::SeqCst) {
                    while sem.try_acquire() {}
                }
                Arc::new(sem)
            });
        Arc::clone(semaphore)
    }

    /// Drain every semaphore and hold the tokens forever. All subsequent
    /// mutators block; call once during shutdown.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let semaphores: Vec<Arc<ThreadSemaphore>> = {
            let map = self.semaphores.lock().unwrap();
            map.values().cloned().collect()
        };
        for semaphore in semaphores {
            for _ in 0..semaphore.capacity {
                semaphore.acquire().await;
            }
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
