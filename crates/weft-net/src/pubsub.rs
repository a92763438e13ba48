// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Pubsub delivery adaptor.
//!
//! Records travel twice: once by direct RPC to every known peer, and once
//! through the gossip topic of their thread. The adaptor consumes topic
//! deliveries from a broadcast channel and drives them through the same
//! `push_record` path as direct RPC. A record arriving before we know its
//! log is dropped with a debug log and NOT retried: the authoritative copy
//! arrives by direct RPC, and retrying here would duplicate that work.

use std::sync::Arc;

use tokio::sync::broadcast;
use weft_core::ThreadId;

use crate::{protocol::types::PushRecordRequest, server::Service};

/// Topic-membership seam of the gossip layer. The engine only ever decides
/// *that* a topic should be joined; the gossip implementation is external.
pub trait Pubsub: Send + Sync + 'static {
    fn subscribe(&self, thread: &ThreadId);
}

/// Bridges a broadcast channel of topic deliveries into the sync service.
pub struct PubsubAdaptor {
    service: Arc<Service>,
    rx: broadcast::Receiver<PushRecordRequest>,
}

impl PubsubAdaptor {
    pub fn new(service: Arc<Service>, rx: broadcast::Receiver<PushRecordRequest>) -> Self {
        PubsubAdaptor { service, rx }
    }

    /// Consume deliveries until the channel closes.
    pub async fn run(mut self) {
        loop {
            match self.rx.recv().await {
                Ok(request) => self.service.handle_pubsub_record(request).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(dropped = n, "pubsub adaptor lagged behind topic deliveries");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
