// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Replication engine for weft threads.
//!
//! The network layer hands inbound sync requests to [`Service`], which
//! answers them out of the [`weft_core::Logstore`] and schedules follow-up
//! pulls on the [`queue::CallQueue`]. The host process wires the seams:
//! a logstore, a [`queue::SyncHandler`] for the client side of sync, the
//! gossip topic membership ([`pubsub::Pubsub`]) and, optionally, the
//! status registry.

pub mod config;
pub mod error;
pub mod protocol;
pub mod pubsub;
pub mod queue;
pub mod semaphore;
pub mod server;
pub mod status;

pub use config::NetConfig;
pub use error::NetError;
pub use pubsub::{Pubsub, PubsubAdaptor};
pub use queue::{CallQueue, Priority, SyncCall, SyncHandler};
pub use semaphore::{SemaphorePool, ThreadSemaphore};
pub use server::Service;
pub use status::{PeerThreadStatus, StatusWorker, SyncState, SyncStatus, ThreadStatusRegistry};
