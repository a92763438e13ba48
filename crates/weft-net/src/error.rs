// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;
use weft_core::StoreError;

/// Error surface of the sync service, mirroring the canonical wire status
/// set. Transient divergence (edge mismatch, missing offset) is never an
/// error: it is logged and scheduled on the call queue instead.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    /// Structurally invalid request: missing header or body, undecodable
    /// identifiers or keys.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Bad request signature, wrong service key, or invalid record signature.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Unknown thread or log.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local storage or codec failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl NetError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, NetError::NotFound(_))
    }
}

impl From<StoreError> for NetError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ThreadNotFound(_) | StoreError::LogNotFound(..) => {
                NetError::NotFound(e.to_string())
            }
            StoreError::InvalidLog(_) => NetError::InvalidArgument(e.to_string()),
            // Divergence sentinels are handled where they occur; reaching
            // this conversion means a handler did not expect one here.
            _ => NetError::Internal(e.to_string()),
        }
    }
}
