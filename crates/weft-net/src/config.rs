// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

/// Tuning knobs for the replication engine.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Upper bound on the total records returned by one `get_records` call.
    /// Each log's share is `max_pull_limit / number_of_logs`, so a single
    /// pull cannot saturate either side however many logs a thread grows.
    pub max_pull_limit: usize,

    /// Tokens per thread semaphore. One serializes all mutators of a thread.
    pub semaphore_capacity: usize,

    /// Buffered status transitions before the registry starts dropping them.
    pub status_buffer: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            max_pull_limit: 10_000,
            semaphore_capacity: 1,
            status_buffer: 64,
        }
    }
}
