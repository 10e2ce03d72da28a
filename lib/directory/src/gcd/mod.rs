// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Global capabilities directory access.
//!
//! [`GcdTransport`] is the wire-facing capability: one request/response RPC
//! per method, no policy. [`GcdClient`] layers the policy on top. Mutating
//! calls are serialized through the task sequencer and retried on runtime
//! errors until their deadline; lookups go out directly.

mod client;
mod sequencer;
pub(crate) mod validation;

pub use client::GcdClient;
pub(crate) use sequencer::{SequencedTask, TaskFate, TaskSequencer};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::types::{GcdError, GlobalDiscoveryEntry};

/// RPC stub for the remote global capabilities directory.
///
/// Implementations are pluggable (broker-backed, unix-domain, in-process)
/// and selected at construction time. Every method performs exactly one
/// remote call; retry and serialization policy live in [`GcdClient`].
#[async_trait]
pub trait GcdTransport: Send + Sync + fmt::Debug {
    /// Publish a provider to the given backends.
    async fn add(&self, entry: GlobalDiscoveryEntry, gbids: &[String]) -> Result<(), GcdError>;

    /// Remove a previously published provider from the given backends.
    async fn remove(&self, participant_id: &str, gbids: &[String]) -> Result<(), GcdError>;

    /// Lookup providers for the domains/interface tuple.
    async fn lookup_by_interface(
        &self,
        domains: &[String],
        interface_name: &str,
        gbids: &[String],
        ttl: Duration,
    ) -> Result<Vec<GlobalDiscoveryEntry>, GcdError>;

    /// Lookup a provider by participant id.
    async fn lookup_by_participant(
        &self,
        participant_id: &str,
        gbids: &[String],
        ttl: Duration,
    ) -> Result<Vec<GlobalDiscoveryEntry>, GcdError>;

    /// Refresh `last_seen_date_ms` of this controller's participants in one
    /// backend.
    async fn touch(
        &self,
        cluster_controller_id: &str,
        participant_ids: &[String],
        gbid: &str,
        ttl: Duration,
    ) -> Result<(), GcdError>;

    /// Ask one backend to drop entries owned by this cluster controller
    /// whose `last_seen_date_ms` is below the cutoff.
    async fn remove_stale(
        &self,
        cluster_controller_id: &str,
        max_last_seen_date_ms: u64,
        gbid: &str,
        ttl: Duration,
    ) -> Result<(), GcdError>;
}
