// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Collaborator traits consumed by the directory.
//!
//! The surrounding runtime supplies the message router and access
//! controller; in-memory defaults are provided where a standalone
//! deployment or a test needs one.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

use crate::types::{DiscoveryEntry, TransportAddress};

/// Routing-table side of the runtime.
///
/// The directory registers a next hop when a provider is added (locally or
/// learned from a global lookup) and forgets it on removal. Router failures
/// are logged by the directory, never surfaced to the registration caller.
#[async_trait]
pub trait MessageRouter: Send + Sync + fmt::Debug {
    async fn add_next_hop(&self, participant_id: &str, address: &TransportAddress) -> Result<()>;

    async fn remove_next_hop(&self, participant_id: &str) -> Result<()>;
}

/// Authorizes provider registrations. Fast, in-memory policy evaluation.
pub trait AccessControl: Send + Sync {
    fn has_provider_permission(&self, entry: &DiscoveryEntry) -> bool;
}

/// Permissive default policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAccess;

impl AccessControl for AllowAllAccess {
    fn has_provider_permission(&self, _entry: &DiscoveryEntry) -> bool {
        true
    }
}

/// Stable participant-id assignment for providers hosted by this runtime.
pub trait ParticipantIdStorage: Send + Sync {
    /// The participant id for a provider, minting one on first use.
    fn provider_participant_id(
        &self,
        domain: &str,
        interface_name: &str,
        major_version: i32,
    ) -> String;
}

/// Non-persistent id storage: ids are stable within one process lifetime.
#[derive(Debug, Default)]
pub struct InMemoryParticipantIds {
    ids: Mutex<HashMap<(String, String, i32), String>>,
}

impl InMemoryParticipantIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParticipantIdStorage for InMemoryParticipantIds {
    fn provider_participant_id(
        &self,
        domain: &str,
        interface_name: &str,
        major_version: i32,
    ) -> String {
        let key = (
            domain.to_string(),
            interface_name.to_string(),
            major_version,
        );
        self.ids
            .lock()
            .entry(key)
            .or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone()
    }
}
