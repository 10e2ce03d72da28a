// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Discovery entry types.
//!
//! A [`DiscoveryEntry`] is a provider advertisement: one participant
//! implementing one versioned interface on one domain. Entries are immutable
//! after insertion except for `last_seen_date_ms` and `expiry_date_ms`,
//! which the freshness loop refreshes.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::TransportAddress;

/// Milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Interface version advertised by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
}

impl Version {
    pub fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }
}

/// Visibility of a provider registration.
///
/// `Local` providers are visible only to co-located consumers and are never
/// published to the global directory; `Global` providers are published to
/// the backends selected at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderScope {
    Local,
    #[default]
    Global,
}

/// Provider-side quality of service attached to a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderQos {
    pub scope: ProviderScope,
    pub priority: i64,
    pub supports_on_change: bool,
}

impl Default for ProviderQos {
    fn default() -> Self {
        Self {
            scope: ProviderScope::Global,
            priority: 0,
            supports_on_change: false,
        }
    }
}

/// Query key pairing a domain with an interface name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceAddress {
    pub domain: String,
    pub interface_name: String,
}

impl InterfaceAddress {
    pub fn new(domain: impl Into<String>, interface_name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            interface_name: interface_name.into(),
        }
    }

    /// Cross product of the requested domains with one interface name.
    pub fn for_domains(domains: &[String], interface_name: &str) -> Vec<Self> {
        domains
            .iter()
            .map(|domain| Self::new(domain.clone(), interface_name))
            .collect()
    }
}

/// Provider advertisement as stored by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEntry {
    pub version: Version,
    pub domain: String,
    pub interface_name: String,
    /// Globally unique opaque identifier, primary key in both stores.
    pub participant_id: String,
    pub qos: ProviderQos,
    pub last_seen_date_ms: u64,
    pub expiry_date_ms: u64,
    pub public_key_id: String,
}

impl DiscoveryEntry {
    pub fn is_global(&self) -> bool {
        self.qos.scope == ProviderScope::Global
    }

    pub fn interface_address(&self) -> InterfaceAddress {
        InterfaceAddress::new(self.domain.clone(), self.interface_name.clone())
    }

    /// Attach the read-time locality flag.
    pub fn with_meta(self, is_local: bool) -> DiscoveryEntryWithMeta {
        DiscoveryEntryWithMeta {
            entry: self,
            is_local,
        }
    }
}

/// A [`DiscoveryEntry`] plus the locality of the row it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEntryWithMeta {
    pub entry: DiscoveryEntry,
    /// True when the entry came from the local store of this controller.
    pub is_local: bool,
}

/// A [`DiscoveryEntry`] as published to the global directory, carrying the
/// transport address a remote cluster controller needs to reach the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalDiscoveryEntry {
    pub entry: DiscoveryEntry,
    pub address: TransportAddress,
}

impl GlobalDiscoveryEntry {
    pub fn new(entry: DiscoveryEntry, address: TransportAddress) -> Self {
        Self { entry, address }
    }
}
