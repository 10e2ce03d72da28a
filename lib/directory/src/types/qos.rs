// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-query discovery quality of service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which of {local store, global lookup cache, remote directory} may answer
/// a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryScope {
    LocalOnly,
    LocalThenGlobal,
    LocalAndGlobal,
    GlobalOnly,
}

impl DiscoveryScope {
    /// Whether local-scope provider entries are visible to this query.
    pub fn includes_local_entries(self) -> bool {
        !matches!(self, Self::GlobalOnly)
    }

    /// Whether the global lookup cache participates in this query.
    pub fn includes_global_cache(self) -> bool {
        !matches!(self, Self::LocalOnly)
    }
}

/// Per-query discovery parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQos {
    /// Maximum acceptable age of a cache row in milliseconds. A negative
    /// value disables the age bound entirely.
    pub cache_max_age_ms: i64,
    /// Deadline for the whole lookup, including any remote fetch.
    pub discovery_timeout_ms: u64,
    pub discovery_scope: DiscoveryScope,
}

impl DiscoveryQos {
    /// Age bound for cache rows; `None` when the bound is disabled.
    pub fn cache_max_age(&self) -> Option<Duration> {
        if self.cache_max_age_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(self.cache_max_age_ms as u64))
        }
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

impl Default for DiscoveryQos {
    fn default() -> Self {
        Self {
            cache_max_age_ms: 60_000,
            discovery_timeout_ms: 600_000,
            discovery_scope: DiscoveryScope::LocalThenGlobal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_cache_age_disables_bound() {
        let qos = DiscoveryQos {
            cache_max_age_ms: -1,
            ..Default::default()
        };
        assert_eq!(qos.cache_max_age(), None);

        let qos = DiscoveryQos {
            cache_max_age_ms: 0,
            ..Default::default()
        };
        assert_eq!(qos.cache_max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn test_scope_predicates() {
        assert!(DiscoveryScope::LocalOnly.includes_local_entries());
        assert!(!DiscoveryScope::LocalOnly.includes_global_cache());

        assert!(DiscoveryScope::GlobalOnly.includes_global_cache());
        assert!(!DiscoveryScope::GlobalOnly.includes_local_entries());

        assert!(DiscoveryScope::LocalThenGlobal.includes_local_entries());
        assert!(DiscoveryScope::LocalThenGlobal.includes_global_cache());
        assert!(DiscoveryScope::LocalAndGlobal.includes_local_entries());
        assert!(DiscoveryScope::LocalAndGlobal.includes_global_cache());
    }
}
