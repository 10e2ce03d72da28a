// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Cluster controller settings, read once at startup.

use anyhow::Result;
use derive_builder::Builder;
use std::collections::HashSet;
use std::time::Duration;
use validator::Validate;

use crate::types::TransportAddress;

/// Validates that a TTL is within the accepted range.
fn validate_ttl(ttl: &Duration) -> Result<(), validator::ValidationError> {
    if !(Duration::from_secs(1)..=Duration::from_secs(600)).contains(ttl) {
        return Err(validator::ValidationError::new("ttl_range"));
    }
    Ok(())
}

fn validate_interval(interval: &Duration) -> Result<(), validator::ValidationError> {
    if *interval < Duration::from_secs(1) {
        return Err(validator::ValidationError::new("interval_too_short"));
    }
    Ok(())
}

fn validate_re_add_interval(interval: &Duration) -> Result<(), validator::ValidationError> {
    if *interval < Duration::from_secs(3600) {
        return Err(validator::ValidationError::new("re_add_interval_too_short"));
    }
    Ok(())
}

fn validate_cluster_controller_id(id: &str) -> Result<(), validator::ValidationError> {
    if id.trim().is_empty() || id.trim() != id {
        let mut err = validator::ValidationError::new("cluster_controller_id");
        err.add_param("value".into(), &id);
        return Err(err);
    }
    Ok(())
}

fn validate_known_gbids(gbids: &[String]) -> Result<(), validator::ValidationError> {
    if gbids.is_empty() {
        return Err(validator::ValidationError::new("known_gbids_empty"));
    }
    let mut seen = HashSet::new();
    for gbid in gbids {
        if gbid.is_empty() {
            return Err(validator::ValidationError::new("known_gbid_empty_string"));
        }
        if !seen.insert(gbid.as_str()) {
            return Err(validator::ValidationError::new("known_gbid_duplicate"));
        }
    }
    Ok(())
}

/// Configuration of the capabilities directory.
///
/// # Example
///
/// ```no_run
/// use fabric_directory::ClusterControllerSettingsBuilder;
/// use fabric_directory::TransportAddress;
///
/// # fn main() -> anyhow::Result<()> {
/// let settings = ClusterControllerSettingsBuilder::default()
///     .cluster_controller_id("cc-1")
///     .known_gbids(vec!["gbid-a".to_string(), "gbid-b".to_string()])
///     .local_address(TransportAddress::from("mqtt://broker:1883/cc-1"))
///     .build()?;
/// assert_eq!(settings.default_gbid(), "gbid-a");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Builder, Validate)]
#[builder(build_fn(private, name = "build_settings"), pattern = "owned")]
pub struct ClusterControllerSettings {
    /// Identity of this cluster controller towards the global directory
    /// (required)
    #[builder(setter(into))]
    #[validate(custom(function = "validate_cluster_controller_id"))]
    pub cluster_controller_id: String,

    /// Ordered backend identifiers; the first element is the default
    /// backend (required)
    #[validate(custom(function = "validate_known_gbids"))]
    pub known_gbids: Vec<String>,

    /// Transport address under which this controller's providers are
    /// reachable from remote controllers (required)
    pub local_address: TransportAddress,

    /// Per-RPC TTL for freshness updates (default: 60 seconds)
    #[builder(default = "Duration::from_secs(60)")]
    #[validate(custom(function = "validate_ttl"))]
    pub touch_ttl: Duration,

    /// Per-RPC TTL for stale purges (default: 1 hour)
    #[builder(default = "Duration::from_secs(3600)")]
    pub remove_stale_ttl: Duration,

    /// Deadline for queued global registrations and removals
    /// (default: 60 seconds)
    #[builder(default = "Duration::from_secs(60)")]
    #[validate(custom(function = "validate_ttl"))]
    pub discovery_registration_ttl: Duration,

    /// Period of the defensive re-add loop (default: 7 days, min: 1 hour)
    #[builder(default = "Duration::from_secs(7 * 24 * 3600)")]
    #[validate(custom(function = "validate_re_add_interval"))]
    pub re_add_interval: Duration,

    /// Period of the freshness-update loop (default: 1 hour)
    #[builder(default = "Duration::from_secs(3600)")]
    #[validate(custom(function = "validate_interval"))]
    pub freshness_update_interval: Duration,

    /// Period of the expired-entry sweep (default: 60 seconds)
    #[builder(default = "Duration::from_secs(60)")]
    #[validate(custom(function = "validate_interval"))]
    pub cleanup_interval: Duration,

    /// Expiry stamped on entries that arrive without one
    /// (default: 6 weeks)
    #[builder(default = "Duration::from_secs(6 * 7 * 24 * 3600)")]
    pub default_expiry_interval: Duration,

    /// First retry backoff for failed global mutations (default: 500 ms)
    #[builder(default = "Duration::from_millis(500)")]
    pub initial_retry_backoff: Duration,

    /// Backoff cap for failed global mutations (default: 5 seconds)
    #[builder(default = "Duration::from_secs(5)")]
    pub max_retry_backoff: Duration,
}

impl ClusterControllerSettingsBuilder {
    /// Build and validate the settings.
    pub fn build(self) -> Result<ClusterControllerSettings> {
        let settings = self
            .build_settings()
            .map_err(|e| anyhow::anyhow!("incomplete settings: {e}"))?;
        settings
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid settings: {e}"))?;
        Ok(settings)
    }
}

impl ClusterControllerSettings {
    /// The backend used when a request does not name one.
    pub fn default_gbid(&self) -> &str {
        &self.known_gbids[0]
    }

    /// Substitute the default backend for an empty request list.
    pub fn normalize_gbids(&self, requested: &[String]) -> Vec<String> {
        if requested.is_empty() {
            vec![self.default_gbid().to_string()]
        } else {
            requested.to_vec()
        }
    }
}
