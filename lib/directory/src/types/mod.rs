// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Data model of the capabilities directory.

use std::sync::Arc;

mod address;
mod entry;
mod qos;

pub use address::TransportAddress;
pub use entry::{
    now_ms, DiscoveryEntry, DiscoveryEntryWithMeta, GlobalDiscoveryEntry, InterfaceAddress,
    ProviderQos, ProviderScope, Version,
};
pub use qos::{DiscoveryQos, DiscoveryScope};

/// Application-level error reported by the global capabilities directory.
///
/// Application errors are deterministic responses and are never retried.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error, serde::Serialize, serde::Deserialize,
)]
pub enum DiscoveryError {
    /// A requested GBID is not one of the configured backends
    #[error("unknown GBID")]
    UnknownGbid,

    /// The requested GBID list contains an empty string or a duplicate
    #[error("invalid GBID")]
    InvalidGbid,

    /// The directory failed internally
    #[error("internal error in the global capabilities directory")]
    InternalError,

    /// No entry exists for the requested participant id
    #[error("no entry for participant")]
    NoEntryForParticipant,

    /// The participant is not registered in any of the selected backends
    #[error("no entry for selected backends")]
    NoEntryForSelectedBackends,

    /// The directory refused access to the entry
    #[error("entry not accessible")]
    NotAccessible,
}

/// Completion of a single global directory call.
///
/// `Runtime` failures (broken connection, timeout, serialization) are
/// candidates for retry; `Application` failures are final. The runtime
/// payload is an `Arc` so one completion can be fanned out to several
/// coalesced waiters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GcdError {
    #[error("global directory rejected the request: {0}")]
    Application(DiscoveryError),

    #[error("global directory call failed: {0}")]
    Runtime(Arc<anyhow::Error>),
}

impl GcdError {
    pub fn runtime(err: impl Into<anyhow::Error>) -> Self {
        Self::Runtime(Arc::new(err.into()))
    }
}

/// Error surfaced by the public discovery API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Application(#[from] DiscoveryError),

    /// The operation did not complete before its deadline
    #[error("discovery operation timed out")]
    Timeout,

    /// The operation was cancelled before it reached the remote directory
    #[error("discovery operation cancelled")]
    Cancelled,

    /// The directory is shutting down
    #[error("capabilities directory is shut down")]
    Shutdown,

    /// Access control denied the provider registration
    #[error("provider registration denied by access control")]
    AccessDenied,

    /// The request conflicts with the recorded provider state
    #[error("illegal provider state: {0}")]
    IllegalState(String),

    /// Unclassified runtime failure
    #[error("internal error: {0}")]
    Internal(Arc<anyhow::Error>),
}

impl DirectoryError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(Arc::new(err.into()))
    }
}

impl From<GcdError> for DirectoryError {
    fn from(err: GcdError) -> Self {
        match err {
            GcdError::Application(e) => Self::Application(e),
            GcdError::Runtime(e) => Self::Internal(e),
        }
    }
}
