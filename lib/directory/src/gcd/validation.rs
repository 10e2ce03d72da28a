// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! GBID validation, applied before every global directory call.

use std::collections::HashSet;

use crate::types::DiscoveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GbidValidationOutcome {
    Ok,
    /// Empty string or duplicate in the request
    Invalid,
    /// A requested GBID is not a configured backend
    Unknown,
}

impl GbidValidationOutcome {
    pub fn into_result(self) -> Result<(), DiscoveryError> {
        match self {
            Self::Ok => Ok(()),
            Self::Invalid => Err(DiscoveryError::InvalidGbid),
            Self::Unknown => Err(DiscoveryError::UnknownGbid),
        }
    }
}

/// Validate a requested GBID list against the configured backends.
///
/// The caller substitutes the default backend for an empty request before
/// validation; an empty list here is invalid.
pub(crate) fn validate_gbids(requested: &[String], known: &[String]) -> GbidValidationOutcome {
    if requested.is_empty() {
        return GbidValidationOutcome::Invalid;
    }

    let mut seen = HashSet::with_capacity(requested.len());
    for gbid in requested {
        if gbid.is_empty() || !seen.insert(gbid.as_str()) {
            return GbidValidationOutcome::Invalid;
        }
        if !known.iter().any(|k| k == gbid) {
            return GbidValidationOutcome::Unknown;
        }
    }
    GbidValidationOutcome::Ok
}
