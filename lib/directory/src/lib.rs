// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Local capabilities directory for a cluster controller.
//!
//! This crate is the in-process source of truth for "which participant
//! implements which interface on which domain, reachable through which
//! backend(s)". It mediates between locally registered providers and a
//! remote global capabilities directory spanning one or more backends
//! identified by opaque GBIDs.
//!
//! The main entry point is [`CapabilitiesDirectory`]:
//! - providers register through [`CapabilitiesDirectory::add`] /
//!   [`CapabilitiesDirectory::add_to_all`] and deregister through
//!   [`CapabilitiesDirectory::remove`];
//! - consumers resolve providers through the two lookup operations, with a
//!   per-query [`DiscoveryScope`] selecting which of {local store, global
//!   lookup cache, remote directory} may answer;
//! - three background loops keep remote state fresh (touch), purge expired
//!   entries, and defensively republish global registrations.
//!
//! The remote directory is reached through the [`GcdTransport`] capability;
//! transport variants (broker-backed, unix-domain, in-process) are selected
//! at construction time.

mod config;
mod directory;
mod events;
mod gcd;
mod store;
mod traits;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{ClusterControllerSettings, ClusterControllerSettingsBuilder};
pub use directory::CapabilitiesDirectory;
pub use events::{DirectoryEvent, DirectoryEventBus};
pub use gcd::{GcdClient, GcdTransport};
pub use store::DirectoryStore;
pub use traits::{
    AccessControl, AllowAllAccess, InMemoryParticipantIds, MessageRouter, ParticipantIdStorage,
};
pub use types::{
    DirectoryError, DiscoveryEntry, DiscoveryEntryWithMeta, DiscoveryError, DiscoveryQos,
    DiscoveryScope, GcdError, GlobalDiscoveryEntry, InterfaceAddress, ProviderQos, ProviderScope,
    TransportAddress, Version,
};
