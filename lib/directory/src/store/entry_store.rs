// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Multi-indexed collection of discovery entries.
//!
//! Indexed by participant id (primary key) and by (domain, interface name).
//! Single-threaded; synchronization is provided by the enclosing
//! [`DirectoryStore`](super::DirectoryStore).

use std::collections::{HashMap, HashSet};

use crate::types::{DiscoveryEntry, InterfaceAddress};

#[derive(Debug, Default)]
pub(crate) struct EntryStore {
    by_participant_id: HashMap<String, DiscoveryEntry>,
    by_interface: HashMap<InterfaceAddress, HashSet<String>>,
}

impl EntryStore {
    /// Insert an entry, replacing any row with the same participant id.
    pub fn insert(&mut self, entry: DiscoveryEntry) {
        self.remove_by_participant_id(&entry.participant_id);

        self.by_interface
            .entry(entry.interface_address())
            .or_default()
            .insert(entry.participant_id.clone());
        self.by_participant_id
            .insert(entry.participant_id.clone(), entry);
    }

    pub fn lookup_by_participant_id(&self, participant_id: &str) -> Option<&DiscoveryEntry> {
        self.by_participant_id.get(participant_id)
    }

    pub fn get_mut(&mut self, participant_id: &str) -> Option<&mut DiscoveryEntry> {
        self.by_participant_id.get_mut(participant_id)
    }

    /// All entries registered for (domain, interface name); order unspecified.
    pub fn lookup_by_domain_and_interface(
        &self,
        domain: &str,
        interface_name: &str,
    ) -> Vec<DiscoveryEntry> {
        let key = InterfaceAddress::new(domain, interface_name);
        let Some(ids) = self.by_interface.get(&key) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.by_participant_id.get(id).cloned())
            .collect()
    }

    pub fn remove_by_participant_id(&mut self, participant_id: &str) -> Option<DiscoveryEntry> {
        let entry = self.by_participant_id.remove(participant_id)?;

        let key = entry.interface_address();
        if let Some(ids) = self.by_interface.get_mut(&key) {
            ids.remove(participant_id);
            if ids.is_empty() {
                self.by_interface.remove(&key);
            }
        }
        Some(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveryEntry> {
        self.by_participant_id.values()
    }

    pub fn clear(&mut self) {
        self.by_participant_id.clear();
        self.by_interface.clear();
    }

    pub fn len(&self) -> usize {
        self.by_participant_id.len()
    }
}
