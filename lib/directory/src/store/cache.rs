// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Age-aware variant of [`EntryStore`] for globally looked-up entries.
//!
//! Every row carries its insertion instant. Age-bounded lookups skip rows
//! older than the caller's bound but do not erase them; stale rows are
//! overwritten on re-insertion or dropped by the expiry sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::entry_store::EntryStore;
use crate::types::DiscoveryEntry;

#[derive(Debug, Default)]
pub(crate) struct CachingStore {
    entries: EntryStore,
    inserted_at: HashMap<String, Instant>,
}

impl CachingStore {
    pub fn insert(&mut self, entry: DiscoveryEntry) {
        self.inserted_at
            .insert(entry.participant_id.clone(), Instant::now());
        self.entries.insert(entry);
    }

    pub fn lookup_by_participant_id(&self, participant_id: &str) -> Option<&DiscoveryEntry> {
        self.entries.lookup_by_participant_id(participant_id)
    }

    /// Row for `participant_id`, only if it is no older than `max_age`.
    pub fn lookup_cache_by_participant_id(
        &self,
        participant_id: &str,
        max_age: Duration,
    ) -> Option<&DiscoveryEntry> {
        if !self.is_fresh(participant_id, max_age) {
            return None;
        }
        self.entries.lookup_by_participant_id(participant_id)
    }

    /// All rows for (domain, interface name) no older than `max_age`;
    /// `None` disables the age bound.
    pub fn lookup_cache_by_domain_and_interface(
        &self,
        domain: &str,
        interface_name: &str,
        max_age: Option<Duration>,
    ) -> Vec<DiscoveryEntry> {
        self.entries
            .lookup_by_domain_and_interface(domain, interface_name)
            .into_iter()
            .filter(|entry| match max_age {
                Some(bound) => self.is_fresh(&entry.participant_id, bound),
                None => true,
            })
            .collect()
    }

    pub fn remove_by_participant_id(&mut self, participant_id: &str) -> Option<DiscoveryEntry> {
        self.inserted_at.remove(participant_id);
        self.entries.remove_by_participant_id(participant_id)
    }

    /// Drop rows whose advertised expiry has passed.
    pub fn remove_expired(&mut self, now_ms: u64) -> Vec<DiscoveryEntry> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.expiry_date_ms <= now_ms)
            .map(|entry| entry.participant_id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.remove_by_participant_id(&id))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.inserted_at.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_fresh(&self, participant_id: &str, max_age: Duration) -> bool {
        self.inserted_at
            .get(participant_id)
            .is_some_and(|at| at.elapsed() <= max_age)
    }
}
