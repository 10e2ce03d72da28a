// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Joint custody of the two entry stores and the per-participant bookkeeping.
//!
//! [`DirectoryStore`] owns the locally-registered store, the global lookup
//! cache, the `participant id -> [GBID]` mapping and the
//! `participant id -> await_global` flag behind a single mutex. The merge
//! algorithm reads across all four atomically, so the lock is coarse on
//! purpose; lookup throughput is dominated by I/O, not contention.
//!
//! Internal helpers take `&StoreInner` / `&mut StoreInner`, so holding the
//! lock is a type-checked precondition rather than a runtime assertion.

mod cache;
mod entry_store;

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use cache::CachingStore;
use entry_store::EntryStore;

use crate::types::{
    DirectoryError, DiscoveryEntry, DiscoveryEntryWithMeta, DiscoveryQos, DiscoveryScope,
    InterfaceAddress,
};

#[derive(Debug, Default)]
struct StoreInner {
    local: EntryStore,
    global_cache: CachingStore,
    gbids_by_participant: HashMap<String, Vec<String>>,
    await_global_by_participant: HashMap<String, bool>,
}

/// Two-tier entry store of the capabilities directory.
#[derive(Debug, Default)]
pub struct DirectoryStore {
    inner: Mutex<StoreInner>,
}

impl DirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a locally registered provider.
    ///
    /// Evicts any cache row with the same participant id, records the
    /// `await_global` flag, and for global-scope entries merges `gbids`
    /// into the participant's backend mapping (union, order-preserving).
    pub fn insert_local(
        &self,
        entry: DiscoveryEntry,
        await_global: bool,
        gbids: &[String],
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.local.lookup_by_participant_id(&entry.participant_id) {
            if existing.qos.scope != entry.qos.scope {
                return Err(DirectoryError::IllegalState(format!(
                    "participant {} is already registered with provider scope {:?}",
                    entry.participant_id, existing.qos.scope
                )));
            }
        }

        if let Some(cached) = inner
            .global_cache
            .remove_by_participant_id(&entry.participant_id)
        {
            tracing::warn!(
                participant_id = %entry.participant_id,
                "local registration evicts cached global entry for the same participant: {:?}",
                cached.interface_address()
            );
            inner.gbids_by_participant.remove(&entry.participant_id);
        }

        inner
            .await_global_by_participant
            .insert(entry.participant_id.clone(), await_global);
        if entry.is_global() {
            inner.merge_gbids(&entry.participant_id, gbids);
        }
        inner.local.insert(entry.clone());

        tracing::info!(
            participant_id = %entry.participant_id,
            domain = %entry.domain,
            interface = %entry.interface_name,
            local_entries = inner.local.len(),
            "added local capability"
        );
        Ok(())
    }

    /// Insert a globally looked-up entry into the cache.
    ///
    /// A participant that is locally registered is never cached; the local
    /// row stays authoritative.
    pub fn insert_cached_global(&self, entry: DiscoveryEntry, gbids: &[String]) -> bool {
        let mut inner = self.inner.lock();

        if inner
            .local
            .lookup_by_participant_id(&entry.participant_id)
            .is_some()
        {
            tracing::debug!(
                participant_id = %entry.participant_id,
                "skipping cache insert, participant is locally registered"
            );
            return false;
        }

        inner.merge_gbids(&entry.participant_id, gbids);
        inner.global_cache.insert(entry.clone());

        tracing::debug!(
            participant_id = %entry.participant_id,
            gbids = ?gbids,
            cached_entries = inner.global_cache.len(),
            "added global capability to cache"
        );
        true
    }

    /// Try to satisfy a by-interface lookup from local and cached entries.
    ///
    /// `Some(result)` means the scope was satisfied without going remote;
    /// `None` means the caller must fetch from the global directory.
    pub fn lookup_local_and_cached_by_interface(
        &self,
        addresses: &[InterfaceAddress],
        qos: &DiscoveryQos,
        gbids: &[String],
    ) -> Option<Vec<DiscoveryEntryWithMeta>> {
        let inner = self.inner.lock();
        let scope = qos.discovery_scope;

        let local = inner.search_local_by_interface(addresses, scope, gbids);
        let cached = if scope.includes_global_cache() {
            inner.search_cache_by_interface(addresses, gbids, qos.cache_max_age())
        } else {
            Vec::new()
        };

        inner.merge_by_scope(scope, local, cached)
    }

    /// Try to satisfy a by-participant lookup from local and cached entries.
    ///
    /// A locally found entry is returned directly, except under
    /// `GlobalOnly`, where a global-scope local entry is treated as a
    /// global result.
    pub fn lookup_local_and_cached_by_participant(
        &self,
        participant_id: &str,
        qos: &DiscoveryQos,
        gbids: &[String],
    ) -> Option<Vec<DiscoveryEntryWithMeta>> {
        let inner = self.inner.lock();
        let scope = qos.discovery_scope;

        let local = inner
            .search_local_by_participant(participant_id, scope)
            .filter(|entry| inner.passes_gbid_filter(&entry.participant_id, gbids));

        if let Some(entry) = local {
            if scope == DiscoveryScope::GlobalOnly {
                // a globally registered local provider answers a GlobalOnly
                // query as a global result
                return inner.merge_by_scope(scope, Vec::new(), vec![entry]);
            }
            return Some(vec![entry.with_meta(true)]);
        }

        if scope == DiscoveryScope::LocalOnly {
            return Some(Vec::new());
        }

        let cached = inner
            .search_cache_by_participant(participant_id, gbids, qos.cache_max_age())
            .into_iter()
            .collect();
        inner.merge_by_scope(scope, Vec::new(), cached)
    }

    /// Remove a locally registered provider and its bookkeeping.
    pub fn remove(&self, participant_id: &str) -> Option<DiscoveryEntry> {
        let mut inner = self.inner.lock();
        inner.remove_participant(participant_id)
    }

    /// Backend mapping recorded for a participant; empty when none.
    pub fn gbids_for_participant(&self, participant_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .gbids_by_participant
            .get(participant_id)
            .cloned()
            .unwrap_or_default()
    }

    /// `await_global` flag recorded at registration; participants without a
    /// record behave as registered with `false`.
    pub fn await_global_registration(&self, participant_id: &str) -> bool {
        self.inner
            .lock()
            .await_global_by_participant
            .get(participant_id)
            .copied()
            .unwrap_or(false)
    }

    pub fn is_locally_registered(&self, participant_id: &str) -> bool {
        self.inner
            .lock()
            .local
            .lookup_by_participant_id(participant_id)
            .is_some()
    }

    /// Whether an entry is visible to a query restricted to `gbids`.
    pub fn entry_passes_gbid_filter(&self, participant_id: &str, gbids: &[String]) -> bool {
        self.inner.lock().passes_gbid_filter(participant_id, gbids)
    }

    /// Local entries matching the interface addresses, scope- and
    /// gbid-filtered; used to merge remote fetch results.
    pub(crate) fn local_entries_by_interface(
        &self,
        addresses: &[InterfaceAddress],
        scope: DiscoveryScope,
        gbids: &[String],
    ) -> Vec<DiscoveryEntry> {
        self.inner
            .lock()
            .search_local_by_interface(addresses, scope, gbids)
    }

    /// Snapshot of the global lookup cache, for diagnostics.
    pub fn cached_global_entries(&self) -> Vec<DiscoveryEntry> {
        self.inner.lock().global_cache.iter().cloned().collect()
    }

    /// Number of locally registered global-scope providers.
    pub fn count_global_capabilities(&self) -> usize {
        self.inner
            .lock()
            .local
            .iter()
            .filter(|entry| entry.is_global())
            .count()
    }

    /// All locally registered global-scope entries, for the re-add loop.
    pub fn all_global_capabilities(&self) -> Vec<DiscoveryEntry> {
        self.inner
            .lock()
            .local
            .iter()
            .filter(|entry| entry.is_global())
            .cloned()
            .collect()
    }

    /// Locally registered global participants published to `gbid`, for the
    /// freshness loop.
    pub fn global_participant_ids_for_gbid(&self, gbid: &str) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .gbids_by_participant
            .iter()
            .filter(|(id, gbids)| {
                gbids.iter().any(|g| g == gbid)
                    && inner.local.lookup_by_participant_id(id).is_some()
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Refresh freshness attributes of local entries. The expiry date is
    /// only ever raised.
    pub fn touch_local(&self, participant_ids: &[String], last_seen_ms: u64, expiry_ms: u64) {
        let mut inner = self.inner.lock();
        for id in participant_ids {
            if let Some(entry) = inner.local.get_mut(id) {
                entry.last_seen_date_ms = last_seen_ms;
                entry.expiry_date_ms = entry.expiry_date_ms.max(expiry_ms);
            }
        }
    }

    /// Drop entries whose expiry date has passed from both stores.
    ///
    /// Returns the removed local entries (the caller unhooks their routes)
    /// and the removed cache entries.
    pub fn remove_expired(&self, now_ms: u64) -> (Vec<DiscoveryEntry>, Vec<DiscoveryEntry>) {
        let mut inner = self.inner.lock();

        let expired_local: Vec<String> = inner
            .local
            .iter()
            .filter(|entry| entry.expiry_date_ms <= now_ms)
            .map(|entry| entry.participant_id.clone())
            .collect();
        let removed_local: Vec<DiscoveryEntry> = expired_local
            .iter()
            .filter_map(|id| inner.remove_participant(id))
            .collect();

        let removed_cached = inner.global_cache.remove_expired(now_ms);
        for entry in &removed_cached {
            inner.gbids_by_participant.remove(&entry.participant_id);
        }

        (removed_local, removed_cached)
    }

    pub fn local_entry_count(&self) -> usize {
        self.inner.lock().local.len()
    }

    pub fn cached_entry_count(&self) -> usize {
        self.inner.lock().global_cache.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.local.clear();
        inner.global_cache.clear();
        inner.gbids_by_participant.clear();
        inner.await_global_by_participant.clear();
    }
}

impl StoreInner {
    /// Union-merge `gbids` into the participant's mapping, requested order
    /// first, previously recorded extras after.
    fn merge_gbids(&mut self, participant_id: &str, gbids: &[String]) {
        let mut all: Vec<String> = gbids.to_vec();
        if let Some(existing) = self.gbids_by_participant.get(participant_id) {
            for gbid in existing {
                if !all.contains(gbid) {
                    all.push(gbid.clone());
                }
            }
        }
        self.gbids_by_participant
            .insert(participant_id.to_string(), all);
    }

    fn remove_participant(&mut self, participant_id: &str) -> Option<DiscoveryEntry> {
        let removed = self.local.remove_by_participant_id(participant_id);
        if removed.is_some() {
            self.gbids_by_participant.remove(participant_id);
            self.await_global_by_participant.remove(participant_id);
        }
        removed
    }

    fn passes_gbid_filter(&self, participant_id: &str, gbids: &[String]) -> bool {
        match self.gbids_by_participant.get(participant_id) {
            None => true,
            Some(mapped) => mapped.iter().any(|g| gbids.contains(g)),
        }
    }

    fn search_local_by_interface(
        &self,
        addresses: &[InterfaceAddress],
        scope: DiscoveryScope,
        gbids: &[String],
    ) -> Vec<DiscoveryEntry> {
        let mut result = Vec::new();
        for address in addresses {
            let entries = self
                .local
                .lookup_by_domain_and_interface(&address.domain, &address.interface_name);
            for entry in entries {
                if !scope.includes_local_entries() && !entry.is_global() {
                    continue;
                }
                if !self.passes_gbid_filter(&entry.participant_id, gbids) {
                    continue;
                }
                result.push(entry);
            }
        }
        result
    }

    fn search_local_by_participant(
        &self,
        participant_id: &str,
        scope: DiscoveryScope,
    ) -> Option<DiscoveryEntry> {
        let entry = self.local.lookup_by_participant_id(participant_id)?;
        if !scope.includes_local_entries() && !entry.is_global() {
            return None;
        }
        Some(entry.clone())
    }

    fn search_cache_by_interface(
        &self,
        addresses: &[InterfaceAddress],
        gbids: &[String],
        max_age: Option<std::time::Duration>,
    ) -> Vec<DiscoveryEntry> {
        let mut result = Vec::new();
        for address in addresses {
            let entries = self.global_cache.lookup_cache_by_domain_and_interface(
                &address.domain,
                &address.interface_name,
                max_age,
            );
            result.extend(
                entries
                    .into_iter()
                    .filter(|entry| self.passes_gbid_filter(&entry.participant_id, gbids)),
            );
        }
        result
    }

    fn search_cache_by_participant(
        &self,
        participant_id: &str,
        gbids: &[String],
        max_age: Option<std::time::Duration>,
    ) -> Option<DiscoveryEntry> {
        let entry = match max_age {
            Some(bound) => self
                .global_cache
                .lookup_cache_by_participant_id(participant_id, bound),
            None => self.global_cache.lookup_by_participant_id(participant_id),
        }?;
        if !self.passes_gbid_filter(&entry.participant_id, gbids) {
            return None;
        }
        Some(entry.clone())
    }

    /// The scope-aware merge of local and cached results.
    ///
    /// `Some` means the lookup is answered now; `None` defers to a global
    /// fetch.
    fn merge_by_scope(
        &self,
        scope: DiscoveryScope,
        local: Vec<DiscoveryEntry>,
        cached: Vec<DiscoveryEntry>,
    ) -> Option<Vec<DiscoveryEntryWithMeta>> {
        match scope {
            // local results answer, even when empty
            DiscoveryScope::LocalOnly => Some(tag(local, true)),

            DiscoveryScope::LocalThenGlobal => {
                if !local.is_empty() {
                    return Some(tag(local, true));
                }
                if !cached.is_empty() {
                    return Some(tag(cached, false));
                }
                None
            }

            DiscoveryScope::LocalAndGlobal => {
                if cached.is_empty() {
                    return None;
                }
                Some(merge_local_wins(tag(local, true), tag(cached, false)))
            }

            DiscoveryScope::GlobalOnly => {
                if cached.is_empty() {
                    return None;
                }
                let registered_globals: Vec<DiscoveryEntry> =
                    local.into_iter().filter(|e| e.is_global()).collect();
                Some(merge_local_wins(
                    tag(registered_globals, true),
                    tag(cached, false),
                ))
            }
        }
    }
}

pub(crate) fn tag(entries: Vec<DiscoveryEntry>, is_local: bool) -> Vec<DiscoveryEntryWithMeta> {
    entries
        .into_iter()
        .map(|entry| entry.with_meta(is_local))
        .collect()
}

/// Merge, dropping duplicated participant ids. The local row wins on
/// collision.
pub(crate) fn merge_local_wins(
    local: Vec<DiscoveryEntryWithMeta>,
    global: Vec<DiscoveryEntryWithMeta>,
) -> Vec<DiscoveryEntryWithMeta> {
    let local_ids: HashSet<String> = local
        .iter()
        .map(|e| e.entry.participant_id.clone())
        .collect();

    let mut result = local;
    result.extend(
        global
            .into_iter()
            .filter(|e| !local_ids.contains(&e.entry.participant_id)),
    );
    result
}
