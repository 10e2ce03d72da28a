// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Coalescing of concurrent `LocalThenGlobal` lookups.
//!
//! A burst of lookups for the same key while no local entry exists must
//! produce exactly one remote request. The first waiter registered for a
//! key owns the fetch; everyone else parks on a oneshot and is completed,
//! in registration order, when the result (or failure) arrives.

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::store::DirectoryStore;
use crate::types::{DirectoryError, DiscoveryEntryWithMeta};

/// Key identifying one coalescable global fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum LookupKey {
    Interface {
        /// Sorted for key equality independent of request order.
        domains: Vec<String>,
        interface_name: String,
    },
    Participant {
        participant_id: String,
    },
}

impl LookupKey {
    pub fn interface(domains: &[String], interface_name: &str) -> Self {
        let mut domains = domains.to_vec();
        domains.sort();
        domains.dedup();
        Self::Interface {
            domains,
            interface_name: interface_name.to_string(),
        }
    }

    pub fn participant(participant_id: &str) -> Self {
        Self::Participant {
            participant_id: participant_id.to_string(),
        }
    }
}

pub(crate) type LookupResult = Result<Vec<DiscoveryEntryWithMeta>, DirectoryError>;

#[derive(Debug)]
struct Waiter {
    gbids: Vec<String>,
    tx: oneshot::Sender<LookupResult>,
}

#[derive(Debug, Default)]
pub(crate) struct PendingLookups {
    waiters: DashMap<LookupKey, Vec<Waiter>>,
}

impl PendingLookups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a waiter for `key`. The `bool` is true iff this is the first
    /// waiter, i.e. the caller must initiate the global fetch.
    pub fn register(
        &self,
        key: LookupKey,
        gbids: Vec<String>,
    ) -> (oneshot::Receiver<LookupResult>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.entry(key).or_default();
        let first = waiters.is_empty();
        waiters.push(Waiter { gbids, tx });
        (rx, first)
    }

    /// Complete all waiters for `key` with the fetched entries, applying
    /// each waiter's backend filter.
    pub fn resolve(&self, key: &LookupKey, entries: &[DiscoveryEntryWithMeta], store: &DirectoryStore) {
        let Some((_, waiters)) = self.waiters.remove(key) else {
            return;
        };
        for waiter in waiters {
            let filtered: Vec<DiscoveryEntryWithMeta> = entries
                .iter()
                .filter(|e| store.entry_passes_gbid_filter(&e.entry.participant_id, &waiter.gbids))
                .cloned()
                .collect();
            let _ = waiter.tx.send(Ok(filtered));
        }
    }

    /// Complete all waiters for `key` with `error`.
    pub fn fail(&self, key: &LookupKey, error: DirectoryError) {
        let Some((_, waiters)) = self.waiters.remove(key) else {
            return;
        };
        for waiter in waiters {
            let _ = waiter.tx.send(Err(error.clone()));
        }
    }

    /// Complete every waiter with `error`; used on shutdown.
    pub fn fail_all(&self, error: DirectoryError) {
        let keys: Vec<LookupKey> = self.waiters.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.fail(&key, error.clone());
        }
    }

    pub fn has_pending(&self, key: &LookupKey) -> bool {
        self.waiters.get(key).is_some_and(|w| !w.is_empty())
    }
}
