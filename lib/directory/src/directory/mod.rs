// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The capabilities directory service.
//!
//! [`CapabilitiesDirectory`] orchestrates the store, the global directory
//! client, the pending-lookup table and the maintenance loops behind the
//! public discovery API. Public operations never block on remote I/O: local
//! state is mutated first, then remote work is submitted and completed
//! through channels.
//!
//! Registration flow: access check, gbid normalization and validation,
//! local insert, observer event, routing hop, then (for global providers)
//! a sequenced directory registration. With `await_global` the caller's
//! result tracks the remote registration and a failure rolls the local
//! insert back; without it the caller completes immediately and the remote
//! outcome is only logged.

mod maintenance;
mod pending;

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use maintenance::Maintenance;
use pending::{LookupKey, PendingLookups};

use crate::config::ClusterControllerSettings;
use crate::events::{DirectoryEvent, DirectoryEventBus};
use crate::gcd::{validation, GcdClient, GcdTransport};
use crate::store::{merge_local_wins, tag, DirectoryStore};
use crate::traits::{AccessControl, MessageRouter};
use crate::types::{
    now_ms, DirectoryError, DiscoveryEntry, DiscoveryEntryWithMeta, DiscoveryError, DiscoveryQos,
    DiscoveryScope, GlobalDiscoveryEntry, InterfaceAddress, TransportAddress,
};

pub struct CapabilitiesDirectory {
    settings: ClusterControllerSettings,
    store: Arc<DirectoryStore>,
    gcd: Arc<GcdClient>,
    pending: Arc<PendingLookups>,
    router: Weak<dyn MessageRouter>,
    access: Arc<dyn AccessControl>,
    events: DirectoryEventBus,
    cancel: CancellationToken,
    maintenance: Mutex<Vec<JoinHandle<()>>>,
}

impl CapabilitiesDirectory {
    /// Construct the directory and start its maintenance loops.
    ///
    /// The router is held weakly: the directory must not keep the
    /// surrounding runtime alive. Must be called within a tokio runtime.
    pub fn new(
        settings: ClusterControllerSettings,
        transport: Arc<dyn GcdTransport>,
        router: &Arc<dyn MessageRouter>,
        access: Arc<dyn AccessControl>,
    ) -> Arc<Self> {
        let store = Arc::new(DirectoryStore::new());
        let gcd = Arc::new(GcdClient::new(transport, &settings));
        let events = DirectoryEventBus::default();
        let cancel = CancellationToken::new();

        let directory = Arc::new(Self {
            store: store.clone(),
            gcd: gcd.clone(),
            pending: Arc::new(PendingLookups::new()),
            router: Arc::downgrade(router),
            access,
            events: events.clone(),
            cancel: cancel.clone(),
            maintenance: Mutex::new(Vec::new()),
            settings: settings.clone(),
        });

        let handles = Maintenance {
            store,
            gcd,
            events,
            router: Arc::downgrade(router),
            settings,
            cancel,
        }
        .spawn();
        *directory.maintenance.lock() = handles;

        tracing::info!(
            cluster_controller_id = %directory.settings.cluster_controller_id,
            known_gbids = ?directory.settings.known_gbids,
            "capabilities directory started"
        );
        directory
    }

    /// Observe local provider registrations and removals.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DirectoryEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &DirectoryStore {
        &self.store
    }

    /// Snapshot of the global lookup cache.
    pub fn cached_global_entries(&self) -> Vec<DiscoveryEntry> {
        self.store.cached_global_entries()
    }

    /// Register a provider with default backends and without waiting for
    /// the global registration.
    pub async fn add_entry(&self, entry: DiscoveryEntry) -> Result<(), DirectoryError> {
        self.add(entry, false, &[]).await
    }

    /// Register a provider.
    ///
    /// An empty `gbids` list selects the default backend. For global-scope
    /// entries with `await_global`, the result tracks the remote
    /// registration and a remote failure rolls back the local insert;
    /// otherwise the call completes after the local insert and the global
    /// registration proceeds in the background.
    pub async fn add(
        &self,
        entry: DiscoveryEntry,
        await_global: bool,
        gbids: &[String],
    ) -> Result<(), DirectoryError> {
        if self.cancel.is_cancelled() {
            return Err(DirectoryError::Shutdown);
        }
        if !self.access.has_provider_permission(&entry) {
            tracing::warn!(
                participant_id = %entry.participant_id,
                domain = %entry.domain,
                interface = %entry.interface_name,
                "provider registration denied by access control"
            );
            return Err(DirectoryError::AccessDenied);
        }

        // gbid validation precedes any store mutation, for local-scope
        // providers too
        let gbids = self.settings.normalize_gbids(gbids);
        validation::validate_gbids(&gbids, &self.settings.known_gbids).into_result()?;

        let mut entry = entry;
        entry.last_seen_date_ms = now_ms();
        if entry.expiry_date_ms == 0 {
            entry.expiry_date_ms =
                now_ms() + self.settings.default_expiry_interval.as_millis() as u64;
        }

        if !entry.is_global() {
            self.store.insert_local(entry.clone(), await_global, &[])?;
            self.events.publish(DirectoryEvent::EntryAdded(entry.clone()));
            self.add_next_hop(&entry.participant_id, &self.settings.local_address)
                .await;
            return Ok(());
        }

        self.store
            .insert_local(entry.clone(), await_global, &gbids)?;
        self.events.publish(DirectoryEvent::EntryAdded(entry.clone()));
        self.add_next_hop(&entry.participant_id, &self.settings.local_address)
            .await;

        let done = self.gcd.add(
            GlobalDiscoveryEntry::new(entry.clone(), self.settings.local_address.clone()),
            gbids,
        );

        if await_global {
            match done.await {
                Ok(Ok(())) => {
                    tracing::debug!(
                        participant_id = %entry.participant_id,
                        "global registration complete"
                    );
                    Ok(())
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        participant_id = %entry.participant_id,
                        error = %err,
                        "global registration failed, rolling back local entry"
                    );
                    self.roll_back_local(&entry).await;
                    Err(err)
                }
                Err(_) => {
                    self.roll_back_local(&entry).await;
                    Err(DirectoryError::Shutdown)
                }
            }
        } else {
            let participant_id = entry.participant_id.clone();
            tokio::spawn(async move {
                match done.await {
                    Ok(Ok(())) => tracing::debug!(
                        %participant_id,
                        "background global registration complete"
                    ),
                    Ok(Err(err)) => tracing::warn!(
                        %participant_id,
                        error = %err,
                        "background global registration failed, local entry stays available"
                    ),
                    Err(_) => tracing::warn!(
                        %participant_id,
                        "background global registration dropped after shutdown"
                    ),
                }
            });
            Ok(())
        }
    }

    /// Register a provider in every configured backend.
    pub async fn add_to_all(
        &self,
        entry: DiscoveryEntry,
        await_global: bool,
    ) -> Result<(), DirectoryError> {
        let gbids = self.settings.known_gbids.clone();
        self.add(entry, await_global, &gbids).await
    }

    /// Deregister a provider.
    ///
    /// The local removal and the routing-hop removal complete before the
    /// call returns; the global removal is submitted to the sequencer and
    /// retried until its deadline, its outcome is only logged.
    pub async fn remove(&self, participant_id: &str) -> Result<(), DirectoryError> {
        if self.cancel.is_cancelled() {
            return Err(DirectoryError::Shutdown);
        }

        let gbids = self.store.gbids_for_participant(participant_id);
        let removed = self
            .store
            .remove(participant_id)
            .ok_or(DiscoveryError::NoEntryForParticipant)?;

        tracing::info!(
            %participant_id,
            domain = %removed.domain,
            interface = %removed.interface_name,
            "removed local capability"
        );
        self.events
            .publish(DirectoryEvent::EntryRemoved(removed.clone()));
        self.remove_next_hop(participant_id).await;

        if !gbids.is_empty() {
            let done = self.gcd.remove(participant_id.to_string(), gbids);
            let participant_id = participant_id.to_string();
            tokio::spawn(async move {
                match done.await {
                    Ok(Ok(())) => {
                        tracing::debug!(%participant_id, "global removal complete")
                    }
                    Ok(Err(err)) => tracing::warn!(
                        %participant_id,
                        error = %err,
                        "global removal failed"
                    ),
                    Err(_) => tracing::warn!(
                        %participant_id,
                        "global removal dropped after shutdown"
                    ),
                }
            });
        }
        Ok(())
    }

    /// Resolve providers for `domains` x `interface_name`.
    pub async fn lookup_by_interface(
        &self,
        domains: &[String],
        interface_name: &str,
        qos: &DiscoveryQos,
        gbids: &[String],
    ) -> Result<Vec<DiscoveryEntryWithMeta>, DirectoryError> {
        if self.cancel.is_cancelled() {
            return Err(DirectoryError::Shutdown);
        }
        if domains.is_empty() {
            return Err(DirectoryError::IllegalState(
                "lookup requires at least one domain".to_string(),
            ));
        }

        let gbids = self.settings.normalize_gbids(gbids);
        validation::validate_gbids(&gbids, &self.settings.known_gbids).into_result()?;

        let addresses = InterfaceAddress::for_domains(domains, interface_name);
        if let Some(result) =
            self.store
                .lookup_local_and_cached_by_interface(&addresses, qos, &gbids)
        {
            return Ok(result);
        }

        let ttl = qos.discovery_timeout();
        match qos.discovery_scope {
            // the store answers LocalOnly unconditionally
            DiscoveryScope::LocalOnly => Ok(Vec::new()),

            DiscoveryScope::LocalThenGlobal => {
                let key = LookupKey::interface(domains, interface_name);
                let (done, first) = self.pending.register(key.clone(), gbids.clone());
                if first {
                    self.spawn_coalesced_interface_fetch(
                        key,
                        domains.to_vec(),
                        interface_name.to_string(),
                        gbids,
                        ttl,
                    );
                }
                match tokio::time::timeout(ttl, done).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(DirectoryError::Shutdown),
                    Err(_) => Err(DirectoryError::Timeout),
                }
            }

            DiscoveryScope::LocalAndGlobal | DiscoveryScope::GlobalOnly => {
                let fetched = self
                    .gcd
                    .lookup_by_interface(domains, interface_name, &gbids, ttl)
                    .await?;
                if self.cancel.is_cancelled() {
                    tracing::warn!(
                        interface = %interface_name,
                        "dropping global lookup result received after shutdown"
                    );
                    return Err(DirectoryError::Shutdown);
                }
                let absorbed =
                    absorb_global_results(&self.store, &self.router, fetched, &gbids).await;
                let local = self.store.local_entries_by_interface(
                    &addresses,
                    qos.discovery_scope,
                    &gbids,
                );
                Ok(merge_local_wins(tag(local, true), absorbed))
            }
        }
    }

    /// Resolve one provider by participant id.
    pub async fn lookup_by_participant(
        &self,
        participant_id: &str,
        qos: &DiscoveryQos,
        gbids: &[String],
    ) -> Result<DiscoveryEntryWithMeta, DirectoryError> {
        if self.cancel.is_cancelled() {
            return Err(DirectoryError::Shutdown);
        }

        let gbids = self.settings.normalize_gbids(gbids);
        validation::validate_gbids(&gbids, &self.settings.known_gbids).into_result()?;

        if let Some(found) =
            self.store
                .lookup_local_and_cached_by_participant(participant_id, qos, &gbids)
        {
            return found
                .into_iter()
                .next()
                .ok_or(DirectoryError::Application(
                    DiscoveryError::NoEntryForParticipant,
                ));
        }

        let ttl = qos.discovery_timeout();
        let entries = match qos.discovery_scope {
            // the store answers LocalOnly unconditionally
            DiscoveryScope::LocalOnly => Vec::new(),

            DiscoveryScope::LocalThenGlobal => {
                let key = LookupKey::participant(participant_id);
                let (done, first) = self.pending.register(key.clone(), gbids.clone());
                if first {
                    self.spawn_coalesced_participant_fetch(
                        key,
                        participant_id.to_string(),
                        gbids,
                        ttl,
                    );
                }
                match tokio::time::timeout(ttl, done).await {
                    Ok(Ok(result)) => result?,
                    Ok(Err(_)) => return Err(DirectoryError::Shutdown),
                    Err(_) => return Err(DirectoryError::Timeout),
                }
            }

            DiscoveryScope::LocalAndGlobal | DiscoveryScope::GlobalOnly => {
                let fetched = self
                    .gcd
                    .lookup_by_participant(participant_id, &gbids, ttl)
                    .await?;
                if self.cancel.is_cancelled() {
                    tracing::warn!(
                        %participant_id,
                        "dropping global lookup result received after shutdown"
                    );
                    return Err(DirectoryError::Shutdown);
                }
                absorb_global_results(&self.store, &self.router, fetched, &gbids).await
            }
        };

        // one entry per backend may come back; the freshest one wins
        entries
            .into_iter()
            .max_by_key(|e| e.entry.last_seen_date_ms)
            .ok_or(DirectoryError::Application(
                DiscoveryError::NoEntryForParticipant,
            ))
    }

    /// Republish all global registrations; used after a detected remote
    /// directory restart.
    pub fn trigger_global_provider_reregistration(&self) {
        tracing::info!("triggering re-registration of global providers");
        let gcd = self.gcd.clone();
        let store = self.store.clone();
        let local_address = self.settings.local_address.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            gcd.re_add(&store, &local_address).await;
        });
    }

    /// Purge directory entries owned by this controller that predate its
    /// current start. Best effort: one retry per backend, then a warning.
    pub async fn remove_stale_providers(&self, cc_start_date_ms: u64) {
        for gbid in &self.settings.known_gbids {
            let mut attempts = 0u32;
            loop {
                attempts += 1;
                match self
                    .gcd
                    .remove_stale(
                        &self.settings.cluster_controller_id,
                        cc_start_date_ms,
                        gbid,
                    )
                    .await
                {
                    Ok(()) => {
                        tracing::debug!(%gbid, cc_start_date_ms, "stale providers purged");
                        break;
                    }
                    Err(err) if attempts < 2 => {
                        tracing::warn!(%gbid, error = %err, "stale purge failed, retrying");
                    }
                    Err(err) => {
                        tracing::warn!(%gbid, error = %err, "stale purge failed, giving up");
                        break;
                    }
                }
            }
        }
    }

    /// Stop timers, cancel queued remote mutations, and fail pending
    /// lookups. Idempotent.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::info!("shutting down capabilities directory");

        self.cancel.cancel();
        for handle in self.maintenance.lock().drain(..) {
            handle.abort();
        }
        self.gcd.cancel_all();
        self.pending.fail_all(DirectoryError::Shutdown);

        tracing::info!("capabilities directory shutdown complete");
    }

    fn spawn_coalesced_interface_fetch(
        &self,
        key: LookupKey,
        domains: Vec<String>,
        interface_name: String,
        gbids: Vec<String>,
        ttl: Duration,
    ) {
        // deliberately no strong reference to the directory: the fetch must
        // not keep it alive past shutdown
        let gcd = self.gcd.clone();
        let store = self.store.clone();
        let pending = self.pending.clone();
        let router = self.router.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let fetched = gcd
                .lookup_by_interface(&domains, &interface_name, &gbids, ttl)
                .await;
            if cancel.is_cancelled() {
                tracing::warn!(
                    interface = %interface_name,
                    "dropping global lookup result received after shutdown"
                );
                return;
            }
            match fetched {
                Ok(entries) => {
                    let absorbed = absorb_global_results(&store, &router, entries, &gbids).await;
                    pending.resolve(&key, &absorbed, &store);
                }
                Err(err) => pending.fail(&key, err),
            }
        });
    }

    fn spawn_coalesced_participant_fetch(
        &self,
        key: LookupKey,
        participant_id: String,
        gbids: Vec<String>,
        ttl: Duration,
    ) {
        let gcd = self.gcd.clone();
        let store = self.store.clone();
        let pending = self.pending.clone();
        let router = self.router.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let fetched = gcd
                .lookup_by_participant(&participant_id, &gbids, ttl)
                .await;
            if cancel.is_cancelled() {
                tracing::warn!(
                    %participant_id,
                    "dropping global lookup result received after shutdown"
                );
                return;
            }
            match fetched {
                Ok(entries) => {
                    let absorbed = absorb_global_results(&store, &router, entries, &gbids).await;
                    pending.resolve(&key, &absorbed, &store);
                }
                Err(err) => pending.fail(&key, err),
            }
        });
    }

    async fn roll_back_local(&self, entry: &DiscoveryEntry) {
        if let Some(removed) = self.store.remove(&entry.participant_id) {
            self.events.publish(DirectoryEvent::EntryRemoved(removed));
            self.remove_next_hop(&entry.participant_id).await;
        }
    }

    async fn add_next_hop(&self, participant_id: &str, address: &TransportAddress) {
        let Some(router) = self.router.upgrade() else {
            tracing::warn!(%participant_id, "router gone, cannot add next hop");
            return;
        };
        if let Err(err) = router.add_next_hop(participant_id, address).await {
            tracing::warn!(%participant_id, error = %err, "failed to add next hop");
        }
    }

    async fn remove_next_hop(&self, participant_id: &str) {
        let Some(router) = self.router.upgrade() else {
            tracing::warn!(%participant_id, "router gone, cannot remove next hop");
            return;
        };
        if let Err(err) = router.remove_next_hop(participant_id).await {
            tracing::warn!(%participant_id, error = %err, "failed to remove next hop");
        }
    }
}

impl Drop for CapabilitiesDirectory {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CapabilitiesDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitiesDirectory")
            .field(
                "cluster_controller_id",
                &self.settings.cluster_controller_id,
            )
            .field("known_gbids", &self.settings.known_gbids)
            .field("local_entries", &self.store.local_entry_count())
            .field("cached_entries", &self.store.cached_entry_count())
            .finish()
    }
}

/// Fold fetched global entries into the cache and the routing table.
///
/// Entries for locally registered participants are not cached; the local
/// row stays authoritative and the result is tagged local.
async fn absorb_global_results(
    store: &DirectoryStore,
    router: &Weak<dyn MessageRouter>,
    fetched: Vec<GlobalDiscoveryEntry>,
    gbids: &[String],
) -> Vec<DiscoveryEntryWithMeta> {
    let mut result = Vec::with_capacity(fetched.len());
    for global in fetched {
        let GlobalDiscoveryEntry { entry, address } = global;
        if store.insert_cached_global(entry.clone(), gbids) {
            if let Some(router) = router.upgrade() {
                if let Err(err) = router.add_next_hop(&entry.participant_id, &address).await {
                    tracing::warn!(
                        participant_id = %entry.participant_id,
                        error = %err,
                        "failed to add next hop for remote provider"
                    );
                }
            }
            result.push(entry.with_meta(false));
        } else {
            result.push(entry.with_meta(true));
        }
    }
    result
}
