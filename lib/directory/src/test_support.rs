// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shared test fixtures: entry factories, settings presets, and a
//! scriptable mock of the global directory transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClusterControllerSettings, ClusterControllerSettingsBuilder};
use crate::gcd::GcdTransport;
use crate::types::{
    now_ms, DiscoveryEntry, DiscoveryError, GcdError, GlobalDiscoveryEntry, ProviderQos,
    ProviderScope, TransportAddress, Version,
};

/// Opt-in log output for debugging a failing test, driven by `RUST_LOG`.
#[allow(dead_code)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn make_entry(
    participant_id: &str,
    domain: &str,
    interface_name: &str,
    scope: ProviderScope,
) -> DiscoveryEntry {
    make_entry_with_expiry(
        participant_id,
        domain,
        interface_name,
        scope,
        now_ms() + 600_000,
    )
}

pub(crate) fn make_entry_with_expiry(
    participant_id: &str,
    domain: &str,
    interface_name: &str,
    scope: ProviderScope,
    expiry_date_ms: u64,
) -> DiscoveryEntry {
    DiscoveryEntry {
        version: Version::new(1, 0),
        domain: domain.to_string(),
        interface_name: interface_name.to_string(),
        participant_id: participant_id.to_string(),
        qos: ProviderQos {
            scope,
            ..Default::default()
        },
        last_seen_date_ms: now_ms(),
        expiry_date_ms,
        public_key_id: String::new(),
    }
}

pub(crate) fn make_global_entry(entry: DiscoveryEntry) -> GlobalDiscoveryEntry {
    GlobalDiscoveryEntry::new(entry, TransportAddress::from("mqtt://remote-cc:1883"))
}

/// Settings preset with fast retry backoff and maintenance loops parked far
/// in the future; tests tune individual fields as needed.
pub(crate) fn settings_with_gbids(gbids: &[&str]) -> ClusterControllerSettings {
    ClusterControllerSettingsBuilder::default()
        .cluster_controller_id("cc-test")
        .known_gbids(gbids.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .local_address(TransportAddress::from("mqtt://local-cc:1883"))
        .discovery_registration_ttl(Duration::from_secs(2))
        .initial_retry_backoff(Duration::from_millis(10))
        .max_retry_backoff(Duration::from_millis(100))
        .freshness_update_interval(Duration::from_secs(3600))
        .cleanup_interval(Duration::from_secs(3600))
        .re_add_interval(Duration::from_secs(7 * 24 * 3600))
        .build()
        .expect("test settings are valid")
}

/// Scriptable in-memory global directory.
///
/// Responses are pre-configured per operation; mutation calls are recorded
/// in arrival order so tests can assert total ordering and call counts.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockGcd {
    inner: Arc<MockGcdInner>,
}

#[derive(Debug, Default)]
struct MockGcdInner {
    add_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    lookup_interface_calls: AtomicUsize,
    lookup_participant_calls: AtomicUsize,
    touch_calls: AtomicUsize,
    remove_stale_calls: AtomicUsize,

    add_script: Mutex<VecDeque<Result<(), GcdError>>>,
    remove_script: Mutex<VecDeque<Result<(), GcdError>>>,
    touch_script: Mutex<VecDeque<Result<(), GcdError>>>,
    remove_stale_script: Mutex<VecDeque<Result<(), GcdError>>>,
    lookup_interface_responses:
        Mutex<HashMap<(String, String), Result<Vec<GlobalDiscoveryEntry>, GcdError>>>,
    lookup_participant_responses:
        Mutex<HashMap<String, Result<Vec<GlobalDiscoveryEntry>, GcdError>>>,

    always_fail_runtime: AtomicBool,
    delay: Mutex<Option<Duration>>,

    mutation_order: Mutex<Vec<String>>,
    added: Mutex<Vec<(GlobalDiscoveryEntry, Vec<String>)>>,
    removed: Mutex<Vec<(String, Vec<String>)>>,
    touched: Mutex<Vec<(String, Vec<String>)>>,
    stale_purges: Mutex<Vec<(String, u64)>>,
}

impl MockGcd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> Arc<dyn GcdTransport> {
        Arc::new(self.clone())
    }

    /// Queue one scripted response for the next `add` call. With an empty
    /// script, `add` succeeds.
    pub fn script_add(&self, response: Result<(), GcdError>) {
        self.inner.add_script.lock().push_back(response);
    }

    pub fn script_remove(&self, response: Result<(), GcdError>) {
        self.inner.remove_script.lock().push_back(response);
    }

    pub fn script_touch(&self, response: Result<(), GcdError>) {
        self.inner.touch_script.lock().push_back(response);
    }

    pub fn script_remove_stale(&self, response: Result<(), GcdError>) {
        self.inner.remove_stale_script.lock().push_back(response);
    }

    pub fn script_lookup_interface(
        &self,
        domain: &str,
        interface_name: &str,
        response: Result<Vec<GlobalDiscoveryEntry>, GcdError>,
    ) {
        self.inner
            .lookup_interface_responses
            .lock()
            .insert((domain.to_string(), interface_name.to_string()), response);
    }

    pub fn script_lookup_participant(
        &self,
        participant_id: &str,
        response: Result<Vec<GlobalDiscoveryEntry>, GcdError>,
    ) {
        self.inner
            .lookup_participant_responses
            .lock()
            .insert(participant_id.to_string(), response);
    }

    /// Every subsequent call fails with a runtime error, regardless of
    /// scripts.
    pub fn always_fail_runtime(&self) {
        self.inner.always_fail_runtime.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = Some(delay);
    }

    pub fn add_call_count(&self) -> usize {
        self.inner.add_calls.load(Ordering::SeqCst)
    }

    pub fn remove_call_count(&self) -> usize {
        self.inner.remove_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_interface_call_count(&self) -> usize {
        self.inner.lookup_interface_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_participant_call_count(&self) -> usize {
        self.inner.lookup_participant_calls.load(Ordering::SeqCst)
    }

    pub fn touch_call_count(&self) -> usize {
        self.inner.touch_calls.load(Ordering::SeqCst)
    }

    pub fn remove_stale_call_count(&self) -> usize {
        self.inner.remove_stale_calls.load(Ordering::SeqCst)
    }

    /// Mutations in arrival order, as `"add:<id>"` / `"remove:<id>"`.
    pub fn mutation_order(&self) -> Vec<String> {
        self.inner.mutation_order.lock().clone()
    }

    pub fn added_participants(&self) -> Vec<String> {
        self.inner
            .added
            .lock()
            .iter()
            .map(|(entry, _)| entry.entry.participant_id.clone())
            .collect()
    }

    pub fn added_gbids_for(&self, participant_id: &str) -> Vec<Vec<String>> {
        self.inner
            .added
            .lock()
            .iter()
            .filter(|(entry, _)| entry.entry.participant_id == participant_id)
            .map(|(_, gbids)| gbids.clone())
            .collect()
    }

    pub fn removed_participants(&self) -> Vec<(String, Vec<String>)> {
        self.inner.removed.lock().clone()
    }

    /// `(gbid, participant ids)` per touch call.
    pub fn touched(&self) -> Vec<(String, Vec<String>)> {
        self.inner.touched.lock().clone()
    }

    /// `(gbid, cutoff)` per removeStale call.
    pub fn stale_purges(&self) -> Vec<(String, u64)> {
        self.inner.stale_purges.lock().clone()
    }

    async fn simulate_latency(&self) {
        let delay = *self.inner.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn scripted(&self, script: &Mutex<VecDeque<Result<(), GcdError>>>) -> Result<(), GcdError> {
        if self.inner.always_fail_runtime.load(Ordering::SeqCst) {
            return Err(GcdError::runtime(anyhow::anyhow!("scripted runtime error")));
        }
        script.lock().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl GcdTransport for MockGcd {
    async fn add(&self, entry: GlobalDiscoveryEntry, gbids: &[String]) -> Result<(), GcdError> {
        self.inner.add_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .mutation_order
            .lock()
            .push(format!("add:{}", entry.entry.participant_id));
        self.inner.added.lock().push((entry, gbids.to_vec()));
        self.simulate_latency().await;
        self.scripted(&self.inner.add_script)
    }

    async fn remove(&self, participant_id: &str, gbids: &[String]) -> Result<(), GcdError> {
        self.inner.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .mutation_order
            .lock()
            .push(format!("remove:{participant_id}"));
        self.inner
            .removed
            .lock()
            .push((participant_id.to_string(), gbids.to_vec()));
        self.simulate_latency().await;
        self.scripted(&self.inner.remove_script)
    }

    async fn lookup_by_interface(
        &self,
        domains: &[String],
        interface_name: &str,
        _gbids: &[String],
        _ttl: Duration,
    ) -> Result<Vec<GlobalDiscoveryEntry>, GcdError> {
        self.inner
            .lookup_interface_calls
            .fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.inner.always_fail_runtime.load(Ordering::SeqCst) {
            return Err(GcdError::runtime(anyhow::anyhow!("scripted runtime error")));
        }

        let responses = self.inner.lookup_interface_responses.lock();
        let mut result = Vec::new();
        for domain in domains {
            match responses.get(&(domain.clone(), interface_name.to_string())) {
                Some(Ok(entries)) => result.extend(entries.clone()),
                Some(Err(err)) => return Err(err.clone()),
                None => {}
            }
        }
        Ok(result)
    }

    async fn lookup_by_participant(
        &self,
        participant_id: &str,
        _gbids: &[String],
        _ttl: Duration,
    ) -> Result<Vec<GlobalDiscoveryEntry>, GcdError> {
        self.inner
            .lookup_participant_calls
            .fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.inner.always_fail_runtime.load(Ordering::SeqCst) {
            return Err(GcdError::runtime(anyhow::anyhow!("scripted runtime error")));
        }

        self.inner
            .lookup_participant_responses
            .lock()
            .get(participant_id)
            .cloned()
            .unwrap_or(Err(GcdError::Application(
                DiscoveryError::NoEntryForParticipant,
            )))
    }

    async fn touch(
        &self,
        _cluster_controller_id: &str,
        participant_ids: &[String],
        gbid: &str,
        _ttl: Duration,
    ) -> Result<(), GcdError> {
        self.inner.touch_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .touched
            .lock()
            .push((gbid.to_string(), participant_ids.to_vec()));
        self.simulate_latency().await;
        self.scripted(&self.inner.touch_script)
    }

    async fn remove_stale(
        &self,
        _cluster_controller_id: &str,
        max_last_seen_date_ms: u64,
        gbid: &str,
        _ttl: Duration,
    ) -> Result<(), GcdError> {
        self.inner.remove_stale_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .stale_purges
            .lock()
            .push((gbid.to_string(), max_last_seen_date_ms));
        self.simulate_latency().await;
        self.scripted(&self.inner.remove_stale_script)
    }
}
