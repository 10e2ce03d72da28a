// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Transport-facing façade with retry and serialization policy.
//!
//! `add` and `remove` are pushed through the [`TaskSequencer`] so every
//! mutation has a bounded footprint on the remote directory and all
//! mutations for one participant are totally ordered. Runtime errors are
//! retried with capped exponential backoff until the per-task deadline;
//! application errors are deterministic directory responses and are never
//! retried. Lookups bypass the sequencer.

use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use super::{GcdTransport, SequencedTask, TaskFate, TaskSequencer};
use crate::config::ClusterControllerSettings;
use crate::store::DirectoryStore;
use crate::types::{DirectoryError, GcdError, GlobalDiscoveryEntry, TransportAddress};

#[derive(Debug)]
pub struct GcdClient {
    transport: Arc<dyn GcdTransport>,
    sequencer: TaskSequencer,
    registration_ttl: Duration,
    touch_ttl: Duration,
    remove_stale_ttl: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl GcdClient {
    /// Must be called within a tokio runtime; spawns the sequencer worker.
    pub fn new(transport: Arc<dyn GcdTransport>, settings: &ClusterControllerSettings) -> Self {
        Self {
            transport,
            sequencer: TaskSequencer::new(),
            registration_ttl: settings.discovery_registration_ttl,
            touch_ttl: settings.touch_ttl,
            remove_stale_ttl: settings.remove_stale_ttl,
            initial_backoff: settings.initial_retry_backoff,
            max_backoff: settings.max_retry_backoff,
        }
    }

    /// Enqueue a global registration. The returned channel completes when
    /// the registration succeeds, is rejected, or exhausts its deadline.
    pub fn add(
        &self,
        entry: GlobalDiscoveryEntry,
        gbids: Vec<String>,
    ) -> oneshot::Receiver<Result<(), DirectoryError>> {
        let label = format!("gcd-add:{}", entry.entry.participant_id);
        let transport = self.transport.clone();
        self.sequence(label, move |label, expires_at, initial, max| {
            async move {
                run_with_retry(&label, expires_at, initial, max, || {
                    let transport = transport.clone();
                    let entry = entry.clone();
                    let gbids = gbids.clone();
                    async move { transport.add(entry, &gbids).await }
                })
                .await
            }
            .boxed()
        })
    }

    /// Enqueue a global removal; same completion semantics as [`add`](Self::add).
    pub fn remove(
        &self,
        participant_id: String,
        gbids: Vec<String>,
    ) -> oneshot::Receiver<Result<(), DirectoryError>> {
        let label = format!("gcd-remove:{participant_id}");
        let transport = self.transport.clone();
        self.sequence(label, move |label, expires_at, initial, max| {
            async move {
                run_with_retry(&label, expires_at, initial, max, || {
                    let transport = transport.clone();
                    let participant_id = participant_id.clone();
                    let gbids = gbids.clone();
                    async move { transport.remove(&participant_id, &gbids).await }
                })
                .await
            }
            .boxed()
        })
    }

    /// Single-attempt remote lookup; the caller's discovery timeout is the
    /// messaging TTL.
    pub async fn lookup_by_interface(
        &self,
        domains: &[String],
        interface_name: &str,
        gbids: &[String],
        ttl: Duration,
    ) -> Result<Vec<GlobalDiscoveryEntry>, DirectoryError> {
        match tokio::time::timeout(
            ttl,
            self.transport
                .lookup_by_interface(domains, interface_name, gbids, ttl),
        )
        .await
        {
            Ok(Ok(entries)) => Ok(entries),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(DirectoryError::Timeout),
        }
    }

    pub async fn lookup_by_participant(
        &self,
        participant_id: &str,
        gbids: &[String],
        ttl: Duration,
    ) -> Result<Vec<GlobalDiscoveryEntry>, DirectoryError> {
        match tokio::time::timeout(
            ttl,
            self.transport
                .lookup_by_participant(participant_id, gbids, ttl),
        )
        .await
        {
            Ok(Ok(entries)) => Ok(entries),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(DirectoryError::Timeout),
        }
    }

    /// Best-effort freshness update for one backend.
    pub async fn touch(
        &self,
        cluster_controller_id: &str,
        participant_ids: &[String],
        gbid: &str,
    ) -> Result<(), DirectoryError> {
        match tokio::time::timeout(
            self.touch_ttl,
            self.transport
                .touch(cluster_controller_id, participant_ids, gbid, self.touch_ttl),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(DirectoryError::Timeout),
        }
    }

    /// Best-effort stale purge for one backend.
    pub async fn remove_stale(
        &self,
        cluster_controller_id: &str,
        max_last_seen_date_ms: u64,
        gbid: &str,
    ) -> Result<(), DirectoryError> {
        match tokio::time::timeout(
            self.remove_stale_ttl,
            self.transport.remove_stale(
                cluster_controller_id,
                max_last_seen_date_ms,
                gbid,
                self.remove_stale_ttl,
            ),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(DirectoryError::Timeout),
        }
    }

    /// Republish every locally registered global entry against its recorded
    /// backends. Partial failures are logged, not propagated.
    pub async fn re_add(&self, store: &DirectoryStore, local_address: &TransportAddress) {
        let entries = store.all_global_capabilities();
        if entries.is_empty() {
            tracing::debug!("no global capabilities to re-add");
            return;
        }

        let mut completions = Vec::with_capacity(entries.len());
        for entry in entries {
            let gbids = store.gbids_for_participant(&entry.participant_id);
            if gbids.is_empty() {
                tracing::warn!(
                    participant_id = %entry.participant_id,
                    "no backend mapping recorded, skipping re-add"
                );
                continue;
            }
            let participant_id = entry.participant_id.clone();
            let done = self.add(
                GlobalDiscoveryEntry::new(entry, local_address.clone()),
                gbids,
            );
            completions.push((participant_id, done));
        }

        let total = completions.len();
        let mut failed = 0usize;
        for (participant_id, done) in completions {
            match done.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failed += 1;
                    tracing::warn!(%participant_id, error = %err, "re-add failed");
                }
                Err(_) => {
                    failed += 1;
                    tracing::warn!(%participant_id, "re-add completion dropped");
                }
            }
        }

        if failed > 0 {
            tracing::warn!(failed, total, "re-add of global capabilities incomplete");
        } else {
            tracing::info!(total, "re-add of global capabilities complete");
        }
    }

    /// Fail every queued mutation with `Cancelled`; used on shutdown.
    pub fn cancel_all(&self) {
        self.sequencer.cancel_all();
    }

    fn sequence<F>(&self, label: String, work: F) -> oneshot::Receiver<Result<(), DirectoryError>>
    where
        F: FnOnce(
                String,
                Instant,
                Duration,
                Duration,
            ) -> futures::future::BoxFuture<'static, Result<(), DirectoryError>>
            + Send
            + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let expires_at = Instant::now() + self.registration_ttl;
        let initial = self.initial_backoff;
        let max = self.max_backoff;

        self.sequencer.enqueue(SequencedTask::new(
            label.clone(),
            expires_at,
            move |fate| {
                async move {
                    let result = match fate {
                        TaskFate::Run => work(label, expires_at, initial, max).await,
                        TaskFate::Expired => Err(DirectoryError::Timeout),
                        TaskFate::Cancelled => Err(DirectoryError::Cancelled),
                    };
                    let _ = done_tx.send(result);
                }
                .boxed()
            },
        ));
        done_rx
    }
}

/// Retry `attempt` on runtime errors until `expires_at`, with capped
/// exponential backoff. Application errors complete immediately.
async fn run_with_retry<F, Fut>(
    label: &str,
    expires_at: Instant,
    initial_backoff: Duration,
    max_backoff: Duration,
    mut attempt: F,
) -> Result<(), DirectoryError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<(), GcdError>> + Send,
{
    let mut backoff = initial_backoff;
    let mut attempts: u32 = 0;

    loop {
        let remaining = expires_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::warn!(task = %label, attempts, "deadline reached");
            return Err(DirectoryError::Timeout);
        }
        attempts += 1;

        let outcome = match tokio::time::timeout(remaining, attempt()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(task = %label, attempts, "attempt ran into the deadline");
                return Err(DirectoryError::Timeout);
            }
        };

        match outcome {
            Ok(()) => {
                if attempts > 1 {
                    tracing::debug!(task = %label, attempts, "succeeded after retry");
                }
                return Ok(());
            }
            Err(GcdError::Application(err)) => {
                tracing::warn!(task = %label, error = %err, "directory rejected the request");
                return Err(err.into());
            }
            Err(GcdError::Runtime(err)) => {
                if Instant::now() + backoff >= expires_at {
                    tracing::warn!(
                        task = %label,
                        attempts,
                        error = %err,
                        "giving up, no time left for another attempt"
                    );
                    return Err(DirectoryError::Timeout);
                }
                tracing::debug!(
                    task = %label,
                    attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "runtime error, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }
}
