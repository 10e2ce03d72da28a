// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Background maintenance of the directory.
//!
//! Three cancellable loops, each sleeping its period and then running once:
//! - freshness: refreshes `last_seen_date_ms` locally and touches every
//!   backend with the participants registered there;
//! - cleanup: sweeps expired entries out of both stores and unhooks their
//!   routes;
//! - re-add: defensively republishes all global registrations to cover
//!   silent remote state loss.
//!
//! Touch and re-add are best-effort; failures are logged and the loop keeps
//! its schedule.

use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClusterControllerSettings;
use crate::events::{DirectoryEvent, DirectoryEventBus};
use crate::gcd::GcdClient;
use crate::store::DirectoryStore;
use crate::traits::MessageRouter;
use crate::types::now_ms;

pub(crate) struct Maintenance {
    pub store: Arc<DirectoryStore>,
    pub gcd: Arc<GcdClient>,
    pub events: DirectoryEventBus,
    pub router: Weak<dyn MessageRouter>,
    pub settings: ClusterControllerSettings,
    pub cancel: CancellationToken,
}

impl Maintenance {
    /// Spawn the three loops. Must be called within a tokio runtime.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_freshness_loop(),
            self.spawn_cleanup_loop(),
            self.spawn_re_add_loop(),
        ]
    }

    fn spawn_freshness_loop(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let gcd = self.gcd.clone();
        let settings = self.settings.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tracing::debug!("freshness loop starting");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(settings.freshness_update_interval) => {}
                }
                run_freshness_update(&store, &gcd, &settings).await;
            }
            tracing::debug!("freshness loop exited");
        })
    }

    fn spawn_cleanup_loop(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let events = self.events.clone();
        let router = self.router.clone();
        let interval = self.settings.cleanup_interval;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tracing::debug!("expired-entry sweep starting");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                run_cleanup_sweep(&store, &events, &router).await;
            }
            tracing::debug!("expired-entry sweep exited");
        })
    }

    fn spawn_re_add_loop(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let gcd = self.gcd.clone();
        let local_address = self.settings.local_address.clone();
        let interval = self.settings.re_add_interval;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tracing::debug!("re-add loop starting");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                tracing::info!("periodic re-add of global capabilities");
                gcd.re_add(&store, &local_address).await;
            }
            tracing::debug!("re-add loop exited");
        })
    }
}

pub(crate) async fn run_freshness_update(
    store: &DirectoryStore,
    gcd: &GcdClient,
    settings: &ClusterControllerSettings,
) {
    let now = now_ms();
    let refreshed_expiry = now + settings.default_expiry_interval.as_millis() as u64;

    for gbid in &settings.known_gbids {
        let participant_ids = store.global_participant_ids_for_gbid(gbid);
        if participant_ids.is_empty() {
            continue;
        }

        store.touch_local(&participant_ids, now, refreshed_expiry);
        if let Err(err) = gcd
            .touch(&settings.cluster_controller_id, &participant_ids, gbid)
            .await
        {
            tracing::warn!(
                %gbid,
                participants = participant_ids.len(),
                error = %err,
                "freshness update failed"
            );
        } else {
            tracing::debug!(
                %gbid,
                participants = participant_ids.len(),
                "freshness update sent"
            );
        }
    }
}

pub(crate) async fn run_cleanup_sweep(
    store: &DirectoryStore,
    events: &DirectoryEventBus,
    router: &Weak<dyn MessageRouter>,
) {
    let (removed_local, removed_cached) = store.remove_expired(now_ms());
    if removed_local.is_empty() && removed_cached.is_empty() {
        return;
    }

    tracing::info!(
        local = removed_local.len(),
        cached = removed_cached.len(),
        "purged expired discovery entries"
    );

    for entry in removed_local {
        events.publish(DirectoryEvent::EntryRemoved(entry.clone()));
        if let Some(router) = router.upgrade() {
            if let Err(err) = router.remove_next_hop(&entry.participant_id).await {
                tracing::warn!(
                    participant_id = %entry.participant_id,
                    error = %err,
                    "failed to remove next hop for expired entry"
                );
            }
        }
    }
}
