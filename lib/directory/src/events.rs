// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Registration event bus.
//!
//! Observers subscribe to learn about local provider registrations and
//! removals. Publishing is fire-and-forget: a lagging subscriber loses
//! events to the channel, never blocks the directory.

use tokio::sync::broadcast;

use crate::types::DiscoveryEntry;

/// Change to the set of locally registered providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    EntryAdded(DiscoveryEntry),
    EntryRemoved(DiscoveryEntry),
}

#[derive(Debug, Clone)]
pub struct DirectoryEventBus {
    tx: broadcast::Sender<DirectoryEvent>,
}

impl DirectoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, event: DirectoryEvent) {
        // no receivers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for DirectoryEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
