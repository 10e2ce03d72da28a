// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Single-writer FIFO queue for directory-mutating tasks.
//!
//! At most one task is in flight at a time; tasks run in insertion order.
//! Each task is handed its fate: `Run` when it gets the slot, `Expired`
//! when its deadline passed while queued, `Cancelled` on shutdown. The
//! expired and cancelled paths must not touch the wire; they only complete
//! the task's callers.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What the queue decided about a task when it reached the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskFate {
    /// The task got the in-flight slot; run the remote call.
    Run,
    /// The deadline passed while the task was still queued.
    Expired,
    /// The queue was cancelled before the task ran.
    Cancelled,
}

pub(crate) struct SequencedTask {
    label: String,
    expires_at: Instant,
    task: Box<dyn FnOnce(TaskFate) -> BoxFuture<'static, ()> + Send>,
}

impl SequencedTask {
    pub fn new(
        label: impl Into<String>,
        expires_at: Instant,
        task: impl FnOnce(TaskFate) -> BoxFuture<'static, ()> + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            expires_at,
            task: Box::new(task),
        }
    }
}

#[derive(Debug)]
pub(crate) struct TaskSequencer {
    tx: mpsc::UnboundedSender<SequencedTask>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSequencer {
    /// Spawn the consumer task. Must be called within a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SequencedTask>();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let worker = tokio::spawn(async move {
            loop {
                let task = tokio::select! {
                    _ = worker_cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Some(task) => task,
                        None => return,
                    },
                };

                if worker_cancel.is_cancelled() {
                    (task.task)(TaskFate::Cancelled).await;
                    continue;
                }
                if Instant::now() >= task.expires_at {
                    tracing::warn!(task = %task.label, "task expired before it could run");
                    (task.task)(TaskFate::Expired).await;
                    continue;
                }

                tracing::debug!(task = %task.label, "running sequenced task");
                (task.task)(TaskFate::Run).await;
            }

            // cancelled: drain whatever is still queued
            while let Ok(task) = rx.try_recv() {
                tracing::debug!(task = %task.label, "cancelling queued task");
                (task.task)(TaskFate::Cancelled).await;
            }
        });

        Self {
            tx,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Append a task to the queue.
    ///
    /// After [`cancel_all`](Self::cancel_all) the task is completed with
    /// `Cancelled` instead of being queued.
    pub fn enqueue(&self, task: SequencedTask) {
        if self.cancel.is_cancelled() {
            tracing::debug!(task = %task.label, "sequencer stopped, cancelling task");
            tokio::spawn((task.task)(TaskFate::Cancelled));
            return;
        }
        if let Err(rejected) = self.tx.send(task) {
            let task = rejected.0;
            tracing::debug!(task = %task.label, "sequencer gone, cancelling task");
            tokio::spawn((task.task)(TaskFate::Cancelled));
        }
    }

    /// Stop the consumer and fail every queued task with `Cancelled`. The
    /// task currently in flight is allowed to finish.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TaskSequencer {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}
