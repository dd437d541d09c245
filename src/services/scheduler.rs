// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user monitoring sessions.
//!
//! Each running session is a tokio task that runs one cycle immediately and
//! then one cycle per interval. Cycles for a user never overlap: the task
//! awaits each cycle before waiting for the next tick, ticks missed while a
//! cycle was slow are skipped, and every cycle holds the user's cycle lock.
//! The lock outlives the session, so a session started right after a stop
//! waits for the stopped session's last cycle.

use crate::services::pipeline::{CycleOutcome, MonitorPipeline};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Public view of a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: u64,
    pub interval: Duration,
    pub started_at: DateTime<Utc>,
}

/// Result of one tick, as seen by whoever is watching.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    Completed(CycleOutcome),
    Failed { reason: String },
}

#[derive(Debug)]
pub enum StartOutcome {
    /// A new session was created; `first_cycle` is the immediate cycle
    Started {
        session: SessionInfo,
        first_cycle: TickReport,
    },
    /// The user already had a session; nothing was changed
    AlreadyRunning(SessionInfo),
}

struct SessionHandle {
    info: SessionInfo,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns all monitoring sessions. Cheap to clone.
#[derive(Clone)]
pub struct MonitorScheduler {
    pipeline: Arc<MonitorPipeline>,
    default_interval: Duration,
    sessions: Arc<DashMap<u64, SessionHandle>>,
    /// Held for the duration of each cycle; never removed
    cycle_locks: Arc<DashMap<u64, Arc<Mutex<()>>>>,
}

impl MonitorScheduler {
    pub fn new(pipeline: Arc<MonitorPipeline>, default_interval: Duration) -> Self {
        Self {
            pipeline,
            default_interval,
            sessions: Arc::new(DashMap::new()),
            cycle_locks: Arc::new(DashMap::new()),
        }
    }

    fn cycle_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        Arc::clone(self.cycle_locks.entry(user_id).or_default().value())
    }

    /// Start monitoring `user_id`, or report the existing session.
    ///
    /// Waits for the first cycle to finish so the caller gets its result.
    pub async fn start(&self, user_id: u64, interval: Option<Duration>) -> StartOutcome {
        let interval = interval.unwrap_or(self.default_interval);
        let (first_tx, first_rx) = oneshot::channel();

        let session = match self.sessions.entry(user_id) {
            Entry::Occupied(existing) => {
                tracing::info!(user_id, "Monitoring already running");
                return StartOutcome::AlreadyRunning(existing.get().info.clone());
            }
            Entry::Vacant(slot) => {
                let info = SessionInfo {
                    user_id,
                    interval,
                    started_at: Utc::now(),
                };
                let (stop_tx, stop_rx) = watch::channel(false);
                let task = tokio::spawn(run_session(
                    Arc::clone(&self.pipeline),
                    self.cycle_lock(user_id),
                    user_id,
                    interval,
                    stop_rx,
                    first_tx,
                ));
                slot.insert(SessionHandle {
                    info: info.clone(),
                    stop: stop_tx,
                    task,
                });
                info
            }
        };

        tracing::info!(
            user_id,
            interval_ms = interval.as_millis() as u64,
            "Monitoring started"
        );

        let first_cycle = match first_rx.await {
            Ok(report) => report,
            Err(_) => {
                // The task died before reporting, so the session is gone too
                self.sessions.remove(&user_id);
                TickReport::Failed {
                    reason: "Monitoring task ended before the first cycle completed".to_string(),
                }
            }
        };

        StartOutcome::Started {
            session,
            first_cycle,
        }
    }

    /// Stop monitoring `user_id`. Returns false if there was no session.
    ///
    /// A cycle already in progress finishes; no further cycles run.
    pub fn stop(&self, user_id: u64) -> bool {
        match self.sessions.remove(&user_id) {
            Some((_, handle)) => {
                let _ = handle.stop.send(true);
                tracing::info!(user_id, "Monitoring stopped");
                true
            }
            None => {
                tracing::debug!(user_id, "Stop requested for idle user");
                false
            }
        }
    }

    pub fn is_running(&self, user_id: u64) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn session(&self, user_id: u64) -> Option<SessionInfo> {
        self.sessions.get(&user_id).map(|s| s.info.clone())
    }

    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|s| s.info.clone()).collect()
    }

    /// Stop every session and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        let user_ids: Vec<u64> = self.sessions.iter().map(|s| *s.key()).collect();
        let mut tasks = Vec::with_capacity(user_ids.len());

        for user_id in user_ids {
            if let Some((_, handle)) = self.sessions.remove(&user_id) {
                let _ = handle.stop.send(true);
                tasks.push(handle.task);
            }
        }

        let count = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Monitoring task ended abnormally");
            }
        }
        tracing::info!(sessions = count, "Monitoring scheduler shut down");
    }
}

async fn run_session(
    pipeline: Arc<MonitorPipeline>,
    cycle_lock: Arc<Mutex<()>>,
    user_id: u64,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    first_tx: oneshot::Sender<TickReport>,
) {
    let first = run_tick(&pipeline, &cycle_lock, user_id).await;
    let _ = first_tx.send(first);

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            // Err means the scheduler dropped the session without signalling
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                run_tick(&pipeline, &cycle_lock, user_id).await;
            }
        }
    }

    tracing::debug!(user_id, "Monitoring task exiting");
}

async fn run_tick(
    pipeline: &MonitorPipeline,
    cycle_lock: &Mutex<()>,
    user_id: u64,
) -> TickReport {
    let _cycle = cycle_lock.lock().await;

    match pipeline.run_cycle(user_id).await {
        Ok(outcome) => TickReport::Completed(outcome),
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Monitoring tick failed");
            TickReport::Failed {
                reason: e.to_string(),
            }
        }
    }
}
