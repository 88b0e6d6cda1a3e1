//! Cron-based scheduler firing one evaluation pass per finalized bucket

use crate::core::runtime::SignalRuntime;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
}

/// Cron expression (seconds field first) firing `grace_minutes` after
/// every bucket close.
///
/// `(15, 2)` gives `0 2,17,32,47 * * * *`; `(240, 2)` gives
/// `0 2 0,4,8,12,16,20 * * *`; `(240, 90)` gives `0 30 1,5,9,13,17,21 * * *`.
pub fn cron_expression(width_minutes: u32, grace_minutes: u32) -> String {
    let width = width_minutes.max(1) as usize;
    let grace = grace_minutes as usize;
    let join = |values: Vec<String>| values.join(",");
    if width <= 60 {
        let minutes = (0..60)
            .step_by(width)
            .map(|m| ((m + grace) % 60).to_string())
            .collect();
        format!("0 {} * * * *", join(minutes))
    } else {
        let hours = (0..24)
            .step_by(width / 60)
            .map(|h| ((h + grace / 60) % 24).to_string())
            .collect();
        format!("0 {} {} * * *", grace % 60, join(hours))
    }
}

/// How long [`JobScheduler::stop`] waits for a pass in progress to finish.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);

pub struct JobScheduler {
    runtime: Arc<SignalRuntime>,
    schedule: Schedule,
    expression: String,
    stop_timeout: Duration,
    wake: Arc<Notify>,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl JobScheduler {
    pub fn new(
        runtime: Arc<SignalRuntime>,
        width_minutes: u32,
        grace_minutes: u32,
    ) -> Result<Self, SchedulerError> {
        let scheduler = Self::with_expression(runtime, &cron_expression(width_minutes, grace_minutes))?;
        info!(
            cron = %scheduler.expression,
            width_minutes,
            grace_minutes,
            "JobScheduler: created (cron: {})",
            scheduler.expression
        );
        Ok(scheduler)
    }

    /// Scheduler on an explicit cron expression (seconds field first).
    pub fn with_expression(runtime: Arc<SignalRuntime>, expression: &str) -> Result<Self, SchedulerError> {
        let schedule = Schedule::from_str(expression).map_err(|e| SchedulerError::InvalidCron {
            expr: expression.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            runtime,
            schedule,
            expression: expression.to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            wake: Arc::new(Notify::new()),
            handle: Arc::new(RwLock::new(None)),
        })
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next firing strictly after `after`.
    pub fn next_tick(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    pub async fn start(&self) {
        let runtime = self.runtime.clone();
        let schedule = self.schedule.clone();
        let shutdown = runtime.shutdown_flag();
        let wake = self.wake.clone();

        let handle = tokio::spawn(async move {
            info!("JobScheduler: started, waiting for cron schedule...");

            while !shutdown.load(Ordering::SeqCst) {
                let Some(next_tick) = schedule.upcoming(Utc).next() else {
                    error!("JobScheduler: schedule has no upcoming ticks, stopping");
                    break;
                };
                let wait = (next_tick - Utc::now()).to_std().unwrap_or_default();
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = wake.notified() => continue,
                }

                if shutdown.load(Ordering::SeqCst) {
                    break;
                }

                info!(tick = %next_tick, "JobScheduler: cron tick, running evaluation pass");
                runtime.run_pass(Utc::now()).await;
            }
            info!("JobScheduler: loop exited");
        });

        *self.handle.write().await = Some(handle);
        info!("JobScheduler: started successfully");
    }

    /// Request shutdown and wait for the loop to exit. A pass in progress
    /// stops taking new symbols but still dispatches and flushes what it
    /// admitted. The task is aborted only if that takes longer than the
    /// stop timeout.
    pub async fn stop(&self) {
        self.runtime.request_shutdown();
        self.wake.notify_one();

        let Some(mut handle) = self.handle.write().await.take() else {
            return;
        };
        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => info!("JobScheduler: stopped"),
            Ok(Err(e)) => error!(error = %e, "JobScheduler: loop ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_secs = self.stop_timeout.as_secs(),
                    "JobScheduler: pass did not finish in time, aborting"
                );
                handle.abort();
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .read()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
