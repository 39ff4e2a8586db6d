//! Daily push scheduler
//!
//! Arms one timer that fires once a day at the configured time (or at a
//! minute drawn from the configured window) and runs an unattended push when
//! there is something worth sending:
//!
//! 1. at least one account is online,
//! 2. at least one of those accounts is in a group,
//! 3. the current notice is still `current` and has not been pushed yet.
//!
//! A trigger that finds nothing to do only logs; the timer re-arms for the
//! next day either way.

mod error;
mod time;

use chrono::{DateTime, Local, NaiveTime};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::account::AccountRegistry;
use crate::config::ScheduleConfig;
use crate::notice::NoticeStore;
use crate::push::{LogReporter, PushMode, PushOrchestrator, PushOutcome};

pub use self::error::{SchedulerError, SchedulerResult};
pub use self::time::{next_fire, next_occurrence, ScheduleTime};

/// Fallback sleep when the next fire time cannot be expressed as a std duration
const FALLBACK_SLEEP: std::time::Duration = std::time::Duration::from_secs(60);

/// What a single trigger decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Scheduling is switched off
    Disabled,
    /// No account is online
    NoAccounts,
    /// Accounts are online but none is in a group
    NoAvailableAccounts,
    /// No current notice, or it was already pushed
    NothingToPush,
    /// A push ran (or was refused because one was in flight)
    Pushed(PushOutcome),
}

/// Snapshot for status displays
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub schedule: ScheduleTime,
    pub fire_at: Option<NaiveTime>,
    pub next_run: Option<DateTime<Local>>,
}

struct ActiveTimer {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
    fire_at: NaiveTime,
}

/// Fires the daily unattended push
pub struct DailyScheduler {
    enabled: bool,
    schedule: ScheduleTime,
    registry: Arc<AccountRegistry>,
    notices: Arc<NoticeStore>,
    orchestrator: Arc<PushOrchestrator>,
    timer: Mutex<Option<ActiveTimer>>,
}

impl DailyScheduler {
    /// Create a scheduler; malformed times fall back to 08:00
    pub fn new(
        config: &ScheduleConfig,
        registry: Arc<AccountRegistry>,
        notices: Arc<NoticeStore>,
        orchestrator: Arc<PushOrchestrator>,
    ) -> Self {
        Self {
            enabled: config.enable_schedule,
            schedule: ScheduleTime::parse_or_default(&config.schedule_time),
            registry,
            notices,
            orchestrator,
            timer: Mutex::new(None),
        }
    }

    /// Whether scheduling is switched on
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured time or window
    pub fn schedule(&self) -> ScheduleTime {
        self.schedule
    }

    /// Whether a timer is armed
    pub async fn is_running(&self) -> bool {
        self.timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Arm the daily timer
    ///
    /// Does nothing (and returns `false`) when scheduling is disabled or a
    /// timer is already armed.
    pub async fn start(self: &Arc<Self>) -> bool {
        if !self.enabled {
            tracing::info!("Scheduled push disabled");
            return false;
        }

        let mut timer = self.timer.lock().await;
        if timer.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::debug!("Scheduler already running");
            return false;
        }

        let fire_at = self.schedule.pick();
        let (stop_tx, stop_rx) = watch::channel(false);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_loop(fire_at, stop_rx).await });

        tracing::info!(
            schedule = %self.schedule,
            fire_at = %fire_at.format("%H:%M"),
            next_run = %next_occurrence(fire_at, &Local::now()),
            "Scheduled push armed"
        );
        *timer = Some(ActiveTimer {
            handle,
            stop: stop_tx,
            fire_at,
        });
        true
    }

    /// Disarm the timer
    ///
    /// A push already in progress runs to completion; only the wait for the
    /// next trigger is cancelled.
    pub async fn stop(&self) -> bool {
        let Some(timer) = self.timer.lock().await.take() else {
            return false;
        };
        if timer.stop.send(true).is_err() {
            timer.handle.abort();
        }
        tracing::info!("Scheduled push disarmed");
        true
    }

    /// Current state
    pub async fn status(&self) -> SchedulerStatus {
        let timer = self.timer.lock().await;
        let fire_at = timer
            .as_ref()
            .filter(|t| !t.handle.is_finished())
            .map(|t| t.fire_at);
        SchedulerStatus {
            enabled: self.enabled,
            running: fire_at.is_some(),
            schedule: self.schedule,
            fire_at,
            next_run: fire_at.map(|at| next_occurrence(at, &Local::now())),
        }
    }

    async fn run_loop(&self, fire_at: NaiveTime, mut stop: watch::Receiver<bool>) {
        let mut previous: Option<DateTime<Local>> = None;
        loop {
            let now = Local::now();
            let next = next_fire(fire_at, &now, previous.as_ref());
            let sleep_for = (next - now).to_std().unwrap_or(FALLBACK_SLEEP);
            tracing::debug!(next_run = %next, "Waiting for next scheduled push");

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {
                    previous = Some(next);
                    match self.run_trigger().await {
                        Ok(outcome) => tracing::info!(?outcome, "Scheduled trigger finished"),
                        Err(e) => tracing::error!(
                            error = %e,
                            recoverable = e.is_recoverable(),
                            "Scheduled trigger failed"
                        ),
                    }
                }
                _ = stop.changed() => {
                    tracing::debug!("Scheduler loop stopped");
                    break;
                }
            }
        }
    }

    /// Run the trigger checks and push if they pass
    pub async fn run_trigger(&self) -> SchedulerResult<TriggerOutcome> {
        if !self.enabled {
            return Ok(TriggerOutcome::Disabled);
        }

        let accounts = self.registry.get_all_accounts(true).await;
        if accounts.is_empty() {
            tracing::info!("Scheduled push skipped: no accounts online");
            return Ok(TriggerOutcome::NoAccounts);
        }
        if accounts.iter().all(|a| a.groups.is_empty()) {
            tracing::info!(
                accounts = accounts.len(),
                "Scheduled push skipped: no account is in a group"
            );
            return Ok(TriggerOutcome::NoAvailableAccounts);
        }

        let notice = self
            .notices
            .get_current_notice()
            .await
            .map_err(|e| SchedulerError::state_unavailable("read current notice", e.to_string()))?;
        match notice {
            Some(notice) if notice.is_deliverable() => {
                tracing::info!(notice_id = %notice.id, "Starting scheduled push");
            }
            Some(notice) => {
                tracing::info!(
                    notice_id = %notice.id,
                    status = notice.status.as_str(),
                    pushed = notice.pushed,
                    "Scheduled push skipped: current notice already handled"
                );
                return Ok(TriggerOutcome::NothingToPush);
            }
            None => {
                tracing::info!("Scheduled push skipped: no current notice");
                return Ok(TriggerOutcome::NothingToPush);
            }
        }

        let outcome = self
            .orchestrator
            .push(PushMode::Unattended, &LogReporter)
            .await
            .map_err(|e| SchedulerError::trigger_failed(e.to_string()))?;
        Ok(TriggerOutcome::Pushed(outcome))
    }
}

impl Drop for DailyScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.handle.abort();
        }
    }
}
