//! Broadcast orchestration
//!
//! A push run walks every pushable (account, group) target strictly in
//! sequence:
//!
//! ```text
//! idle ─► collecting targets ─┬─► no targets (done, no job)
//!                             └─► sending ─► finished
//! ```
//!
//! Each target gets exactly one attempt. Failures are recorded and the run
//! continues; the job's sent counter advances once per attempt whatever the
//! outcome. Between two attempts the loop sleeps for a jittered interval
//! taken from the sending account's configuration.
//!
//! Progress is published as [`PushEvent`]s to a [`PushReporter`], so the
//! same loop serves an operator waiting on a reply ([`ChannelReporter`]) and
//! the scheduler writing to the log ([`LogReporter`]).

mod pacing;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::account::{AccountRegistry, DeliveryError};
use crate::error::Result;
use crate::metrics;
use crate::notice::{Notice, NoticeStore, PushStatsRecord};

pub use self::pacing::{jittered_delay, progress_due, progress_step, JITTER_MAX, JITTER_MIN};

/// Header line of every broadcast message
pub const MESSAGE_HEADER: &str = "[Announcement]";

/// Separator around the message body
pub const MESSAGE_RULE: &str = "--------------------";

/// Failed targets listed individually in a report
pub const FAILED_PREVIEW_LIMIT: usize = 10;

/// Frame a notice for delivery
pub fn format_notice_message(notice: &Notice) -> String {
    format!(
        "{MESSAGE_HEADER}\n{MESSAGE_RULE}\n{}\n{MESSAGE_RULE}\n{}",
        notice.content, notice.timestamp
    )
}

// ============================================================================
// Events and reports
// ============================================================================

/// Who started the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    /// An operator is waiting for replies; progress events are emitted
    Interactive,
    /// Triggered by the scheduler; no intermediate progress
    Unattended,
}

impl PushMode {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Unattended => "scheduled",
        }
    }
}

/// Delivery totals of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOutcome {
    pub uin: String,
    pub nickname: String,
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// Final report of a push run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    pub job_id: String,
    pub notice_id: String,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub accounts: Vec<AccountOutcome>,
    /// Every failed target as `uin:group_id`, in attempt order
    pub failed_targets: Vec<String>,
}

impl PushReport {
    /// First failed targets and the count of those left out
    pub fn failed_preview(&self) -> (&[String], usize) {
        let shown = self.failed_targets.len().min(FAILED_PREVIEW_LIMIT);
        (
            &self.failed_targets[..shown],
            self.failed_targets.len() - shown,
        )
    }
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Announcement push finished.")?;
        writeln!(f, "Total: {} groups", self.total)?;
        writeln!(f, "Succeeded: {}", self.success)?;
        write!(f, "Failed: {}", self.failed)?;

        if !self.accounts.is_empty() {
            write!(f, "\n\nBy account:")?;
            for account in &self.accounts {
                let name = if account.nickname.is_empty() {
                    "unknown"
                } else {
                    &account.nickname
                };
                write!(
                    f,
                    "\n{name}({}): {}/{}",
                    account.uin, account.success, account.total
                )?;
            }
        }

        let (shown, hidden) = self.failed_preview();
        if !shown.is_empty() {
            write!(f, "\n\nFailed groups: {}", shown.join(", "))?;
            if hidden > 0 {
                write!(f, "\n{hidden} more omitted.")?;
            }
        }
        Ok(())
    }
}

/// Something worth telling whoever started the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    /// No current notice
    NothingToPush,
    /// The filtered target set is empty
    NoTargets,
    /// Another run holds the broadcast lock
    AlreadyRunning,
    /// A job was created and sending begins
    Started {
        job_id: String,
        account_count: usize,
        total_groups: usize,
    },
    /// Intermediate progress (interactive runs only)
    Progress {
        sent: u64,
        total: u64,
        success: usize,
    },
    /// The run completed
    Finished(PushReport),
}

impl fmt::Display for PushEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToPush => write!(f, "There is no current announcement to push."),
            Self::NoTargets => write!(f, "No groups are eligible for this push."),
            Self::AlreadyRunning => write!(f, "A push is already in progress."),
            Self::Started {
                account_count,
                total_groups,
                ..
            } => write!(
                f,
                "Announcement push started: {account_count} accounts, {total_groups} groups."
            ),
            Self::Progress {
                sent,
                total,
                success,
            } => write!(f, "Push progress: {sent}/{total} (succeeded: {success})"),
            Self::Finished(report) => report.fmt(f),
        }
    }
}

/// How a push invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    NothingToPush,
    NoTargets,
    AlreadyRunning,
    Completed(PushReport),
}

impl PushOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::NothingToPush => "nothing_to_push",
            Self::NoTargets => "no_targets",
            Self::AlreadyRunning => "already_running",
            Self::Completed(_) => "completed",
        }
    }
}

// ============================================================================
// Reporters
// ============================================================================

/// Consumer of push events
#[async_trait]
pub trait PushReporter: Send + Sync {
    async fn report(&self, event: &PushEvent);
}

/// Writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl PushReporter for LogReporter {
    async fn report(&self, event: &PushEvent) {
        match event {
            PushEvent::Finished(report) if report.failed > 0 => {
                tracing::warn!(
                    job_id = %report.job_id,
                    total = report.total,
                    success = report.success,
                    failed = report.failed,
                    "{event}"
                );
            }
            _ => tracing::info!("{event}"),
        }
    }
}

/// Forwards events to a channel, e.g. a chat reply task
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<PushEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PushReporter for ChannelReporter {
    async fn report(&self, event: &PushEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!("Push event receiver dropped");
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs broadcasts, one at a time
pub struct PushOrchestrator {
    registry: Arc<AccountRegistry>,
    notices: Arc<NoticeStore>,
    running: Mutex<()>,
}

impl PushOrchestrator {
    /// Create an orchestrator
    pub fn new(registry: Arc<AccountRegistry>, notices: Arc<NoticeStore>) -> Self {
        Self {
            registry,
            notices,
            running: Mutex::new(()),
        }
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Broadcast the current notice to every pushable group
    ///
    /// Returns `AlreadyRunning` without doing anything while another run is
    /// in flight. Errors only when the push job itself cannot be created.
    pub async fn push(&self, mode: PushMode, reporter: &dyn PushReporter) -> Result<PushOutcome> {
        let Ok(_running) = self.running.try_lock() else {
            tracing::warn!(mode = mode.as_str(), "Push requested while another run is in flight");
            reporter.report(&PushEvent::AlreadyRunning).await;
            metrics::record_push_run(mode.as_str(), PushOutcome::AlreadyRunning.label());
            return Ok(PushOutcome::AlreadyRunning);
        };
        let _in_flight = metrics::InFlightGuard::enter();
        let started = tokio::time::Instant::now();

        let outcome = self.run(mode, reporter).await?;

        metrics::record_push_run(mode.as_str(), outcome.label());
        if matches!(outcome, PushOutcome::Completed(_)) {
            metrics::observe_run_duration(mode.as_str(), started.elapsed().as_secs_f64());
        }
        Ok(outcome)
    }

    async fn run(&self, mode: PushMode, reporter: &dyn PushReporter) -> Result<PushOutcome> {
        let notice = match self.notices.get_current_notice().await {
            Ok(Some(notice)) => notice,
            Ok(None) => {
                tracing::info!(mode = mode.as_str(), "No current notice, skipping push");
                reporter.report(&PushEvent::NothingToPush).await;
                return Ok(PushOutcome::NothingToPush);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read current notice, skipping push");
                reporter.report(&PushEvent::NothingToPush).await;
                return Ok(PushOutcome::NothingToPush);
            }
        };

        let targets = self.registry.get_all_pushable_groups().await;
        let total: usize = targets.values().map(Vec::len).sum();
        if total == 0 {
            tracing::info!(notice_id = %notice.id, "No eligible groups, skipping push");
            reporter.report(&PushEvent::NoTargets).await;
            return Ok(PushOutcome::NoTargets);
        }

        let job = self.notices.init_push_progress(total as u64).await?;
        tracing::info!(
            job_id = %job.id,
            notice_id = %notice.id,
            account_count = targets.len(),
            total_groups = total,
            "Push started"
        );
        reporter
            .report(&PushEvent::Started {
                job_id: job.id.clone(),
                account_count: targets.len(),
                total_groups: total,
            })
            .await;

        let nicknames: HashMap<String, String> = self
            .registry
            .get_all_accounts(false)
            .await
            .into_iter()
            .map(|a| (a.uin, a.nickname))
            .collect();

        let message = format_notice_message(&notice);
        let mut success = 0usize;
        let mut attempted = 0u64;
        let mut failed_targets = Vec::new();
        let mut accounts = Vec::with_capacity(targets.len());

        for (uin, groups) in &targets {
            let config = self.registry.get_account_config(uin).await;
            let mut outcome = AccountOutcome {
                uin: uin.clone(),
                nickname: nicknames.get(uin).cloned().unwrap_or_default(),
                success: 0,
                failed: 0,
                total: groups.len(),
            };
            tracing::info!(uin = %uin, groups = groups.len(), "Pushing through account");

            for group_id in groups {
                match self.deliver(uin, group_id, &message).await {
                    Ok(()) => {
                        success += 1;
                        outcome.success += 1;
                        metrics::record_delivery(true);
                    }
                    Err(e) => {
                        tracing::warn!(uin = %uin, group_id = %group_id, error = %e, "Delivery failed");
                        outcome.failed += 1;
                        failed_targets.push(format!("{uin}:{group_id}"));
                        metrics::record_delivery(false);
                    }
                }

                attempted += 1;
                let sent = match self.notices.update_push_progress(&job.id).await {
                    Ok(sent) => sent,
                    Err(e) => {
                        tracing::warn!(job_id = %job.id, error = %e, "Failed to update push progress");
                        attempted
                    }
                };

                if mode == PushMode::Interactive && progress_due(sent, total as u64) {
                    reporter
                        .report(&PushEvent::Progress {
                            sent,
                            total: total as u64,
                            success,
                        })
                        .await;
                }

                if attempted < total as u64 {
                    tokio::time::sleep(jittered_delay(config.push_interval())).await;
                }
            }

            if !self
                .registry
                .record_last_push(uin, Utc::now().timestamp_millis())
                .await
            {
                tracing::warn!(uin = %uin, "Failed to record last push time");
            }
            accounts.push(outcome);
        }

        if let Err(e) = self.notices.finish_push_progress(&job.id).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to finish push progress");
        }

        let report = PushReport {
            job_id: job.id.clone(),
            notice_id: notice.id.clone(),
            total,
            success,
            failed: total - success,
            accounts,
            failed_targets,
        };
        tracing::info!(
            job_id = %job.id,
            total,
            success,
            failed = report.failed,
            "Push finished"
        );
        reporter.report(&PushEvent::Finished(report.clone())).await;

        self.record_stats(&report).await;
        if let Err(e) = self.notices.set_notice_pushed(&notice.id).await {
            tracing::error!(notice_id = %notice.id, error = %e, "Failed to mark notice as pushed");
        }

        Ok(PushOutcome::Completed(report))
    }

    async fn deliver(
        &self,
        uin: &str,
        group_id: &str,
        message: &str,
    ) -> std::result::Result<(), DeliveryError> {
        let Some(session) = self.registry.session(uin).await else {
            return Err(DeliveryError::SessionUnavailable {
                uin: uin.to_string(),
            });
        };
        if !session.has_group(group_id) {
            return Err(DeliveryError::GroupNotFound {
                uin: uin.to_string(),
                group_id: group_id.to_string(),
            });
        }
        session.send_group_message(group_id, message).await
    }

    async fn record_stats(&self, report: &PushReport) {
        let stats = self.registry.get_push_stats().await;
        let record = PushStatsRecord {
            total_accounts: stats.total_accounts as u64,
            enabled_accounts: stats.enabled_accounts as u64,
            total_groups: stats.total_groups as u64,
            pushable_groups: stats.pushable_groups as u64,
            success_count: report.success as u64,
            failed_count: report.failed as u64,
            timestamp: Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.notices.record_push_stats(&record).await {
            tracing::error!(job_id = %report.job_id, error = %e, "Failed to record push statistics");
        }
    }
}
