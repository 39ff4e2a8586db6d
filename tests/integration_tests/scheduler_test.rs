//! Scheduler integration tests
//!
//! Trigger decisions against the full stack, and timer arming.

use herald::config::ScheduleConfig;
use herald::push::PushOutcome;
use herald::scheduler::{DailyScheduler, ScheduleTime, TriggerOutcome};
use std::sync::Arc;

use super::fixtures::{FakeSession, Harness};

fn scheduler(h: &Harness, enabled: bool, time: &str) -> Arc<DailyScheduler> {
    let config = ScheduleConfig {
        enable_schedule: enabled,
        schedule_time: time.to_string(),
    };
    Arc::new(DailyScheduler::new(
        &config,
        Arc::clone(&h.registry),
        Arc::clone(&h.notices),
        Arc::clone(&h.orchestrator),
    ))
}

#[tokio::test]
async fn test_malformed_time_falls_back_to_eight() {
    let h = Harness::new(vec![]);
    let s = scheduler(&h, true, "25:61");
    assert_eq!(s.schedule(), ScheduleTime::default());
    assert_eq!(s.schedule().to_string(), "08:00");
}

#[tokio::test]
async fn test_window_fire_time_stays_inside_window() {
    let h = Harness::new(vec![]);
    let s = scheduler(&h, true, "07:10-07:40");
    assert!(s.start().await);

    let status = s.status().await;
    let fire_at = status.fire_at.unwrap();
    assert!(fire_at >= s.schedule().start() && fire_at <= s.schedule().end());
    assert!(s.stop().await);
}

#[tokio::test]
async fn test_only_one_timer_at_a_time() {
    let h = Harness::new(vec![]);
    let s = scheduler(&h, true, "08:00");

    assert!(s.start().await);
    assert!(!s.start().await);
    assert!(s.stop().await);
    assert!(!s.is_running().await);

    // Restartable after stop
    assert!(s.start().await);
    assert!(s.is_running().await);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_trigger_checks_in_order() {
    let offline = Harness::new(vec![]);
    assert_eq!(
        scheduler(&offline, true, "08:00").run_trigger().await.unwrap(),
        TriggerOutcome::NoAccounts
    );

    let groupless = Harness::new(vec![FakeSession::new("10001", &[])]);
    assert_eq!(
        scheduler(&groupless, true, "08:00").run_trigger().await.unwrap(),
        TriggerOutcome::NoAvailableAccounts
    );

    let h = Harness::new(vec![FakeSession::new("10001", &["1", "2"])]);
    let s = scheduler(&h, true, "08:00");
    assert_eq!(s.run_trigger().await.unwrap(), TriggerOutcome::NothingToPush);

    h.notices.create_notice("daily digest", "admin").await.unwrap();
    let outcome = s.run_trigger().await.unwrap();
    assert!(matches!(
        outcome,
        TriggerOutcome::Pushed(PushOutcome::Completed(ref report)) if report.success == 2
    ));
    assert_eq!(h.delivered().len(), 2);

    // Already pushed: the next day's trigger sends nothing
    assert_eq!(s.run_trigger().await.unwrap(), TriggerOutcome::NothingToPush);
    assert_eq!(h.delivered().len(), 2);
}

#[tokio::test]
async fn test_recalled_notice_is_not_pushed() {
    let h = Harness::new(vec![FakeSession::new("10001", &["1"])]);
    let s = scheduler(&h, true, "08:00");

    h.notices.create_notice("withdrawn", "admin").await.unwrap();
    h.notices.recall_notice().await.unwrap();

    assert_eq!(s.run_trigger().await.unwrap(), TriggerOutcome::NothingToPush);
    assert!(h.delivered().is_empty());
}
