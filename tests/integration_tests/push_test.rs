//! Push orchestration integration tests
//!
//! End-to-end broadcast runs over fake accounts. Timing tests run on the
//! paused tokio clock, so the jittered delays cost no real time.

use chrono::Local;
use herald::notice::PushJobStatus;
use herald::push::{ChannelReporter, LogReporter, PushEvent, PushMode, PushOutcome, MESSAGE_HEADER};
use std::sync::Arc;
use std::time::Duration;

use super::fixtures::{ids, FakeSession, Harness};

fn completed(outcome: PushOutcome) -> herald::PushReport {
    match outcome {
        PushOutcome::Completed(report) => report,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_sent_counter_matches_target_count() {
    let h = Harness::new(vec![
        FakeSession::new("10001", &["1", "2", "3"]),
        FakeSession::new("10002", &["4", "5"]),
    ]);
    h.notices.create_notice("hello", "admin").await.unwrap();

    let report = completed(h.orchestrator.push(PushMode::Interactive, &LogReporter).await.unwrap());
    assert_eq!(report.total, 5);
    assert_eq!(report.success, 5);
    assert_eq!(report.failed, 0);

    let job = h.notices.get_push_progress(&report.job_id).await.unwrap().unwrap();
    assert_eq!(job.sent, 5);
    assert_eq!(job.total, 5);
    assert_eq!(job.status, PushJobStatus::Finished);

    let mut delivered = h.delivered();
    delivered.sort();
    assert_eq!(
        delivered,
        ids(&["10001:1", "10001:2", "10001:3", "10002:4", "10002:5"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_counted_and_run_completes() {
    let h = Harness::new(vec![
        FakeSession::new("10001", &["1", "2", "3"]).failing_on(&["2"]),
    ]);
    h.notices.create_notice("hello", "admin").await.unwrap();

    let report = completed(h.orchestrator.push(PushMode::Interactive, &LogReporter).await.unwrap());
    assert_eq!(report.success, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_targets, ids(&["10001:2"]));
    assert_eq!(h.delivered(), ids(&["10001:1", "10001:3"]));

    let job = h.notices.get_push_progress(&report.job_id).await.unwrap().unwrap();
    assert_eq!(job.sent, 3, "failed attempts still advance the counter");

    let text = report.to_string();
    assert!(text.contains("Failed groups: 10001:2"));
}

#[tokio::test(start_paused = true)]
async fn test_message_is_framed_and_notice_marked_pushed() {
    let h = Harness::new(vec![FakeSession::new("10001", &["1"])]);
    let notice = h.notices.create_notice("Line one", "admin").await.unwrap();

    h.orchestrator.push(PushMode::Interactive, &LogReporter).await.unwrap();

    let sent = h.sessions[0].sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].message.starts_with(MESSAGE_HEADER));
    assert!(sent[0].message.contains("Line one"));
    assert!(sent[0].message.ends_with(&notice.timestamp));

    let stored = h.notices.get_notice(&notice.id).await.unwrap().unwrap();
    assert!(stored.pushed);

    let config = h.registry.get_account_config("10001").await;
    assert!(config.last_push_time > 0);

    let stats = h
        .notices
        .get_push_stats_record(Local::now().date_naive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.failed_count, 0);
    assert_eq!(stats.total_accounts, 1);
}

#[tokio::test]
async fn test_no_current_notice_creates_no_job() {
    let h = Harness::new(vec![FakeSession::new("10001", &["1"])]);

    let outcome = h.orchestrator.push(PushMode::Interactive, &LogReporter).await.unwrap();
    assert_eq!(outcome, PushOutcome::NothingToPush);
    assert!(h.delivered().is_empty());
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_no_targets_creates_no_job() {
    let h = Harness::new(vec![FakeSession::new("10001", &["1", "2"])]);
    h.notices.create_notice("hello", "admin").await.unwrap();
    h.registry.set_all_enabled(false).await;

    let outcome = h.orchestrator.push(PushMode::Interactive, &LogReporter).await.unwrap();
    assert_eq!(outcome, PushOutcome::NoTargets);
    assert!(h.delivered().is_empty());

    let keys_before = h.store.len().await;
    h.notices
        .update_list(
            herald::filter::ListKind::Blacklist,
            herald::filter::ListAction::Add,
            &ids(&["1", "2"]),
        )
        .await
        .unwrap();
    h.registry.set_all_enabled(true).await;
    let outcome = h.orchestrator.push(PushMode::Interactive, &LogReporter).await.unwrap();
    assert_eq!(outcome, PushOutcome::NoTargets);
    // only the blacklist set was added; no progress hash
    assert_eq!(h.store.len().await, keys_before + 1);

    let current = h.notices.get_current_notice().await.unwrap().unwrap();
    assert!(!current.pushed);
}

#[tokio::test(start_paused = true)]
async fn test_three_deliveries_pace_within_jitter_window() {
    let h = Harness::with_defaults(
        vec![FakeSession::new("10001", &["1", "2", "3"])],
        Harness::defaults_with_interval(1000),
    );
    h.notices.create_notice("hello", "admin").await.unwrap();

    let started = tokio::time::Instant::now();
    completed(h.orchestrator.push(PushMode::Unattended, &LogReporter).await.unwrap());
    let elapsed = started.elapsed();

    assert!(
        elapsed >= Duration::from_millis(1600) && elapsed <= Duration::from_millis(2400),
        "elapsed {elapsed:?} outside two jittered 1000 ms delays"
    );

    let sent = h.sessions[0].sent();
    for pair in sent.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= Duration::from_millis(800) && gap <= Duration::from_millis(1200));
    }
}

#[tokio::test(start_paused = true)]
async fn test_interactive_run_reports_progress() {
    let groups: Vec<String> = (1..=25).map(|n| n.to_string()).collect();
    let group_refs: Vec<&str> = groups.iter().map(String::as_str).collect();
    let h = Harness::with_defaults(
        vec![FakeSession::new("10001", &group_refs)],
        Harness::defaults_with_interval(500),
    );
    h.notices.create_notice("hello", "admin").await.unwrap();

    let (reporter, mut events) = ChannelReporter::new();
    completed(h.orchestrator.push(PushMode::Interactive, &reporter).await.unwrap());
    drop(reporter);

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }

    assert!(matches!(
        received.first(),
        Some(PushEvent::Started { account_count: 1, total_groups: 25, .. })
    ));
    let progress: Vec<u64> = received
        .iter()
        .filter_map(|e| match e {
            PushEvent::Progress { sent, .. } => Some(*sent),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![10, 20]);
    assert!(matches!(received.last(), Some(PushEvent::Finished(_))));
}

#[tokio::test(start_paused = true)]
async fn test_unattended_run_reports_no_progress() {
    let groups: Vec<String> = (1..=25).map(|n| n.to_string()).collect();
    let group_refs: Vec<&str> = groups.iter().map(String::as_str).collect();
    let h = Harness::with_defaults(
        vec![FakeSession::new("10001", &group_refs)],
        Harness::defaults_with_interval(500),
    );
    h.notices.create_notice("hello", "admin").await.unwrap();

    let (reporter, mut events) = ChannelReporter::new();
    completed(h.orchestrator.push(PushMode::Unattended, &reporter).await.unwrap());
    drop(reporter);

    while let Some(event) = events.recv().await {
        assert!(!matches!(event, PushEvent::Progress { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_run_while_in_flight_is_refused() {
    let h = Harness::with_defaults(
        vec![FakeSession::new("10001", &["1", "2", "3"])],
        Harness::defaults_with_interval(1000),
    );
    h.notices.create_notice("hello", "admin").await.unwrap();

    let orchestrator = Arc::clone(&h.orchestrator);
    let first = tokio::spawn(async move {
        orchestrator.push(PushMode::Unattended, &LogReporter).await
    });

    // Let the first run reach its first delay
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.orchestrator.is_running());

    let second = h.orchestrator.push(PushMode::Interactive, &LogReporter).await.unwrap();
    assert_eq!(second, PushOutcome::AlreadyRunning);

    let report = completed(first.await.unwrap().unwrap());
    assert_eq!(report.success, 3);
    assert_eq!(h.delivered().len(), 3);
    assert!(!h.orchestrator.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_group_left_mid_run_fails_that_target_only() {
    let h = Harness::with_defaults(
        vec![FakeSession::new("10001", &["1", "2", "3"])],
        Harness::defaults_with_interval(1000),
    );
    h.notices.create_notice("hello", "admin").await.unwrap();

    let orchestrator = Arc::clone(&h.orchestrator);
    let run = tokio::spawn(async move {
        orchestrator.push(PushMode::Unattended, &LogReporter).await
    });

    // After the first delivery, before the last
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.sessions[0].leave("3");

    let report = completed(run.await.unwrap().unwrap());
    assert_eq!(report.total, 3);
    assert_eq!(report.success, 2);
    assert_eq!(report.failed_targets, ids(&["10001:3"]));
    assert_eq!(h.delivered(), ids(&["10001:1", "10001:2"]));

    let job = h.notices.get_push_progress(&report.job_id).await.unwrap().unwrap();
    assert_eq!(job.sent, 3);
    assert_eq!(job.status, PushJobStatus::Finished);
}

#[tokio::test(start_paused = true)]
async fn test_account_logged_out_mid_run_fails_its_targets() {
    let h = Harness::new(vec![
        FakeSession::new("10001", &["1", "2", "3", "4", "5"]),
        FakeSession::new("10002", &["6", "7"]),
        FakeSession::without_groups("10003"),
    ]);
    h.notices.create_notice("hello", "admin").await.unwrap();

    let orchestrator = Arc::clone(&h.orchestrator);
    let run = tokio::spawn(async move {
        orchestrator.push(PushMode::Unattended, &LogReporter).await
    });

    // Four 2000 ms delays outlast the cached account list
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.directory.logout("10002");

    let report = completed(run.await.unwrap().unwrap());
    assert_eq!(report.total, 7);
    assert_eq!(report.success, 5);
    assert_eq!(report.failed_targets, ids(&["10002:6", "10002:7"]));
    assert_eq!(report.accounts.len(), 2);
    assert!(h.sessions[1].sent().is_empty());

    let job = h.notices.get_push_progress(&report.job_id).await.unwrap().unwrap();
    assert_eq!(job.sent, 7);
    assert_eq!(job.total, 7);
}

#[tokio::test(start_paused = true)]
async fn test_completed_run_shows_in_metrics_text() {
    herald::metrics::init_metrics().unwrap();
    assert!(herald::metrics::metrics_initialized());

    let h = Harness::new(vec![FakeSession::new("10001", &["1"])]);
    h.notices.create_notice("hello", "admin").await.unwrap();
    completed(h.orchestrator.push(PushMode::Interactive, &LogReporter).await.unwrap());

    let text = herald::metrics::encode_metrics().unwrap();
    assert!(text.contains("herald_push_runs_total"));
    assert!(text.contains("herald_push_deliveries_total"));
    assert!(text.contains("herald_push_run_duration_seconds"));
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_is_rejected_and_pacing_kept() {
    let h = Harness::with_defaults(
        vec![FakeSession::new("10001", &["1", "2", "3"])],
        Harness::defaults_with_interval(1000),
    );
    h.notices.create_notice("hello", "admin").await.unwrap();

    let mut config = h.registry.get_account_config("10001").await;
    config.push_interval_ms = 0;
    assert!(!h.registry.update_account_config("10001", &config).await);

    let started = tokio::time::Instant::now();
    completed(h.orchestrator.push(PushMode::Unattended, &LogReporter).await.unwrap());
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(1600) && elapsed <= Duration::from_millis(2400),
        "elapsed {elapsed:?}"
    );
}
