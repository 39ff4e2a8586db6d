//! Webhook transport integration tests
//!
//! Drives `WebhookDirectory` against a wiremock server, alone and as the
//! directory behind a full push run.

use herald::account::{AccountDirectory, AccountRegistry, DeliveryError, WebhookDirectory};
use herald::config::{AccountDefaults, DirectoryAccount, DirectoryConfig};
use herald::notice::NoticeStore;
use herald::push::{LogReporter, PushMode, PushOrchestrator, PushOutcome};
use herald::store::{Keys, MemoryStore};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn account(uin: &str, url: String, groups: &[&str]) -> DirectoryAccount {
    DirectoryAccount {
        uin: uin.to_string(),
        nickname: format!("relay-{uin}"),
        groups: groups.iter().map(|g| g.to_string()).collect(),
        webhook_url: url,
        token: None,
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn test_delivery_posts_payload_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/relay"))
        .and(header("authorization", "Bearer s3cret"))
        .and(body_partial_json(json!({
            "uin": "10001",
            "group_id": "777",
            "message": "hello"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut relay = account("10001", format!("{}/relay", server.uri()), &["777"]);
    relay.token = Some("s3cret".into());
    let directory = WebhookDirectory::new(&DirectoryConfig {
        accounts: vec![relay],
    })
    .unwrap();

    let sessions = directory.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    sessions[0].send_group_message("777", "hello").await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_a_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&server)
        .await;

    let directory = WebhookDirectory::new(&DirectoryConfig {
        accounts: vec![account("10001", server.uri(), &["777"])],
    })
    .unwrap();
    let sessions = directory.sessions().await.unwrap();

    let err = sessions[0].send_group_message("777", "hello").await.unwrap_err();
    match err {
        DeliveryError::Rejected { reason } => {
            assert!(reason.contains("503"));
            assert!(reason.contains("busy"));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_push_through_webhooks_attempts_each_group_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "group_id": "2" })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let directory = Arc::new(
        WebhookDirectory::new(&DirectoryConfig {
            accounts: vec![account("10001", server.uri(), &["1", "2", "3"])],
        })
        .unwrap(),
    );
    let notices = Arc::new(NoticeStore::new(
        Arc::new(MemoryStore::new()),
        Keys::default(),
    ));
    let registry = Arc::new(AccountRegistry::new(
        directory,
        Arc::clone(&notices),
        AccountDefaults {
            default_push_interval_ms: 500,
            ..AccountDefaults::default()
        },
    ));
    let orchestrator = PushOrchestrator::new(registry, Arc::clone(&notices));
    notices.create_notice("hello", "admin").await.unwrap();

    let outcome = orchestrator.push(PushMode::Unattended, &LogReporter).await.unwrap();
    let PushOutcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(report.total, 3);
    assert_eq!(report.success, 2);
    assert_eq!(report.failed_targets, vec!["10001:2".to_string()]);
}
