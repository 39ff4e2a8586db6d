//! Notice lifecycle integration tests
//!
//! Publishing, editing, recalling and paging through history against the
//! in-memory store.

use herald::notice::{is_notice_id, NoticeStatus, HISTORY_LIMIT};
use herald::store::KvStore;
use std::collections::HashSet;

use super::fixtures::Harness;

#[tokio::test]
async fn test_publish_installs_current_notice() {
    let h = Harness::new(vec![]);

    let notice = h.notices.create_notice("Server maintenance at 22:00", "admin").await.unwrap();
    assert!(is_notice_id(&notice.id));
    assert_eq!(notice.status, NoticeStatus::Current);
    assert!(!notice.pushed);

    let current = h.notices.get_current_notice().await.unwrap().unwrap();
    assert_eq!(current.id, notice.id);
    assert_eq!(current.content, "Server maintenance at 22:00");
    assert_eq!(current.creator, "admin");
    assert!(h.notices.get_history(1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_publish_archives_first() {
    let h = Harness::new(vec![]);

    let first = h.notices.create_notice("first", "admin").await.unwrap();
    let second = h.notices.create_notice("second", "admin").await.unwrap();

    let current = h.notices.get_current_notice().await.unwrap().unwrap();
    assert_eq!(current.id, second.id);

    let archived = h.notices.get_notice(&first.id).await.unwrap().unwrap();
    assert_eq!(archived.status, NoticeStatus::Archived);

    let history = h.notices.get_history(1, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, first.id);
}

#[tokio::test]
async fn test_edit_keeps_identity() {
    let h = Harness::new(vec![]);

    assert!(!h.notices.edit_notice("nothing yet").await.unwrap());

    let notice = h.notices.create_notice("draft", "admin").await.unwrap();
    assert!(h.notices.edit_notice("final text").await.unwrap());

    let current = h.notices.get_current_notice().await.unwrap().unwrap();
    assert_eq!(current.id, notice.id);
    assert_eq!(current.content, "final text");
    assert_eq!(current.timestamp, notice.timestamp);
}

#[tokio::test]
async fn test_recall_clears_current() {
    let h = Harness::new(vec![]);

    let notice = h.notices.create_notice("oops", "admin").await.unwrap();
    assert!(h.notices.recall_notice().await.unwrap());

    assert!(h.notices.get_current_notice().await.unwrap().is_none());
    let recalled = h.notices.get_notice(&notice.id).await.unwrap().unwrap();
    assert_eq!(recalled.status, NoticeStatus::Recalled);

    let history = h.notices.get_history(1, 10).await.unwrap();
    assert_eq!(history[0].id, notice.id);

    assert!(!h.notices.recall_notice().await.unwrap());
    assert!(!h.notices.edit_notice("too late").await.unwrap());
}

#[tokio::test]
async fn test_history_is_bounded() {
    let h = Harness::new(vec![]);

    let mut created = Vec::new();
    for i in 0..55 {
        created.push(h.notices.create_notice(&format!("notice {i}"), "admin").await.unwrap());
    }

    let history_ids = h.store.lrange("notice:history", 0, -1).await.unwrap();
    assert!(history_ids.len() <= HISTORY_LIMIT);

    // Oldest records fell out of the window and were deleted
    assert!(h.notices.get_notice(&created[0].id).await.unwrap().is_none());
    assert!(h.notices.get_notice(&created[53].id).await.unwrap().is_some());

    let mut cursor = h.notices.history_pages(20);
    let mut seen = Vec::new();
    while let Some(page) = cursor.next_page().await.unwrap() {
        assert!(page.len() <= 20);
        seen.extend(page);
    }
    assert!(seen.len() <= HISTORY_LIMIT);
    assert_eq!(seen[0].id, created[53].id);

    // The installed notice is the only current one
    assert!(seen.iter().all(|n| n.status != NoticeStatus::Current));
    assert!(h.notices.get_current_notice().await.unwrap().is_some());

    let unique: HashSet<_> = seen.iter().map(|n| n.id.clone()).collect();
    assert_eq!(unique.len(), seen.len());

    cursor.reset();
    let first_page = cursor.next_page().await.unwrap().unwrap();
    assert_eq!(first_page[0].id, created[53].id);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let h = Harness::new(vec![]);
    for i in 0..3 {
        h.notices.create_notice(&format!("n{i}"), "admin").await.unwrap();
    }
    assert_eq!(h.notices.cleanup_expired().await.unwrap(), 0);
    assert_eq!(h.notices.get_history(1, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_publish_edit_recall_scenario() {
    let h = Harness::new(vec![]);

    let created = h.notices.create_notice("Test A", "admin").await.unwrap();
    let current = h.notices.get_current_notice().await.unwrap().unwrap();
    assert_eq!(current.content, "Test A");
    assert_eq!(current.status, NoticeStatus::Current);
    assert!(!current.pushed);

    assert!(h.notices.edit_notice("Test B").await.unwrap());
    let edited = h.notices.get_current_notice().await.unwrap().unwrap();
    assert_eq!(edited.content, "Test B");
    assert_eq!(edited.status, NoticeStatus::Current);
    assert_eq!(edited.timestamp, created.timestamp);

    assert!(h.notices.recall_notice().await.unwrap());
    assert!(h.notices.get_current_notice().await.unwrap().is_none());

    let history = h.notices.get_history(1, 100).await.unwrap();
    let recalled = history.iter().find(|n| n.id == created.id).unwrap();
    assert_eq!(recalled.status, NoticeStatus::Recalled);
}

#[tokio::test]
async fn test_history_page_after_55_notices() {
    let h = Harness::new(vec![]);
    let mut last = None;
    for i in 0..55 {
        last = Some(h.notices.create_notice(&format!("n{i}"), "admin").await.unwrap());
    }
    // Archive the last one too
    h.notices.recall_notice().await.unwrap();

    let history = h.notices.get_history(1, 100).await.unwrap();
    assert_eq!(history.len(), HISTORY_LIMIT);
    assert_eq!(history[0].id, last.unwrap().id);
    let created: Vec<i64> = history.iter().map(|n| n.created).collect();
    let mut sorted = created.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(created, sorted, "history is most recent first");
}
