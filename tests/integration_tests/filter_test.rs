//! List and filter integration tests
//!
//! Global and per-account lists driven through the public services, and the
//! precedence of the four filter stages.

use herald::filter::{
    apply_global_filters, filter_account_groups, GlobalLists, ListAction, ListKind, ListUpdate,
};
use herald::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;

use super::fixtures::{ids, FakeSession, Harness};

#[tokio::test]
async fn test_add_reports_new_and_existing() {
    let h = Harness::new(vec![]);

    let first = h
        .notices
        .update_list(ListKind::Whitelist, ListAction::Add, &ids(&["1", "1", "2"]))
        .await
        .unwrap();
    let ListUpdate::Added(first) = first else {
        panic!("expected an add outcome");
    };
    assert_eq!((first.added, first.already_exist), (2, 0));

    let second = h
        .notices
        .update_list(ListKind::Whitelist, ListAction::Add, &ids(&["1", "1", "2"]))
        .await
        .unwrap();
    let ListUpdate::Added(second) = second else {
        panic!("expected an add outcome");
    };
    assert_eq!((second.added, second.already_exist), (0, 2));
}

#[tokio::test]
async fn test_del_counts_only_present_ids() {
    let h = Harness::new(vec![]);
    h.notices
        .update_list(ListKind::Blacklist, ListAction::Add, &ids(&["10", "20"]))
        .await
        .unwrap();

    let removed = h
        .notices
        .update_list(ListKind::Blacklist, ListAction::Del, &ids(&["10", "30"]))
        .await
        .unwrap();
    assert_eq!(removed, ListUpdate::Removed(1));

    let view = h
        .notices
        .update_list(ListKind::Blacklist, ListAction::View, &[])
        .await
        .unwrap();
    assert_eq!(view, ListUpdate::Members(ids(&["20"])));
}

#[tokio::test]
async fn test_empty_input_is_rejected_without_mutation() {
    let h = Harness::new(vec![]);

    let err = h
        .notices
        .update_list(ListKind::Whitelist, ListAction::Add, &ids(&["", "  "]))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(h.notices.lists().members(ListKind::Whitelist).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_global_blacklist_beats_account_whitelist() {
    let h = Harness::new(vec![FakeSession::new("10001", &["A", "B"])]);

    let mut config = h.registry.get_account_config("10001").await;
    config.whitelist = ids(&["A"]);
    assert!(h.registry.update_account_config("10001", &config).await);
    h.notices
        .update_list(ListKind::Blacklist, ListAction::Add, &ids(&["A"]))
        .await
        .unwrap();

    let pushable = h.registry.get_all_pushable_groups().await;
    assert!(pushable.is_empty(), "A is blacklisted globally, B is not in the account whitelist");
}

#[tokio::test]
async fn test_global_whitelist_restricts_every_account() {
    let h = Harness::new(vec![
        FakeSession::new("10001", &["1", "2"]),
        FakeSession::new("10002", &["2", "3"]),
    ]);
    h.notices
        .update_list(ListKind::Whitelist, ListAction::Add, &ids(&["2"]))
        .await
        .unwrap();

    let pushable = h.registry.get_all_pushable_groups().await;
    assert_eq!(pushable.get("10001"), Some(&ids(&["2"])));
    assert_eq!(pushable.get("10002"), Some(&ids(&["2"])));
}

#[tokio::test]
async fn test_account_rules_and_disabled_accounts() {
    let h = Harness::new(vec![
        FakeSession::new("10001", &["1", "2", "3"]),
        FakeSession::new("10002", &["4"]),
    ]);

    h.registry
        .update_account_list("10001", ListKind::Blacklist, ListAction::Add, &ids(&["2"]))
        .await
        .unwrap();
    let mut config = h.registry.get_account_config("10002").await;
    config.enabled = false;
    assert!(h.registry.update_account_config("10002", &config).await);

    let pushable = h.registry.get_all_pushable_groups().await;
    assert_eq!(pushable.get("10001"), Some(&ids(&["1", "3"])));
    assert!(!pushable.contains_key("10002"));

    let stats = h.registry.get_push_stats().await;
    assert_eq!(stats.total_accounts, 2);
    assert_eq!(stats.enabled_accounts, 1);
    assert_eq!(stats.total_groups, 4);
    assert_eq!(stats.pushable_groups, 2);
}

#[tokio::test]
async fn test_all_group_ids_feeds_list_add() {
    let h = Harness::new(vec![
        FakeSession::new("10001", &["1", "2"]),
        FakeSession::new("10002", &["2", "3"]),
    ]);

    let all = h.registry.all_group_ids().await;
    let unique: HashSet<_> = all.iter().cloned().collect();
    assert_eq!(unique, ["1", "2", "3"].iter().map(|s| s.to_string()).collect());

    let update = h
        .notices
        .update_list(ListKind::Whitelist, ListAction::Add, &all)
        .await
        .unwrap();
    let ListUpdate::Added(outcome) = update else {
        panic!("expected an add outcome");
    };
    assert_eq!(outcome.added, 3);
}

fn group_set() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(0u8..12, 0..8)
        .prop_map(|v| v.into_iter().map(|n| n.to_string()).collect())
}

proptest! {
    #[test]
    fn prop_final_set_respects_every_stage(
        groups in group_set(),
        account_white in group_set(),
        account_black in group_set(),
        global_white in group_set(),
        global_black in group_set(),
    ) {
        let config = AccountConfig {
            whitelist: account_white.clone(),
            blacklist: account_black.clone(),
            ..AccountConfig::default()
        };
        let lists = GlobalLists {
            whitelist: global_white.iter().cloned().collect(),
            blacklist: global_black.iter().cloned().collect(),
        };

        let result = apply_global_filters(&filter_account_groups(&config, &groups), &lists);

        for g in &result {
            prop_assert!(groups.contains(g));
            prop_assert!(!global_black.contains(g));
            prop_assert!(!account_black.contains(g));
            prop_assert!(account_white.is_empty() || account_white.contains(g));
            prop_assert!(global_white.is_empty() || global_white.contains(g));
        }
        for g in &groups {
            let allowed = !global_black.contains(g)
                && !account_black.contains(g)
                && (account_white.is_empty() || account_white.contains(g))
                && (global_white.is_empty() || global_white.contains(g));
            prop_assert_eq!(allowed, result.contains(g));
        }
    }

    #[test]
    fn prop_readding_is_a_noop(raw in group_set()) {
        let h = Harness::new(vec![]);
        let unique: HashSet<_> = raw.iter().cloned().collect();
        prop_assume!(!unique.is_empty());

        let (first, second) = tokio_test::block_on(async {
            let first = h.notices.update_list(ListKind::Whitelist, ListAction::Add, &raw).await.unwrap();
            let second = h.notices.update_list(ListKind::Whitelist, ListAction::Add, &raw).await.unwrap();
            (first, second)
        });

        let (ListUpdate::Added(first), ListUpdate::Added(second)) = (first, second) else {
            panic!("expected add outcomes");
        };
        prop_assert_eq!(first.added, unique.len());
        prop_assert_eq!(second.added, 0);
        prop_assert_eq!(second.already_exist, unique.len());
    }
}
