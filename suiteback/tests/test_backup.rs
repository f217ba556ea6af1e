// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! Backup integration tests
//!
//! Runs [`produce_backup_collections`] against the in-memory [`MockSuite`] and checks
//! the collections, tombstones, and metadata it produces, including the metadata
//! round trip between two consecutive backups.
//!
//! ```bash
//! cargo test -p suiteback --test test_backup
//! ```

mod common;

use std::collections::HashSet;

use anyhow::Result;
use common::*;
use futures::TryStreamExt;
use suiteback::prelude::*;
use tokio_util::sync::CancellationToken;

fn added_ids(coll: &ItemCollection) -> HashSet<String> {
    coll.added.keys().cloned().collect()
}

fn ids(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
#[test_log::test]
async fn test_moved_scope_with_deleted_prior_container() -> Result<()> {
    let mock = mail_tree();
    let prior = prior_metadata(Category::Email, &[("f1", "/A/B")], &[("f1", "tok1")])?;
    let scope = Scope::exact_folders(Category::Email, ["A/C"])?;

    let run = run_backup(&mock, &params(), &[scope], &[prior]).await?;
    assert!(run.can_use_previous);
    assert_eq!(run.collections.len(), 3, "data, tombstone, metadata");

    let f2 = run.data("f2").expect("collection for f2");
    assert_eq!(f2.full_path.to_string(), "tenant/exchange/user/email/A/C");
    assert_eq!(f2.state(), CollectionState::New);
    assert!(f2.do_not_merge_items);
    assert_eq!(added_ids(f2), ids(&["m1", "m2"]));

    let f1 = run.tombstone("f1").expect("tombstone for f1");
    assert_eq!(f1.prev_path.to_string(), "tenant/exchange/user/email/A/B");

    assert!(run.data("fa").is_none(), "A is out of scope");
    assert!(run.data("inbox-id").is_none(), "Inbox is out of scope");

    let (paths, deltas) = run.stored_maps(Category::Email)?;
    assert_eq!(paths.len(), 1);
    assert_eq!(paths.get("f2").map(String::as_str), Some("/A/C"));
    let delta = deltas.get("f2").expect("delta for f2");
    assert!(!delta.is_empty());
    assert_ne!(delta, "tok1");

    assert_eq!(run.counter.get(CountKey::Tombstones), 1);
    assert_eq!(run.counter.get(CountKey::Collections), 3);
    assert!(run.errs.recovered().is_empty());
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_collection_streams_item_bodies() -> Result<()> {
    let mock = mail_tree();
    let run = run_backup(&mock, &params(), &[Scope::all(Category::Email)], &[]).await?;
    let f2 = run.data("f2").expect("collection for f2");

    let errs = Bus::new(false);
    let counter = Counter::new();
    let items: Vec<StreamItem> = f2
        .items(mock.clone(), &errs, &counter, &CancellationToken::new())
        .try_collect()
        .await?;

    let got: Vec<&str> = items.iter().map(StreamItem::id).collect();
    assert_eq!(got, vec!["m1", "m2"]);
    match &items[0] {
        StreamItem::Item { info, .. } => match info {
            ItemInfo::Email { subject, sender, .. } => {
                assert_eq!(subject, "first");
                assert_eq!(sender, "sender@example.com");
            }
            other => panic!("unexpected info {other:?}"),
        },
        other => panic!("unexpected item {other:?}"),
    }
    assert_eq!(counter.get(CountKey::ItemsAdded), 2);
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_incremental_backup_uses_stored_cursor() -> Result<()> {
    let mock = mail_tree();
    let scopes = [Scope::all(Category::Email)];

    let first = run_backup(&mock, &params(), &scopes, &[]).await?;
    assert!(first.data("f2").expect("f2").do_not_merge_items);
    // the mail root never forms a collection
    assert!(first.data("root-mail").is_none());

    mock.add_item(
        Category::Email,
        "f2",
        "m3",
        &message("third", "2026-01-03T10:00:00Z"),
    );
    mock.remove_item(Category::Email, "m1");

    let second = run_backup(&mock, &params(), &scopes, &first.metadata_collections()).await?;
    assert!(second.can_use_previous);
    let f2 = second.data("f2").expect("f2");
    assert!(!f2.do_not_merge_items);
    assert_eq!(added_ids(f2), ids(&["m3"]));
    assert_eq!(f2.removed, vec!["m1".to_string()]);
    assert_eq!(f2.state(), CollectionState::NotMoved);

    let (_, first_deltas) = first.stored_maps(Category::Email)?;
    let (_, second_deltas) = second.stored_maps(Category::Email)?;
    assert_ne!(first_deltas.get("f2"), second_deltas.get("f2"));
    assert_eq!(second.counter.get(CountKey::PrevDeltas), 3);
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_renamed_parent_marks_collection_moved() -> Result<()> {
    let mock = mail_tree();
    let scopes = [Scope::all(Category::Email)];
    let first = run_backup(&mock, &params(), &scopes, &[]).await?;

    mock.rename_container(Category::Email, "fa", "Archive");
    let second = run_backup(&mock, &params(), &scopes, &first.metadata_collections()).await?;

    let f2 = second.data("f2").expect("f2");
    assert_eq!(f2.state(), CollectionState::Moved);
    assert_eq!(
        f2.prev_path.as_ref().map(ToString::to_string).as_deref(),
        Some("tenant/exchange/user/email/A/C")
    );
    assert_eq!(f2.full_path.to_string(), "tenant/exchange/user/email/Archive/C");
    assert!(!f2.do_not_merge_items, "a move keeps the item cursor");

    let (paths, _) = second.stored_maps(Category::Email)?;
    assert_eq!(paths.get("f2").map(String::as_str), Some("/Archive/C"));
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_deleted_container_becomes_tombstone() -> Result<()> {
    let mock = mail_tree();
    let scopes = [Scope::all(Category::Email)];
    let first = run_backup(&mock, &params(), &scopes, &[]).await?;

    mock.delete_container(Category::Email, "f2");
    let second = run_backup(&mock, &params(), &scopes, &first.metadata_collections()).await?;

    assert!(second.data("f2").is_none());
    let tomb = second.tombstone("f2").expect("tombstone");
    assert_eq!(tomb.prev_path.to_string(), "tenant/exchange/user/email/A/C");
    let state = second
        .collections
        .iter()
        .find(|c| c.as_tombstone().is_some())
        .map(BackupCollection::state);
    assert_eq!(state, Some(CollectionState::Deleted));

    let (paths, deltas) = second.stored_maps(Category::Email)?;
    assert!(!paths.contains_key("f2"));
    assert!(!deltas.contains_key("f2"));
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_unusable_cursor_resets_container() -> Result<()> {
    let mock = mail_tree();
    let prior = prior_metadata(Category::Email, &[("f2", "/A/C")], &[("f2", "garbage")])?;
    let run = run_backup(&mock, &params(), &[Scope::all(Category::Email)], &[prior]).await?;

    let f2 = run.data("f2").expect("f2");
    assert!(f2.do_not_merge_items);
    assert_eq!(added_ids(f2), ids(&["m1", "m2"]));
    assert_eq!(f2.state(), CollectionState::NotMoved);
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_bad_prev_path_drops_cursor() -> Result<()> {
    let mock = mail_tree();
    let token = mock
        .delta_token(Category::Email, "f2")
        .expect("token for f2");
    let prior = prior_metadata(Category::Email, &[("f2", "A/C")], &[("f2", &token)])?;
    let run = run_backup(&mock, &params(), &[Scope::all(Category::Email)], &[prior]).await?;

    let f2 = run.data("f2").expect("f2");
    assert!(f2.prev_path.is_none());
    assert!(f2.do_not_merge_items);
    assert_eq!(run.counter.get(CountKey::BadPrevPath), 1);

    let queried = mock.calls().into_iter().any(|c| {
        c == MockCall::ItemDelta {
            category: Category::Email,
            container_id: "f2".to_string(),
            prev_delta: String::new(),
        }
    });
    assert!(queried, "delta query should start over");
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_disable_delta_ignores_cursors() -> Result<()> {
    let mock = mail_tree();
    let scopes = [Scope::all(Category::Email)];
    let first = run_backup(&mock, &params(), &scopes, &[]).await?;

    let params = BackupParams::new(TENANT, USER).options(
        Options::default()
            .disable_delta(true)
            .fail_fast(false),
    );
    let second = run_backup(&mock, &params, &scopes, &first.metadata_collections()).await?;
    let f2 = second.data("f2").expect("f2");
    assert!(f2.do_not_merge_items);
    assert_eq!(added_ids(f2), ids(&["m1", "m2"]));

    let (paths, deltas) = second.stored_maps(Category::Email)?;
    assert!(paths.contains_key("f2"));
    assert!(deltas.is_empty(), "no cursors without delta queries");
    assert_eq!(second.counter.get(CountKey::MissingDelta), 0);
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_malformed_metadata_forces_full_backup() -> Result<()> {
    let mock = mail_tree();
    let bad = MetadataCollection {
        path: DataPath::metadata(TENANT, USER, Category::Email)?,
        entries: vec![MetadataEntry {
            file_name: "previouspath".to_string(),
            data: bytes::Bytes::from_static(b"not json"),
        }],
    };
    let run = run_backup(&mock, &params(), &[Scope::all(Category::Email)], &[bad]).await?;

    assert!(!run.can_use_previous);
    let f2 = run.data("f2").expect("f2");
    assert!(f2.do_not_merge_items);
    assert!(f2.prev_path.is_none());
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_duplicate_metadata_is_an_error() -> Result<()> {
    let mock = mail_tree();
    let a = prior_metadata(Category::Email, &[("f2", "/A/C")], &[])?;
    let b = prior_metadata(Category::Email, &[("f2", "/A/C")], &[])?;
    let res = run_backup(&mock, &params(), &[Scope::all(Category::Email)], &[a, b]).await;
    assert!(res.is_err());
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_container_deleted_during_delta_query() -> Result<()> {
    let mock = mail_tree();
    mock.fail_delta(Category::Email, "f2", SyncError::not_found("container", "f2"));
    let token = mock.delta_token(Category::Email, "f2").expect("token");
    let prior = prior_metadata(Category::Email, &[("f2", "/A/C")], &[("f2", &token)])?;

    let run = run_backup(&mock, &params(), &[Scope::all(Category::Email)], &[prior]).await?;
    let f2 = run.data("f2").expect("reset collection for f2");
    assert!(f2.do_not_merge_items);
    assert!(f2.added.is_empty());

    let (paths, deltas) = run.stored_maps(Category::Email)?;
    assert!(paths.contains_key("f2"));
    assert!(!deltas.contains_key("f2"));
    assert!(run.errs.recovered().is_empty());
    assert_eq!(run.counter.get(CountKey::MissingDelta), 0);
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_delta_failure_skips_container() -> Result<()> {
    let mock = mail_tree();
    mock.fail_delta(
        Category::Email,
        "f2",
        SyncError::Api {
            code: 503,
            operation: "delta".to_string(),
            message: "unavailable".to_string(),
        },
    );
    let prior = prior_metadata(Category::Email, &[("f2", "/A/C")], &[])?;

    let run = run_backup(&mock, &params(), &[Scope::all(Category::Email)], &[prior]).await?;
    assert!(run.data("f2").is_none());
    assert!(run.tombstone("f2").is_none(), "a live container is never tombstoned");
    assert!(run.data("fa").is_some(), "other containers still run");
    assert!(run.errs.has_label(Label::ForceNoBackupCreation));
    assert_eq!(run.errs.recovered().len(), 1);
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_fail_fast_stops_on_first_error() -> Result<()> {
    let mock = mail_tree();
    mock.fail_delta(Category::Email, "f2", SyncError::validation("boom"));
    let params = BackupParams::new(TENANT, USER).options(
        Options::default()
            .disable_delta(false)
            .fail_fast(true),
    );
    let res = run_backup(&mock, &params, &[Scope::all(Category::Email)], &[]).await;
    assert!(res.is_err());
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_preview_limits() -> Result<()> {
    let mock = MockSuite::with_roots();
    for (id, name, alias) in [
        ("f-inbox", "Inbox", Some("inbox")),
        ("f-deleted", "Deleted Items", Some("deleteditems")),
        ("f-junk", "Junk Email", Some("junkemail")),
        ("f-x", "X", None),
        ("f-y", "Y", None),
    ] {
        mock.add_container(Category::Email, id, name, Some("root-mail"));
        if let Some(alias) = alias {
            mock.add_alias(Category::Email, alias, id);
        }
        for n in 0..5 {
            mock.add_item(
                Category::Email,
                id,
                &format!("{id}-{n}"),
                &message(&format!("{name} {n}"), "2026-01-01T00:00:00Z"),
            );
        }
    }

    let limits = PreviewLimits {
        max_containers: 2,
        max_items_per_container: 3,
        max_items: 5,
    };
    let params = BackupParams::new(TENANT, USER).options(
        Options::default()
            .disable_delta(false)
            .fail_fast(false)
            .preview(limits),
    );
    let run = run_backup(&mock, &params, &[Scope::all(Category::Email)], &[]).await?;

    let inbox = run.data("f-inbox").expect("inbox is ranked first");
    assert_eq!(added_ids(inbox), ids(&["f-inbox-0", "f-inbox-1", "f-inbox-2"]));
    let x = run.data("f-x").expect("second container");
    assert_eq!(added_ids(x), ids(&["f-x-0", "f-x-1"]));
    assert!(run.data("f-y").is_none(), "container limit reached");
    assert!(run.data("f-deleted").is_none(), "excluded from previews");
    assert!(run.data("f-junk").is_none(), "excluded from previews");
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_zero_preview_limits_use_defaults() -> Result<()> {
    let mock = MockSuite::with_roots();
    mock.add_container(Category::Email, "f-big", "Big", Some("root-mail"));
    for n in 0..40 {
        mock.add_item(
            Category::Email,
            "f-big",
            &format!("big-{n:02}"),
            &message(&format!("big {n}"), "2026-01-01T00:00:00Z"),
        );
    }

    let limits = PreviewLimits {
        max_containers: 0,
        max_items_per_container: 0,
        max_items: 5,
    };
    let params = BackupParams::new(TENANT, USER).options(
        Options::default()
            .disable_delta(false)
            .fail_fast(false)
            .preview(limits),
    );
    let run = run_backup(&mock, &params, &[Scope::all(Category::Email)], &[]).await?;

    let big = run.data("f-big").expect("zero container limit means the default");
    assert_eq!(big.added.len(), 5);
    assert!(mock.calls().iter().any(|call| matches!(
        call,
        MockCall::ItemDelta { container_id, .. } if container_id == "f-big"
    )));
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_contacts_root_forms_collection() -> Result<()> {
    let mock = MockSuite::with_roots();
    mock.add_item(
        Category::Contacts,
        "root-contacts",
        "c1",
        &contact("Ada", "Lovelace", "ada@example.com"),
    );
    mock.add_container(Category::Contacts, "friends", "Friends", Some("root-contacts"));

    let run = run_backup(&mock, &params(), &[Scope::all(Category::Contacts)], &[]).await?;
    let root = run.data("root-contacts").expect("root collection");
    assert_eq!(root.full_path.to_string(), "tenant/exchange/user/contacts/Contacts");
    assert_eq!(added_ids(root), ids(&["c1"]));
    let friends = run.data("friends").expect("friends");
    assert_eq!(friends.location.to_string(), "Friends");
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_failed_category_does_not_stop_others() -> Result<()> {
    let mock = MockSuite::new();
    mock.add_container(Category::Email, "root-mail", "Top", None);
    mock.add_alias(Category::Email, "msgfolderroot", "root-mail");
    mock.add_container(Category::Email, "fa", "A", Some("root-mail"));

    let scopes = [Scope::all(Category::Email), Scope::all(Category::Contacts)];
    let run = run_backup(&mock, &params(), &scopes, &[]).await?;

    assert!(run.data("fa").is_some());
    assert!(run.metadata(Category::Email).is_some());
    assert!(run.metadata(Category::Contacts).is_none());
    assert!(run.errs.has_label(Label::ForceNoBackupCreation));
    assert_eq!(run.errs.recovered().len(), 1);
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_one_scope_per_category() -> Result<()> {
    let mock = mail_tree();
    let scopes = [
        Scope::all(Category::Email),
        Scope::folders(Category::Email, ["A"])?,
    ];
    let Err(err) = run_backup(&mock, &params(), &scopes, &[]).await else {
        panic!("duplicate scopes should fail");
    };
    assert!(err.to_string().contains("more than one scope"));
    Ok(())
}

#[tokio::test]
#[test_log::test]
async fn test_cancelled_backup() -> Result<()> {
    let mock = mail_tree();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let res = produce_backup_collections(
        &mock,
        &params(),
        &[Scope::all(Category::Email)],
        &[],
        &Counter::new(),
        &Bus::new(false),
        &cancel,
    )
    .await;
    assert!(matches!(res, Err(SyncError::Cancelled)));
    Ok(())
}
