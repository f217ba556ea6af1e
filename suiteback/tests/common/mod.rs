// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for suiteback integration tests
//!
//! All tests run against [`MockSuite`], an in-memory remote system. Fixtures build a
//! small mail hierarchy:
//!
//! ```text
//! root-mail (msgfolderroot)
//! ├── fa   "A"
//! │   └── f2  "C"    items m1, m2
//! └── inbox-id "Inbox" (inbox)
//! ```
#![cfg(test)]
#![allow(dead_code)]

use std::collections::HashMap;

use bytes::Bytes;
use suiteback::prelude::*;
use tokio_util::sync::CancellationToken;

pub const TENANT: &str = "tenant";
pub const USER: &str = "user";

/// Json body of a mail message.
pub fn message(subject: &str, sent: &str) -> String {
    serde_json::json!({
        "subject": subject,
        "from": { "address": "sender@example.com" },
        "sentDateTime": sent,
        "receivedDateTime": sent,
    })
    .to_string()
}

pub fn contact(given: &str, surname: &str, email: &str) -> String {
    serde_json::json!({
        "givenName": given,
        "surname": surname,
        "emailAddresses": [{ "address": email }],
    })
    .to_string()
}

pub fn event(subject: &str) -> String {
    serde_json::json!({
        "subject": subject,
        "start": "2026-03-01T09:00:00Z",
        "end": "2026-03-01T10:00:00Z",
    })
    .to_string()
}

/// Mock with the mail hierarchy described in the module docs.
pub fn mail_tree() -> MockSuite {
    let mock = MockSuite::with_roots();
    mock.add_container(Category::Email, "fa", "A", Some("root-mail"));
    mock.add_container(Category::Email, "f2", "C", Some("fa"));
    mock.add_container(Category::Email, "inbox-id", "Inbox", Some("root-mail"));
    mock.add_alias(Category::Email, "inbox", "inbox-id");
    mock.add_item(
        Category::Email,
        "f2",
        "m1",
        &message("first", "2026-01-01T10:00:00Z"),
    );
    mock.add_item(
        Category::Email,
        "f2",
        "m2",
        &message("second", "2026-01-02T10:00:00Z"),
    );
    mock
}

/// Metadata collection as a previous backup would have written it.
pub fn prior_metadata(
    category: Category,
    paths: &[(&str, &str)],
    deltas: &[(&str, &str)],
) -> anyhow::Result<MetadataCollection> {
    let to_map = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    };
    Ok(MetadataCollection::build(
        DataPath::metadata(TENANT, USER, category)?,
        &to_map(paths),
        &to_map(deltas),
    )?)
}

/// Backup params with delta queries enabled, regardless of the environment.
pub fn params() -> BackupParams {
    BackupParams::new(TENANT, USER).options(
        Options::default()
            .disable_delta(false)
            .fail_fast(false),
    )
}

pub struct BackupRun {
    pub collections: Vec<BackupCollection>,
    pub can_use_previous: bool,
    pub counter: Counter,
    pub errs: Bus,
}

impl BackupRun {
    pub fn data(&self, container_id: &str) -> Option<&ItemCollection> {
        self.collections
            .iter()
            .filter_map(BackupCollection::as_data)
            .find(|c| c.container_id == container_id)
    }

    pub fn tombstone(&self, container_id: &str) -> Option<&TombstoneCollection> {
        self.collections
            .iter()
            .filter_map(BackupCollection::as_tombstone)
            .find(|c| c.container_id == container_id)
    }

    pub fn metadata(&self, category: Category) -> Option<&MetadataCollection> {
        self.collections
            .iter()
            .filter_map(BackupCollection::as_metadata)
            .find(|m| m.category() == category)
    }

    /// Stored `previouspath` and `delta` maps for a category.
    pub fn stored_maps(
        &self,
        category: Category,
    ) -> anyhow::Result<(HashMap<String, String>, HashMap<String, String>)> {
        let md = self
            .metadata(category)
            .ok_or_else(|| anyhow::anyhow!("no metadata collection for {category}"))?;
        Ok((
            md.entry_map("previouspath")?.unwrap_or_default(),
            md.entry_map("delta")?.unwrap_or_default(),
        ))
    }

    pub fn metadata_collections(&self) -> Vec<MetadataCollection> {
        self.collections
            .iter()
            .filter_map(BackupCollection::as_metadata)
            .cloned()
            .collect()
    }
}

pub async fn run_backup(
    api: &MockSuite,
    params: &BackupParams,
    scopes: &[Scope],
    metadata: &[MetadataCollection],
) -> anyhow::Result<BackupRun> {
    let counter = Counter::new();
    let errs = Bus::new(params.options.fail_fast);
    let (collections, can_use_previous) = produce_backup_collections(
        api,
        params,
        scopes,
        metadata,
        &counter,
        &errs,
        &CancellationToken::new(),
    )
    .await?;
    Ok(BackupRun {
        collections,
        can_use_previous,
        counter,
        errs,
    })
}

pub fn restore_items(items: &[(&str, &str)]) -> Vec<RestoreItem> {
    items
        .iter()
        .map(|(id, body)| RestoreItem {
            id: id.to_string(),
            body: Bytes::from(body.to_string()),
        })
        .collect()
}

pub fn folder_path(category: Category, folders: &[&str]) -> anyhow::Result<DataPath> {
    let loc = PathBuilder::new().append(folders.iter().copied());
    Ok(DataPath::exchange_folder(TENANT, USER, category, &loc)?)
}
