// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! Details records: one entry per backed up or restored item, for reporting.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    error::SyncError,
    models::ItemInfo,
    path::{DataPath, PathBuilder},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsEntry {
    /// Item path in the backup data layer.
    pub repo_ref: String,
    /// Short hash of `repo_ref`.
    pub short_ref: String,
    /// Folder the item lives in, by display name.
    pub location_ref: String,
    /// Id of the item in the remote system.
    pub item_ref: String,
    pub info: ItemInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Details {
    entries: Vec<DetailsEntry>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl Details {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. `repo_ref` must be an item path and must not already be recorded.
    pub fn add(
        &mut self,
        repo_ref: &DataPath,
        location_ref: &PathBuilder,
        item_ref: &str,
        info: ItemInfo,
    ) -> Result<()> {
        if repo_ref.item().is_none() {
            return Err(SyncError::validation(format!(
                "details entry {repo_ref} is not an item path"
            )));
        }
        let key = repo_ref.to_string();
        if !self.seen.insert(key.clone()) {
            return Err(SyncError::already_exists("details entry", key));
        }
        self.entries.push(DetailsEntry {
            short_ref: repo_ref.short_ref(),
            repo_ref: key,
            location_ref: location_ref.to_string(),
            item_ref: item_ref.to_string(),
            info,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[DetailsEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of all entries, in bytes.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|entry| entry.info.size()).sum()
    }
}
