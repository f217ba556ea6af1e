// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # Backup metadata
//!
//! Each backup writes one metadata collection per category with two entries:
//!
//! - `previouspath`: json object, container id → folder path string (`/A/B`)
//! - `delta`: json object, container id → delta cursor
//!
//! The next backup reads them back with [`parse_metadata_collections`].

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use strum::IntoEnumIterator;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    Result,
    config::{DELTA_URLS_FILE_NAME, PREVIOUS_PATH_FILE_NAME},
    error::{SerializationSnafu, SyncError, deserialization_error},
    path::{Category, DataPath},
};

/// Stored state for one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaPath {
    #[serde(default)]
    pub delta: String,
    #[serde(default)]
    pub path: String,
}

/// Container id → stored state.
pub type DeltaPaths = HashMap<String, DeltaPath>;

/// Category → stored state.
pub type CatDeltaPaths = HashMap<Category, DeltaPaths>;

/// A `CatDeltaPaths` with an empty map for every category.
pub fn empty_cat_delta_paths() -> CatDeltaPaths {
    Category::iter().map(|cat| (cat, DeltaPaths::new())).collect()
}

/// One named blob in a metadata collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub file_name: String,
    pub data: Bytes,
}

impl MetadataEntry {
    /// Serializes `map` as a json object.
    pub fn new(file_name: &str, map: &HashMap<String, String>) -> Result<Self> {
        // sorted keys keep the output stable
        let sorted: BTreeMap<&String, &String> = map.iter().collect();
        let data = serde_json::to_vec(&sorted).context(SerializationSnafu)?;
        Ok(MetadataEntry {
            file_name: file_name.to_string(),
            data: Bytes::from(data),
        })
    }
}

/// Metadata collection for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCollection {
    pub path: DataPath,
    pub entries: Vec<MetadataEntry>,
}

impl MetadataCollection {
    /// Builds the collection from the current paths and delta cursors of a run.
    pub fn build(
        path: DataPath,
        curr_paths: &HashMap<String, String>,
        delta_urls: &HashMap<String, String>,
    ) -> Result<Self> {
        Ok(MetadataCollection {
            path,
            entries: vec![
                MetadataEntry::new(PREVIOUS_PATH_FILE_NAME, curr_paths)?,
                MetadataEntry::new(DELTA_URLS_FILE_NAME, delta_urls)?,
            ],
        })
    }

    pub fn category(&self) -> Category {
        self.path.category()
    }

    /// Decodes the entry named `file_name`.
    pub fn entry_map(&self, file_name: &str) -> Result<Option<HashMap<String, String>>> {
        let Some(entry) = self.entries.iter().find(|entry| entry.file_name == file_name) else {
            return Ok(None);
        };
        decode_map(file_name, &entry.data).map(Some)
    }
}

fn decode_map(what: &str, data: &[u8]) -> Result<HashMap<String, String>> {
    let mut de = serde_json::Deserializer::from_slice(data);
    serde_path_to_error::deserialize(&mut de).map_err(|err| deserialization_error(what, &err))
}

/// Reads previous-backup metadata.
///
/// Returns the stored state and whether it can be used. A malformed entry makes the
/// whole previous state unusable: the result is empty and the flag is false, so the
/// next backup is a full one. Two copies of the same map for one category is an
/// error. Containers with a delta cursor but no path are dropped.
pub fn parse_metadata_collections(
    colls: &[MetadataCollection],
    cancel: &CancellationToken,
) -> Result<(CatDeltaPaths, bool)> {
    let mut cdp = empty_cat_delta_paths();
    let mut found: HashMap<Category, Vec<&'static str>> = HashMap::new();

    for coll in colls {
        let category = coll.category();
        for entry in &coll.entries {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let kind = match entry.file_name.as_str() {
                PREVIOUS_PATH_FILE_NAME => PREVIOUS_PATH_FILE_NAME,
                DELTA_URLS_FILE_NAME => DELTA_URLS_FILE_NAME,
                other => {
                    info!(category = %category, file_name = %other, "ignoring unknown metadata entry");
                    continue;
                }
            };

            let seen = found.entry(category).or_default();
            if seen.contains(&kind) {
                return Err(SyncError::Metadata {
                    category,
                    message: format!("multiple versions of {kind} metadata"),
                });
            }
            seen.push(kind);

            let map = match decode_map(kind, &entry.data) {
                Ok(map) => map,
                Err(err) => {
                    warn!(category = %category, error = %err, "decoding metadata, previous backup will not be used");
                    return Ok((empty_cat_delta_paths(), false));
                }
            };

            let dps = cdp.entry(category).or_default();
            for (id, value) in map {
                let dp = dps.entry(id).or_default();
                if kind == PREVIOUS_PATH_FILE_NAME {
                    dp.path = value;
                } else {
                    dp.delta = value;
                }
            }
        }
    }

    for dps in cdp.values_mut() {
        dps.retain(|_, dp| !dp.path.is_empty());
    }

    Ok((cdp, true))
}
