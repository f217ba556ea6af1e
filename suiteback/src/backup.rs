// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # Backup
//!
//! Turns the live container hierarchy plus the previous backup's metadata into
//! backup collections.
//!
//! For each scope (one per category):
//!
//! 1. load and resolve the category's containers ([`ContainerResolver::populate`])
//! 2. for every container in scope, query item changes since the stored delta cursor
//!    and build an [`ItemCollection`]
//! 3. emit a tombstone for every container in the previous metadata that is no longer
//!    present
//! 4. emit a metadata collection with the current paths and new delta cursors
//!
//! Container failures are recorded on the [`Bus`] and the container is skipped. A
//! container deleted while its items are queried is reset, so the next backup starts
//! over for it.

use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    Result,
    api::{AddedAndRemoved, CallConfig, DeltaUpdate, SuiteApi},
    collection::{BackupCollection, ItemCollection, TombstoneCollection},
    config::METADATA_COLLECTION_KEY,
    control::{Options, PreviewLimits},
    count::{CountKey, Counter},
    error::SyncError,
    fault::{Bus, Label},
    handlers::CategoryHandler,
    metadata::{DeltaPaths, MetadataCollection, parse_metadata_collections},
    path::{Category, DataPath, PathBuilder},
    resolver::ContainerResolver,
    selectors::Scope,
};

/// Who is being backed up, and how.
#[derive(Debug, Clone)]
pub struct BackupParams {
    pub tenant_id: String,
    pub user_id: String,
    pub options: Options,
}

impl BackupParams {
    pub fn new(tenant_id: &str, user_id: &str) -> Self {
        BackupParams {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            options: Options::default(),
        }
    }

    pub fn options(self, options: Options) -> Self {
        BackupParams { options, ..self }
    }

    fn validate(&self) -> Result<()> {
        if self.tenant_id.is_empty() {
            return Err(SyncError::validation("missing tenant id"));
        }
        if self.user_id.is_empty() {
            return Err(SyncError::validation("missing user id"));
        }
        Ok(())
    }
}

/// Produces the backup collections for every scope.
///
/// Returns the collections and whether the previous backup's metadata was usable. If
/// it was not, every collection is a full backup of its container.
///
/// Categories run one after the other. A category that fails is recorded as
/// recoverable and the others still run. Cancellation stops the run.
pub async fn produce_backup_collections<A: SuiteApi>(
    api: &A,
    params: &BackupParams,
    scopes: &[Scope],
    metadata: &[MetadataCollection],
    counter: &Counter,
    errs: &Bus,
    cancel: &CancellationToken,
) -> Result<(Vec<BackupCollection>, bool)> {
    params.validate()?;
    let mut seen = HashSet::new();
    for scope in scopes {
        if !seen.insert(scope.category) {
            return Err(SyncError::validation(format!(
                "more than one scope for {}",
                scope.category
            )));
        }
    }

    let (cdps, can_use_previous_backup) = parse_metadata_collections(metadata, cancel)?;
    info!(can_use_previous_backup, scopes = scopes.len(), "producing backup collections");

    let el = errs.local();
    let mut collections = Vec::new();

    for scope in scopes {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if el.failure().is_some() {
            break;
        }

        let dps = cdps.get(&scope.category).cloned().unwrap_or_default();
        match create_collections(api, params, scope, &dps, counter, &el, cancel).await {
            Ok(colls) => collections.extend(colls),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                error!(category = %scope.category, error = %err, "creating collections");
                el.add_recoverable(err, &[Label::ForceNoBackupCreation]);
            }
        }
    }

    match el.failure() {
        Some(failure) => Err(failure),
        None => Ok((collections, can_use_previous_backup)),
    }
}

/// Builds the collections for one category.
pub async fn create_collections<A: SuiteApi>(
    api: &A,
    params: &BackupParams,
    scope: &Scope,
    dps: &DeltaPaths,
    counter: &Counter,
    errs: &Bus,
    cancel: &CancellationToken,
) -> Result<Vec<BackupCollection>> {
    let handler = CategoryHandler::new(scope.category);
    debug!(category = %scope.category, "collecting {}", scope.category.human_string());

    let mut resolver = ContainerResolver::new(api.clone(), &params.user_id, scope.category)
        .with_cancel(cancel.clone());
    resolver
        .populate(handler.default_root_container(), errs)
        .await?;

    let collections = populate_collections(
        api,
        params,
        &handler,
        &mut resolver,
        scope,
        dps,
        counter,
        errs,
        cancel,
    )
    .await?;
    counter.add(CountKey::Collections, collections.len() as i64);

    let mut keyed: Vec<(String, BackupCollection)> = collections.into_iter().collect();
    keyed.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));
    Ok(keyed.into_iter().map(|(_, coll)| coll).collect())
}

/// Fills the collection map for one category: one entry per in-scope container keyed
/// by container id, tombstones keyed by their old id, and the metadata collection
/// under `"metadata"`.
#[allow(clippy::too_many_arguments)]
pub async fn populate_collections<A: SuiteApi>(
    api: &A,
    params: &BackupParams,
    handler: &CategoryHandler,
    resolver: &mut ContainerResolver<A>,
    scope: &Scope,
    dps: &DeltaPaths,
    counter: &Counter,
    errs: &Bus,
    cancel: &CancellationToken,
) -> Result<HashMap<String, BackupCollection>> {
    let el = errs.local();
    let category = handler.category();
    let opts = &params.options;

    let mut collections: HashMap<String, BackupCollection> = HashMap::new();
    let mut delta_urls: HashMap<String, String> = HashMap::new();
    let mut curr_paths: HashMap<String, String> = HashMap::new();
    // ids still here after enumeration belong to containers that are gone
    let mut tombstones: HashMap<String, String> = dps
        .iter()
        .map(|(id, dp)| (id.clone(), dp.path.clone()))
        .collect();

    let preview = opts.preview.map(PreviewLimits::or_defaults);
    if preview.is_some() {
        resolver
            .rank(
                handler.preview_include_containers(),
                handler.preview_exclude_containers(),
            )
            .await?;
    }

    info!(
        category = %category,
        len_deltapaths = dps.len(),
        preview = ?preview,
        "filling collections"
    );
    counter.add(CountKey::PrevDeltas, dps.len() as i64);

    let mut added_items = 0usize;
    let mut added_containers = 0usize;

    for cached in resolver.items() {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if let Some(failure) = el.failure() {
            return Err(failure);
        }

        let cl = counter.local();
        let id = cached.id().to_string();

        let Some(location) = handler.backup_location(&cached) else {
            cl.inc(CountKey::SkippedContainers);
            continue;
        };
        let included = scope.matches(&location);
        debug!(container_id = %id, location = %location, included, "backup folder selection filter");
        if !included {
            cl.inc(CountKey::SkippedContainers);
            continue;
        }

        tombstones.remove(&id);

        let dp = dps.get(&id).cloned().unwrap_or_default();
        let mut prev_delta = if opts.disable_delta {
            String::new()
        } else {
            dp.delta
        };
        let mut prev_path = None;
        if !dp.path.is_empty() {
            match path_from_prev_string(params, category, &dp.path) {
                Ok(path) => prev_path = Some(path),
                Err(err) => {
                    error!(container_id = %id, error = %err, "parsing prev path");
                    cl.inc(CountKey::BadPrevPath);
                    // an unusable previous path makes the cursor unusable too
                    prev_delta.clear();
                }
            }
        }

        let mut config = CallConfig {
            can_make_delta_queries: !opts.disable_delta,
            use_immutable_ids: opts.use_immutable_ids,
            limit_results: 0,
        };
        if let Some(limits) = &preview {
            let to_add = limits.max_items.saturating_sub(added_items);
            if added_containers >= limits.max_containers || to_add == 0 {
                cl.inc(CountKey::SkippedContainers);
                continue;
            }
            config.limit_results = to_add.min(limits.max_items_per_container);
        }

        let aar = match api
            .get_added_and_removed_item_ids(&params.user_id, category, &id, &prev_delta, config)
            .await
        {
            Ok(aar) => aar,
            Err(err) if err.is_not_found() => {
                // deleted in flight: reset so no stale items are kept
                debug!(container_id = %id, "container deleted while querying items");
                AddedAndRemoved {
                    du: DeltaUpdate {
                        url: String::new(),
                        reset: true,
                    },
                    ..Default::default()
                }
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                el.add_recoverable(err, &[Label::ForceNoBackupCreation]);
                continue;
            }
        };

        if !aar.du.url.is_empty() {
            delta_urls.insert(id.clone(), aar.du.url.clone());
        } else if !aar.du.reset {
            info!(container_id = %id, "missing delta url");
            cl.inc(CountKey::MissingDelta);
        }

        let full_path =
            DataPath::exchange_folder(&params.tenant_id, &params.user_id, category, &location)?;
        let mut coll = ItemCollection::new(
            &id,
            &params.user_id,
            full_path,
            prev_path,
            location.clone(),
            aar.added,
            aar.removed,
            aar.du.reset,
        );
        coll.valid_mod_times = aar.valid_mod_times;

        added_items += coll.added.len();
        added_containers += 1;
        curr_paths.insert(id.clone(), location.to_folder_string());
        collections.insert(id, BackupCollection::Data(coll));
    }

    add_tombstones(
        params,
        category,
        &mut collections,
        tombstones,
        counter,
        &el,
        cancel,
    )?;

    counter.add(CountKey::NewDeltas, delta_urls.len() as i64);
    counter.add(CountKey::NewPrevPaths, curr_paths.len() as i64);

    let md_path = DataPath::metadata(&params.tenant_id, &params.user_id, category)?;
    collections.insert(
        METADATA_COLLECTION_KEY.to_string(),
        BackupCollection::Metadata(MetadataCollection::build(
            md_path,
            &curr_paths,
            &delta_urls,
        )?),
    );

    match el.failure() {
        Some(failure) => Err(failure),
        None => Ok(collections),
    }
}

/// Adds one tombstone per remaining id. An id that already has a live collection is
/// recorded as a conflict and left alone; empty previous paths are ignored.
pub(crate) fn add_tombstones(
    params: &BackupParams,
    category: Category,
    collections: &mut HashMap<String, BackupCollection>,
    tombstones: HashMap<String, String>,
    counter: &Counter,
    errs: &Bus,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut tombstones: Vec<(String, String)> = tombstones.into_iter().collect();
    tombstones.sort();

    for (id, prev) in tombstones {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if let Some(failure) = errs.failure() {
            return Err(failure);
        }

        if collections.contains_key(&id) {
            errs.add_recoverable(
                SyncError::Other {
                    message: format!("conflict: tombstone exists for a live collection {id}"),
                },
                &[Label::CollectionTombstoneConflict],
            );
            continue;
        }

        // a container seen only in flight has no stored path
        if prev.is_empty() {
            continue;
        }

        let prev_path = match path_from_prev_string(params, category, &prev) {
            Ok(path) => path,
            Err(err) => {
                error!(tombstone_id = %id, error = %err, "parsing tombstone prev path");
                counter.inc(CountKey::BadPrevPath);
                continue;
            }
        };

        counter.inc(CountKey::Tombstones);
        collections.insert(
            id.clone(),
            BackupCollection::Tombstone(TombstoneCollection {
                container_id: id,
                prev_path,
            }),
        );
    }
    Ok(())
}

fn path_from_prev_string(params: &BackupParams, category: Category, prev: &str) -> Result<DataPath> {
    let folders = PathBuilder::from_folder_string(prev)?;
    DataPath::exchange_folder(&params.tenant_id, &params.user_id, category, &folders)
}
