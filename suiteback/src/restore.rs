// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # Restore
//!
//! Writes backed up items back into the remote system.
//!
//! For each collection the [`Restorer`]:
//!
//! 1. computes the destination folder ([`CategoryHandler::format_restore_destination`])
//! 2. finds or creates it, one path segment at a time ([`create_destination`])
//! 3. indexes the items already in the destination by collision key, once per
//!    destination per run
//! 4. restores each item under the configured [`CollisionPolicy`]
//!
//! Under [`CollisionPolicy::Replace`] the new item is created before the old one is
//! deleted, so a failure between the two calls leaves a duplicate instead of losing
//! the item.
//!
//! ```rust,no_run
//! use suiteback::prelude::*;
//! use tokio_util::sync::CancellationToken;
//! # async fn example(api: MockSuite, collections: Vec<RestoreCollection>) -> Result<(), SyncError> {
//! let config = RestoreConfig::default().on_collision(CollisionPolicy::Copy);
//! let mut details = Details::new();
//! let mut restorer = Restorer::new(
//!     api,
//!     "user",
//!     config,
//!     &Counter::new(),
//!     &Bus::new(false),
//!     &CancellationToken::new(),
//! );
//! let stats = restorer.restore_collections(collections, &mut details).await?;
//! println!("restored {} items, skipped {}", stats.restored, stats.skipped);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    Result,
    api::{ItemGetter, SuiteApi},
    collection::{ItemCollection, StreamItem},
    control::{CollisionPolicy, RestoreConfig},
    count::{CountKey, Counter},
    details::Details,
    error::SyncError,
    fault::{Bus, Label, Skipped},
    handlers::CategoryHandler,
    models::{ItemInfo, collision_key},
    path::{Category, DataPath, PathBuilder},
    resolver::ContainerResolver,
};

/// An item to restore.
#[derive(Debug, Clone)]
pub struct RestoreItem {
    /// Id in the backup.
    pub id: String,
    pub body: Bytes,
}

/// A folder of items to restore.
pub struct RestoreCollection {
    /// Path of the collection in the backup.
    pub full_path: DataPath,
    items: BoxStream<'static, Result<RestoreItem>>,
}

impl RestoreCollection {
    pub fn new(full_path: DataPath, items: Vec<RestoreItem>) -> Self {
        RestoreCollection {
            full_path,
            items: stream::iter(items.into_iter().map(Ok)).boxed(),
        }
    }

    pub fn from_stream(full_path: DataPath, items: BoxStream<'static, Result<RestoreItem>>) -> Self {
        RestoreCollection { full_path, items }
    }

    /// Restores straight from a backup collection. Deletion markers are dropped.
    pub fn from_backup<G>(
        coll: &ItemCollection,
        getter: G,
        errs: &Bus,
        counter: &Counter,
        cancel: &CancellationToken,
    ) -> Self
    where
        G: ItemGetter + 'static,
    {
        let items = coll
            .items(getter, errs, counter, cancel)
            .filter_map(|item| async move {
                match item {
                    Ok(StreamItem::Item { id, body, .. }) => Some(Ok(RestoreItem { id, body })),
                    Ok(StreamItem::Deleted { .. }) => None,
                    Err(err) => Some(Err(err)),
                }
            })
            .boxed();
        RestoreCollection {
            full_path: coll.full_path.clone(),
            items,
        }
    }

    pub fn category(&self) -> Category {
        self.full_path.category()
    }
}

/// Tally of one restore run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub collections: usize,
    pub restored: usize,
    pub skipped: usize,
    pub replaced: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// Result of restoring one item.
#[derive(Debug, Clone)]
pub struct RestoredItem {
    pub new_id: String,
    /// Id of the existing item deleted under [`CollisionPolicy::Replace`].
    pub replaced: Option<String>,
    pub info: ItemInfo,
}

/// Finds or creates the destination folder and returns its id.
///
/// Segments already in the resolver cache are reused. A fresh resolver is populated
/// from the category root before the first container is created. A create that
/// reports a conflict falls back to a lookup by name.
pub async fn create_destination<A: SuiteApi>(
    api: &A,
    handler: &CategoryHandler,
    destination: &PathBuilder,
    user_id: &str,
    resolver: &mut ContainerResolver<A>,
    errs: &Bus,
) -> Result<String> {
    let category = handler.category();
    let mut container_id = String::new();
    let mut so_far = PathBuilder::new();

    for segment in destination.elements() {
        so_far = so_far.append_one(segment.clone());
        let location = so_far.to_string();

        if let Some(id) = resolver.location_in_cache(&location) {
            container_id = id;
            continue;
        }

        if resolver.is_empty() {
            resolver
                .populate(handler.default_root_container(), errs)
                .await?;
            if let Some(id) = resolver.location_in_cache(&location) {
                container_id = id;
                continue;
            }
        }

        let parent_id = handler.or_root_container(&container_id);
        let container = match api
            .create_container(user_id, category, &parent_id, segment)
            .await
        {
            Ok(container) => container,
            Err(err) if err.is_already_exists() => {
                debug!(parent_id = %parent_id, name = %segment, "container exists, looking it up by name");
                api.get_container_by_name(user_id, category, &parent_id, segment)
                    .await?
            }
            Err(err) => return Err(err),
        };

        info!(category = %category, container_id = %container.id, location = %location, "created restore container");
        container_id = container.id.clone();
        resolver.add_to_cache(container).await?;
    }

    if container_id.is_empty() {
        return Err(SyncError::validation("empty restore destination"));
    }
    Ok(container_id)
}

/// Maps the collision key of every item in `container_id` to the item's id.
pub async fn get_items_in_container_by_collision_key<A: SuiteApi>(
    api: &A,
    category: Category,
    user_id: &str,
    container_id: &str,
) -> Result<HashMap<String, String>> {
    let items = api.list_items(user_id, category, container_id).await?;
    let mut index = HashMap::with_capacity(items.len());
    for (id, body) in items {
        match collision_key(category, &body) {
            Ok(key) => {
                index.insert(key, id);
            }
            Err(err) => {
                warn!(item_id = %id, error = %err, "computing collision key for existing item");
            }
        }
    }
    Ok(index)
}

/// Restores one item into `destination_id`.
///
/// Returns [`SyncError::AlreadyExists`] when the item collides and the policy is
/// [`CollisionPolicy::Skip`]; callers count that as a skip. Under the other policies
/// the same error from the remote system is a failure.
pub async fn restore_item<A: SuiteApi>(
    api: &A,
    category: Category,
    user_id: &str,
    destination_id: &str,
    body: Bytes,
    index: &mut HashMap<String, String>,
    policy: CollisionPolicy,
) -> Result<RestoredItem> {
    let key = collision_key(category, &body)?;
    let info = ItemInfo::from_body(category, &body)?;

    let mut replace = None;
    if let Some(existing) = index.get(&key) {
        debug!(collision_key = %key, existing_id = %existing, "item collision");
        match policy {
            CollisionPolicy::Skip => {
                return Err(SyncError::already_exists("item", existing.clone()));
            }
            CollisionPolicy::Copy => {}
            CollisionPolicy::Replace => replace = Some(existing.clone()),
        }
    }

    let new_id = api
        .post_item(user_id, category, destination_id, body)
        .await?;

    if let Some(old_id) = &replace {
        api.delete_item(user_id, category, old_id).await?;
        index.remove(&key);
    }

    Ok(RestoredItem {
        new_id,
        replaced: replace,
        info,
    })
}

/// Restore run state: per-category container caches and per-destination collision
/// indexes, both kept for the whole run.
pub struct Restorer<A: SuiteApi> {
    api: A,
    user_id: String,
    config: RestoreConfig,
    counter: Counter,
    errs: Bus,
    cancel: CancellationToken,
    resolvers: HashMap<Category, ContainerResolver<A>>,
    indexes: HashMap<(Category, String), HashMap<String, String>>,
}

impl<A: SuiteApi> Restorer<A> {
    pub fn new(
        api: A,
        user_id: &str,
        config: RestoreConfig,
        counter: &Counter,
        errs: &Bus,
        cancel: &CancellationToken,
    ) -> Self {
        Restorer {
            api,
            user_id: user_id.to_string(),
            config,
            counter: counter.clone(),
            errs: errs.clone(),
            cancel: cancel.clone(),
            resolvers: HashMap::new(),
            indexes: HashMap::new(),
        }
    }

    /// Finds or creates the destination for a collection in `category`.
    pub async fn create_destination(
        &mut self,
        category: Category,
        destination: &PathBuilder,
    ) -> Result<String> {
        let handler = CategoryHandler::new(category);
        let resolver = self.resolvers.entry(category).or_insert_with(|| {
            ContainerResolver::new(self.api.clone(), &self.user_id, category)
                .with_cancel(self.cancel.clone())
        });
        create_destination(
            &self.api,
            &handler,
            destination,
            &self.user_id,
            resolver,
            &self.errs,
        )
        .await
    }

    /// Id of the category root when an in-place restore targets a collection that was
    /// backed up from the root under the root's own name.
    async fn root_in_place(
        &mut self,
        category: Category,
        destination: &PathBuilder,
    ) -> Result<Option<String>> {
        let handler = CategoryHandler::new(category);
        if !self.config.location.is_empty() || !handler.root_holds_items() {
            return Ok(None);
        }
        let [name] = destination.elements() else {
            return Ok(None);
        };

        let resolver = self.resolvers.entry(category).or_insert_with(|| {
            ContainerResolver::new(self.api.clone(), &self.user_id, category)
                .with_cancel(self.cancel.clone())
        });
        if resolver.is_empty() {
            resolver
                .populate(handler.default_root_container(), &self.errs)
                .await?;
        }
        Ok(resolver
            .root()
            .filter(|root| root.display_name() == name.as_str())
            .map(|root| root.id().to_string()))
    }

    /// Collision index for a destination. Built on first use, then reused.
    pub async fn get_items_in_container_by_collision_key(
        &mut self,
        category: Category,
        container_id: &str,
    ) -> Result<&mut HashMap<String, String>> {
        let key = (category, container_id.to_string());
        if !self.indexes.contains_key(&key) {
            let index = get_items_in_container_by_collision_key(
                &self.api,
                category,
                &self.user_id,
                container_id,
            )
            .await?;
            self.counter.inc(CountKey::CollisionIndexes);
            self.indexes.insert(key.clone(), index);
        }
        self.indexes
            .get_mut(&key)
            .ok_or_else(|| SyncError::NotCached {
                container_id: container_id.to_string(),
                message: "collision index".to_string(),
            })
    }

    /// Restores every collection, adding a details entry per restored item.
    ///
    /// Item failures are recorded on the bus and counted. Skips are counted separately.
    /// Cancellation, and failing to create a destination or build its collision index,
    /// stop the run; `details` keeps what was restored before that.
    pub async fn restore_collections(
        &mut self,
        collections: Vec<RestoreCollection>,
        details: &mut Details,
    ) -> Result<RestoreStats> {
        let el = self.errs.local();
        let mut stats = RestoreStats::default();

        for coll in collections {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if let Some(failure) = el.failure() {
                return Err(failure);
            }

            let category = coll.category();
            let handler = CategoryHandler::new(category);
            let destination = handler
                .format_restore_destination(&self.config.location, coll.full_path.folders())?;
            info!(
                category = %category,
                collection = %coll.full_path,
                destination = %destination,
                "restoring collection"
            );

            let dest_id = match self.root_in_place(category, &destination).await? {
                Some(root_id) => root_id,
                None => self.create_destination(category, &destination).await?,
            };
            // builds the index before anything is written into the destination
            self.get_items_in_container_by_collision_key(category, &dest_id)
                .await?;
            stats.collections += 1;

            self.restore_items(coll, &dest_id, &destination, &el, details, &mut stats)
                .await?;
        }

        Ok(stats)
    }

    async fn restore_items(
        &mut self,
        coll: RestoreCollection,
        dest_id: &str,
        destination: &PathBuilder,
        el: &Bus,
        details: &mut Details,
        stats: &mut RestoreStats,
    ) -> Result<()> {
        let category = coll.category();
        let full_path = coll.full_path;
        let mut items = coll.items;
        let policy = self.config.on_collision;

        while let Some(next) = items.next().await {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if let Some(failure) = el.failure() {
                return Err(failure);
            }

            let item = match next {
                Ok(item) => item,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    stats.failed += 1;
                    self.counter.inc(CountKey::ItemsFailed);
                    el.add_recoverable(err, &[Label::ItemRestore]);
                    continue;
                }
            };

            let size = item.body.len() as u64;
            let api = self.api.clone();
            let user_id = self.user_id.clone();
            let index = self
                .get_items_in_container_by_collision_key(category, dest_id)
                .await?;
            let restored =
                restore_item(&api, category, &user_id, dest_id, item.body, index, policy).await;

            match restored {
                Ok(restored) => {
                    stats.restored += 1;
                    stats.bytes += size;
                    self.counter.inc(CountKey::ItemsRestored);
                    if restored.replaced.is_some() {
                        stats.replaced += 1;
                        self.counter.inc(CountKey::ItemsReplaced);
                    }
                    let added = full_path
                        .append_item(&item.id)
                        .and_then(|repo_ref| {
                            details.add(&repo_ref, destination, &restored.new_id, restored.info)
                        });
                    if let Err(err) = added {
                        info!(item_id = %item.id, error = %err, "adding restored item to details");
                    }
                }
                Err(err) if policy == CollisionPolicy::Skip && err.is_already_exists() => {
                    stats.skipped += 1;
                    self.counter.inc(CountKey::ItemsSkipped);
                    el.add_skip(Skipped {
                        id: item.id,
                        cause: "already_exists".to_string(),
                    });
                }
                Err(err) => {
                    stats.failed += 1;
                    self.counter.inc(CountKey::ItemsFailed);
                    el.add_recoverable(err, &[Label::ItemRestore]);
                }
            }
        }
        Ok(())
    }
}
