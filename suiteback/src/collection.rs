// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # Backup collections
//!
//! A backup produces one [`BackupCollection`] per container that changed or may have
//! changed, one per container that disappeared, and one metadata collection per
//! category.
//!
//! Item collections hold ids only. Bodies are fetched while the collection is
//! streamed with [`ItemCollection::items`]:
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use suiteback::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(coll: ItemCollection, api: MockSuite) -> Result<(), SyncError> {
//! let errs = Bus::new(false);
//! let mut items = coll.items(api, &errs, &Counter::new(), &CancellationToken::new());
//! while let Some(item) = items.next().await {
//!     match item? {
//!         StreamItem::Deleted { id } => println!("deleted {id}"),
//!         StreamItem::Item { id, body, .. } => println!("{id}: {} bytes", body.len()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, vec};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{
    StreamExt,
    stream::{BoxStream, unfold},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    Result,
    api::ItemGetter,
    count::{CountKey, Counter},
    error::SyncError,
    fault::{Bus, Label},
    metadata::MetadataCollection,
    models::ItemInfo,
    path::{Category, DataPath, PathBuilder},
};

/// How a collection relates to the previous backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CollectionState {
    /// No previous path.
    New,
    /// Same path as the previous backup.
    NotMoved,
    /// The container moved or was renamed since the previous backup.
    Moved,
    /// The container no longer exists.
    Deleted,
}

impl CollectionState {
    pub fn from_paths(curr: Option<&DataPath>, prev: Option<&DataPath>) -> Self {
        match (curr, prev) {
            (None, _) => CollectionState::Deleted,
            (Some(_), None) => CollectionState::New,
            (Some(curr), Some(prev)) if curr == prev => CollectionState::NotMoved,
            (Some(_), Some(_)) => CollectionState::Moved,
        }
    }
}

/// One item read from a collection.
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// The item was removed since the previous backup.
    Deleted { id: String },
    /// A new or changed item.
    Item {
        id: String,
        body: Bytes,
        info: ItemInfo,
        mod_time: Option<DateTime<Utc>>,
    },
}

impl StreamItem {
    pub fn id(&self) -> &str {
        match self {
            StreamItem::Deleted { id } | StreamItem::Item { id, .. } => id,
        }
    }
}

pub type ItemStream = BoxStream<'static, Result<StreamItem>>;

/// Items of one live container.
#[derive(Debug, Clone)]
pub struct ItemCollection {
    pub container_id: String,
    pub user_id: String,
    /// Current path, built from the container location.
    pub full_path: DataPath,
    pub prev_path: Option<DataPath>,
    pub location: PathBuilder,
    /// Added or changed ids with their modification times.
    pub added: HashMap<String, Option<DateTime<Utc>>>,
    pub removed: Vec<String>,
    /// True if items from the previous backup must not be carried forward.
    pub do_not_merge_items: bool,
    pub valid_mod_times: bool,
}

impl ItemCollection {
    /// Builds a collection. Ids present in both `added` and `removed` are treated as
    /// removed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        container_id: &str,
        user_id: &str,
        full_path: DataPath,
        prev_path: Option<DataPath>,
        location: PathBuilder,
        mut added: HashMap<String, Option<DateTime<Utc>>>,
        removed: Vec<String>,
        do_not_merge_items: bool,
    ) -> Self {
        for id in &removed {
            added.remove(id);
        }
        ItemCollection {
            container_id: container_id.to_string(),
            user_id: user_id.to_string(),
            full_path,
            prev_path,
            location,
            added,
            removed,
            do_not_merge_items,
            valid_mod_times: false,
        }
    }

    pub fn category(&self) -> Category {
        self.full_path.category()
    }

    pub fn state(&self) -> CollectionState {
        CollectionState::from_paths(Some(&self.full_path), self.prev_path.as_ref())
    }

    /// Streams the collection: deletion markers for removed ids, then added items in
    /// id order, fetched one at a time. Items deleted in flight are skipped. Other
    /// fetch failures are recorded on `errs`; the stream ends early if that makes the
    /// bus fail. Cancellation yields [`SyncError::Cancelled`] and ends the stream.
    pub fn items<G>(
        &self,
        getter: G,
        errs: &Bus,
        counter: &Counter,
        cancel: &CancellationToken,
    ) -> ItemStream
    where
        G: ItemGetter + 'static,
    {
        let mut added: Vec<(String, Option<DateTime<Utc>>)> =
            self.added.iter().map(|(id, mod_time)| (id.clone(), *mod_time)).collect();
        added.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));

        let state = StreamState {
            getter,
            user_id: self.user_id.clone(),
            category: self.category(),
            removed: self.removed.clone().into_iter(),
            added: added.into_iter(),
            errs: errs.clone(),
            counter: counter.clone(),
            cancel: cancel.clone(),
            done: false,
        };

        unfold(state, |mut st| async move {
            if st.done {
                return None;
            }
            if st.cancel.is_cancelled() {
                st.done = true;
                return Some((Err(SyncError::Cancelled), st));
            }
            if let Some(id) = st.removed.next() {
                st.counter.inc(CountKey::ItemsRemoved);
                return Some((Ok(StreamItem::Deleted { id }), st));
            }

            loop {
                let (id, mod_time) = st.added.next()?;
                if st.cancel.is_cancelled() {
                    st.done = true;
                    return Some((Err(SyncError::Cancelled), st));
                }

                let fetched = st
                    .getter
                    .get_item(&st.user_id, st.category, &id)
                    .await
                    .and_then(|body| {
                        let info = ItemInfo::from_body(st.category, &body)?;
                        Ok((body, info))
                    });
                match fetched {
                    Ok((body, info)) => {
                        st.counter.inc(CountKey::ItemsAdded);
                        return Some((
                            Ok(StreamItem::Item {
                                id,
                                body,
                                info,
                                mod_time,
                            }),
                            st,
                        ));
                    }
                    Err(err) if err.is_not_found() => {
                        debug!(item_id = %id, "item deleted in flight");
                        st.counter.inc(CountKey::ItemsDeletedInFlight);
                    }
                    Err(err) => {
                        st.errs.add_recoverable(err, &[Label::ItemFetch]);
                        if let Some(failure) = st.errs.failure() {
                            st.done = true;
                            return Some((Err(failure), st));
                        }
                    }
                }
            }
        })
        .boxed()
    }
}

struct StreamState<G> {
    getter: G,
    user_id: String,
    category: Category,
    removed: vec::IntoIter<String>,
    added: vec::IntoIter<(String, Option<DateTime<Utc>>)>,
    errs: Bus,
    counter: Counter,
    cancel: CancellationToken,
    done: bool,
}

/// Marks a container from the previous backup as deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneCollection {
    pub container_id: String,
    pub prev_path: DataPath,
}

/// Output of a backup.
#[derive(Debug, Clone)]
pub enum BackupCollection {
    Data(ItemCollection),
    Tombstone(TombstoneCollection),
    Metadata(MetadataCollection),
}

impl BackupCollection {
    /// Current path. Tombstones have none.
    pub fn full_path(&self) -> Option<&DataPath> {
        match self {
            BackupCollection::Data(coll) => Some(&coll.full_path),
            BackupCollection::Tombstone(_) => None,
            BackupCollection::Metadata(coll) => Some(&coll.path),
        }
    }

    pub fn previous_path(&self) -> Option<&DataPath> {
        match self {
            BackupCollection::Data(coll) => coll.prev_path.as_ref(),
            BackupCollection::Tombstone(coll) => Some(&coll.prev_path),
            BackupCollection::Metadata(_) => None,
        }
    }

    pub fn state(&self) -> CollectionState {
        CollectionState::from_paths(self.full_path(), self.previous_path())
    }

    pub fn as_data(&self) -> Option<&ItemCollection> {
        match self {
            BackupCollection::Data(coll) => Some(coll),
            _ => None,
        }
    }

    pub fn as_tombstone(&self) -> Option<&TombstoneCollection> {
        match self {
            BackupCollection::Tombstone(coll) => Some(coll),
            _ => None,
        }
    }

    pub fn as_metadata(&self) -> Option<&MetadataCollection> {
        match self {
            BackupCollection::Metadata(coll) => Some(coll),
            _ => None,
        }
    }
}
