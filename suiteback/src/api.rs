// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # Collaborators
//!
//! Traits for the remote system. Each call is scoped to a resource owner (user id) and
//! a [`Category`]. Implementations report classification through [`SyncError`]:
//!
//! - a missing or deleted entity is [`SyncError::NotFound`]
//! - a conflicting entity is [`SyncError::AlreadyExists`]
//!
//! Transport concerns (paging, retries, throttling) belong to the implementation.
//!
//! [`SyncError`]: crate::error::SyncError
//! [`SyncError::NotFound`]: crate::error::SyncError::NotFound
//! [`SyncError::AlreadyExists`]: crate::error::SyncError::AlreadyExists

use std::{collections::HashMap, future::Future};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{Result, models::Container, path::Category};

/// Result of a delta query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaUpdate {
    /// Cursor for the next delta query. May be empty.
    pub url: String,
    /// True if the previous cursor was unusable and the listing is complete.
    pub reset: bool,
}

/// Added and removed item ids for one container.
#[derive(Debug, Clone, Default)]
pub struct AddedAndRemoved {
    /// Added or changed item ids, with their modification times when known.
    pub added: HashMap<String, Option<DateTime<Utc>>>,
    pub removed: Vec<String>,
    /// True if the modification times in `added` can be trusted.
    pub valid_mod_times: bool,
    pub du: DeltaUpdate,
}

/// Parameters for an item enumeration call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallConfig {
    pub can_make_delta_queries: bool,
    pub use_immutable_ids: bool,
    /// Maximum number of added ids to return. Zero is unlimited.
    pub limit_results: usize,
}

pub trait ContainerGetter: Send + Sync {
    /// Fetches a container. Well-known names (e.g. `inbox`) are accepted as ids.
    fn get_container_by_id(
        &self,
        user_id: &str,
        category: Category,
        container_id: &str,
    ) -> impl Future<Output = Result<Container>> + Send;
}

pub trait ContainersEnumerator: Send + Sync {
    /// Lists every container below `base_id`, at any depth. The base is not included.
    fn enumerate_containers(
        &self,
        user_id: &str,
        category: Category,
        base_id: &str,
    ) -> impl Future<Output = Result<Vec<Container>>> + Send;
}

pub trait ItemEnumerator: Send + Sync {
    /// Returns item changes since `prev_delta`. An empty cursor, or a cursor the remote
    /// system no longer accepts, yields a full listing with `du.reset` set.
    fn get_added_and_removed_item_ids(
        &self,
        user_id: &str,
        category: Category,
        container_id: &str,
        prev_delta: &str,
        config: CallConfig,
    ) -> impl Future<Output = Result<AddedAndRemoved>> + Send;
}

pub trait ItemGetter: Send + Sync {
    /// Fetches one item body.
    fn get_item(
        &self,
        user_id: &str,
        category: Category,
        item_id: &str,
    ) -> impl Future<Output = Result<Bytes>> + Send;
}

pub trait ContainerCreator: Send + Sync {
    /// Creates a container named `name` under `parent_id`.
    fn create_container(
        &self,
        user_id: &str,
        category: Category,
        parent_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Container>> + Send;
}

pub trait ContainerByNamer: Send + Sync {
    /// Finds the child of `parent_id` named `name`.
    fn get_container_by_name(
        &self,
        user_id: &str,
        category: Category,
        parent_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Container>> + Send;
}

pub trait ItemPoster: Send + Sync {
    /// Creates an item in a container and returns its new id.
    fn post_item(
        &self,
        user_id: &str,
        category: Category,
        container_id: &str,
        body: Bytes,
    ) -> impl Future<Output = Result<String>> + Send;

    fn delete_item(
        &self,
        user_id: &str,
        category: Category,
        item_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub trait ItemLister: Send + Sync {
    /// Lists the items in a container as `(id, body)` pairs.
    fn list_items(
        &self,
        user_id: &str,
        category: Category,
        container_id: &str,
    ) -> impl Future<Output = Result<Vec<(String, Bytes)>>> + Send;
}

/// Every collaborator the engine needs.
pub trait SuiteApi:
    ContainerGetter
    + ContainersEnumerator
    + ItemEnumerator
    + ItemGetter
    + ContainerCreator
    + ContainerByNamer
    + ItemPoster
    + ItemLister
    + Clone
    + 'static
{
}

impl<T> SuiteApi for T where
    T: ContainerGetter
        + ContainersEnumerator
        + ItemEnumerator
        + ItemGetter
        + ContainerCreator
        + ContainerByNamer
        + ItemPoster
        + ItemLister
        + Clone
        + 'static
{
}
