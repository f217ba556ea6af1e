// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # suiteback
//!
//! Incremental backup and restore of mail folders, contact folders and calendars
//! stored in a remote collaboration suite.
//!
//! ## Features
//!
//! - container path resolution with a per-run cache ([`resolver::ContainerResolver`])
//! - delta-driven backup collections with tombstones for deleted or moved containers
//!   ([`backup::produce_backup_collections`])
//! - restore with per-item collision policies ([`restore::Restorer`])
//! - record-and-continue failure aggregation ([`fault::Bus`])
//! - preview backups with bounded containers and items
//!
//! The remote system is reached through the collaborator traits in [`api`]. An
//! in-memory implementation lives in [`mock`] for tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use suiteback::prelude::*;
//! use tokio_util::sync::CancellationToken;
//! # async fn example(api: MockSuite) -> Result<(), SyncError> {
//!
//! let errs = Bus::new(false);
//! let counter = Counter::new();
//! let cancel = CancellationToken::new();
//! let scopes = vec![Scope::all(Category::Email), Scope::all(Category::Contacts)];
//!
//! let (collections, can_use_previous) = produce_backup_collections(
//!     &api,
//!     &BackupParams::new("tenant", "user@example.com"),
//!     &scopes,
//!     &[],
//!     &counter,
//!     &errs,
//!     &cancel,
//! )
//! .await?;
//! println!("{} collections, merge with previous: {can_use_previous}", collections.len());
//! # Ok(())
//! # }
//! ```
//!
#![allow(clippy::missing_errors_doc)] // pedantic
#![allow(clippy::missing_const_for_fn)] //  nursery function
#![allow(clippy::must_use_candidate)] // pedantic
#![warn(clippy::default_trait_access)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::future_not_send)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::literal_string_with_formatting_args)]
#![warn(clippy::match_same_arms)]
#![warn(clippy::min_ident_chars)]
#![warn(clippy::needless_raw_strings)]
#![warn(clippy::option_if_let_else)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::ref_option)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::uninlined_format_args)]
#![warn(clippy::unnecessary_wraps)]
#![warn(clippy::unused_async)]

pub mod api;
pub mod backup;
pub mod collection;
pub mod control;
pub mod count;
pub mod details;
pub mod error;
pub mod fault;
pub mod handlers;
pub mod metadata;
#[doc(hidden)]
pub mod mock;
pub mod models;
pub mod path;
pub mod resolver;
pub mod restore;
pub mod selectors;

/// Result type alias using `SyncError` as the default error.
pub type Result<T, E = crate::error::SyncError> = std::result::Result<T, E>;

/// Prelude module - import the common types with `use suiteback::prelude::*;`
pub mod prelude {
    pub use crate::error::*;
    pub use crate::{
        // Collaborators
        api::{
            AddedAndRemoved, CallConfig, ContainerByNamer, ContainerCreator, ContainerGetter,
            ContainersEnumerator, DeltaUpdate, ItemEnumerator, ItemGetter, ItemLister,
            ItemPoster, SuiteApi,
        },
        // Backup
        backup::{BackupParams, produce_backup_collections},
        // Collections
        collection::{
            BackupCollection, CollectionState, ItemCollection, ItemStream, StreamItem,
            TombstoneCollection,
        },
        // Configuration
        control::{CollisionPolicy, Options, PreviewLimits, RestoreConfig},
        // Counters
        count::{CountKey, Counter},
        // Details
        details::{Details, DetailsEntry},
        // Failures
        fault::{Bus, Label, Recovered, Skipped},
        // Per-category behaviour
        handlers::CategoryHandler,
        // Metadata
        metadata::{
            CatDeltaPaths, DeltaPath, DeltaPaths, MetadataCollection, MetadataEntry,
            parse_metadata_collections,
        },
        // In-memory collaborator
        mock::{MockCall, MockSuite},
        // Models
        models::{CachedContainer, Container, ItemInfo, collision_key},
        // Paths
        path::{Category, DataPath, PathBuilder},
        // Resolver
        resolver::{ContainerResolver, ResolvedPath},
        // Restore
        restore::{RestoreCollection, RestoreItem, RestoreStats, Restorer},
        // Scopes
        selectors::Scope,
    };
}

pub(crate) mod config {
    /// Maximum parent hops while resolving a container path.
    pub const MAX_ITERATIONS: usize = 300;

    /// Metadata entry holding the container id → previous path map.
    pub const PREVIOUS_PATH_FILE_NAME: &str = "previouspath";

    /// Metadata entry holding the container id → delta cursor map.
    pub const DELTA_URLS_FILE_NAME: &str = "delta";

    /// Key for the metadata collection in the collection map.
    pub const METADATA_COLLECTION_KEY: &str = "metadata";

    /// Environment variable that disables delta queries.
    pub const DISABLE_DELTA_ENV: &str = "SUITEBACK_DISABLE_DELTA";

    /// Environment variable that turns on fail-fast error handling.
    pub const FAIL_FAST_ENV: &str = "SUITEBACK_FAIL_FAST";

    /// Environment variable that requests immutable item ids from the remote system.
    pub const IMMUTABLE_IDS_ENV: &str = "SUITEBACK_IMMUTABLE_IDS";

    // Preview limits
    pub const DEFAULT_PREVIEW_MAX_CONTAINERS: usize = 5;
    pub const DEFAULT_PREVIEW_MAX_ITEMS_PER_CONTAINER: usize = 10;
    pub const DEFAULT_PREVIEW_MAX_ITEMS: usize = 50;

    /// Timestamp format used for default restore destinations.
    pub const RESTORE_DESTINATION_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

    /// Prefix for default restore destinations.
    pub const RESTORE_DESTINATION_PREFIX: &str = "Restore_";
}
