// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! Run configuration for backups and restores.
//!
//! [`Options`] controls backup behavior, [`RestoreConfig`] controls restores. Both use
//! consuming setters:
//!
//! ```rust
//! use suiteback::prelude::*;
//!
//! let opts = Options::default().fail_fast(true).preview(PreviewLimits::default());
//! let restore = RestoreConfig::default()
//!     .on_collision(CollisionPolicy::Replace)
//!     .location("Recovered");
//! assert!(opts.fail_fast);
//! assert_eq!(restore.location, "Recovered");
//! ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::{
    DEFAULT_PREVIEW_MAX_CONTAINERS, DEFAULT_PREVIEW_MAX_ITEMS,
    DEFAULT_PREVIEW_MAX_ITEMS_PER_CONTAINER, DISABLE_DELTA_ENV, FAIL_FAST_ENV, IMMUTABLE_IDS_ENV,
    RESTORE_DESTINATION_PREFIX, RESTORE_DESTINATION_TIME_FORMAT,
};

/// What to do when a restored item collides with an existing item in the destination.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Leave the existing item alone and count the restored item as skipped.
    #[default]
    Skip,
    /// Create the restored item next to the existing one.
    Copy,
    /// Create the restored item, then delete the existing one.
    Replace,
}

/// Bounds for preview backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewLimits {
    pub max_containers: usize,
    pub max_items_per_container: usize,
    pub max_items: usize,
}

impl Default for PreviewLimits {
    fn default() -> Self {
        PreviewLimits {
            max_containers: DEFAULT_PREVIEW_MAX_CONTAINERS,
            max_items_per_container: DEFAULT_PREVIEW_MAX_ITEMS_PER_CONTAINER,
            max_items: DEFAULT_PREVIEW_MAX_ITEMS,
        }
    }
}

impl PreviewLimits {
    /// Replaces every zero limit with its default.
    pub fn or_defaults(self) -> Self {
        let or = |value: usize, default: usize| if value == 0 { default } else { value };
        PreviewLimits {
            max_containers: or(self.max_containers, DEFAULT_PREVIEW_MAX_CONTAINERS),
            max_items_per_container: or(
                self.max_items_per_container,
                DEFAULT_PREVIEW_MAX_ITEMS_PER_CONTAINER,
            ),
            max_items: or(self.max_items, DEFAULT_PREVIEW_MAX_ITEMS),
        }
    }
}

/// Backup options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Ignore stored delta cursors and enumerate every container in full.
    ///
    /// Defaults to the value of `SUITEBACK_DISABLE_DELTA` (`1` or `true`).
    pub disable_delta: bool,

    /// Abort on the first recoverable error.
    ///
    /// Defaults to the value of `SUITEBACK_FAIL_FAST`.
    pub fail_fast: bool,

    /// Ask the remote system for ids that survive moves.
    ///
    /// Defaults to the value of `SUITEBACK_IMMUTABLE_IDS`.
    pub use_immutable_ids: bool,

    /// When set, run a preview backup bounded by these limits.
    pub preview: Option<PreviewLimits>,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .is_some_and(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true"))
}

impl Default for Options {
    fn default() -> Self {
        Options {
            disable_delta: env_flag(DISABLE_DELTA_ENV),
            fail_fast: env_flag(FAIL_FAST_ENV),
            use_immutable_ids: env_flag(IMMUTABLE_IDS_ENV),
            preview: None,
        }
    }
}

impl Options {
    pub fn disable_delta(self, disable_delta: bool) -> Self {
        Options {
            disable_delta,
            ..self
        }
    }

    pub fn fail_fast(self, fail_fast: bool) -> Self {
        Options { fail_fast, ..self }
    }

    pub fn use_immutable_ids(self, use_immutable_ids: bool) -> Self {
        Options {
            use_immutable_ids,
            ..self
        }
    }

    /// Turns the run into a preview bounded by `limits`.
    pub fn preview(self, limits: PreviewLimits) -> Self {
        Options {
            preview: Some(limits),
            ..self
        }
    }

    pub fn is_preview(&self) -> bool {
        self.preview.is_some()
    }
}

/// Restore configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreConfig {
    /// Collision policy applied to every item.
    pub on_collision: CollisionPolicy,

    /// Destination folder, relative to the category root. Nested folders use `/`.
    /// Empty restores in place, into the original folders.
    pub location: String,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        RestoreConfig {
            on_collision: CollisionPolicy::default(),
            location: default_restore_location(Utc::now()),
        }
    }
}

impl RestoreConfig {
    pub fn on_collision(self, on_collision: CollisionPolicy) -> Self {
        RestoreConfig {
            on_collision,
            ..self
        }
    }

    pub fn location(self, location: &str) -> Self {
        RestoreConfig {
            location: location.to_string(),
            ..self
        }
    }
}

/// Default restore destination name, e.g. `Restore_2026-01-02T03-04-05`.
pub fn default_restore_location(now: DateTime<Utc>) -> String {
    format!(
        "{RESTORE_DESTINATION_PREFIX}{}",
        now.format(RESTORE_DESTINATION_TIME_FORMAT)
    )
}
