// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! Errors returned by suiteback
//!
use std::sync::Arc;

use snafu::prelude::*;

use crate::path::Category;

/// Errors returned by the suiteback crate.
///
/// The enum is `Clone` so failures recorded on a [`Bus`](crate::fault::Bus) can be
/// handed back to the caller while the bus keeps its own copy.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum SyncError {
    /// The remote system reports the entity as missing or deleted.
    /// Containers and items that vanish between two calls surface as this error.
    #[snafu(display("{obj_type} {key} not found"))]
    NotFound { obj_type: String, key: String },

    /// The remote system already holds a conflicting entity.
    /// Also used as the sentinel for items skipped under the `Skip` collision policy.
    #[snafu(display("{obj_type} {key} already exists"))]
    AlreadyExists { obj_type: String, key: String },

    /// Walking a container's parents exceeded the depth bound.
    #[snafu(display("path contains cycle or is too tall: container {container_id} depth {depth}"))]
    PathTooDeep { container_id: String, depth: usize },

    /// Container is not in the resolver cache, or is cached without a path.
    #[snafu(display("container {container_id} not cached: {message}"))]
    NotCached {
        container_id: String,
        message: String,
    },

    /// Validation error: a required value was missing or malformed.
    #[snafu(display("Validation error: {message}"))]
    Validation { message: String },

    /// A stored or constructed path could not be parsed.
    #[snafu(display("invalid path {path:?}: {message}"))]
    PathParse { path: String, message: String },

    /// Deserialization error for metadata or item bodies.
    #[snafu(display("Deserialization: {message}"))]
    Deserialization { message: String },

    /// Serialization error. unlikely to occur.
    #[snafu(display("Serialization: {source}"))]
    Serialization {
        #[snafu(source(from(serde_json::Error, Arc::new)))]
        source: Arc<serde_json::Error>,
    },

    /// Previous-backup metadata is inconsistent.
    #[snafu(display("metadata for {category}: {message}"))]
    Metadata { category: Category, message: String },

    /// The remote system responded with an error that has no better classification.
    #[snafu(display("Api error ({code}) {operation}: {message}"))]
    Api {
        code: u16,
        operation: String,
        message: String,
    },

    /// The run's cancellation token fired.
    #[snafu(display("context cancelled"))]
    Cancelled,

    /// Some other error occurred
    #[snafu(display("{message}"))]
    Other { message: String },
}

impl SyncError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(obj_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            obj_type: obj_type.into(),
            key: key.into(),
        }
    }

    /// Shorthand for an `AlreadyExists` error.
    pub fn already_exists(obj_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            obj_type: obj_type.into(),
            key: key.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns true if the remote entity is missing or was deleted in flight.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for conflicts, including the item-collision skip sentinel.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Converts a `serde_path_to_error` failure into a [`SyncError::Deserialization`]
/// that names the json path where decoding stopped.
pub(crate) fn deserialization_error(
    what: &str,
    err: &serde_path_to_error::Error<serde_json::Error>,
) -> SyncError {
    SyncError::Deserialization {
        message: format!("{what} at {}: {}", err.path(), err.inner()),
    }
}
