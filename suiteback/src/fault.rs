// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # Failure aggregation
//!
//! A [`Bus`] collects the errors of one run. Container and item failures are recorded
//! with [`Bus::add_recoverable`] and the run continues; a run-ending error is recorded
//! with [`Bus::fail`]. Callers check [`Bus::failure`] between units of work.
//!
//! [`Bus::local`] creates a child bus for one section of the run, e.g. one category.
//! Everything recorded on the child is forwarded to its parent, while
//! [`failure`](Bus::failure) on the child only reflects errors recorded through it.
//!
//! In fail-fast mode the first recoverable error is promoted to the failure.

/*
 Locking: each bus holds one mutex. A child locks its own state, releases it, then
 forwards to the parent. No code holds two locks at once.
*/

use std::sync::Arc;

use parking_lot::Mutex;
use strum::{AsRefStr, Display};
use tracing::{error, info};

use crate::error::SyncError;

/// Classification attached to recoverable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Label {
    /// A stored previous path could not be parsed.
    BadPrevPath,
    /// A tombstone would have replaced a live collection.
    CollectionTombstoneConflict,
    /// The backup should not be committed as a complete snapshot.
    ForceNoBackupCreation,
    /// An item fetch failed.
    ItemFetch,
    /// An item restore failed.
    ItemRestore,
}

/// A recoverable error and its labels.
#[derive(Debug, Clone)]
pub struct Recovered {
    pub error: SyncError,
    pub labels: Vec<Label>,
}

impl Recovered {
    pub fn has_label(&self, label: Label) -> bool {
        self.labels.contains(&label)
    }
}

/// Something intentionally left out of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// Id of the skipped item or container.
    pub id: String,
    /// Short name for the reason, e.g. `already_exists`.
    pub cause: String,
}

#[derive(Debug, Default)]
struct BusState {
    failure: Option<SyncError>,
    recovered: Vec<Recovered>,
    skipped: Vec<Skipped>,
}

/// Run-scoped error collector. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct Bus {
    fail_fast: bool,
    state: Arc<Mutex<BusState>>,
    parent: Option<Arc<Bus>>,
}

impl Bus {
    pub fn new(fail_fast: bool) -> Self {
        Bus {
            fail_fast,
            state: Arc::new(Mutex::new(BusState::default())),
            parent: None,
        }
    }

    /// Creates a child bus that forwards everything to this one.
    pub fn local(&self) -> Bus {
        Bus {
            fail_fast: self.fail_fast,
            state: Arc::new(Mutex::new(BusState::default())),
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Records a run-ending error. The first failure wins.
    pub fn fail(&self, err: SyncError) {
        error!(error = %err, "failure");
        self.set_failure(err);
    }

    fn set_failure(&self, err: SyncError) {
        {
            let mut state = self.state.lock();
            if state.failure.is_none() {
                state.failure = Some(err.clone());
            }
        }
        if let Some(parent) = &self.parent {
            parent.set_failure(err);
        }
    }

    /// Records an error that does not stop the run.
    pub fn add_recoverable(&self, err: SyncError, labels: &[Label]) {
        info!(error = %err, labels = ?labels, "recoverable error");
        self.push_recoverable(Recovered {
            error: err,
            labels: labels.to_vec(),
        });
    }

    fn push_recoverable(&self, rec: Recovered) {
        {
            let mut state = self.state.lock();
            if self.fail_fast && state.failure.is_none() {
                state.failure = Some(rec.error.clone());
            }
            state.recovered.push(rec.clone());
        }
        if let Some(parent) = &self.parent {
            parent.push_recoverable(rec);
        }
    }

    /// Records an intentionally skipped item or container.
    pub fn add_skip(&self, skipped: Skipped) {
        info!(id = %skipped.id, cause = %skipped.cause, "skipped");
        self.push_skip(skipped);
    }

    fn push_skip(&self, skipped: Skipped) {
        self.state.lock().skipped.push(skipped.clone());
        if let Some(parent) = &self.parent {
            parent.push_skip(skipped);
        }
    }

    /// The failure recorded through this bus, if any.
    pub fn failure(&self) -> Option<SyncError> {
        self.state.lock().failure.clone()
    }

    pub fn recovered(&self) -> Vec<Recovered> {
        self.state.lock().recovered.clone()
    }

    pub fn skipped(&self) -> Vec<Skipped> {
        self.state.lock().skipped.clone()
    }

    /// Returns true if any recoverable error carries `label`.
    pub fn has_label(&self, label: Label) -> bool {
        self.state.lock().recovered.iter().any(|rec| rec.has_label(label))
    }
}
