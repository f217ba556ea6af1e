// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! Run counters.
//!
//! A [`Counter`] is shared by every layer of a run. [`Counter::local`] returns a child
//! whose increments are also applied to the parent, so per-container tallies and run
//! totals come from the same calls.
use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

/// Counted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum CountKey {
    // backup
    Collections,
    Tombstones,
    SkippedContainers,
    PrevDeltas,
    NewDeltas,
    NewPrevPaths,
    MissingDelta,
    BadPrevPath,
    ItemsAdded,
    ItemsRemoved,
    ItemsDeletedInFlight,
    // restore
    ItemsRestored,
    ItemsSkipped,
    ItemsReplaced,
    ItemsFailed,
    CollisionIndexes,
}

/// Shared, hierarchical counter set. Cloning shares the same values.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    values: Arc<Mutex<HashMap<CountKey, i64>>>,
    parent: Option<Arc<Counter>>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child counter that also increments this one.
    pub fn local(&self) -> Counter {
        Counter {
            values: Arc::new(Mutex::new(HashMap::new())),
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn inc(&self, key: CountKey) {
        self.add(key, 1);
    }

    pub fn add(&self, key: CountKey, n: i64) {
        *self.values.lock().entry(key).or_default() += n;
        if let Some(parent) = &self.parent {
            parent.add(key, n);
        }
    }

    pub fn get(&self, key: CountKey) -> i64 {
        self.values.lock().get(&key).copied().unwrap_or_default()
    }

    /// Non-zero values, by counter name.
    pub fn totals(&self) -> Vec<(CountKey, i64)> {
        let values = self.values.lock();
        CountKey::iter()
            .filter_map(|key| {
                values
                    .get(&key)
                    .copied()
                    .filter(|value| *value != 0)
                    .map(|value| (key, value))
            })
            .collect()
    }
}
