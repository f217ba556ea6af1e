// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! Per-category policy: root containers, which containers become collections, and
//! where restored items go.
//!
//! | category | root            | restore destination                  |
//! |----------|-----------------|--------------------------------------|
//! | email    | `msgfolderroot` | destination / original folders       |
//! | contacts | `contacts`      | destination / original folders       |
//! | events   | `calendars`     | destination (calendars do not nest)  |

use crate::{
    Result,
    error::SyncError,
    models::CachedContainer,
    path::{Category, PathBuilder},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryHandler {
    category: Category,
}

impl CategoryHandler {
    pub fn new(category: Category) -> Self {
        CategoryHandler { category }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Well-known id of the container every other container descends from.
    pub fn default_root_container(&self) -> &'static str {
        match self.category {
            Category::Email => "msgfolderroot",
            Category::Contacts => "contacts",
            Category::Events => "calendars",
        }
    }

    /// Returns `id`, or the root container when `id` is empty.
    pub fn or_root_container(&self, id: &str) -> String {
        if id.is_empty() {
            self.default_root_container().to_string()
        } else {
            id.to_string()
        }
    }

    /// Whether the root container holds items of its own.
    pub fn root_holds_items(&self) -> bool {
        self.category == Category::Contacts
    }

    /// Containers backed up first in a preview, in order. Well-known names allowed.
    pub fn preview_include_containers(&self) -> &'static [&'static str] {
        match self.category {
            Category::Email => &["inbox"],
            Category::Contacts | Category::Events => &[],
        }
    }

    /// Containers left out of a preview. Well-known names allowed.
    pub fn preview_exclude_containers(&self) -> &'static [&'static str] {
        match self.category {
            Category::Email => &["deleteditems", "junkemail"],
            Category::Contacts | Category::Events => &[],
        }
    }

    /// Location a container is matched and stored under, or `None` if the container
    /// never forms a collection.
    ///
    /// The mail and calendar roots have an empty location and are skipped. The
    /// contacts root holds contacts directly, so it is stored under its own name.
    pub fn backup_location(&self, cached: &CachedContainer) -> Option<PathBuilder> {
        cached.path()?;
        let location = cached.location()?;
        if !location.is_empty() {
            return Some(location.clone());
        }
        if self.root_holds_items() && !cached.display_name().is_empty() {
            return Some(location.append_one(cached.display_name()));
        }
        None
    }

    /// Folder path, relative to the root, that a collection restores into.
    ///
    /// `destination` may contain nested folders separated by `/`. An empty destination
    /// restores into the original folders.
    pub fn format_restore_destination(
        &self,
        destination: &str,
        folders: &PathBuilder,
    ) -> Result<PathBuilder> {
        let base = PathBuilder::new().split_unescape_append(destination)?;
        let dest = match self.category {
            Category::Email | Category::Contacts => base.append(folders.elements().iter().cloned()),
            Category::Events if base.is_empty() => {
                folders.last_elem().map(|last| base.append_one(last)).unwrap_or_default()
            }
            Category::Events => base,
        };
        if dest.is_empty() {
            return Err(SyncError::validation(format!(
                "no restore destination for {} collection",
                self.category
            )));
        }
        Ok(dest)
    }
}
