// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! Backup scopes: which category, and which folders within it.
//!
//! Folder filters compare container locations (display-name paths). Filter strings
//! use the escaped path form, so `Inbox/Receipts` names the `Receipts` folder under
//! `Inbox`, and a folder literally named `a/b` is written `a\/b`.
use crate::{
    Result,
    path::{Category, PathBuilder},
};

/// How a scope filters folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderFilter {
    /// Every folder in the category.
    Any,
    /// Folders equal to, or nested under, one of the listed locations.
    Prefix(Vec<PathBuilder>),
    /// Folders exactly equal to one of the listed locations.
    Exact(Vec<PathBuilder>),
}

/// A backup scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub category: Category,
    pub folders: FolderFilter,
}

impl Scope {
    /// Scope selecting every folder in the category.
    pub fn all(category: Category) -> Self {
        Scope {
            category,
            folders: FolderFilter::Any,
        }
    }

    /// Scope selecting the listed folders and everything below them.
    pub fn folders<I, S>(category: Category, folders: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Scope {
            category,
            folders: FolderFilter::Prefix(parse_folders(folders)?),
        })
    }

    /// Scope selecting only the listed folders.
    pub fn exact_folders<I, S>(category: Category, folders: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Scope {
            category,
            folders: FolderFilter::Exact(parse_folders(folders)?),
        })
    }

    /// Returns true if a container at `location` is selected.
    pub fn matches(&self, location: &PathBuilder) -> bool {
        match &self.folders {
            FolderFilter::Any => true,
            FolderFilter::Prefix(targets) => targets
                .iter()
                .any(|target| !location.is_empty() && location.has_prefix(target)),
            FolderFilter::Exact(targets) => targets.iter().any(|target| target == location),
        }
    }
}

fn parse_folders<I, S>(folders: I) -> Result<Vec<PathBuilder>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    folders
        .into_iter()
        .map(|folder| PathBuilder::new().split_unescape_append(folder.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(elems: &[&str]) -> PathBuilder {
        PathBuilder::new().append(elems.iter().copied())
    }

    #[test]
    fn test_prefix_matches_subfolders() {
        let scope = Scope::folders(Category::Email, ["Inbox"]).expect("scope");
        assert!(scope.matches(&loc(&["Inbox"])));
        assert!(scope.matches(&loc(&["Inbox", "Receipts"])));
        assert!(!scope.matches(&loc(&["Archive"])));
        assert!(!scope.matches(&loc(&["Inboxes"])));
    }

    #[test]
    fn test_exact_and_escaped() {
        let scope = Scope::exact_folders(Category::Email, ["A/C", r"x\/y"]).expect("scope");
        assert!(scope.matches(&loc(&["A", "C"])));
        assert!(!scope.matches(&loc(&["A"])));
        assert!(!scope.matches(&loc(&["A", "C", "D"])));
        assert!(scope.matches(&loc(&["x/y"])));
    }

    #[test]
    fn test_all_matches_everything() {
        let scope = Scope::all(Category::Events);
        assert!(scope.matches(&loc(&[])));
        assert!(scope.matches(&loc(&["Calendar"])));
    }

    #[test]
    fn test_bad_filter_rejected() {
        assert!(Scope::folders(Category::Contacts, [r"bad\"]).is_err());
    }
}
