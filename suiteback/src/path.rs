// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # Paths
//!
//! Containers are addressed two ways:
//!
//! - an ID path, the ordered ids of a container's ancestors ending with its own id;
//! - a location, the same chain expressed with display names.
//!
//! Both are [`PathBuilder`]s. A builder holds unescaped elements. Its string form joins
//! the elements with `/`, escaping `/` and `\` inside an element with `\`, so
//! `["a/b", "c"]` becomes `a\/b/c`.
//!
//! A [`DataPath`] prefixes a folder builder with tenant, service, resource owner and
//! category: `tenant/exchange/user/email/Inbox/Receipts`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{Result, error::SyncError};

const ESCAPE_CHAR: char = '\\';
const PATH_SEPARATOR: char = '/';

/// Number of hex characters in a [`PathBuilder::short_ref`].
const SHORT_REF_CHARS: usize = 12;

/// Data category handled by the engine.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Email,
    Contacts,
    Events,
}

impl Category {
    /// Human-readable name used in progress and log messages.
    pub fn human_string(self) -> &'static str {
        match self {
            Category::Email => "Emails",
            Category::Contacts => "Contacts",
            Category::Events => "Events",
        }
    }
}

/// Service prefix for data-layer paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Service {
    Exchange,
    #[strum(serialize = "exchangemetadata")]
    ExchangeMetadata,
}

// =============================================================================
// PathBuilder
// =============================================================================

/// Ordered, unescaped path elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathBuilder {
    elements: Vec<String>,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this builder with raw (unescaped) elements appended.
    #[must_use]
    pub fn append<I, S>(&self, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.elements.extend(
            elements
                .into_iter()
                .map(Into::into)
                .filter(|elem: &String| !elem.is_empty()),
        );
        next
    }

    /// Returns a copy with a single raw element appended.
    #[must_use]
    pub fn append_one(&self, element: impl Into<String>) -> Self {
        self.append([element.into()])
    }

    /// Returns a copy with already-escaped elements appended. Each element is
    /// validated and unescaped.
    pub fn unescape_and_append<I, S>(&self, elements: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut next = self.clone();
        for element in elements {
            let element = element.as_ref();
            if element.is_empty() {
                continue;
            }
            validate_escaped_element(element)?;
            next.elements.push(unescape(element));
        }
        Ok(next)
    }

    /// Parses an escaped, `/` separated string into a builder.
    pub fn split_unescape_append(&self, escaped: &str) -> Result<Self> {
        self.unescape_and_append(split(escaped))
    }

    /// Parses a folder path string as written by [`to_folder_string`](Self::to_folder_string).
    /// The string must begin with `/` and contain at least one element.
    pub fn from_folder_string(folder: &str) -> Result<Self> {
        let Some(rest) = folder.strip_prefix(PATH_SEPARATOR) else {
            return Err(SyncError::PathParse {
                path: folder.to_string(),
                message: "folder path must begin with '/'".to_string(),
            });
        };
        let builder = Self::new().split_unescape_append(rest)?;
        if builder.is_empty() {
            return Err(SyncError::PathParse {
                path: folder.to_string(),
                message: "folder path has no elements".to_string(),
            });
        }
        Ok(builder)
    }

    /// Folder string form: `/` followed by the escaped elements.
    pub fn to_folder_string(&self) -> String {
        format!("{PATH_SEPARATOR}{self}")
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Last element, if any.
    pub fn last_elem(&self) -> Option<&str> {
        self.elements.last().map(String::as_str)
    }

    /// First element, if any.
    pub fn head_elem(&self) -> Option<&str> {
        self.elements.first().map(String::as_str)
    }

    /// Returns a copy without the first element.
    #[must_use]
    pub fn pop_front(&self) -> Self {
        Self {
            elements: self.elements.iter().skip(1).cloned().collect(),
        }
    }

    /// Returns a copy without the last element.
    #[must_use]
    pub fn dir(&self) -> Self {
        let mut elements = self.elements.clone();
        elements.pop();
        Self { elements }
    }

    /// Returns true if `prefix` is an element-wise prefix of this builder.
    pub fn has_prefix(&self, prefix: &PathBuilder) -> bool {
        self.elements.starts_with(&prefix.elements)
    }

    /// Short, stable reference to the path: hex prefix of the sha256 of the string form.
    pub fn short_ref(&self) -> String {
        let digest = Sha256::digest(self.to_string().as_bytes());
        let mut out = String::with_capacity(SHORT_REF_CHARS);
        for byte in digest.iter().take(SHORT_REF_CHARS / 2) {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl fmt::Display for PathBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let escaped: Vec<String> = self.elements.iter().map(|elem| escape_element(elem)).collect();
        f.write_str(&escaped.join("/"))
    }
}

impl<S: Into<String>> FromIterator<S> for PathBuilder {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new().append(iter)
    }
}

// =============================================================================
// DataPath
// =============================================================================

/// A fully qualified path for a collection or item in the backup data layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataPath {
    tenant: String,
    service: Service,
    resource_owner: String,
    category: Category,
    folders: PathBuilder,
    item: Option<String>,
}

impl DataPath {
    /// Builds a folder (collection) path. Tenant and resource owner must be non-empty.
    pub fn build(
        tenant: &str,
        resource_owner: &str,
        service: Service,
        category: Category,
        folders: &PathBuilder,
    ) -> Result<Self> {
        if tenant.is_empty() {
            return Err(SyncError::validation("missing tenant"));
        }
        if resource_owner.is_empty() {
            return Err(SyncError::validation("missing resource owner"));
        }
        Ok(Self {
            tenant: tenant.to_string(),
            service,
            resource_owner: resource_owner.to_string(),
            category,
            folders: folders.clone(),
            item: None,
        })
    }

    /// Data path for a collection of exchange data. Requires at least one folder.
    pub fn exchange_folder(
        tenant: &str,
        resource_owner: &str,
        category: Category,
        folders: &PathBuilder,
    ) -> Result<Self> {
        if folders.is_empty() {
            return Err(SyncError::validation("exchange data path requires a folder"));
        }
        Self::build(tenant, resource_owner, Service::Exchange, category, folders)
    }

    /// Data path for the per-category metadata collection.
    pub fn metadata(tenant: &str, resource_owner: &str, category: Category) -> Result<Self> {
        Self::build(
            tenant,
            resource_owner,
            Service::ExchangeMetadata,
            category,
            &PathBuilder::new(),
        )
    }

    /// Parses the string form `tenant/service/owner/category/folders...`.
    pub fn from_data_layer_path(path: &str, is_item: bool) -> Result<Self> {
        let parse_err = |message: &str| SyncError::PathParse {
            path: path.to_string(),
            message: message.to_string(),
        };
        let builder = PathBuilder::new().split_unescape_append(path)?;
        let elems = builder.elements();
        if elems.len() < 4 {
            return Err(parse_err("expected tenant, service, resource owner and category"));
        }
        let service: Service = elems[1]
            .parse()
            .map_err(|_| parse_err("unknown service"))?;
        let category: Category = elems[3]
            .parse()
            .map_err(|_| parse_err("unknown category"))?;
        let mut folders: Vec<String> = elems[4..].to_vec();
        let item = if is_item {
            Some(folders.pop().ok_or_else(|| parse_err("item path has no item"))?)
        } else {
            None
        };
        Ok(Self {
            tenant: elems[0].clone(),
            service,
            resource_owner: elems[2].clone(),
            category,
            folders: folders.into_iter().collect(),
            item,
        })
    }

    /// Returns a copy of this folder path with an item element.
    pub fn append_item(&self, item_id: &str) -> Result<Self> {
        if self.item.is_some() {
            return Err(SyncError::validation("cannot append to an item path"));
        }
        if item_id.is_empty() {
            return Err(SyncError::validation("missing item id"));
        }
        Ok(Self {
            item: Some(item_id.to_string()),
            ..self.clone()
        })
    }

    /// Returns a copy with the folder elements replaced.
    #[must_use]
    pub fn with_folders(&self, folders: &PathBuilder) -> Self {
        Self {
            folders: folders.clone(),
            ..self.clone()
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn resource_owner(&self) -> &str {
        &self.resource_owner
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn folders(&self) -> &PathBuilder {
        &self.folders
    }

    pub fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }

    /// The full path as a builder, prefix included.
    pub fn to_builder(&self) -> PathBuilder {
        let mut builder = PathBuilder::new().append([
            self.tenant.clone(),
            self.service.to_string(),
            self.resource_owner.clone(),
            self.category.to_string(),
        ]);
        builder = builder.append(self.folders.elements().iter().cloned());
        if let Some(item) = &self.item {
            builder = builder.append_one(item.clone());
        }
        builder
    }

    pub fn short_ref(&self) -> String {
        self.to_builder().short_ref()
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_builder())
    }
}

// =============================================================================
// escaping
// =============================================================================

fn needs_escape(ch: char) -> bool {
    ch == ESCAPE_CHAR || ch == PATH_SEPARATOR
}

fn escape_element(element: &str) -> String {
    if !element.chars().any(needs_escape) {
        return element.to_string();
    }
    let mut out = String::with_capacity(element.len() + 4);
    for ch in element.chars() {
        if needs_escape(ch) {
            out.push(ESCAPE_CHAR);
        }
        out.push(ch);
    }
    out
}

fn unescape(element: &str) -> String {
    let mut out = String::with_capacity(element.len());
    let mut prev_was_escape = false;
    for ch in element.chars() {
        if ch == ESCAPE_CHAR && !prev_was_escape {
            prev_was_escape = true;
            continue;
        }
        prev_was_escape = false;
        out.push(ch);
    }
    out
}

fn validate_escaped_element(element: &str) -> Result<()> {
    let bad = |message: String| SyncError::PathParse {
        path: element.to_string(),
        message,
    };
    let mut prev_was_escape = false;
    for ch in element.chars() {
        if prev_was_escape {
            if !needs_escape(ch) {
                return Err(bad(format!("bad escape sequence '{ESCAPE_CHAR}{ch}'")));
            }
            prev_was_escape = false;
            continue;
        }
        if ch == ESCAPE_CHAR {
            prev_was_escape = true;
        } else if ch == PATH_SEPARATOR {
            return Err(bad(format!("unescaped character '{ch}'")));
        }
    }
    if prev_was_escape {
        return Err(bad("trailing escape character".to_string()));
    }
    Ok(())
}

/// Splits an escaped string on unescaped separators. Escape sequences are left in
/// place; empty segments are dropped.
pub fn split(segment: &str) -> Vec<String> {
    let mut res = Vec::new();
    let mut current = String::new();
    let mut prev_was_escape = false;

    for ch in segment.chars() {
        if prev_was_escape {
            current.push(ch);
            prev_was_escape = false;
            continue;
        }
        if ch == ESCAPE_CHAR {
            current.push(ch);
            prev_was_escape = true;
            continue;
        }
        if ch == PATH_SEPARATOR {
            if !current.is_empty() {
                res.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        res.push(current);
    }
    res
}
