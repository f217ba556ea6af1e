// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # Containers and items
//!
//! [`Container`] is the remote view of a mail folder, contact folder or calendar.
//! [`CachedContainer`] adds the id path and location the resolver computes.
//!
//! Item bodies are JSON. The engine reads a few fields from each body to compute
//! collision keys and details records:
//!
//! | category | collision key                               |
//! |----------|---------------------------------------------|
//! | email    | subject, sent time, received time (RFC3339) |
//! | contacts | given name, surname, first email address    |
//! | events   | subject                                     |

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Result,
    error::deserialization_error,
    path::{Category, PathBuilder},
};

/// A container as reported by the remote system.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Container {
    pub fn new(id: &str, display_name: &str, parent_id: Option<&str>) -> Self {
        Container {
            id: id.to_string(),
            display_name: display_name.to_string(),
            parent_id: parent_id.map(str::to_string),
        }
    }

    /// Parent id, treating an empty string as absent.
    pub fn parent(&self) -> Option<&str> {
        self.parent_id.as_deref().filter(|parent| !parent.is_empty())
    }
}

/// A container plus its resolved paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedContainer {
    container: Container,
    id_path: Option<PathBuilder>,
    location: Option<PathBuilder>,
}

impl CachedContainer {
    /// An unresolved entry.
    pub fn new(container: Container) -> Self {
        CachedContainer {
            container,
            id_path: None,
            location: None,
        }
    }

    /// An entry with known paths.
    pub fn resolved(container: Container, id_path: PathBuilder, location: PathBuilder) -> Self {
        CachedContainer {
            container,
            id_path: Some(id_path),
            location: Some(location),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn id(&self) -> &str {
        &self.container.id
    }

    pub fn display_name(&self) -> &str {
        &self.container.display_name
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.container.parent()
    }

    /// The id path, once resolved.
    pub fn path(&self) -> Option<&PathBuilder> {
        self.id_path.as_ref()
    }

    /// The display-name path, once resolved.
    pub fn location(&self) -> Option<&PathBuilder> {
        self.location.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.id_path.is_some()
    }

    pub(crate) fn set_paths(&mut self, id_path: PathBuilder, location: PathBuilder) {
        self.id_path = Some(id_path);
        self.location = Some(location);
    }
}

// ============================================================================
// ITEM BODIES
// ============================================================================

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<EmailAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_date_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

/// Decodes an item body, reporting the json path of any failure.
pub fn parse_item<T: DeserializeOwned>(what: &str, body: &[u8]) -> Result<T> {
    let mut de = serde_json::Deserializer::from_slice(body);
    serde_path_to_error::deserialize(&mut de).map_err(|err| deserialization_error(what, &err))
}

fn rfc3339(dt: Option<&DateTime<Utc>>) -> String {
    dt.map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Computes the collision key for an item body.
pub fn collision_key(category: Category, body: &[u8]) -> Result<String> {
    Ok(match category {
        Category::Email => {
            let msg: Message = parse_item("message", body)?;
            format!(
                "{}{}{}",
                msg.subject,
                rfc3339(msg.sent_date_time.as_ref()),
                rfc3339(msg.received_date_time.as_ref())
            )
        }
        Category::Contacts => {
            let contact: Contact = parse_item("contact", body)?;
            let email = contact
                .email_addresses
                .first()
                .map(|addr| addr.address.as_str())
                .unwrap_or_default();
            format!("{}{}{email}", contact.given_name, contact.surname)
        }
        Category::Events => parse_item::<Event>("event", body)?.subject,
    })
}

/// Category-specific description of a backed up or restored item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemInfo {
    Email {
        subject: String,
        sender: String,
        received: Option<DateTime<Utc>>,
        size: u64,
    },
    Contact {
        name: String,
        size: u64,
    },
    Event {
        subject: String,
        start: Option<DateTime<Utc>>,
        size: u64,
    },
}

impl ItemInfo {
    /// Builds item info from a body.
    pub fn from_body(category: Category, body: &[u8]) -> Result<Self> {
        let size = body.len() as u64;
        Ok(match category {
            Category::Email => {
                let msg: Message = parse_item("message", body)?;
                ItemInfo::Email {
                    subject: msg.subject,
                    sender: msg.from.map(|from| from.address).unwrap_or_default(),
                    received: msg.received_date_time,
                    size,
                }
            }
            Category::Contacts => {
                let contact: Contact = parse_item("contact", body)?;
                let name = [contact.given_name, contact.surname]
                    .into_iter()
                    .filter(|name| !name.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                ItemInfo::Contact { name, size }
            }
            Category::Events => {
                let event: Event = parse_item("event", body)?;
                ItemInfo::Event {
                    subject: event.subject,
                    start: event.start,
                    size,
                }
            }
        })
    }

    pub fn size(&self) -> u64 {
        match self {
            ItemInfo::Email { size, .. }
            | ItemInfo::Contact { size, .. }
            | ItemInfo::Event { size, .. } => *size,
        }
    }
}
