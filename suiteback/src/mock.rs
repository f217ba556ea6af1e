// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! In-memory collaborator for tests.
//!
//! [`MockSuite`] implements every collaborator trait over an in-memory hierarchy of
//! containers and items. Clones share state, so a test can hand one clone to the
//! engine and inspect or mutate the hierarchy through another.
//!
//! Delta cursors have the form `<container id>@<version>`. Every item change bumps
//! the container version. A cursor that is empty, malformed, or from another
//! container yields a full listing with `reset` set.
//!
//! Every call is appended to a log ([`MockSuite::calls`]) so tests can assert ordering.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    future::{Future, ready},
    sync::Arc,
};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    Result,
    api::{
        AddedAndRemoved, CallConfig, ContainerByNamer, ContainerCreator, ContainerGetter,
        ContainersEnumerator, DeltaUpdate, ItemEnumerator, ItemGetter, ItemLister, ItemPoster,
    },
    error::SyncError,
    models::Container,
    path::Category,
};

type Key = (Category, String);

fn key(category: Category, id: &str) -> Key {
    (category, id.to_string())
}

/// A call received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    GetContainer {
        category: Category,
        id: String,
    },
    EnumerateContainers {
        category: Category,
        base_id: String,
    },
    ItemDelta {
        category: Category,
        container_id: String,
        prev_delta: String,
    },
    GetItem {
        category: Category,
        item_id: String,
    },
    CreateContainer {
        category: Category,
        parent_id: String,
        name: String,
    },
    GetContainerByName {
        category: Category,
        parent_id: String,
        name: String,
    },
    PostItem {
        category: Category,
        container_id: String,
        new_id: String,
    },
    DeleteItem {
        category: Category,
        item_id: String,
    },
    ListItems {
        category: Category,
        container_id: String,
    },
}

#[derive(Debug, Clone)]
enum Change {
    Added(String),
    Removed(String),
}

#[derive(Debug, Clone)]
struct MockContainer {
    container: Container,
    version: u64,
    changes: Vec<(u64, Change)>,
}

impl MockContainer {
    fn token(&self) -> String {
        format!("{}@{}", self.container.id, self.version)
    }

    fn record(&mut self, change: Change) {
        self.version += 1;
        self.changes.push((self.version, change));
    }
}

#[derive(Debug, Clone)]
struct MockItem {
    container_id: String,
    body: Bytes,
}

#[derive(Debug, Default)]
struct MockState {
    containers: HashMap<Key, MockContainer>,
    aliases: HashMap<Key, String>,
    items: HashMap<Key, MockItem>,
    scripted_containers: HashMap<Key, VecDeque<Result<Container>>>,
    scripted_deltas: HashMap<Key, AddedAndRemoved>,
    delta_failures: HashMap<Key, SyncError>,
    item_failures: HashMap<Key, SyncError>,
    delete_failures: HashMap<Key, SyncError>,
    post_failures: HashMap<Key, SyncError>,
    create_conflicts: HashSet<Key>,
    calls: Vec<MockCall>,
    next_id: u64,
}

impl MockState {
    fn resolve(&self, category: Category, id: &str) -> String {
        self.aliases
            .get(&key(category, id))
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn new_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn child_by_name(&self, category: Category, parent_id: &str, name: &str) -> Option<Container> {
        self.containers
            .iter()
            .filter(|((cat, _), _)| *cat == category)
            .map(|(_, entry)| &entry.container)
            .find(|entry| entry.parent() == Some(parent_id) && entry.display_name == name)
            .cloned()
    }

    fn items_in(&self, category: Category, container_id: &str) -> Vec<(String, Bytes)> {
        let mut items: Vec<(String, Bytes)> = self
            .items
            .iter()
            .filter(|((cat, _), item)| *cat == category && item.container_id == container_id)
            .map(|((_, id), item)| (id.clone(), item.body.clone()))
            .collect();
        items.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));
        items
    }

    fn full_listing(&self, category: Category, container_id: &str) -> AddedAndRemoved {
        AddedAndRemoved {
            added: self
                .items_in(category, container_id)
                .into_iter()
                .map(|(id, _)| (id, None))
                .collect(),
            ..Default::default()
        }
    }
}

/// In-memory remote system. Cloning shares state.
#[derive(Debug, Clone, Default)]
pub struct MockSuite {
    state: Arc<Mutex<MockState>>,
}

impl MockSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock with a root container for every category, reachable through the
    /// well-known root names.
    pub fn with_roots() -> Self {
        let mock = Self::new();
        for (category, id, alias, name) in [
            (Category::Email, "root-mail", "msgfolderroot", "Top of Information Store"),
            (Category::Contacts, "root-contacts", "contacts", "Contacts"),
            (Category::Events, "root-calendars", "calendars", "Calendars"),
        ] {
            mock.add_container(category, id, name, None);
            mock.add_alias(category, alias, id);
        }
        mock
    }

    // ------------------------------------------------------------------------
    // setup
    // ------------------------------------------------------------------------

    pub fn add_container(&self, category: Category, id: &str, name: &str, parent: Option<&str>) {
        self.state.lock().containers.insert(
            key(category, id),
            MockContainer {
                container: Container::new(id, name, parent),
                version: 0,
                changes: Vec::new(),
            },
        );
    }

    /// Makes `alias` (e.g. `inbox`) resolve to container `id`.
    pub fn add_alias(&self, category: Category, alias: &str, id: &str) {
        self.state
            .lock()
            .aliases
            .insert(key(category, alias), id.to_string());
    }

    pub fn move_container(&self, category: Category, id: &str, new_parent: &str) {
        if let Some(entry) = self.state.lock().containers.get_mut(&key(category, id)) {
            entry.container.parent_id = Some(new_parent.to_string());
        }
    }

    pub fn rename_container(&self, category: Category, id: &str, name: &str) {
        if let Some(entry) = self.state.lock().containers.get_mut(&key(category, id)) {
            entry.container.display_name = name.to_string();
        }
    }

    /// Removes a container and its items. Child containers are left in place.
    pub fn delete_container(&self, category: Category, id: &str) {
        let mut state = self.state.lock();
        state.containers.remove(&key(category, id));
        state
            .items
            .retain(|(cat, _), item| !(*cat == category && item.container_id == id));
    }

    pub fn add_item(&self, category: Category, container_id: &str, item_id: &str, body: &str) {
        let mut state = self.state.lock();
        state.items.insert(
            key(category, item_id),
            MockItem {
                container_id: container_id.to_string(),
                body: Bytes::from(body.to_string()),
            },
        );
        if let Some(entry) = state.containers.get_mut(&key(category, container_id)) {
            entry.record(Change::Added(item_id.to_string()));
        }
    }

    pub fn remove_item(&self, category: Category, item_id: &str) {
        let mut state = self.state.lock();
        if let Some(item) = state.items.remove(&key(category, item_id))
            && let Some(entry) = state.containers.get_mut(&key(category, &item.container_id))
        {
            entry.record(Change::Removed(item_id.to_string()));
        }
    }

    // ------------------------------------------------------------------------
    // scripted behavior
    // ------------------------------------------------------------------------

    /// Queues a response for the next `get_container_by_id` of `id`. Queued
    /// responses are used before the stored hierarchy.
    pub fn push_container_response(&self, category: Category, id: &str, res: Result<Container>) {
        self.state
            .lock()
            .scripted_containers
            .entry(key(category, id))
            .or_default()
            .push_back(res);
    }

    /// Returns `aar` from the next delta query of `container_id`.
    pub fn script_delta(&self, category: Category, container_id: &str, aar: AddedAndRemoved) {
        self.state
            .lock()
            .scripted_deltas
            .insert(key(category, container_id), aar);
    }

    /// Makes every delta query of `container_id` fail with `err`.
    pub fn fail_delta(&self, category: Category, container_id: &str, err: SyncError) {
        self.state
            .lock()
            .delta_failures
            .insert(key(category, container_id), err);
    }

    /// Makes every fetch of `item_id` fail with `err`.
    pub fn fail_item(&self, category: Category, item_id: &str, err: SyncError) {
        self.state
            .lock()
            .item_failures
            .insert(key(category, item_id), err);
    }

    /// Makes every delete of `item_id` fail with `err`.
    pub fn fail_delete(&self, category: Category, item_id: &str, err: SyncError) {
        self.state
            .lock()
            .delete_failures
            .insert(key(category, item_id), err);
    }

    /// Makes every post into `container_id` fail with `err`.
    pub fn fail_post(&self, category: Category, container_id: &str, err: SyncError) {
        self.state
            .lock()
            .post_failures
            .insert(key(category, container_id), err);
    }

    /// The next create of a container named `name` succeeds remotely but reports a
    /// conflict to the caller.
    pub fn conflict_on_create(&self, category: Category, name: &str) {
        self.state
            .lock()
            .create_conflicts
            .insert(key(category, name));
    }

    // ------------------------------------------------------------------------
    // inspection
    // ------------------------------------------------------------------------

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn container(&self, category: Category, id: &str) -> Option<Container> {
        let state = self.state.lock();
        let id = state.resolve(category, id);
        state
            .containers
            .get(&key(category, &id))
            .map(|entry| entry.container.clone())
    }

    pub fn child_by_name(&self, category: Category, parent_id: &str, name: &str) -> Option<Container> {
        let state = self.state.lock();
        let parent_id = state.resolve(category, parent_id);
        state.child_by_name(category, &parent_id, name)
    }

    pub fn items_in(&self, category: Category, container_id: &str) -> Vec<(String, Bytes)> {
        self.state.lock().items_in(category, container_id)
    }

    /// Current delta cursor for a container.
    pub fn delta_token(&self, category: Category, container_id: &str) -> Option<String> {
        self.state
            .lock()
            .containers
            .get(&key(category, container_id))
            .map(MockContainer::token)
    }

    // ------------------------------------------------------------------------
    // collaborator behavior
    // ------------------------------------------------------------------------

    fn get_container(&self, category: Category, id: &str) -> Result<Container> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::GetContainer {
            category,
            id: id.to_string(),
        });
        if let Some(res) = state
            .scripted_containers
            .get_mut(&key(category, id))
            .and_then(VecDeque::pop_front)
        {
            return res;
        }
        let real = state.resolve(category, id);
        state
            .containers
            .get(&key(category, &real))
            .map(|entry| entry.container.clone())
            .ok_or_else(|| SyncError::not_found("container", id))
    }

    fn enumerate(&self, category: Category, base_id: &str) -> Result<Vec<Container>> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::EnumerateContainers {
            category,
            base_id: base_id.to_string(),
        });
        let base = state.resolve(category, base_id);
        if !state.containers.contains_key(&key(category, &base)) {
            return Err(SyncError::not_found("container", base_id));
        }

        let mut found = Vec::new();
        let mut queue = VecDeque::from([base]);
        while let Some(parent) = queue.pop_front() {
            let mut children: Vec<Container> = state
                .containers
                .iter()
                .filter(|((cat, _), entry)| {
                    *cat == category && entry.container.parent() == Some(parent.as_str())
                })
                .map(|(_, entry)| entry.container.clone())
                .collect();
            children.sort_by(|lhs, rhs| lhs.id.cmp(&rhs.id));
            for child in children {
                if found.iter().any(|entry: &Container| entry.id == child.id) {
                    continue;
                }
                queue.push_back(child.id.clone());
                found.push(child);
            }
        }
        Ok(found)
    }

    fn delta(
        &self,
        category: Category,
        container_id: &str,
        prev_delta: &str,
        config: CallConfig,
    ) -> Result<AddedAndRemoved> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::ItemDelta {
            category,
            container_id: container_id.to_string(),
            prev_delta: prev_delta.to_string(),
        });
        let container_key = key(category, container_id);
        if let Some(err) = state.delta_failures.get(&container_key) {
            return Err(err.clone());
        }
        if let Some(aar) = state.scripted_deltas.remove(&container_key) {
            return Ok(aar);
        }
        let Some(container) = state.containers.get(&container_key) else {
            return Err(SyncError::not_found("container", container_id));
        };

        let mut aar = if !config.can_make_delta_queries {
            AddedAndRemoved {
                du: DeltaUpdate {
                    url: String::new(),
                    reset: true,
                },
                ..state.full_listing(category, container_id)
            }
        } else {
            let since = prev_delta
                .rsplit_once('@')
                .filter(|(id, _)| *id == container_id)
                .and_then(|(_, version)| version.parse::<u64>().ok())
                .filter(|version| *version <= container.version);
            match since {
                Some(since) => {
                    let mut net: HashMap<String, bool> = HashMap::new();
                    let changes = container
                        .changes
                        .iter()
                        .filter(|(version, _)| *version > since);
                    for (_, change) in changes {
                        match change {
                            Change::Added(id) => net.insert(id.clone(), true),
                            Change::Removed(id) => net.insert(id.clone(), false),
                        };
                    }
                    let mut aar = AddedAndRemoved {
                        du: DeltaUpdate {
                            url: container.token(),
                            reset: false,
                        },
                        ..Default::default()
                    };
                    for (id, present) in net {
                        if present && state.items.contains_key(&key(category, &id)) {
                            aar.added.insert(id, None);
                        } else {
                            aar.removed.push(id);
                        }
                    }
                    aar.removed.sort();
                    aar
                }
                None => AddedAndRemoved {
                    du: DeltaUpdate {
                        url: container.token(),
                        reset: true,
                    },
                    ..state.full_listing(category, container_id)
                },
            }
        };

        if config.limit_results > 0 && aar.added.len() > config.limit_results {
            let mut ids: Vec<String> = aar.added.keys().cloned().collect();
            ids.sort();
            for id in ids.into_iter().skip(config.limit_results) {
                aar.added.remove(&id);
            }
        }
        Ok(aar)
    }

    fn get_item_body(&self, category: Category, item_id: &str) -> Result<Bytes> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::GetItem {
            category,
            item_id: item_id.to_string(),
        });
        let item_key = key(category, item_id);
        if let Some(err) = state.item_failures.get(&item_key) {
            return Err(err.clone());
        }
        state
            .items
            .get(&item_key)
            .map(|item| item.body.clone())
            .ok_or_else(|| SyncError::not_found("item", item_id))
    }

    fn create(&self, category: Category, parent_id: &str, name: &str) -> Result<Container> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::CreateContainer {
            category,
            parent_id: parent_id.to_string(),
            name: name.to_string(),
        });
        let parent = state.resolve(category, parent_id);
        if !state.containers.contains_key(&key(category, &parent)) {
            return Err(SyncError::not_found("container", parent_id));
        }
        if state.child_by_name(category, &parent, name).is_some() {
            return Err(SyncError::already_exists("container", name));
        }

        let id = state.new_id("folder");
        let container = Container::new(&id, name, Some(&parent));
        state.containers.insert(
            key(category, &id),
            MockContainer {
                container: container.clone(),
                version: 0,
                changes: Vec::new(),
            },
        );
        if state.create_conflicts.remove(&key(category, name)) {
            return Err(SyncError::already_exists("container", name));
        }
        Ok(container)
    }

    fn by_name(&self, category: Category, parent_id: &str, name: &str) -> Result<Container> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::GetContainerByName {
            category,
            parent_id: parent_id.to_string(),
            name: name.to_string(),
        });
        let parent = state.resolve(category, parent_id);
        state
            .child_by_name(category, &parent, name)
            .ok_or_else(|| SyncError::not_found("container", name))
    }

    fn post(&self, category: Category, container_id: &str, body: Bytes) -> Result<String> {
        let mut state = self.state.lock();
        let container_id = state.resolve(category, container_id);
        let container_key = key(category, &container_id);
        if !state.containers.contains_key(&container_key) {
            return Err(SyncError::not_found("container", container_id));
        }
        if let Some(err) = state.post_failures.get(&container_key) {
            return Err(err.clone());
        }
        let id = state.new_id("item");
        state.items.insert(
            key(category, &id),
            MockItem {
                container_id: container_id.clone(),
                body,
            },
        );
        if let Some(entry) = state.containers.get_mut(&container_key) {
            entry.record(Change::Added(id.clone()));
        }
        state.calls.push(MockCall::PostItem {
            category,
            container_id,
            new_id: id.clone(),
        });
        Ok(id)
    }

    fn delete(&self, category: Category, item_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::DeleteItem {
            category,
            item_id: item_id.to_string(),
        });
        let item_key = key(category, item_id);
        if let Some(err) = state.delete_failures.get(&item_key) {
            return Err(err.clone());
        }
        let item = state
            .items
            .remove(&item_key)
            .ok_or_else(|| SyncError::not_found("item", item_id))?;
        if let Some(entry) = state
            .containers
            .get_mut(&key(category, &item.container_id))
        {
            entry.record(Change::Removed(item_id.to_string()));
        }
        Ok(())
    }

    fn list(&self, category: Category, container_id: &str) -> Result<Vec<(String, Bytes)>> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::ListItems {
            category,
            container_id: container_id.to_string(),
        });
        let container_id = state.resolve(category, container_id);
        if !state.containers.contains_key(&key(category, &container_id)) {
            return Err(SyncError::not_found("container", container_id));
        }
        Ok(state.items_in(category, &container_id))
    }
}

impl ContainerGetter for MockSuite {
    fn get_container_by_id(
        &self,
        _user_id: &str,
        category: Category,
        container_id: &str,
    ) -> impl Future<Output = Result<Container>> + Send {
        ready(self.get_container(category, container_id))
    }
}

impl ContainersEnumerator for MockSuite {
    fn enumerate_containers(
        &self,
        _user_id: &str,
        category: Category,
        base_id: &str,
    ) -> impl Future<Output = Result<Vec<Container>>> + Send {
        ready(self.enumerate(category, base_id))
    }
}

impl ItemEnumerator for MockSuite {
    fn get_added_and_removed_item_ids(
        &self,
        _user_id: &str,
        category: Category,
        container_id: &str,
        prev_delta: &str,
        config: CallConfig,
    ) -> impl Future<Output = Result<AddedAndRemoved>> + Send {
        ready(self.delta(category, container_id, prev_delta, config))
    }
}

impl ItemGetter for MockSuite {
    fn get_item(
        &self,
        _user_id: &str,
        category: Category,
        item_id: &str,
    ) -> impl Future<Output = Result<Bytes>> + Send {
        ready(self.get_item_body(category, item_id))
    }
}

impl ContainerCreator for MockSuite {
    fn create_container(
        &self,
        _user_id: &str,
        category: Category,
        parent_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Container>> + Send {
        ready(self.create(category, parent_id, name))
    }
}

impl ContainerByNamer for MockSuite {
    fn get_container_by_name(
        &self,
        _user_id: &str,
        category: Category,
        parent_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Container>> + Send {
        ready(self.by_name(category, parent_id, name))
    }
}

impl ItemPoster for MockSuite {
    fn post_item(
        &self,
        _user_id: &str,
        category: Category,
        container_id: &str,
        body: Bytes,
    ) -> impl Future<Output = Result<String>> + Send {
        ready(self.post(category, container_id, body))
    }

    fn delete_item(
        &self,
        _user_id: &str,
        category: Category,
        item_id: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        ready(self.delete(category, item_id))
    }
}

impl ItemLister for MockSuite {
    fn list_items(
        &self,
        _user_id: &str,
        category: Category,
        container_id: &str,
    ) -> impl Future<Output = Result<Vec<(String, Bytes)>>> + Send {
        ready(self.list(category, container_id))
    }
}
