// SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
// SPDX-License-Identifier: Apache-2.0

//! # Container resolver
//!
//! Maps container ids to their id path and location (display-name path).
//!
//! One resolver serves one category of one resource owner for one run. Its cache is
//! an owned map of [`CachedContainer`] values; nothing is shared across runs.
//!
//! [`populate`](ContainerResolver::populate) loads the hierarchy below a category root
//! and resolves every entry. Resolution walks parent links up to
//! [`MAX_ITERATIONS`](crate::config::MAX_ITERATIONS) hops, so cyclic parent
//! references fail instead of recursing forever.
//!
//! The remote hierarchy can change while a run is resolving it. When a parent is
//! missing from the cache it is fetched. After a fetched parent resolves, the child
//! is fetched again and compared with the cached view; a child that moved or was
//! renamed is re-cached and resolved again, and a child of a deleted parent is
//! dropped.
//!
//! ```rust,no_run
//! use suiteback::prelude::*;
//! # async fn example(api: MockSuite) -> Result<(), SyncError> {
//! let errs = Bus::new(false);
//! let mut resolver = ContainerResolver::new(api, "user", Category::Email);
//! resolver.populate("msgfolderroot", &errs).await?;
//! if let Some(id) = resolver.location_in_cache("Inbox/Receipts") {
//!     println!("receipts folder is {id}");
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};

use futures::{FutureExt, future::BoxFuture};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    Result,
    api::{ContainerGetter, ContainersEnumerator},
    config::MAX_ITERATIONS,
    error::SyncError,
    fault::Bus,
    models::{CachedContainer, Container},
    path::{Category, PathBuilder},
};

/// Outcome of resolving one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPath {
    pub id_path: Option<PathBuilder>,
    pub location: Option<PathBuilder>,
    /// True if the container was already in the cache when resolution started.
    pub cached: bool,
    /// True if the container, or one of its ancestors, no longer exists.
    pub deleted: bool,
}

impl ResolvedPath {
    fn deleted(cached: bool) -> Self {
        ResolvedPath {
            cached,
            deleted: true,
            ..Default::default()
        }
    }
}

/// Preview ordering: ranked containers first, excluded containers hidden.
#[derive(Debug, Clone, Default)]
struct Ranking {
    include: Vec<String>,
    exclude: HashSet<String>,
}

/// Per-run container cache with path resolution.
pub struct ContainerResolver<G> {
    getter: G,
    user_id: String,
    category: Category,
    cache: HashMap<String, CachedContainer>,
    ranking: Option<Ranking>,
    cancel: CancellationToken,
}

impl<G> ContainerResolver<G>
where
    G: ContainerGetter + ContainersEnumerator,
{
    pub fn new(getter: G, user_id: &str, category: Category) -> Self {
        ContainerResolver {
            getter,
            user_id: user_id.to_string(),
            category,
            cache: HashMap::new(),
            ranking: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to stop long resolution passes.
    pub fn with_cancel(self, cancel: CancellationToken) -> Self {
        ContainerResolver { cancel, ..self }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Adds a container to the cache. Paths are not computed. Does nothing if the id is
    /// already cached.
    pub fn add_folder(&mut self, cached: CachedContainer) -> Result<()> {
        validate(&cached)?;
        self.cache
            .entry(cached.id().to_string())
            .or_insert(cached);
        Ok(())
    }

    /// Fetches a container. `Ok(None)` means the remote system reports it deleted.
    async fn refresh_container(&self, id: &str) -> Result<Option<CachedContainer>> {
        debug!(container_id = %id, category = %self.category, "refreshing container");
        match self
            .getter
            .get_container_by_id(&self.user_id, self.category, id)
            .await
        {
            Ok(container) => Ok(Some(CachedContainer::new(container))),
            Err(err) if err.is_not_found() => {
                debug!(container_id = %id, "container deleted");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Fetches a container missing from the cache, caches it and resolves it.
    async fn recover_container(&mut self, id: &str, depth: usize) -> Result<ResolvedPath> {
        let Some(fresh) = self.refresh_container(id).await? else {
            debug!(container_id = %id, "uncached container was deleted");
            return Ok(ResolvedPath::deleted(false));
        };
        self.add_folder(fresh)?;
        let resolved = self.id_to_path(id, depth).await?;
        Ok(ResolvedPath {
            cached: false,
            ..resolved
        })
    }

    /// Resolves the id path and location of `id`. `depth` counts parent hops taken so
    /// far; callers start at 0.
    pub fn id_to_path<'a>(
        &'a mut self,
        id: &'a str,
        depth: usize,
    ) -> BoxFuture<'a, Result<ResolvedPath>> {
        async move {
            if depth >= MAX_ITERATIONS {
                return Err(SyncError::PathTooDeep {
                    container_id: id.to_string(),
                    depth,
                });
            }

            let Some(cached) = self.cache.get(id).cloned() else {
                return self.recover_container(id, depth).await;
            };

            if let (Some(id_path), Some(location)) = (cached.path(), cached.location()) {
                return Ok(ResolvedPath {
                    id_path: Some(id_path.clone()),
                    location: Some(location.clone()),
                    cached: true,
                    deleted: false,
                });
            }

            let parent_id = cached.parent_id().map(str::to_string).ok_or_else(|| {
                SyncError::validation(format!("container {id} has no parent and no path"))
            })?;
            let parent = self.id_to_path(&parent_id, depth + 1).await?;

            if !parent.cached {
                debug!(container_id = %id, parent_id = %parent_id, "parent container was refreshed");
                let Some(fresh) = self.refresh_container(id).await? else {
                    debug!(container_id = %id, "refreshing container showed it was deleted");
                    self.cache.remove(id);
                    return Ok(ResolvedPath::deleted(true));
                };

                if fresh.parent_id() != cached.parent_id()
                    || fresh.display_name() != cached.display_name()
                {
                    debug!(container_id = %id, "container changed while resolving, restarting");
                    self.cache.remove(id);
                    self.add_folder(fresh)?;
                    return self.id_to_path(id, depth).await;
                }
            }

            if parent.deleted {
                debug!(container_id = %id, "removing container whose parent was deleted");
                self.cache.remove(id);
                return Ok(ResolvedPath::deleted(true));
            }

            let (Some(parent_path), Some(parent_loc)) = (parent.id_path, parent.location) else {
                return Err(SyncError::NotCached {
                    container_id: parent_id,
                    message: "parent resolved without a path".to_string(),
                });
            };
            let id_path = parent_path.append_one(cached.id());
            let location = parent_loc.append_one(cached.display_name());
            if let Some(entry) = self.cache.get_mut(id) {
                entry.set_paths(id_path.clone(), location.clone());
            }

            Ok(ResolvedPath {
                id_path: Some(id_path),
                location: Some(location),
                cached: true,
                deleted: false,
            })
        }
        .boxed()
    }

    /// Cache-only lookup of a container's id path and location.
    pub fn cached_path(&self, id: &str) -> Result<(PathBuilder, PathBuilder)> {
        let cached = self.cache.get(id).ok_or_else(|| SyncError::NotCached {
            container_id: id.to_string(),
            message: "container not cached".to_string(),
        })?;
        match (cached.path(), cached.location()) {
            (Some(id_path), Some(location)) => Ok((id_path.clone(), location.clone())),
            _ => Err(SyncError::NotCached {
                container_id: id.to_string(),
                message: "cached container has no path".to_string(),
            }),
        }
    }

    /// Id of the cached container whose id path has this string form.
    pub fn path_in_cache(&self, path: &str) -> Option<String> {
        if path.is_empty() {
            return None;
        }
        self.cache
            .values()
            .find(|cached| cached.path().is_some_and(|id_path| id_path.to_string() == path))
            .map(|cached| cached.id().to_string())
    }

    /// Id of the cached container whose location has this string form.
    pub fn location_in_cache(&self, location: &str) -> Option<String> {
        if location.is_empty() {
            return None;
        }
        self.cache
            .values()
            .find(|cached| cached.location().is_some_and(|loc| loc.to_string() == location))
            .map(|cached| cached.id().to_string())
    }

    /// Resolves every cached container. Failures are recorded on a local bus and
    /// resolution continues; the last one is returned as `Ok(Some(err))`. Returns
    /// `Err` on cancellation or when the bus reports a failure.
    pub async fn populate_paths(&mut self, errs: &Bus) -> Result<Option<SyncError>> {
        let el = errs.local();
        let mut last_err = None;

        let mut ids: Vec<String> = self.cache.keys().cloned().collect();
        ids.sort();
        for id in ids {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if let Some(failure) = el.failure() {
                return Err(failure);
            }
            // resolving a sibling may have purged this one
            if !self.cache.contains_key(&id) {
                continue;
            }
            if let Err(err) = self.id_to_path(&id, 0).await {
                el.add_recoverable(err.clone(), &[]);
                last_err = Some(err);
            }
        }
        Ok(last_err)
    }

    /// Loads the hierarchy below `root_id`. The root itself is cached with id path
    /// `[root]` and an empty location.
    pub async fn populate(&mut self, root_id: &str, errs: &Bus) -> Result<()> {
        let root = self
            .getter
            .get_container_by_id(&self.user_id, self.category, root_id)
            .await?;
        if root.id.is_empty() {
            return Err(SyncError::validation(format!("root {root_id} has no id")));
        }
        let root_path = PathBuilder::new().append_one(root.id.clone());
        self.cache.insert(
            root.id.clone(),
            CachedContainer::resolved(root.clone(), root_path, PathBuilder::new()),
        );

        let containers = self
            .getter
            .enumerate_containers(&self.user_id, self.category, &root.id)
            .await?;
        debug!(
            category = %self.category,
            root_id = %root.id,
            count = containers.len(),
            "enumerated containers"
        );

        let el = errs.local();
        for container in containers {
            if let Err(err) = self.add_folder(CachedContainer::new(container)) {
                el.add_recoverable(err, &[]);
            }
        }

        if let Some(err) = self.populate_paths(errs).await? {
            warn!(category = %self.category, error = %err, "some container paths did not resolve");
        }
        Ok(())
    }

    /// Adds a container and resolves it right away.
    pub async fn add_to_cache(&mut self, container: Container) -> Result<()> {
        let id = container.id.clone();
        self.add_folder(CachedContainer::new(container))?;
        self.id_to_path(&id, 0).await?;
        Ok(())
    }

    /// Looks up ranked include and exclude lists, which may use well-known names,
    /// and applies them to [`items`](Self::items) and [`item_by_id`](Self::item_by_id).
    /// Includes win over excludes.
    pub async fn rank(&mut self, include: &[&str], exclude: &[&str]) -> Result<()> {
        let mut ranking = Ranking::default();
        for name in include {
            let container = self
                .getter
                .get_container_by_id(&self.user_id, self.category, name)
                .await?;
            if container.id.is_empty() {
                return Err(SyncError::validation(format!(
                    "ranked include container {name} missing id"
                )));
            }
            ranking.include.push(container.id);
        }
        for name in exclude {
            let container = self
                .getter
                .get_container_by_id(&self.user_id, self.category, name)
                .await?;
            if container.id.is_empty() {
                return Err(SyncError::validation(format!(
                    "exclude container {name} missing id"
                )));
            }
            ranking.exclude.insert(container.id);
        }
        self.ranking = Some(ranking);
        Ok(())
    }

    fn is_excluded(&self, id: &str) -> bool {
        self.ranking
            .as_ref()
            .is_some_and(|rank| rank.exclude.contains(id) && !rank.include.iter().any(|inc| inc == id))
    }

    /// The category root loaded by [`populate`](Self::populate).
    pub fn root(&self) -> Option<&CachedContainer> {
        self.cache
            .values()
            .find(|cached| cached.location().is_some_and(PathBuilder::is_empty))
    }

    pub fn item_by_id(&self, id: &str) -> Option<&CachedContainer> {
        if self.is_excluded(id) {
            return None;
        }
        self.cache.get(id)
    }

    /// Cached containers. Ranked containers come first in rank order; the rest follow
    /// sorted by id.
    pub fn items(&self) -> Vec<CachedContainer> {
        let mut rest: Vec<&CachedContainer> = self.cache.values().collect();
        rest.sort_by(|lhs, rhs| lhs.id().cmp(rhs.id()));

        let Some(ranking) = &self.ranking else {
            return rest.into_iter().cloned().collect();
        };

        let mut res: Vec<CachedContainer> = ranking
            .include
            .iter()
            .filter_map(|id| self.cache.get(id).cloned())
            .collect();
        res.extend(
            rest.into_iter()
                .filter(|cached| !ranking.exclude.contains(cached.id()))
                .filter(|cached| !ranking.include.iter().any(|inc| inc == cached.id()))
                .cloned(),
        );
        res
    }
}

fn validate(cached: &CachedContainer) -> Result<()> {
    if cached.id().is_empty() {
        return Err(SyncError::validation("container has no id"));
    }
    if cached.is_resolved() {
        return Ok(());
    }
    if cached.display_name().is_empty() {
        return Err(SyncError::validation(format!(
            "container {} has no display name",
            cached.id()
        )));
    }
    if cached.parent_id().is_none() {
        return Err(SyncError::validation(format!(
            "container {} has no parent id",
            cached.id()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockSuite};

    const USER: &str = "user1";

    fn tree() -> MockSuite {
        let mock = MockSuite::new();
        mock.add_container(Category::Email, "root", "", None);
        mock.add_alias(Category::Email, "msgfolderroot", "root");
        mock.add_container(Category::Email, "a", "A", Some("root"));
        mock.add_container(Category::Email, "b", "B", Some("a"));
        mock.add_container(Category::Email, "c", "a/c", Some("b"));
        mock
    }

    fn pb(elems: &[&str]) -> PathBuilder {
        PathBuilder::new().append(elems.iter().copied())
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_populate_resolves_all() {
        let mock = tree();
        let errs = Bus::new(false);
        let mut resolver = ContainerResolver::new(mock, USER, Category::Email);
        resolver.populate("msgfolderroot", &errs).await.expect("populate");

        assert_eq!(resolver.len(), 4);
        let (id_path, location) = resolver.cached_path("c").expect("resolved");
        assert_eq!(id_path, pb(&["root", "a", "b", "c"]));
        assert_eq!(location, pb(&["A", "B", "a/c"]));
        assert_eq!(resolver.location_in_cache(r"A/B/a\/c"), Some("c".to_string()));
        assert_eq!(resolver.path_in_cache("root/a"), Some("a".to_string()));
        assert_eq!(resolver.location_in_cache(""), None);
        assert!(errs.recovered().is_empty());

        let (root_path, root_loc) = resolver.cached_path("root").expect("root");
        assert_eq!(root_path, pb(&["root"]));
        assert!(root_loc.is_empty());
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_resolution_is_idempotent() {
        let mut resolver = ContainerResolver::new(tree(), USER, Category::Email);
        resolver
            .populate("msgfolderroot", &Bus::new(false))
            .await
            .expect("populate");

        let first = resolver.id_to_path("b", 0).await.expect("first");
        let second = resolver.id_to_path("b", 0).await.expect("second");
        assert_eq!(first, second);
        assert!(first.cached);
        assert_eq!(first.location, Some(pb(&["A", "B"])));
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_cycle_fails_with_depth_error() {
        let mock = MockSuite::new();
        let mut resolver = ContainerResolver::new(mock, USER, Category::Email);
        resolver
            .add_folder(CachedContainer::new(Container::new("x", "X", Some("y"))))
            .expect("add x");
        resolver
            .add_folder(CachedContainer::new(Container::new("y", "Y", Some("x"))))
            .expect("add y");

        let err = resolver.id_to_path("x", 0).await.expect_err("cycle");
        assert!(matches!(err, SyncError::PathTooDeep { .. }), "{err}");
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_depth_bound_at_limit() {
        let mut resolver = ContainerResolver::new(MockSuite::new(), USER, Category::Email);
        let err = resolver
            .id_to_path("anything", MAX_ITERATIONS)
            .await
            .expect_err("too deep");
        assert!(matches!(err, SyncError::PathTooDeep { depth, .. } if depth == MAX_ITERATIONS));
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_uncached_deleted_is_not_error() {
        let mut resolver = ContainerResolver::new(MockSuite::new(), USER, Category::Email);
        let res = resolver.id_to_path("gone", 0).await.expect("deleted ok");
        assert!(res.deleted);
        assert!(res.id_path.is_none());
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_child_of_deleted_parent_is_purged() {
        let mock = MockSuite::new();
        mock.add_container(Category::Email, "child", "Child", Some("gone-parent"));
        let mut resolver = ContainerResolver::new(mock, USER, Category::Email);
        resolver
            .add_folder(CachedContainer::new(Container::new(
                "child",
                "Child",
                Some("gone-parent"),
            )))
            .expect("add");

        let res = resolver.id_to_path("child", 0).await.expect("resolve");
        assert!(res.deleted);
        assert!(resolver.item_by_id("child").is_none());
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_child_deleted_during_parent_refresh_is_purged() {
        let mock = MockSuite::new();
        mock.add_container(Category::Email, "root", "", None);
        mock.add_container(Category::Email, "p", "P", Some("root"));
        mock.add_container(Category::Email, "child", "Child", Some("p"));
        // the child disappears between the parent fetch and its own refresh
        mock.push_container_response(
            Category::Email,
            "child",
            Err(SyncError::not_found("container", "child")),
        );

        let mut resolver = ContainerResolver::new(mock.clone(), USER, Category::Email);
        resolver
            .add_folder(CachedContainer::resolved(
                Container::new("root", "", None),
                pb(&["root"]),
                PathBuilder::new(),
            ))
            .expect("add root");
        resolver
            .add_folder(CachedContainer::new(Container::new("child", "Child", Some("p"))))
            .expect("add child");

        let res = resolver.id_to_path("child", 0).await.expect("resolve");
        assert!(res.deleted);
        assert!(res.id_path.is_none());
        assert!(resolver.item_by_id("child").is_none());
        assert_eq!(resolver.cached_path("p").expect("parent").1, pb(&["P"]));

        let fetched: Vec<String> = mock
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::GetContainer { id, .. } => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(fetched, vec!["p".to_string(), "child".to_string()]);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_reconciles_moved_and_renamed_container() {
        // "child" was cached under "old-parent", which has since been deleted. The
        // child itself was moved under "root" and renamed.
        let mock = MockSuite::new();
        mock.add_container(Category::Email, "root", "", None);
        mock.add_container(Category::Email, "child", "Renamed", Some("root"));

        let mut resolver = ContainerResolver::new(mock.clone(), USER, Category::Email);
        resolver
            .add_folder(CachedContainer::resolved(
                Container::new("root", "", None),
                pb(&["root"]),
                PathBuilder::new(),
            ))
            .expect("add root");
        resolver
            .add_folder(CachedContainer::new(Container::new(
                "child",
                "Original",
                Some("old-parent"),
            )))
            .expect("add child");

        let res = resolver.id_to_path("child", 0).await.expect("resolve");
        assert!(!res.deleted);
        assert_eq!(res.id_path, Some(pb(&["root", "child"])));
        assert_eq!(res.location, Some(pb(&["Renamed"])));
        assert_eq!(
            resolver.item_by_id("child").map(CachedContainer::display_name),
            Some("Renamed")
        );
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_add_folder_validation() {
        let mut resolver = ContainerResolver::new(MockSuite::new(), USER, Category::Email);
        assert!(
            resolver
                .add_folder(CachedContainer::new(Container::new("", "X", Some("p"))))
                .is_err()
        );
        assert!(
            resolver
                .add_folder(CachedContainer::new(Container::new("a", "", Some("p"))))
                .is_err()
        );
        assert!(
            resolver
                .add_folder(CachedContainer::new(Container::new("a", "A", None)))
                .is_err()
        );
        // a resolved container may omit its name
        resolver
            .add_folder(CachedContainer::resolved(
                Container::new("a", "", None),
                pb(&["a"]),
                PathBuilder::new(),
            ))
            .expect("resolved without name");
        // re-adding is a no-op
        resolver
            .add_folder(CachedContainer::new(Container::new("a", "Other", Some("p"))))
            .expect("noop");
        assert!(resolver.item_by_id("a").is_some_and(CachedContainer::is_resolved));
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_populate_paths_continues_after_error() {
        let mock = tree();
        let mut resolver = ContainerResolver::new(mock, USER, Category::Email);
        let errs = Bus::new(false);
        resolver.populate("msgfolderroot", &errs).await.expect("populate");

        resolver
            .add_folder(CachedContainer::new(Container::new("x", "X", Some("y"))))
            .expect("add x");
        resolver
            .add_folder(CachedContainer::new(Container::new("y", "Y", Some("x"))))
            .expect("add y");
        resolver
            .add_folder(CachedContainer::new(Container::new("d", "D", Some("a"))))
            .expect("add d");

        let last = resolver.populate_paths(&errs).await.expect("no failure");
        assert!(matches!(last, Some(SyncError::PathTooDeep { .. })));
        assert_eq!(errs.recovered().len(), 2);
        assert_eq!(
            resolver.cached_path("d").expect("d resolved").1,
            pb(&["A", "D"])
        );
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_ranked_items() {
        let mock = tree();
        mock.add_alias(Category::Email, "inbox", "b");
        mock.add_alias(Category::Email, "junk", "a");
        let mut resolver = ContainerResolver::new(mock, USER, Category::Email);
        resolver
            .populate("msgfolderroot", &Bus::new(false))
            .await
            .expect("populate");
        resolver.rank(&["inbox"], &["junk"]).await.expect("rank");

        let ids: Vec<String> = resolver.items().iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["b", "c", "root"]);
        assert!(resolver.item_by_id("a").is_none());
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_add_to_cache_resolves() {
        let mock = tree();
        let mut resolver = ContainerResolver::new(mock, USER, Category::Email);
        resolver
            .populate("msgfolderroot", &Bus::new(false))
            .await
            .expect("populate");
        resolver
            .add_to_cache(Container::new("n", "New", Some("a")))
            .await
            .expect("add");
        assert_eq!(resolver.location_in_cache("A/New"), Some("n".to_string()));
    }
}
