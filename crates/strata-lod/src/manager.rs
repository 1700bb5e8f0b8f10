//! Per-frame tile lifecycle state machine.
//!
//! Each call to [`TileManager::load_tiles`] runs five phases on the calling
//! thread:
//!
//! 1. drain: apply worker completions that arrived since the last frame,
//! 2. mark: assume every tracked node is no longer needed,
//! 3. visit: walk the traversal and keep what it yields,
//! 4. protect: keep the nearest visible ancestor of anything still loading,
//! 5. apply: drop what is still marked, then issue loads best-first.
//!
//! All deletion decisions are final before the first load or cancel is
//! issued.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use strata_cache::{Buffer, CacheKey, TileCache};
use strata_spatial::{Camera, GridAddress, NodeKey, Refine, Tree};
use strata_worker::{
    Completion, ContentFetcher, FetchError, Outcome, PoolConfig, PoolError, TileRequest, WorkerPool,
};
use tracing::{debug, trace, warn};

use crate::{Residency, TileStatus, TraversalBudget, Traverser};

/// Receives content as nodes become resident and leave again.
pub trait Renderer {
    /// `key` became visible with `content`.
    fn attach(&mut self, key: NodeKey, content: &Buffer);
    /// `key` is no longer resident; release anything built from its content.
    fn detach(&mut self, key: NodeKey);
}

impl Renderer for () {
    fn attach(&mut self, _key: NodeKey, _content: &Buffer) {}
    fn detach(&mut self, _key: NodeKey) {}
}

/// Manager construction parameters.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Worker pool settings.
    pub pool: PoolConfig,
    /// Cache namespace for this dataset's payloads.
    pub namespace: String,
    /// Cache collection for this dataset's payloads.
    pub collection: String,
    /// Serve loads from the cache when possible: the memory tier is checked on
    /// the frame thread, storage on the worker before fetching.
    pub read_cache: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            namespace: "tiles".to_string(),
            collection: "default".to_string(),
            read_cache: true,
        }
    }
}

/// Counters for one [`TileManager::load_tiles`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Nodes yielded by the traversal.
    pub visited: usize,
    /// Fetches handed to the worker pool.
    pub dispatched: usize,
    /// Loads satisfied from the in-memory cache tier without a dispatch.
    pub cache_hits: usize,
    /// Wanted loads postponed because the pool was saturated.
    pub deferred: usize,
    /// Visible nodes detached from the renderer.
    pub evicted: usize,
    /// In-flight fetches cancelled.
    pub cancelled: usize,
    /// Fetched payloads that became visible during the drain phase.
    pub completed: usize,
    /// Fetches that failed during the drain phase.
    pub failed: usize,
    /// Completions discarded as stale during the drain phase.
    pub stale: usize,
    /// Visible nodes at the end of the frame.
    pub resident: usize,
    /// Loading nodes at the end of the frame.
    pub loading: usize,
}

/// Drives a [`Tree`] towards the resident set a camera needs.
///
/// Owns the worker pool that fetches payloads and the tracking state of every
/// node the traversal has touched. Single-threaded: call
/// [`load_tiles`](Self::load_tiles) once per frame from the render loop.
pub struct TileManager<R: Renderer> {
    tree: Tree,
    renderer: R,
    pool: WorkerPool,
    cache: Arc<dyn TileCache>,
    traverser: Traverser,
    tiles: FxHashMap<NodeKey, TileStatus>,
    failed: FxHashSet<NodeKey>,
    namespace: Arc<str>,
    collection: Arc<str>,
    read_cache: bool,
    next_nonce: u64,
    frame: u64,
    last_frame: FrameStats,
}

impl<R: Renderer> TileManager<R> {
    /// Create a manager streaming `tree` into `renderer`.
    ///
    /// Fetches run on a new pool built from `config.pool`; `cache` serves
    /// reads before fetching and receives every fetched payload.
    pub fn new(
        tree: Tree,
        renderer: R,
        fetcher: Arc<dyn ContentFetcher>,
        cache: Arc<dyn TileCache>,
        config: ManagerConfig,
    ) -> Result<Self, PoolError> {
        let pool = WorkerPool::new(config.pool, fetcher, Arc::clone(&cache))?;
        Ok(Self {
            tree,
            renderer,
            pool,
            cache,
            traverser: Traverser::new(),
            tiles: FxHashMap::default(),
            failed: FxHashSet::default(),
            namespace: config.namespace.into(),
            collection: config.collection.into(),
            read_cache: config.read_cache,
            next_nonce: 0,
            frame: 0,
            last_frame: FrameStats::default(),
        })
    }

    /// Run one frame pass for `camera` and return its counters.
    pub fn load_tiles(&mut self, camera: &Camera, budget: &TraversalBudget) -> FrameStats {
        self.frame += 1;
        let mut stats = FrameStats {
            frame: self.frame,
            ..FrameStats::default()
        };

        for completion in self.pool.pump() {
            self.route(completion, &mut stats);
        }

        for status in self.tiles.values_mut() {
            status.mark();
        }

        // Visit. Loads are issued later in this order, best score first.
        let mut load_order = Vec::new();
        let mut replacing = Vec::new();
        let mut failed_visits = Vec::new();
        self.traverser.reset(&self.tree, camera);
        while let Some(visit) = self.traverser.next_visit(&self.tree, camera, budget) {
            stats.visited += 1;
            if self.failed.contains(&visit.key) {
                failed_visits.push(visit.key);
                continue;
            }
            let status = self.tiles.entry(visit.key).or_insert_with(TileStatus::new);
            status.visit();
            if status.is_visible() {
                if self
                    .tree
                    .get(visit.key)
                    .is_some_and(|node| node.refine == Refine::Replace)
                {
                    replacing.push(visit.key);
                }
            } else if status.is_pending_load() {
                load_order.push(visit.key);
            }
        }
        let mut coverage = FxHashMap::default();
        let mut superseded = Vec::new();
        for key in replacing {
            self.replaced_ancestors(key, camera, &mut coverage, &mut superseded);
        }
        for key in superseded {
            if let Some(status) = self.tiles.get_mut(&key) {
                status.supersede();
            }
        }

        self.protect(&failed_visits);
        self.apply(&load_order, &mut stats);

        stats.resident = self.tiles.values().filter(|s| s.is_visible()).count();
        stats.loading = self.loading_len();
        debug!(
            frame = stats.frame,
            visited = stats.visited,
            dispatched = stats.dispatched,
            cache_hits = stats.cache_hits,
            deferred = stats.deferred,
            evicted = stats.evicted,
            cancelled = stats.cancelled,
            resident = stats.resident,
            loading = stats.loading,
            "frame"
        );
        self.last_frame = stats;
        stats
    }

    /// Collect the ancestors of a visible `key` that its visible relatives
    /// fully replace, stopping at the first ancestor that refines additively.
    fn replaced_ancestors(
        &self,
        key: NodeKey,
        camera: &Camera,
        coverage: &mut FxHashMap<NodeKey, bool>,
        out: &mut Vec<NodeKey>,
    ) {
        for ancestor in self.tree.ancestors(key) {
            if ancestor.refine == Refine::Add {
                break;
            }
            if self.tiles.contains_key(&ancestor.key) && self.children_cover(ancestor.key, camera, coverage) {
                out.push(ancestor.key);
            }
        }
    }

    /// Whether every in-view child of a replacing `key` is drawn this frame,
    /// by itself or by its own replacing children.
    fn children_cover(&self, key: NodeKey, camera: &Camera, coverage: &mut FxHashMap<NodeKey, bool>) -> bool {
        let Some(node) = self.tree.get(key) else {
            return false;
        };
        if node.refine != Refine::Replace || node.is_leaf() {
            return false;
        }
        node.children().iter().all(|&child| {
            let in_view = self
                .tree
                .get(child)
                .is_some_and(|child| child.intersects_frustum(camera));
            !in_view || self.covers(child, camera, coverage)
        })
    }

    /// Memoised per frame. Only nodes visited this frame can cover anything.
    fn covers(&self, key: NodeKey, camera: &Camera, coverage: &mut FxHashMap<NodeKey, bool>) -> bool {
        if let Some(&known) = coverage.get(&key) {
            return known;
        }
        let covered = match self.tiles.get(&key) {
            Some(status) if !status.is_evicted() => {
                status.is_visible() || self.children_cover(key, camera, coverage)
            }
            _ => false,
        };
        coverage.insert(key, covered);
        covered
    }

    /// Keep the nearest visible ancestor of every node that is wanted but not
    /// yet visible, so its region never goes empty.
    fn protect(&mut self, failed_visits: &[NodeKey]) {
        let waiting: Vec<NodeKey> = self
            .tiles
            .iter()
            .filter(|(_, s)| !s.is_pending_delete() && (s.is_pending_load() || s.is_loading()))
            .map(|(key, _)| *key)
            .chain(failed_visits.iter().copied())
            .collect();
        for key in waiting {
            for ancestor in self.tree.ancestors(key) {
                if ancestor.refine != Refine::Replace {
                    break;
                }
                if let Some(status) = self.tiles.get_mut(&ancestor.key)
                    && status.is_visible()
                {
                    status.retain_as_placeholder();
                    break;
                }
            }
        }
    }

    fn apply(&mut self, load_order: &[NodeKey], stats: &mut FrameStats) {
        let doomed: Vec<NodeKey> = self
            .tiles
            .iter()
            .filter(|(_, s)| s.is_pending_delete())
            .map(|(key, _)| *key)
            .collect();
        for key in doomed {
            let Some(status) = self.tiles.remove(&key) else {
                continue;
            };
            match status.residency() {
                Residency::Visible(_) => {
                    self.renderer.detach(key);
                    stats.evicted += 1;
                }
                Residency::Loading(id) => {
                    trace!(%key, %id, "cancelling fetch");
                    self.pool.cancel(*id);
                    stats.cancelled += 1;
                }
                Residency::Idle => {}
            }
        }

        let capacity = self.pool.concurrency();
        let mut loading = self.loading_len();
        for &key in load_order {
            if !self.tiles.get(&key).is_some_and(TileStatus::is_pending_load) {
                continue;
            }
            let Some(descriptors) = self.tree.get(key).map(|node| node.content.clone()) else {
                continue;
            };

            if descriptors.is_empty() {
                // Structural node: nothing to fetch.
                let nonce = self.bump_nonce();
                let content: Buffer = Arc::from(Vec::new());
                self.renderer.attach(key, &content);
                if let Some(status) = self.tiles.get_mut(&key) {
                    status.show(nonce, content);
                }
                continue;
            }

            if loading >= capacity {
                stats.deferred += 1;
                continue;
            }
            let cache_key = self.cache_key(key);
            if self.read_cache
                && let Some(content) = self.cache.peek(&cache_key)
            {
                let nonce = self.bump_nonce();
                self.renderer.attach(key, &content);
                if let Some(status) = self.tiles.get_mut(&key) {
                    status.show(nonce, content);
                }
                stats.cache_hits += 1;
                continue;
            }

            let nonce = self.bump_nonce();
            let request = TileRequest {
                key,
                nonce,
                content: descriptors,
                cache_key: Some(cache_key),
                read_cache: self.read_cache,
            };
            let id = self.pool.dispatch(request);
            if let Some(status) = self.tiles.get_mut(&key) {
                status.start_loading(nonce, id);
            }
            loading += 1;
            stats.dispatched += 1;
        }

        for status in self.tiles.values_mut() {
            status.settle();
        }
    }

    fn bump_nonce(&mut self) -> u64 {
        self.next_nonce += 1;
        self.next_nonce
    }

    /// Cache identity of a node's payload: its grid path for regular trees,
    /// `n<key>` otherwise.
    fn cache_key(&self, key: NodeKey) -> CacheKey {
        let item = match self.tree.address(key) {
            Some(GridAddress {
                level,
                x,
                y,
                z: Some(z),
            }) => format!("{level}/{x}/{y}/{z}"),
            Some(GridAddress { level, x, y, z: None }) => format!("{level}/{x}/{y}"),
            None => format!("n{}", key.raw()),
        };
        CacheKey::new(Arc::clone(&self.namespace), Arc::clone(&self.collection), item)
    }

    /// Apply one completion if it is still current.
    fn route(&mut self, completion: Completion, stats: &mut FrameStats) {
        let Completion {
            id,
            key,
            nonce,
            outcome,
        } = completion;
        let Some(status) = self.tiles.get_mut(&key) else {
            debug!(%key, %id, nonce, "completion for untracked node discarded");
            stats.stale += 1;
            return;
        };
        if !status.accepts(nonce) {
            debug!(%key, %id, nonce, current = status.nonce(), "stale completion discarded");
            stats.stale += 1;
            return;
        }

        match outcome {
            Outcome::Loaded(content) => {
                self.renderer.attach(key, &content);
                status.complete(nonce, content);
                stats.completed += 1;
            }
            Outcome::Cancelled | Outcome::Failed(FetchError::Cancelled) => {
                trace!(%key, %id, "fetch cancelled");
                status.abandon_load(nonce);
            }
            Outcome::Failed(error) => {
                warn!(%key, %id, %error, "tile fetch failed");
                self.tiles.remove(&key);
                self.failed.insert(key);
                stats.failed += 1;
            }
        }
    }

    /// Apply completions obtained outside [`load_tiles`](Self::load_tiles).
    /// Returns how many were current.
    pub fn apply_completions(&mut self, completions: impl IntoIterator<Item = Completion>) -> usize {
        let mut stats = FrameStats::default();
        for completion in completions {
            self.route(completion, &mut stats);
        }
        stats.completed + stats.failed
    }

    /// Apply whatever the pool has finished, without traversing.
    pub fn poll(&mut self) -> usize {
        let completions = self.pool.pump();
        self.apply_completions(completions)
    }

    /// Like [`poll`](Self::poll), waiting up to `timeout` for the first
    /// completion.
    pub fn poll_timeout(&mut self, timeout: Duration) -> usize {
        let completions = self.pool.pump_timeout(timeout);
        self.apply_completions(completions)
    }

    /// Keys of every visible node, sorted.
    #[must_use]
    pub fn resident(&self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self
            .tiles
            .iter()
            .filter(|(_, s)| s.is_visible())
            .map(|(key, _)| *key)
            .collect();
        keys.sort_unstable();
        keys
    }

    #[must_use]
    pub fn status(&self, key: NodeKey) -> Option<&TileStatus> {
        self.tiles.get(&key)
    }

    /// Number of nodes with a lifecycle record.
    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.tiles.len()
    }

    /// Number of nodes with a fetch in flight.
    #[must_use]
    pub fn loading_len(&self) -> usize {
        self.tiles.values().filter(|s| s.is_loading()).count()
    }

    /// Counters of the most recent frame.
    #[must_use]
    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    /// Whether `key` failed to load and is excluded from loading.
    #[must_use]
    pub fn is_failed(&self, key: NodeKey) -> bool {
        self.failed.contains(&key)
    }

    /// Allow previously failed nodes to be fetched again.
    pub fn clear_failures(&mut self) {
        if !self.failed.is_empty() {
            debug!(count = self.failed.len(), "clearing failed nodes");
        }
        self.failed.clear();
    }

    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutable tree access, e.g. to attach children of a generic hierarchy
    /// discovered at runtime.
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    #[must_use]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Detach every visible node, cancel every fetch and forget all tracking
    /// state. The pool stays running.
    pub fn clear(&mut self) {
        for (key, status) in self.tiles.drain() {
            match status.residency() {
                Residency::Visible(_) => self.renderer.detach(key),
                Residency::Loading(id) => {
                    self.pool.cancel(*id);
                }
                Residency::Idle => {}
            }
        }
        self.failed.clear();
    }

    /// [`clear`](Self::clear), then stop the worker threads.
    pub fn shutdown(&mut self) {
        self.clear();
        self.pool.shutdown();
        debug!(frames = self.frame, "tile manager shut down");
    }
}

impl<R: Renderer> std::fmt::Debug for TileManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("nodes", &self.tree.len())
            .field("tracked", &self.tiles.len())
            .field("failed", &self.failed.len())
            .field("frame", &self.frame)
            .field("pool", &self.pool)
            .finish()
    }
}
