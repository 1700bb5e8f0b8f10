//! Best-first traversal of a spatial tree under a per-frame budget.
//!
//! The traverser pops the node with the largest screen-space error, yields it,
//! and expands its children when the stop rule allows. Nodes outside the
//! frustum are dropped together with their subtrees.
//!
//! Children are admitted as a group: either every in-view child above the
//! refinement floor is queued, or none is. Admitted children always fit the
//! node ceiling and the point budget, so a frame never ends with a parent
//! only partly refined.

use strata_spatial::{Camera, NodeKey, SpatialNode, Tree};

use crate::PriorityQueue;

/// When the traversal stops refining.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StopRule {
    /// Expand a node only while its score exceeds `threshold` pixels.
    ErrorThreshold {
        /// Largest tolerated screen-space error.
        threshold: f64,
    },
    /// Always expand while every child still fits within `max_points`.
    CumulativePoints {
        /// Point budget for the whole frame.
        max_points: u64,
    },
}

/// Per-frame traversal limits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraversalBudget {
    /// Refinement rule.
    pub rule: StopRule,
    /// Children scoring at or below this floor are never queued.
    pub min_refine_score: f64,
    /// Hard ceiling on yielded plus queued nodes.
    pub max_nodes: usize,
}

impl TraversalBudget {
    /// Default ceiling on nodes touched per frame.
    pub const DEFAULT_MAX_NODES: usize = 4096;

    /// Refine while screen-space error exceeds `threshold`.
    #[must_use]
    pub fn error_threshold(threshold: f64) -> Self {
        Self {
            rule: StopRule::ErrorThreshold { threshold },
            min_refine_score: 0.0,
            max_nodes: Self::DEFAULT_MAX_NODES,
        }
    }

    /// Refine until `max_points` points are selected.
    #[must_use]
    pub fn point_budget(max_points: u64) -> Self {
        Self {
            rule: StopRule::CumulativePoints { max_points },
            min_refine_score: 0.0,
            max_nodes: Self::DEFAULT_MAX_NODES,
        }
    }

    /// Builder-style refinement floor.
    #[must_use]
    pub fn with_min_refine_score(mut self, floor: f64) -> Self {
        self.min_refine_score = floor;
        self
    }

    /// Builder-style node ceiling.
    #[must_use]
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    fn expands(&self, score: f64) -> bool {
        match self.rule {
            StopRule::ErrorThreshold { threshold } => score > threshold,
            StopRule::CumulativePoints { .. } => true,
        }
    }
}

impl Default for TraversalBudget {
    fn default() -> Self {
        Self::error_threshold(16.0)
    }
}

/// One node selected by the traversal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Visit {
    pub key: NodeKey,
    /// Screen-space error at the time of the visit.
    pub score: f64,
}

/// Reusable traversal state. One instance serves every frame.
#[derive(Debug, Default)]
pub struct Traverser {
    queue: PriorityQueue<NodeKey>,
    yielded: usize,
    points: u64,
    /// Points of admitted nodes still in the queue.
    reserved: u64,
    admitted: Vec<(f64, NodeKey)>,
    done: bool,
}

impl Traverser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new traversal from the root of `tree`.
    pub fn reset(&mut self, tree: &Tree, camera: &Camera) {
        self.queue.reset(tree.len().min(TraversalBudget::DEFAULT_MAX_NODES));
        self.yielded = 0;
        self.points = 0;
        self.reserved = 0;
        self.done = false;
        let root = tree.root();
        self.queue.insert(root.score(camera), root.key);
    }

    /// Produce the next visit, or `None` once the traversal is exhausted.
    pub fn next_visit(&mut self, tree: &Tree, camera: &Camera, budget: &TraversalBudget) -> Option<Visit> {
        if self.done {
            return None;
        }
        loop {
            if self.yielded >= budget.max_nodes {
                self.done = true;
                return None;
            }
            let Some((score, key)) = self.queue.extract_max() else {
                self.done = true;
                return None;
            };
            let Some(node) = tree.get(key) else {
                continue;
            };
            self.reserved = self.reserved.saturating_sub(node.point_count);
            if !node.intersects_frustum(camera) {
                continue;
            }
            // Only the root can overflow here; children were admitted within budget.
            if let StopRule::CumulativePoints { max_points } = budget.rule {
                let total = self.points.saturating_add(node.point_count);
                if total > max_points {
                    self.done = true;
                    return None;
                }
                self.points = total;
            }
            self.yielded += 1;

            if budget.expands(score) {
                self.admit_children(node, tree, camera, budget);
            }
            return Some(Visit { key, score });
        }
    }

    /// Queue all in-view children of `node` above the refinement floor, or
    /// none when they would not all fit the node ceiling or the point budget.
    fn admit_children(&mut self, node: &SpatialNode, tree: &Tree, camera: &Camera, budget: &TraversalBudget) {
        self.admitted.clear();
        let mut points = 0u64;
        for &child_key in node.children() {
            let Some(child) = tree.get(child_key) else {
                continue;
            };
            if !child.intersects_frustum(camera) {
                continue;
            }
            let child_score = child.score(camera);
            if child_score > budget.min_refine_score {
                points = points.saturating_add(child.point_count);
                self.admitted.push((child_score, child_key));
            }
        }

        if self.yielded + self.queue.len() + self.admitted.len() > budget.max_nodes {
            return;
        }
        if let StopRule::CumulativePoints { max_points } = budget.rule
            && self.points.saturating_add(self.reserved).saturating_add(points) > max_points
        {
            return;
        }
        self.reserved = self.reserved.saturating_add(points);
        for &(score, key) in &self.admitted {
            self.queue.insert(score, key);
        }
    }

    /// Reset and iterate lazily over this frame's visits.
    pub fn iter<'a>(
        &'a mut self,
        tree: &'a Tree,
        camera: &'a Camera,
        budget: &'a TraversalBudget,
    ) -> impl Iterator<Item = Visit> + 'a {
        self.reset(tree, camera);
        std::iter::from_fn(move || self.next_visit(tree, camera, budget))
    }

    /// Points accumulated by the current traversal.
    #[must_use]
    pub fn points(&self) -> u64 {
        self.points
    }
}
