//! Spatial hierarchy nodes and their camera-dependent priority.

use std::ops::Range;

use crate::{BoundingVolume, Camera, NodeKey};

/// Smallest distance used when scoring, so a camera inside a volume yields a
/// large but finite score.
const MIN_SCORE_DISTANCE: f64 = 1e-6;

/// How a node's children relate to the node's own content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Refine {
    /// Children add detail on top of the parent, which stays drawn.
    Add,
    /// Children supersede the parent once they are visible.
    #[default]
    Replace,
}

/// Opaque reference to a node's payload, interpreted only by the fetcher.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentDescriptor {
    /// Location of the payload (URL, path, or collection-relative name).
    pub uri: String,
    /// Byte range within `uri`, for payloads packed into a shared file.
    pub byte_range: Option<Range<u64>>,
}

impl ContentDescriptor {
    /// A descriptor covering a whole resource.
    #[must_use]
    pub fn uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            byte_range: None,
        }
    }

    /// A descriptor covering `range` bytes of a shared resource.
    #[must_use]
    pub fn region(uri: impl Into<String>, range: Range<u64>) -> Self {
        Self {
            uri: uri.into(),
            byte_range: Some(range),
        }
    }
}

/// One node of a spatial hierarchy.
///
/// Parent and children are stored as keys into the owning [`crate::Tree`].
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialNode {
    /// Identity of this node within its tree.
    pub key: NodeKey,
    /// Spatial extent.
    pub bounds: BoundingVolume,
    /// Geometric error in world units, independent of the camera.
    pub geometric_error: f64,
    /// Relationship between this node and its children.
    pub refine: Refine,
    /// Payloads to fetch when the node becomes resident.
    pub content: Vec<ContentDescriptor>,
    /// Number of points carried by the payload (point-cloud budgets).
    pub point_count: u64,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
}

impl SpatialNode {
    /// A detached node with no content; attach it with [`crate::Tree`].
    #[must_use]
    pub fn new(key: NodeKey, bounds: BoundingVolume, geometric_error: f64) -> Self {
        Self {
            key,
            bounds,
            geometric_error,
            refine: Refine::default(),
            content: Vec::new(),
            point_count: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Builder-style refine strategy.
    #[must_use]
    pub fn with_refine(mut self, refine: Refine) -> Self {
        self.refine = refine;
        self
    }

    /// Builder-style content descriptor.
    #[must_use]
    pub fn with_content(mut self, descriptor: ContentDescriptor) -> Self {
        self.content.push(descriptor);
        self
    }

    /// Builder-style point count.
    #[must_use]
    pub fn with_points(mut self, point_count: u64) -> Self {
        self.point_count = point_count;
        self
    }

    /// Parent key, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Child keys; empty for leaves.
    #[must_use]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    /// Whether the node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Screen-space error of this node under `camera`:
    /// `(geometric_error * viewport_height) / (2 * tan(fov_y / 2) * distance)`.
    ///
    /// Larger scores mean the node is coarser than the camera can tolerate and
    /// more in need of refinement.
    #[must_use]
    pub fn score(&self, camera: &Camera) -> f64 {
        let distance = self
            .bounds
            .distance_to(camera.position)
            .max(MIN_SCORE_DISTANCE);
        self.geometric_error * camera.sse_factor() / distance
    }

    /// Whether the node's bounds intersect the camera frustum.
    #[must_use]
    pub fn intersects_frustum(&self, camera: &Camera) -> bool {
        camera.sees(&self.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn unit_camera(position: DVec3) -> Camera {
        // sse_factor == 1 for a 90 degree fov over a 2 pixel viewport.
        Camera::unculled(position, std::f64::consts::FRAC_PI_2, 2.0)
    }

    /// Score falls off with distance.
    #[test]
    fn test_score_decreases_with_distance() {
        let node = SpatialNode::new(
            NodeKey::ROOT,
            BoundingVolume::sphere(DVec3::ZERO, 1.0),
            10.0,
        );
        let near = node.score(&unit_camera(DVec3::new(0.0, 0.0, 3.0)));
        let far = node.score(&unit_camera(DVec3::new(0.0, 0.0, 21.0)));
        assert!((near - 5.0).abs() < 1e-9);
        assert!((far - 0.5).abs() < 1e-9);
    }

    /// A camera inside the volume produces a very large, finite score.
    #[test]
    fn test_camera_inside_volume_scores_high() {
        let node = SpatialNode::new(
            NodeKey::ROOT,
            BoundingVolume::aabb(DVec3::ZERO, DVec3::ONE),
            1.0,
        );
        let score = node.score(&unit_camera(DVec3::splat(0.5)));
        assert!(score.is_finite());
        assert!(score > 1e5);
    }

    /// Builder helpers fill the optional fields.
    #[test]
    fn test_builders() {
        let node = SpatialNode::new(NodeKey::ROOT, BoundingVolume::sphere(DVec3::ZERO, 1.0), 1.0)
            .with_refine(Refine::Add)
            .with_content(ContentDescriptor::region("octree.bin", 0..128))
            .with_points(42);
        assert_eq!(node.refine, Refine::Add);
        assert_eq!(node.content[0].byte_range, Some(0..128));
        assert_eq!(node.point_count, 42);
        assert!(node.is_leaf());
    }
}
