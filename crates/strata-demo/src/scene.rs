//! Synthetic dataset and camera path driven by the demo config.

use glam::DVec3;
use strata_config::{CameraConfig, DemoConfig, StopMode, TraversalConfig, TreeShape};
use strata_lod::{StopRule, TraversalBudget};
use strata_spatial::{BoundingVolume, Camera, NodeKey, Tree};

/// Build the dataset tree: a flat slab for quadtrees, a cube for octrees.
pub fn build_tree(demo: &DemoConfig) -> Tree {
    let h = demo.half_extent;
    let mut tree = match demo.shape {
        TreeShape::Quadtree => {
            let bounds = BoundingVolume::aabb(DVec3::new(-h, -h, -1.0), DVec3::new(h, h, 0.0));
            Tree::quadtree(demo.depth, bounds, demo.root_error)
        }
        TreeShape::Octree => {
            let bounds = BoundingVolume::aabb(DVec3::splat(-h), DVec3::new(h, h, 0.0));
            Tree::octree(demo.depth, bounds, demo.root_error)
        }
    };
    let keys: Vec<NodeKey> = tree.iter().map(|node| node.key).collect();
    for key in keys {
        if let Some(node) = tree.get_mut(key) {
            node.point_count = demo.points_per_node;
        }
    }
    tree
}

/// Camera for `frame` of the fly-through.
///
/// The first half descends from high above the dataset to low altitude; the
/// second half sweeps across it at that altitude, looking slightly ahead.
pub fn camera_at(frame: u32, demo: &DemoConfig, camera: &CameraConfig) -> Camera {
    let h = demo.half_extent;
    let t = if demo.frames > 1 {
        f64::from(frame) / f64::from(demo.frames - 1)
    } else {
        0.0
    };
    let high = h * 4.0;
    let low = h * 0.02;
    let (eye, target) = if t < 0.5 {
        let s = t * 2.0;
        let altitude = high + (low - high) * s;
        (DVec3::new(0.0, 0.0, altitude), DVec3::new(0.0, h * 0.1, 0.0))
    } else {
        let s = (t - 0.5) * 2.0;
        let x = -h * 0.8 + 1.6 * h * s;
        (DVec3::new(x, 0.0, low), DVec3::new(x + low * 2.0, low, 0.0))
    };

    let fov_y = camera.fov_y_degrees.to_radians();
    let viewport_height = f64::from(camera.viewport_height);
    if camera.frustum_culling {
        Camera::look_at(
            eye,
            target,
            fov_y,
            (f64::from(camera.viewport_width), viewport_height),
            camera.near,
            camera.far,
        )
    } else {
        Camera::unculled(eye, fov_y, viewport_height)
    }
}

/// Traversal budget described by the config.
pub fn budget(traversal: &TraversalConfig) -> TraversalBudget {
    let rule = match traversal.mode {
        StopMode::ErrorThreshold => StopRule::ErrorThreshold {
            threshold: traversal.error_threshold,
        },
        StopMode::PointBudget => StopRule::CumulativePoints {
            max_points: traversal.max_points,
        },
    };
    TraversalBudget {
        rule,
        min_refine_score: traversal.min_refine_score,
        max_nodes: traversal.max_nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_lod::Traverser;

    #[test]
    fn test_tree_size_matches_depth() {
        let demo = DemoConfig {
            depth: 2,
            ..DemoConfig::default()
        };
        assert_eq!(build_tree(&demo).len(), 1 + 4 + 16);

        let octree = DemoConfig {
            shape: TreeShape::Octree,
            depth: 1,
            ..DemoConfig::default()
        };
        let tree = build_tree(&octree);
        assert_eq!(tree.len(), 9);
        assert!(tree.iter().all(|node| node.point_count == octree.points_per_node));
    }

    #[test]
    fn test_descent_refines_more() {
        let demo = DemoConfig {
            depth: 4,
            frames: 10,
            ..DemoConfig::default()
        };
        let tree = build_tree(&demo);
        let camera_config = CameraConfig {
            frustum_culling: false,
            ..CameraConfig::default()
        };
        let budget = budget(&TraversalConfig::default());
        let mut traverser = Traverser::new();

        let high = camera_at(0, &demo, &camera_config);
        let low = camera_at(4, &demo, &camera_config);
        let coarse = traverser.iter(&tree, &high, &budget).count();
        let fine = traverser.iter(&tree, &low, &budget).count();
        assert!(fine > coarse, "descending should refine ({coarse} -> {fine})");
    }

    #[test]
    fn test_budget_mapping() {
        let points = TraversalConfig {
            mode: StopMode::PointBudget,
            max_points: 1234,
            ..TraversalConfig::default()
        };
        assert_eq!(
            budget(&points).rule,
            StopRule::CumulativePoints { max_points: 1234 }
        );
        assert_eq!(budget(&points).max_nodes, points.max_nodes);
    }
}
