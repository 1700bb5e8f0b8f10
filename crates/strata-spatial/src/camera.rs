//! Camera parameters for screen-space error estimation and frustum culling.

use glam::{DMat4, DVec3, DVec4};

use crate::BoundingVolume;

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// A view frustum defined by six inward-pointing planes.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far. Each `DVec4(a, b, c, d)` holds the
    /// unit inward normal and the signed distance term.
    planes: [DVec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix with a `[0, 1]`
    /// clip-space depth range (Griggs-Hartmann).
    #[must_use]
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [DVec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[2];
        planes[FAR] = rows[3] - rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Whether `volume` is at least partially inside the frustum.
    ///
    /// Conservative: boxes near frustum corners may report `true`.
    #[must_use]
    pub fn intersects(&self, volume: &BoundingVolume) -> bool {
        match *volume {
            BoundingVolume::Aabb { min, max } => self.planes.iter().all(|plane| {
                let normal = plane.truncate();
                let p = DVec3::select(normal.cmpge(DVec3::ZERO), max, min);
                normal.dot(p) + plane.w >= 0.0
            }),
            BoundingVolume::Sphere { center, radius } => self
                .planes
                .iter()
                .all(|plane| plane.truncate().dot(center) + plane.w >= -radius),
        }
    }
}

/// Per-frame camera state consumed by node scoring and culling.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Eye position in world space.
    pub position: DVec3,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// Viewport height in pixels.
    pub viewport_height: f64,
    /// View frustum; `None` disables culling.
    pub frustum: Option<Frustum>,
}

impl Camera {
    /// A camera without a frustum: every node passes the culling test.
    #[must_use]
    pub fn unculled(position: DVec3, fov_y: f64, viewport_height: f64) -> Self {
        Self {
            position,
            fov_y,
            viewport_height,
            frustum: None,
        }
    }

    /// A right-handed perspective camera looking from `eye` towards `target`.
    #[must_use]
    pub fn look_at(
        eye: DVec3,
        target: DVec3,
        fov_y: f64,
        viewport: (f64, f64),
        near: f64,
        far: f64,
    ) -> Self {
        let (width, height) = viewport;
        let aspect = if height > 0.0 { width / height } else { 1.0 };
        let up = if (target - eye).normalize_or_zero().y.abs() > 0.99 {
            DVec3::Z
        } else {
            DVec3::Y
        };
        let view = DMat4::look_at_rh(eye, target, up);
        let proj = DMat4::perspective_rh(fov_y, aspect, near, far);
        Self {
            position: eye,
            fov_y,
            viewport_height: height,
            frustum: Some(Frustum::from_view_projection(&(proj * view))),
        }
    }

    /// Pixels per world unit of error at unit distance:
    /// `viewport_height / (2 * tan(fov_y / 2))`.
    #[must_use]
    pub fn sse_factor(&self) -> f64 {
        let denom = 2.0 * (self.fov_y * 0.5).tan();
        if denom > 0.0 {
            self.viewport_height / denom
        } else {
            self.viewport_height
        }
    }

    /// Frustum test; always `true` for unculled cameras.
    #[must_use]
    pub fn sees(&self, volume: &BoundingVolume) -> bool {
        self.frustum
            .as_ref()
            .is_none_or(|frustum| frustum.intersects(volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward_camera() -> Camera {
        Camera::look_at(
            DVec3::ZERO,
            DVec3::NEG_Z,
            std::f64::consts::FRAC_PI_4,
            (1600.0, 900.0),
            0.1,
            1000.0,
        )
    }

    /// A box straight ahead is visible.
    #[test]
    fn test_box_ahead_visible() {
        let camera = forward_camera();
        let aabb = BoundingVolume::aabb(DVec3::new(-1.0, -1.0, -5.0), DVec3::new(1.0, 1.0, -3.0));
        assert!(camera.sees(&aabb));
    }

    /// Boxes behind, beside or beyond the far plane are culled.
    #[test]
    fn test_boxes_outside_are_culled() {
        let camera = forward_camera();
        let behind = BoundingVolume::aabb(DVec3::splat(10.0), DVec3::splat(20.0));
        let left = BoundingVolume::aabb(DVec3::new(-1000.0, 0.0, -5.0), DVec3::new(-999.0, 1.0, -4.0));
        let beyond = BoundingVolume::aabb(DVec3::new(0.0, 0.0, -2000.0), DVec3::new(1.0, 1.0, -1500.0));
        assert!(!camera.sees(&behind));
        assert!(!camera.sees(&left));
        assert!(!camera.sees(&beyond));
    }

    /// Sphere tests honour the radius.
    #[test]
    fn test_sphere_straddling_plane_is_visible() {
        let camera = forward_camera();
        let straddling = BoundingVolume::sphere(DVec3::new(0.0, 0.0, 2.0), 2.5);
        let behind = BoundingVolume::sphere(DVec3::new(0.0, 0.0, 10.0), 2.0);
        assert!(camera.sees(&straddling));
        assert!(!camera.sees(&behind));
    }

    /// A 90 degree field of view maps one unit of error at distance one to
    /// half the viewport height.
    #[test]
    fn test_sse_factor() {
        let camera = Camera::unculled(DVec3::ZERO, std::f64::consts::FRAC_PI_2, 1000.0);
        assert!((camera.sse_factor() - 500.0).abs() < 1e-9);
    }

    /// Extracted planes are normalized.
    #[test]
    fn test_planes_normalized() {
        let camera = forward_camera();
        let frustum = camera.frustum.expect("look_at builds a frustum");
        for plane in &frustum.planes {
            assert!((plane.truncate().length() - 1.0).abs() < 1e-9);
        }
    }
}
