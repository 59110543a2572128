//! Camera for rendering and shadow projection

use void_math::{FrustumPlanes, Mat4, Plane, Sphere, Vec3, AABB};

/// Far distance used for culling when the projection has no far plane
pub const INFINITE_FAR_CULL_DISTANCE: f32 = 100_000.0;

/// Projection type
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    /// `far == 0.0` projects to infinity
    Perspective {
        fov: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        width: f32,
        height: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Self::Perspective {
            fov: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Camera for rendering
#[derive(Clone, Debug)]
pub struct Camera {
    pub name: String,
    /// World position
    pub position: Vec3,
    /// Unit view direction
    direction: Vec3,
    /// Reference up axis
    pub up: Vec3,
    pub projection: Projection,
}

impl Camera {
    /// Create a new camera looking down -Z
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }

    /// Create a perspective camera
    pub fn perspective(name: impl Into<String>, fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective { fov, aspect, near, far },
            ..Self::new(name)
        }
    }

    /// Create an orthographic camera
    pub fn orthographic(name: impl Into<String>, width: f32, height: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic { width, height, near, far },
            ..Self::new(name)
        }
    }

    /// Look at a target
    pub fn look_at(&mut self, target: Vec3) {
        self.set_direction(target - self.position);
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        let direction = direction.normalize_or_zero();
        if direction != Vec3::ZERO {
            self.direction = direction;
        }
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.direction
    }

    /// Right vector, valid even when looking along the up axis
    pub fn right(&self) -> Vec3 {
        let right = self.direction.cross(self.up);
        if right.length_squared() < 1e-12 {
            self.direction.perpendicular().normalize()
        } else {
            right.normalize()
        }
    }

    /// Up vector orthogonal to the view direction
    pub fn true_up(&self) -> Vec3 {
        self.right().cross(self.direction)
    }

    #[inline]
    pub fn near(&self) -> f32 {
        match self.projection {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    /// Far distance, `0.0` when infinite
    #[inline]
    pub fn far(&self) -> f32 {
        match self.projection {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    #[inline]
    pub fn is_infinite(&self) -> bool {
        self.far() == 0.0
    }

    /// Far distance used for culling and corner generation
    pub fn culling_far(&self) -> f32 {
        if self.is_infinite() {
            INFINITE_FAR_CULL_DISTANCE
        } else {
            self.far()
        }
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.position + self.direction, self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov, aspect, near, far } => {
                if far == 0.0 {
                    Mat4::perspective_infinite(fov, aspect, near)
                } else {
                    Mat4::perspective(fov, aspect, near, far)
                }
            }
            Projection::Orthographic { width, height, near, .. } => {
                let (hw, hh) = (width * 0.5, height * 0.5);
                Mat4::orthographic(-hw, hw, -hh, hh, near, self.culling_far())
            }
        }
    }

    /// Projection with a finite far plane, for culling
    fn culling_projection(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov, aspect, near, .. } => {
                Mat4::perspective(fov, aspect, near, self.culling_far())
            }
            Projection::Orthographic { .. } => self.projection_matrix(),
        }
    }

    /// Get the combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// World-space frustum planes, normals pointing inward
    pub fn frustum_planes(&self) -> FrustumPlanes {
        FrustumPlanes::from_view_projection(&(self.culling_projection() * self.view_matrix()))
    }

    pub fn near_plane(&self) -> Plane {
        self.frustum_planes().planes[FrustumPlanes::NEAR]
    }

    pub fn is_visible_aabb(&self, aabb: &AABB) -> bool {
        self.frustum_planes().is_aabb_visible(aabb)
    }

    pub fn is_visible_sphere(&self, sphere: &Sphere) -> bool {
        self.frustum_planes().is_sphere_visible(sphere)
    }

    /// The eight frustum corners in world space
    ///
    /// Near plane first: top-right, top-left, bottom-left, bottom-right,
    /// then the far plane in the same order.
    pub fn world_space_corners(&self) -> [Vec3; 8] {
        let forward = self.direction;
        let right = self.right();
        let up = self.true_up();
        let near = self.near();
        let far = self.culling_far();

        let (near_half, far_half) = match self.projection {
            Projection::Perspective { fov, aspect, .. } => {
                let t = (fov * 0.5).tan();
                ((near * t * aspect, near * t), (far * t * aspect, far * t))
            }
            Projection::Orthographic { width, height, .. } => {
                ((width * 0.5, height * 0.5), (width * 0.5, height * 0.5))
            }
        };

        let quad = |distance: f32, (hw, hh): (f32, f32)| {
            let center = self.position + forward * distance;
            [
                center + up * hh + right * hw,
                center + up * hh - right * hw,
                center - up * hh - right * hw,
                center - up * hh + right * hw,
            ]
        };
        let n = quad(near, near_half);
        let f = quad(far, far_half);
        [n[0], n[1], n[2], n[3], f[0], f[1], f[2], f[3]]
    }

    /// Conservative screen rectangle of a sphere in normalised device
    /// coordinates as `[left, bottom, right, top]`
    ///
    /// Returns `None` when the sphere reaches the near plane or the camera,
    /// meaning it may cover the whole screen.
    pub fn project_sphere(&self, sphere: &Sphere) -> Option<[f32; 4]> {
        let view = self.view_matrix();
        let center = view.transform_point(sphere.center);
        if -center.z - sphere.radius <= self.near() {
            return None;
        }

        let proj = self.projection_matrix();
        let corners = sphere.to_aabb().corners();
        let mut rect = [f32::MAX, f32::MAX, f32::MIN, f32::MIN];
        for corner in corners {
            let clip = proj * view.transform_point(corner).extend(1.0);
            let (x, y) = (clip.x / clip.w, clip.y / clip.w);
            rect[0] = rect[0].min(x);
            rect[1] = rect[1].min(y);
            rect[2] = rect[2].max(x);
            rect[3] = rect[3].max(y);
        }

        let rect = rect.map(|v| v.clamp(-1.0, 1.0));
        if rect == [-1.0, -1.0, 1.0, 1.0] {
            return None;
        }
        Some(rect)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        let mut camera = Camera::perspective("main", 90.0_f32.to_radians(), 1.0, 1.0, 100.0);
        camera.position = Vec3::new(0.0, 0.0, 10.0);
        camera.look_at(Vec3::ZERO);
        camera
    }

    #[test]
    fn test_visibility() {
        let camera = camera();
        assert!(camera.is_visible_aabb(&AABB::new(Vec3::splat(-1.0), Vec3::ONE)));
        assert!(!camera.is_visible_aabb(&AABB::new(Vec3::new(-1.0, -1.0, 20.0), Vec3::new(1.0, 1.0, 21.0))));
        assert!(camera.is_visible_sphere(&Sphere::new(Vec3::ZERO, 1.0)));
    }

    #[test]
    fn test_world_space_corners() {
        let camera = camera();
        let corners = camera.world_space_corners();
        // 90 degree fov, aspect 1: near half extent equals the near distance
        assert_relative_eq!(corners[0].z, 9.0, epsilon = 1e-5);
        assert_relative_eq!(corners[0].x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(corners[0].y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(corners[6].z, -90.0, epsilon = 1e-4);
        assert_relative_eq!(corners[6].x, -100.0, epsilon = 1e-3);

        let planes = camera.frustum_planes();
        for corner in corners {
            for plane in &planes.planes {
                assert!(plane.distance_to_point(corner) > -1e-2);
            }
        }
    }

    #[test]
    fn test_project_sphere() {
        let camera = camera();
        let rect = camera.project_sphere(&Sphere::new(Vec3::ZERO, 1.0)).unwrap();
        assert!(rect[0] < 0.0 && rect[2] > 0.0);
        assert!(rect[2] - rect[0] < 1.0);

        // Sphere around the camera covers the screen
        assert!(camera.project_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 10.0), 2.0)).is_none());
    }

    #[test]
    fn test_infinite_projection_still_culls() {
        let mut camera = Camera::perspective("inf", 1.0, 1.0, 0.5, 0.0);
        camera.position = Vec3::ZERO;
        assert!(camera.is_infinite());
        assert!(camera.is_visible_aabb(&AABB::new(Vec3::new(-1.0, -1.0, -5000.0), Vec3::new(1.0, 1.0, -4999.0))));
        assert!(!camera.is_visible_aabb(&AABB::new(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, 1.0, 6.0))));
    }
}
