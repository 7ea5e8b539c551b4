//! Perspective camera and pointer rays

use cgmath::{
    perspective, Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix, Vector2,
    Vector3, Vector4,
};
use winit::dpi::{PhysicalPosition, PhysicalSize};

use crate::config::CameraConfig;

/// A perspective camera looking at `target`.
///
/// The projection uses the OpenGL clip convention (`z` in `-1..=1`); the GPU
/// backend converts it for its own depth range.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub fov: Deg<f32>,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            fov: Deg(config.fov_deg),
            aspect,
            near: config.near,
            far: config.far,
            position: Point3::from(config.position),
            target: Point3::origin(),
            up: Vector3::unit_y(),
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        perspective(self.fov, self.aspect, self.near, self.far)
    }

    pub fn distance(&self) -> f32 {
        (self.position - self.target).magnitude()
    }

    pub fn forward(&self) -> Vector3<f32> {
        (self.target - self.position).normalize()
    }

    /// Ray from the eye through a point in normalized device coordinates.
    pub fn ray_from_ndc(&self, ndc: Vector2<f32>) -> Ray {
        let inverse = match (self.projection_matrix() * self.view_matrix()).invert() {
            Some(m) => m,
            None => return Ray::new(self.position, self.forward()),
        };
        let clip = inverse * Vector4::new(ndc.x, ndc.y, 0.5, 1.0);
        if clip.w.abs() < f32::EPSILON {
            return Ray::new(self.position, self.forward());
        }
        let world = Point3::from_homogeneous(clip);
        Ray::new(self.position, world - self.position)
    }
}

/// Viewport pixel position to normalized device coordinates.
///
/// Both axes map to `-1..=1`; `y` points up, so screen rows are inverted.
pub fn ndc_from_pointer(pos: PhysicalPosition<f64>, size: PhysicalSize<u32>) -> Vector2<f32> {
    let w = size.width.max(1) as f64;
    let h = size.height.max(1) as f64;
    Vector2::new(
        (pos.x / w * 2.0 - 1.0) as f32,
        (-(pos.y / h) * 2.0 + 1.0) as f32,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f32>,
    /// Unit length.
    pub direction: Vector3<f32>,
}

impl Ray {
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }

    /// Distance to the first sphere surface crossing in front of the origin.
    pub fn intersect_sphere(&self, center: Point3<f32>, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.magnitude2() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();
        let near = -b - sqrt_d;
        let far = -b + sqrt_d;
        if near >= 0.0 {
            Some(near)
        } else if far >= 0.0 {
            Some(far)
        } else {
            None
        }
    }

    /// Distance to a flat disc, hit from either side.
    pub fn intersect_disc(
        &self,
        center: Point3<f32>,
        normal: Vector3<f32>,
        radius: f32,
    ) -> Option<f32> {
        let denom = normal.dot(self.direction);
        if denom.abs() < 1e-6 {
            return None;
        }
        let t = normal.dot(center - self.origin) / denom;
        if t < 0.0 {
            return None;
        }
        if (self.at(t) - center).magnitude2() <= radius * radius {
            Some(t)
        } else {
            None
        }
    }
}
