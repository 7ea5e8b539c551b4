use cgmath::{InnerSpace, Matrix4, Point3, Transform, Vector3};
use winit::dpi::PhysicalSize;

use crate::error::Result;
use scene::{Frame, MeshId};

pub mod camera;
pub mod controls;
pub mod frame_loop;
pub mod hotspot;
pub mod lighting;
pub mod render;
pub mod scene;
mod view_core;
mod view_data;
pub mod viewer;

/// GPU-side storage that is not reclaimed by dropping the CPU copy.
pub trait ResourceRelease {
    /// Free every buffer uploaded for `mesh`. Unknown ids are ignored.
    fn release_mesh(&mut self, mesh: MeshId);
}

/// The drawing surface attached to the host container.
pub trait Surface: ResourceRelease {
    fn resize(&mut self, size: PhysicalSize<u32>);

    fn draw(&mut self, frame: &Frame<'_>) -> Result<()>;

    /// Release the surface itself and take it out of the host document.
    fn detach(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Default for BBox {
    fn default() -> Self {
        Self {
            min: Vector3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Vector3::new(f32::MIN, f32::MIN, f32::MIN),
        }
    }
}

impl BBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Self {
        let mut bbox = Self::default();
        for p in points {
            bbox.merge(&Vector3::new(p[0], p[1], p[2]));
        }
        bbox
    }

    #[inline]
    pub fn merge(&mut self, point: &Vector3<f32>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    #[inline]
    pub fn merge_box(&mut self, other: &BBox) {
        if other.is_empty() {
            return;
        }
        self.merge(&other.min);
        self.merge(&other.max);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) / 2.0
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Length of the box diagonal, 0 for an empty box.
    pub fn diagonal(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.size().magnitude()
        }
    }

    /// Axis-aligned box around the eight transformed corners.
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> BBox {
        let mut out = BBox::default();
        if self.is_empty() {
            return out;
        }
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point(corner);
            out.merge(&Vector3::new(p.x, p.y, p.z));
        }
        out
    }
}
