//! Hotspot markers and hit testing

use std::f32::consts::PI;

use cgmath::{EuclideanSpace, InnerSpace, Matrix3, Matrix4, One, Point3, Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::camera::Ray;
use super::scene::{Dispose, Geometry, Material, Mesh, NodeContent, NodeId, Scene};
use super::ResourceRelease;
use crate::config::{MarkerShape, MarkerStyle};

/// Text shown when a hotspot is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub title: String,
    pub description: String,
}

impl Annotation {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Title and description on separate lines, for a native alert box.
    pub fn alert_text(&self) -> String {
        format!("{}\n{}", self.title, self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotspotId(Uuid);

impl HotspotId {
    fn new() -> Self {
        HotspotId(Uuid::new_v4())
    }
}

#[derive(Debug)]
pub struct Hotspot {
    id: HotspotId,
    pub position: Point3<f32>,
    pub orientation: Quaternion<f32>,
    shape: MarkerShape,
    radius: f32,
    marker: Mesh,
    pub annotation: Annotation,
}

impl Hotspot {
    pub fn new(position: Point3<f32>, annotation: Annotation, style: &MarkerStyle) -> Self {
        let geometry = match style.shape {
            MarkerShape::Sphere => sphere_geometry(style.radius, 16, 16),
            MarkerShape::Disc => disc_geometry(style.radius, 32),
        };
        let material = Material {
            color: style.color,
            opacity: style.opacity,
            unlit: true,
            double_sided: style.shape == MarkerShape::Disc,
        };
        Self {
            id: HotspotId::new(),
            position,
            orientation: Quaternion::one(),
            shape: style.shape,
            radius: style.radius,
            marker: Mesh::new(geometry, material),
            annotation,
        }
    }

    pub fn id(&self) -> HotspotId {
        self.id
    }

    pub fn marker(&self) -> &Mesh {
        &self.marker
    }

    pub fn normal(&self) -> Vector3<f32> {
        self.orientation * Vector3::unit_z()
    }

    pub fn world_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position.to_vec())
            * Matrix4::from(self.orientation)
    }

    /// Turn the marker's +Z axis towards `eye`.
    pub fn face(&mut self, eye: Point3<f32>) {
        let to_eye = eye - self.position;
        if to_eye.magnitude2() < f32::EPSILON {
            return;
        }
        let z = to_eye.normalize();
        let up = if z.y.abs() > 0.999 {
            Vector3::unit_z()
        } else {
            Vector3::unit_y()
        };
        let x = up.cross(z).normalize();
        let y = z.cross(x);
        self.orientation = Quaternion::from(Matrix3::from_cols(x, y, z));
    }

    /// Distance along `ray` to the marker, if it is hit.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        match self.shape {
            MarkerShape::Sphere => ray.intersect_sphere(self.position, self.radius),
            MarkerShape::Disc => ray.intersect_disc(self.position, self.normal(), self.radius),
        }
    }
}

impl Dispose for Hotspot {
    fn dispose(self, resources: &mut dyn ResourceRelease) {
        self.marker.dispose(resources);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotspotHit {
    pub node: NodeId,
    pub hotspot: HotspotId,
    pub distance: f32,
    pub annotation: Annotation,
}

/// The set of scene children that take part in hit testing.
#[derive(Debug, Default)]
pub struct HotspotRegistry {
    nodes: Vec<NodeId>,
}

impl HotspotRegistry {
    pub fn add(
        &mut self,
        scene: &mut Scene,
        position: Point3<f32>,
        annotation: Annotation,
        style: &MarkerStyle,
    ) -> NodeId {
        let id = scene.add(NodeContent::Hotspot(Hotspot::new(position, annotation, style)));
        self.nodes.push(id);
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter<'a>(&'a self, scene: &'a Scene) -> impl Iterator<Item = (NodeId, &'a Hotspot)> + 'a {
        self.nodes.iter().filter_map(move |&id| match scene.get(id) {
            Some(NodeContent::Hotspot(hotspot)) => Some((id, hotspot)),
            _ => None,
        })
    }

    /// Billboard every marker towards the camera.
    pub fn face_camera(&self, scene: &mut Scene, eye: Point3<f32>) {
        for &id in &self.nodes {
            if let Some(NodeContent::Hotspot(hotspot)) = scene.get_mut(id) {
                hotspot.face(eye);
            }
        }
    }

    /// Nearest marker along `ray`.
    pub fn hit_test(&self, scene: &Scene, ray: &Ray) -> Option<HotspotHit> {
        self.iter(scene)
            .filter_map(|(node, hotspot)| {
                hotspot.intersect(ray).map(|distance| (node, hotspot, distance))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(node, hotspot, distance)| HotspotHit {
                node,
                hotspot: hotspot.id(),
                distance,
                annotation: hotspot.annotation.clone(),
            })
    }

    /// Forget every marker; the caller owns removing them from the scene.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// UV sphere centred on the origin.
pub fn sphere_geometry(radius: f32, width_segments: u32, height_segments: u32) -> Geometry {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        let phi = v * PI;
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            let theta = u * 2.0 * PI;
            let n = [-theta.cos() * phi.sin(), phi.cos(), theta.sin() * phi.sin()];
            positions.push(n.map(|c| c * radius));
            normals.push(n);
        }
    }
    let row = width_segments + 1;
    let mut indices = Vec::new();
    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;
            if iy != 0 {
                indices.extend_from_slice(&[a, b, d]);
            }
            if iy != height_segments - 1 {
                indices.extend_from_slice(&[b, c, d]);
            }
        }
    }
    Geometry::new(positions, Some(normals), indices)
}

/// Flat disc in the XY plane facing +Z.
pub fn disc_geometry(radius: f32, segments: u32) -> Geometry {
    let mut positions = vec![[0.0, 0.0, 0.0]];
    for i in 0..=segments {
        let a = i as f32 / segments as f32 * 2.0 * PI;
        positions.push([radius * a.cos(), radius * a.sin(), 0.0]);
    }
    let normals = vec![[0.0, 0.0, 1.0]; positions.len()];
    let indices = (1..=segments).flat_map(|i| [0, i, i + 1]).collect();
    Geometry::new(positions, Some(normals), indices)
}
