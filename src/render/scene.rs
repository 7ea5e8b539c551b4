//! Scene registry
//!
//! The scene root holds a flat list of tagged children. Each child is a light,
//! a hotspot marker or a loaded model subtree; clearing and swapping work on
//! the tags instead of inspecting node types at runtime.

use std::sync::atomic::{AtomicU64, Ordering};

use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Vector3, Zero};

use super::hotspot::Hotspot;
use super::{BBox, ResourceRelease};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a mesh's GPU resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

impl MeshId {
    pub fn next() -> Self {
        MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl Geometry {
    /// Build geometry, computing smooth normals when none are supplied.
    pub fn new(positions: Vec<[f32; 3]>, normals: Option<Vec<[f32; 3]>>, indices: Vec<u32>) -> Self {
        let normals = match normals {
            Some(n) if n.len() == positions.len() => n,
            _ => vertex_normals(&positions, &indices),
        };
        Self {
            positions,
            normals,
            indices,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounding_box(&self) -> BBox {
        BBox::from_points(&self.positions)
    }
}

/// Area-weighted vertex normals.
fn vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut acc = vec![Vector3::<f32>::zero(); positions.len()];
    for tri in indices.chunks_exact(3) {
        let idx = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if idx.iter().any(|&i| i >= positions.len()) {
            continue;
        }
        let [a, b, c] = idx.map(|i| Vector3::from(positions[i]));
        let n = (b - a).cross(c - a);
        for i in idx {
            acc[i] += n;
        }
    }
    acc.into_iter()
        .map(|n| {
            if n.magnitude2() > 0.0 {
                n.normalize().into()
            } else {
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub color: [f32; 3],
    pub opacity: f32,
    /// Constant color, ignores the light rig.
    pub unlit: bool,
    pub double_sided: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: [0.8, 0.8, 0.8],
            opacity: 1.0,
            unlit: false,
            double_sided: false,
        }
    }
}

impl Material {
    pub fn is_transparent(&self) -> bool {
        self.opacity < 1.0
    }
}

#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    pub geometry: Geometry,
    pub material: Material,
}

impl Mesh {
    pub fn new(geometry: Geometry, material: Material) -> Self {
        Self {
            id: MeshId::next(),
            geometry,
            material,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }
}

/// Explicit release of GPU-side resources. Consumes the node, so a removed
/// node can be released only once.
pub trait Dispose {
    fn dispose(self, resources: &mut dyn ResourceRelease);
}

impl Dispose for Mesh {
    fn dispose(self, resources: &mut dyn ResourceRelease) {
        resources.release_mesh(self.id);
    }
}

#[derive(Debug)]
pub struct ModelNode {
    pub name: String,
    pub transform: Matrix4<f32>,
    pub meshes: Vec<Mesh>,
    pub children: Vec<ModelNode>,
}

impl ModelNode {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Matrix4::identity(),
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }

    fn visit<'a>(&'a self, parent: Matrix4<f32>, f: &mut impl FnMut(&'a Mesh, Matrix4<f32>)) {
        let world = parent * self.transform;
        for mesh in &self.meshes {
            f(mesh, world);
        }
        for child in &self.children {
            child.visit(world, f);
        }
    }
}

impl Dispose for ModelNode {
    fn dispose(self, resources: &mut dyn ResourceRelease) {
        for mesh in self.meshes {
            mesh.dispose(resources);
        }
        for child in self.children {
            child.dispose(resources);
        }
    }
}

/// A loaded model: a node tree plus the root translation used for centering.
#[derive(Debug)]
pub struct ModelSubtree {
    pub name: String,
    pub position: Vector3<f32>,
    pub root: ModelNode,
}

impl ModelSubtree {
    pub fn new(name: impl Into<String>, root: ModelNode) -> Self {
        Self {
            name: name.into(),
            position: Vector3::zero(),
            root,
        }
    }

    pub fn world_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
    }

    pub fn for_each_mesh<'a>(&'a self, mut f: impl FnMut(&'a Mesh, Matrix4<f32>)) {
        self.root.visit(self.world_matrix(), &mut f);
    }

    /// World-space box around every vertex of the subtree.
    pub fn bounding_box(&self) -> BBox {
        let mut bbox = BBox::default();
        self.for_each_mesh(|mesh, world| {
            bbox.merge_box(&mesh.geometry.bounding_box().transformed(&world));
        });
        bbox
    }

    pub fn mesh_ids(&self) -> Vec<MeshId> {
        let mut ids = Vec::new();
        self.for_each_mesh(|mesh, _| ids.push(mesh.id()));
        ids
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.for_each_mesh(|_, _| count += 1);
        count
    }

    pub fn triangle_count(&self) -> usize {
        let mut count = 0;
        self.for_each_mesh(|mesh, _| count += mesh.geometry.triangle_count());
        count
    }
}

impl Dispose for ModelSubtree {
    fn dispose(self, resources: &mut dyn ResourceRelease) {
        self.root.dispose(resources);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Ambient {
        color: [f32; 3],
        intensity: f32,
    },
    /// Shines from `position` towards the origin.
    Directional {
        color: [f32; 3],
        intensity: f32,
        position: Point3<f32>,
    },
}

impl Dispose for Light {
    fn dispose(self, _resources: &mut dyn ResourceRelease) {}
}

#[derive(Debug)]
pub enum NodeContent {
    Light(Light),
    Hotspot(Hotspot),
    Model(ModelSubtree),
}

impl Dispose for NodeContent {
    fn dispose(self, resources: &mut dyn ResourceRelease) {
        match self {
            NodeContent::Light(light) => light.dispose(resources),
            NodeContent::Hotspot(hotspot) => hotspot.dispose(resources),
            NodeContent::Model(model) => model.dispose(resources),
        }
    }
}

#[derive(Debug)]
pub struct SceneNode {
    pub id: NodeId,
    pub content: NodeContent,
}

pub struct DrawItem<'a> {
    pub mesh: &'a Mesh,
    pub world: Matrix4<f32>,
}

/// Everything the surface needs to draw one frame.
pub struct Frame<'a> {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub eye: Point3<f32>,
    pub background: [f32; 3],
    pub lights: Vec<&'a Light>,
    pub items: Vec<DrawItem<'a>>,
}

#[derive(Debug)]
pub struct Scene {
    pub background: [f32; 3],
    children: Vec<SceneNode>,
    next_id: u32,
}

impl Scene {
    pub fn new(background: [f32; 3]) -> Self {
        Self {
            background,
            children: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add(&mut self, content: NodeContent) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.children.push(SceneNode { id, content });
        id
    }

    pub fn remove(&mut self, id: NodeId) -> Option<NodeContent> {
        let index = self.children.iter().position(|node| node.id == id)?;
        Some(self.children.remove(index).content)
    }

    /// Detach every child for which `keep` is false and hand them back.
    pub fn drain_where(&mut self, mut keep: impl FnMut(&SceneNode) -> bool) -> Vec<NodeContent> {
        let (kept, removed): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.children).into_iter().partition(|node| keep(node));
        self.children = kept;
        removed.into_iter().map(|node| node.content).collect()
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeContent> {
        self.children.iter().find(|n| n.id == id).map(|n| &n.content)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeContent> {
        self.children
            .iter_mut()
            .find(|n| n.id == id)
            .map(|n| &mut n.content)
    }

    pub fn children(&self) -> &[SceneNode] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.children.iter().filter_map(|n| match &n.content {
            NodeContent::Light(light) => Some(light),
            _ => None,
        })
    }

    pub fn models(&self) -> impl Iterator<Item = (NodeId, &ModelSubtree)> {
        self.children.iter().filter_map(|n| match &n.content {
            NodeContent::Model(model) => Some((n.id, model)),
            _ => None,
        })
    }

    pub fn model_mut(&mut self, id: NodeId) -> Option<&mut ModelSubtree> {
        match self.get_mut(id)? {
            NodeContent::Model(model) => Some(model),
            _ => None,
        }
    }

    /// Flatten the graph into world-space draw items.
    pub fn draw_items(&self) -> Vec<DrawItem<'_>> {
        let mut items = Vec::new();
        for node in &self.children {
            match &node.content {
                NodeContent::Light(_) => {}
                NodeContent::Hotspot(hotspot) => items.push(DrawItem {
                    mesh: hotspot.marker(),
                    world: hotspot.world_matrix(),
                }),
                NodeContent::Model(model) => {
                    model.for_each_mesh(|mesh, world| items.push(DrawItem { mesh, world }))
                }
            }
        }
        items
    }
}
