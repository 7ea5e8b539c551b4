use std::collections::HashMap;
use std::io::BufReader;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::error::Result;
use crate::render::scene::{Geometry, Material, Mesh, ModelNode, ModelSubtree};

/// Light random color so untextured parts stay distinguishable.
fn pastel(rng: &mut impl Rng) -> [f32; 3] {
    [
        rng.gen_range(0.55..0.95),
        rng.gen_range(0.55..0.95),
        rng.gen_range(0.55..0.95),
    ]
}

fn triples(values: &[f32]) -> Vec<[f32; 3]> {
    values.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect()
}

/// Parse a Wavefront OBJ document. Material libraries are not fetched.
pub(crate) fn parse(name: &str, bytes: &[u8]) -> Result<ModelSubtree> {
    let mut reader = BufReader::new(bytes);
    let options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };
    let (models, _) = tobj::load_obj_buf(&mut reader, &options, |_| {
        Ok((Vec::new(), HashMap::new()))
    })?;

    let mut rng = SmallRng::from_entropy();
    let mut root = ModelNode::group(name);
    for model in models {
        let mesh = model.mesh;
        if mesh.indices.len() < 3 {
            continue;
        }
        let positions = triples(&mesh.positions);
        let normals = (mesh.normals.len() == mesh.positions.len()).then(|| triples(&mesh.normals));
        let mut node = ModelNode::group(model.name);
        node.meshes.push(Mesh::new(
            Geometry::new(positions, normals, mesh.indices),
            Material {
                color: pastel(&mut rng),
                ..Material::default()
            },
        ));
        root.children.push(node);
    }
    Ok(ModelSubtree::new(name, root))
}
