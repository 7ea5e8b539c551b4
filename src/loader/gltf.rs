//! glTF 2.0 (JSON and binary) import

use std::collections::HashSet;

use base64::Engine as _;
use cgmath::Matrix4;

use super::{resolve_url, AssetSource};
use crate::error::{Result, ViewerError};
use crate::render::scene::{Geometry, Material, Mesh, ModelNode, ModelSubtree};

pub(crate) async fn parse<A: AssetSource>(
    assets: &A,
    base_url: &str,
    name: &str,
    bytes: &[u8],
) -> Result<ModelSubtree> {
    let ::gltf::Gltf { document, blob } = ::gltf::Gltf::from_slice(bytes)?;
    let buffers = load_buffers(assets, base_url, &document, blob).await?;

    let mut root = ModelNode::group(name);
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                root.children.push(read_node(&node, &buffers)?);
            }
        }
        None => {
            // No scene: every node that is nobody's child is a root.
            let children: HashSet<usize> = document
                .nodes()
                .flat_map(|n| n.children().map(|c| c.index()).collect::<Vec<_>>())
                .collect();
            for node in document.nodes().filter(|n| !children.contains(&n.index())) {
                root.children.push(read_node(&node, &buffers)?);
            }
        }
    }
    Ok(ModelSubtree::new(name, root))
}

async fn load_buffers<A: AssetSource>(
    assets: &A,
    base_url: &str,
    document: &::gltf::Document,
    mut blob: Option<Vec<u8>>,
) -> Result<Vec<Vec<u8>>> {
    let mut buffers = Vec::new();
    for buffer in document.buffers() {
        let data = match buffer.source() {
            ::gltf::buffer::Source::Bin => blob
                .take()
                .ok_or_else(|| ViewerError::Parse("missing binary chunk".to_owned()))?,
            ::gltf::buffer::Source::Uri(uri) => match uri.strip_prefix("data:") {
                Some(data_uri) => decode_data_uri(data_uri)?,
                None => assets.fetch(&resolve_url(base_url, uri)?).await?,
            },
        };
        if data.len() < buffer.length() {
            return Err(ViewerError::Parse(format!(
                "buffer {} holds {} bytes, expected {}",
                buffer.index(),
                data.len(),
                buffer.length()
            )));
        }
        buffers.push(data);
    }
    Ok(buffers)
}

fn decode_data_uri(data_uri: &str) -> Result<Vec<u8>> {
    let (_, payload) = data_uri
        .split_once(";base64,")
        .ok_or_else(|| ViewerError::Parse("only base64 data URIs are supported".to_owned()))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ViewerError::Parse(format!("bad base64 buffer: {e}")))
}

fn read_node(node: &::gltf::Node<'_>, buffers: &[Vec<u8>]) -> Result<ModelNode> {
    let mut out = ModelNode::group(node.name().unwrap_or_default());
    out.transform = Matrix4::from(node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if let Some(mesh) = read_primitive(&primitive, buffers)? {
                out.meshes.push(mesh);
            }
        }
    }
    for child in node.children() {
        out.children.push(read_node(&child, buffers)?);
    }
    Ok(out)
}

fn read_primitive(primitive: &::gltf::Primitive<'_>, buffers: &[Vec<u8>]) -> Result<Option<Mesh>> {
    if primitive.mode() != ::gltf::mesh::Mode::Triangles {
        log::debug!("skipping {:?} primitive", primitive.mode());
        return Ok(None);
    }
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let Some(positions) = reader.read_positions() else {
        return Ok(None);
    };
    let positions: Vec<[f32; 3]> = positions.collect();
    let normals = reader.read_normals().map(|n| n.collect());
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    if indices.len() < 3 {
        return Ok(None);
    }
    if let Some(bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
        return Err(ViewerError::Parse(format!(
            "index {bad} out of range for {} vertices",
            positions.len()
        )));
    }

    let material = primitive.material();
    let [r, g, b, a] = material.pbr_metallic_roughness().base_color_factor();
    Ok(Some(Mesh::new(
        Geometry::new(positions, normals, indices),
        Material {
            color: [r, g, b],
            opacity: a,
            unlit: false,
            double_sided: material.double_sided(),
        },
    )))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::loader::tests::MemoryAssets;
    use crate::loader::{ModelLoader, ModelSource};

    /// A single-mesh glTF document with its buffer embedded as a data URI,
    /// or referenced as `buffer.bin` when `external` is set.
    pub(crate) fn mesh_gltf(positions: &[[f32; 3]], indices: &[u16], external: bool) -> (String, Vec<u8>) {
        let mut bin: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let offset = bin.len();
        bin.extend(positions.iter().flatten().flat_map(|f| f.to_le_bytes()));
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for p in positions {
            for c in 0..3 {
                min[c] = min[c].min(p[c]);
                max[c] = max[c].max(p[c]);
            }
        }
        let uri = if external {
            "buffer.bin".to_owned()
        } else {
            format!(
                "data:application/octet-stream;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&bin)
            )
        };
        let json = format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "name": "body", "mesh": 0, "translation": [10.0, 0.0, 0.0] }}],
  "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 1 }}, "indices": 0, "material": 0 }}] }}],
  "materials": [{{ "pbrMetallicRoughness": {{ "baseColorFactor": [0.2, 0.4, 0.6, 1.0] }}, "doubleSided": true }}],
  "buffers": [{{ "uri": "{uri}", "byteLength": {len} }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": {ilen}, "target": 34963 }},
    {{ "buffer": 0, "byteOffset": {offset}, "byteLength": {plen}, "target": 34962 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5123, "count": {icount}, "type": "SCALAR" }},
    {{ "bufferView": 1, "componentType": 5126, "count": {pcount}, "type": "VEC3",
       "min": [{min0}, {min1}, {min2}], "max": [{max0}, {max1}, {max2}] }}
  ]
}}"#,
            len = bin.len(),
            ilen = indices.len() * 2,
            plen = positions.len() * 12,
            icount = indices.len(),
            pcount = positions.len(),
            min0 = min[0],
            min1 = min[1],
            min2 = min[2],
            max0 = max[0],
            max1 = max[1],
            max2 = max[2],
        );
        (json, bin)
    }

    fn triangle() -> (Vec<[f32; 3]>, Vec<u16>) {
        (
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn data_uri_document_keeps_hierarchy_and_material() {
        let (positions, indices) = triangle();
        let (json, _) = mesh_gltf(&positions, &indices, false);
        let assets = MemoryAssets::with(&[("models/tri.gltf", json.as_bytes())]);
        let loader = ModelLoader::new(assets);
        let model =
            pollster::block_on(loader.load(ModelSource::Url("models/tri.gltf".into()))).unwrap();
        assert_eq!(model.name, "tri.gltf");
        assert_eq!(model.mesh_count(), 1);
        assert_eq!(model.triangle_count(), 1);

        let body = &model.root.children[0];
        assert_eq!(body.name, "body");
        let mesh = &body.meshes[0];
        assert_eq!(mesh.material.color, [0.2, 0.4, 0.6]);
        assert!(mesh.material.double_sided);
        assert_eq!(mesh.geometry.normals.len(), 3);
        assert_eq!(model.bounding_box().min.x, 10.0);
    }

    #[test]
    fn external_buffer_is_fetched_relative_to_document() {
        let (positions, indices) = triangle();
        let (json, bin) = mesh_gltf(&positions, &indices, true);
        let assets = MemoryAssets::with(&[
            ("models/tri.gltf", json.as_bytes()),
            ("models/buffer.bin", bin.as_slice()),
        ]);
        let loader = ModelLoader::new(assets);
        let model =
            pollster::block_on(loader.load(ModelSource::Url("models/tri.gltf".into()))).unwrap();
        assert_eq!(model.triangle_count(), 1);
    }

    #[test]
    fn external_buffer_of_picked_file_cannot_resolve() {
        let (positions, indices) = triangle();
        let (json, _) = mesh_gltf(&positions, &indices, true);
        let loader = ModelLoader::new(MemoryAssets::default());
        let source = ModelSource::File(("tri.gltf".to_owned(), json.into_bytes()));
        assert!(matches!(
            pollster::block_on(loader.load(source)),
            Err(ViewerError::Fetch(_))
        ));
    }

    #[test]
    fn non_base64_data_uri_is_rejected() {
        assert!(decode_data_uri("text/plain,hello").is_err());
        assert_eq!(decode_data_uri("application/octet-stream;base64,AAE=").unwrap(), vec![0, 1]);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let loader = ModelLoader::new(MemoryAssets::with(&[("x.gltf", &b"{ not json"[..])]));
        let err = pollster::block_on(loader.load(ModelSource::Url("x.gltf".into()))).unwrap_err();
        assert!(matches!(err, ViewerError::Parse(_)));
    }
}
