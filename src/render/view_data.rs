use cgmath::{InnerSpace, Matrix, Matrix4, SquareMatrix, Vector3};
use wgpu::{util::DeviceExt, BindGroup, BindGroupLayout, Buffer, Device, Queue, RenderPass};

use super::scene::{Frame, Light, Material, Mesh};

/// Maximum directional lights passed to the shader.
pub(crate) const MAX_LIGHTS: usize = 4;

/// cgmath builds OpenGL clip space; wgpu expects depth in `0..1`.
#[rustfmt::skip]
pub(crate) const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirtyFlags: u32 {
        const SURFACE = 0b00000001;
        const DEPTH = 0b00000010;
        const ALL = Self::SURFACE.bits() | Self::DEPTH.bits();
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct Vertex {
    pub(crate) position: [f32; 3],
    pub(crate) normal: [f32; 3],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub(crate) fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

// Uniform members are all vec4-sized; WebGL has no 16-byte-unaligned bindings.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct MeshUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    color: [f32; 4],
    /// x: unlit, y: double sided
    flags: [u32; 4],
}

impl MeshUniform {
    pub(crate) fn new(world: Matrix4<f32>, material: &Material) -> Self {
        let normal = world
            .invert()
            .map(|m| m.transpose())
            .unwrap_or_else(Matrix4::identity);
        let [r, g, b] = material.color;
        Self {
            model: world.into(),
            normal: normal.into(),
            color: [r, g, b, material.opacity],
            flags: [material.unlit as u32, material.double_sided as u32, 0, 0],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct FrameUniform {
    view_proj: [[f32; 4]; 4],
    eye: [f32; 4],
    ambient: [f32; 4],
    light_dir: [[f32; 4]; MAX_LIGHTS],
    light_color: [[f32; 4]; MAX_LIGHTS],
    light_count: [u32; 4],
}

impl FrameUniform {
    pub(crate) fn new(frame: &Frame<'_>) -> Self {
        let view_proj = OPENGL_TO_WGPU_MATRIX * frame.projection * frame.view;
        let mut uniform = Self {
            view_proj: view_proj.into(),
            eye: [frame.eye.x, frame.eye.y, frame.eye.z, 1.0],
            ambient: [0.0; 4],
            light_dir: [[0.0; 4]; MAX_LIGHTS],
            light_color: [[0.0; 4]; MAX_LIGHTS],
            light_count: [0; 4],
        };
        let mut count = 0;
        for light in &frame.lights {
            match light {
                Light::Ambient { color, intensity } => {
                    for c in 0..3 {
                        uniform.ambient[c] += color[c] * intensity;
                    }
                }
                Light::Directional {
                    color,
                    intensity,
                    position,
                } => {
                    if count == MAX_LIGHTS {
                        log::warn!("more than {MAX_LIGHTS} directional lights, ignoring the rest");
                        continue;
                    }
                    let to_light = Vector3::new(position.x, position.y, position.z);
                    if to_light.magnitude2() == 0.0 {
                        continue;
                    }
                    let dir = to_light.normalize();
                    uniform.light_dir[count] = [dir.x, dir.y, dir.z, 0.0];
                    uniform.light_color[count] = [
                        color[0] * intensity,
                        color[1] * intensity,
                        color[2] * intensity,
                        1.0,
                    ];
                    count += 1;
                }
            }
        }
        uniform.light_count[0] = count as u32;
        uniform
    }
}

/// GPU buffers of one scene mesh.
pub(crate) struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    uniform_buffer: Buffer,
    bind_group: BindGroup,
}

impl GpuMesh {
    pub(crate) fn upload(device: &Device, layout: &BindGroupLayout, mesh: &Mesh) -> Self {
        let geometry = &mesh.geometry;
        let vertices: Vec<Vertex> = geometry
            .positions
            .iter()
            .zip(&geometry.normals)
            .map(|(&position, &normal)| Vertex { position, normal })
            .collect();

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vertex_buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("index_buffer"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_uniform_buffer"),
            contents: bytemuck::bytes_of(&MeshUniform::new(Matrix4::identity(), &mesh.material)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mesh_bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: geometry.indices.len() as u32,
            uniform_buffer,
            bind_group,
        }
    }

    #[inline]
    pub(crate) fn write_uniform(&self, queue: &Queue, world: Matrix4<f32>, material: &Material) {
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&MeshUniform::new(world, material)),
        );
    }

    pub(crate) fn draw<'a>(&'a self, render_pass: &mut RenderPass<'a>) {
        render_pass.set_bind_group(1, &self.bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
    }

    pub(crate) fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.uniform_buffer.destroy();
    }
}
