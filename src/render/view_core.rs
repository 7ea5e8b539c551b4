use wgpu::{
    util::DeviceExt, BindGroup, BindGroupLayout, Buffer, CompareFunction, Device, Queue,
    RenderPipeline, TextureFormat,
};

use super::scene::Material;
use super::view_data::{FrameUniform, Vertex};

pub(crate) const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

fn uniform_layout(device: &Device, label: &str, visibility: wgpu::ShaderStages) -> BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

/// Frame-wide GPU state: the camera/light uniform and the four pipeline
/// variants (culled or double sided, depth writing or not).
pub(crate) struct ViewCore {
    frame_buffer: Buffer,
    frame_bind_group: BindGroup,
    mesh_bind_group_layout: BindGroupLayout,
    pipeline_cull_back: RenderPipeline,
    pipeline_double_sided: RenderPipeline,
    pipeline_cull_back_blend: RenderPipeline,
    pipeline_double_sided_blend: RenderPipeline,
}

impl ViewCore {
    pub(crate) fn new(device: &Device, color_format: TextureFormat) -> Self {
        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let frame_bind_group_layout = uniform_layout(device, "frame_bind_group_layout", visibility);
        let mesh_bind_group_layout = uniform_layout(device, "mesh_bind_group_layout", visibility);

        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame_buffer"),
            contents: bytemuck::bytes_of(&<FrameUniform as bytemuck::Zeroable>::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_bind_group"),
            layout: &frame_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("render_pipeline_layout"),
            bind_group_layouts: &[&frame_bind_group_layout, &mesh_bind_group_layout],
            push_constant_ranges: &[],
        });

        let vertex_buffers = [Vertex::desc()];
        let color_targets = [Some(wgpu::ColorTargetState {
            format: color_format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let pipeline_desc_base = wgpu::RenderPipelineDescriptor {
            label: Some("render_pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &vertex_buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &color_targets,
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        };

        let pipeline_cull_back = device.create_render_pipeline(&pipeline_desc_base);

        let mut desc = pipeline_desc_base.clone();
        desc.primitive.cull_mode = None;
        let pipeline_double_sided = device.create_render_pipeline(&desc);

        // Transparent surfaces test against depth but do not write it.
        let mut desc = pipeline_desc_base.clone();
        if let Some(depth) = desc.depth_stencil.as_mut() {
            depth.depth_write_enabled = false;
        }
        let pipeline_cull_back_blend = device.create_render_pipeline(&desc);
        desc.primitive.cull_mode = None;
        let pipeline_double_sided_blend = device.create_render_pipeline(&desc);

        Self {
            frame_buffer,
            frame_bind_group,
            mesh_bind_group_layout,
            pipeline_cull_back,
            pipeline_double_sided,
            pipeline_cull_back_blend,
            pipeline_double_sided_blend,
        }
    }

    pub(crate) fn mesh_bind_group_layout(&self) -> &BindGroupLayout {
        &self.mesh_bind_group_layout
    }

    pub(crate) fn frame_bind_group(&self) -> &BindGroup {
        &self.frame_bind_group
    }

    pub(crate) fn write_frame(&self, queue: &Queue, uniform: &FrameUniform) {
        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(uniform));
    }

    pub(crate) fn pipeline(&self, material: &Material) -> &RenderPipeline {
        match (material.double_sided, material.is_transparent()) {
            (false, false) => &self.pipeline_cull_back,
            (true, false) => &self.pipeline_double_sided,
            (false, true) => &self.pipeline_cull_back_blend,
            (true, true) => &self.pipeline_double_sided_blend,
        }
    }

    pub(crate) fn destroy(&self) {
        self.frame_buffer.destroy();
    }
}
