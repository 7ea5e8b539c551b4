use std::collections::HashMap;

use cgmath::{InnerSpace, Point3, Transform};
use web_sys::HtmlCanvasElement;
use winit::dpi::PhysicalSize;

use super::scene::{DrawItem, Frame, MeshId};
use super::view_core::{ViewCore, DEPTH_FORMAT};
use super::view_data::{DirtyFlags, FrameUniform, GpuMesh};
use super::{ResourceRelease, Surface};
use crate::error::Result;

/// The wgpu drawing surface bound to a canvas.
pub struct Renderer {
    canvas: HtmlCanvasElement,
    surface: wgpu::Surface,
    config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,
    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    core: ViewCore,
    meshes: HashMap<MeshId, GpuMesh>,
    dirty: DirtyFlags,
    detached: bool,
}

fn create_depth_texture(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: config.width.max(1),
            height: config.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

impl Renderer {
    #[cfg(target_arch = "wasm32")]
    pub async fn new(canvas: HtmlCanvasElement, width: u32, height: u32) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface_from_canvas(canvas.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .ok_or(anyhow::anyhow!("Failed to find an appropriate adapter"))?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    features: wgpu::Features::empty(),
                    // Make sure we use the texture resolution limits from the adapter, so we can support images the size of the swapchain.
                    limits: wgpu::Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let texture_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(anyhow::anyhow!("Surface reports no texture formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let (depth_texture, depth_view) = create_depth_texture(&device, &config);
        let core = ViewCore::new(&device, texture_format);
        log::info!("renderer ready: {:?} {}x{}", texture_format, config.width, config.height);

        Ok(Self {
            canvas,
            surface,
            config,
            device,
            queue,
            depth_texture,
            depth_view,
            core,
            meshes: HashMap::new(),
            dirty: DirtyFlags::empty(),
            detached: false,
        })
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub async fn new(_canvas: HtmlCanvasElement, _width: u32, _height: u32) -> anyhow::Result<Self> {
        anyhow::bail!("a canvas surface is only available on wasm32")
    }

    pub fn w(&self) -> u32 {
        self.config.width
    }

    pub fn h(&self) -> u32 {
        self.config.height
    }

    fn apply_dirty(&mut self) {
        if self.dirty.contains(DirtyFlags::SURFACE) {
            self.surface.configure(&self.device, &self.config);
        }
        if self.dirty.contains(DirtyFlags::DEPTH) {
            self.depth_texture.destroy();
            let (texture, view) = create_depth_texture(&self.device, &self.config);
            self.depth_texture = texture;
            self.depth_view = view;
        }
        self.dirty = DirtyFlags::empty();
    }

    /// Upload meshes seen for the first time and refresh every transform.
    fn sync_meshes(&mut self, items: &[DrawItem<'_>]) {
        for item in items {
            let mesh = item.mesh;
            let gpu = self.meshes.entry(mesh.id()).or_insert_with(|| {
                GpuMesh::upload(&self.device, self.core.mesh_bind_group_layout(), mesh)
            });
            gpu.write_uniform(&self.queue, item.world, &mesh.material);
        }
    }
}

fn eye_distance2(item: &DrawItem<'_>, eye: Point3<f32>) -> f32 {
    let origin = item.world.transform_point(Point3::new(0.0, 0.0, 0.0));
    (origin - eye).magnitude2()
}

/// Opaque items first, then transparent ones back to front.
fn draw_order<'f, 'a>(items: &'f [DrawItem<'a>], eye: Point3<f32>) -> Vec<&'f DrawItem<'a>> {
    let (mut order, mut transparent): (Vec<_>, Vec<_>) =
        items.iter().partition(|item| !item.mesh.material.is_transparent());
    transparent.sort_by(|a, b| eye_distance2(b, eye).total_cmp(&eye_distance2(a, eye)));
    order.append(&mut transparent);
    order
}

impl ResourceRelease for Renderer {
    fn release_mesh(&mut self, mesh: MeshId) {
        if let Some(gpu) = self.meshes.remove(&mesh) {
            gpu.destroy();
        }
    }
}

impl Surface for Renderer {
    fn resize(&mut self, size: PhysicalSize<u32>) {
        let max = self.device.limits().max_texture_dimension_2d;
        let width = size.width.clamp(1, max);
        let height = size.height.clamp(1, max);
        if width == self.config.width && height == self.config.height {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.canvas.set_width(width);
        self.canvas.set_height(height);
        self.dirty.insert(DirtyFlags::ALL);
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<()> {
        if self.detached {
            return Ok(());
        }
        self.apply_dirty();
        self.sync_meshes(&frame.items);
        self.core.write_frame(&self.queue, &FrameUniform::new(frame));

        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                self.dirty.insert(DirtyFlags::SURFACE);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let [r, g, b] = frame.background.map(f64::from);
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a: 1.0 }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_viewport(0.0, 0.0, self.w() as f32, self.h() as f32, 0.0, 1.0);
            render_pass.set_bind_group(0, self.core.frame_bind_group(), &[]);
            for item in draw_order(&frame.items, frame.eye) {
                if let Some(gpu) = self.meshes.get(&item.mesh.id()) {
                    render_pass.set_pipeline(self.core.pipeline(&item.mesh.material));
                    gpu.draw(&mut render_pass);
                }
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        texture.present();
        Ok(())
    }

    fn detach(&mut self) {
        if self.detached {
            return;
        }
        for (_, gpu) in self.meshes.drain() {
            gpu.destroy();
        }
        self.depth_texture.destroy();
        self.core.destroy();
        self.canvas.remove();
        self.detached = true;
        log::debug!("renderer detached");
    }
}
