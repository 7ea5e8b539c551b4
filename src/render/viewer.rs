//! Viewer session
//!
//! One session per mounted viewer. It owns the scene, camera, orbit
//! controller, hotspot registry and drawing surface, and moves through
//! `Uninitialized -> Active -> Disposed`. Structural calls outside `Active`
//! fail with [`ViewerError::Lifecycle`] before touching any state; pointer and
//! frame callbacks outside `Active` are no-ops.

use std::any::Any;

use cgmath::{Point3, Vector2, Vector3};
use winit::dpi::{PhysicalPosition, PhysicalSize};

use super::camera::{ndc_from_pointer, PerspectiveCamera};
use super::controls::OrbitControls;
use super::hotspot::{Annotation, HotspotHit, HotspotRegistry};
use super::lighting;
use super::scene::{Dispose, Frame, ModelSubtree, NodeContent, NodeId, Scene};
use super::Surface;
use crate::config::ViewerConfig;
use crate::error::{Result, ViewerError};

/// Pointer travel, in pixels, past which a press is an orbit gesture rather
/// than a click.
const CLICK_SLOP: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Active,
    Disposed,
}

/// Issued by [`ViewerSession::begin_load`]; only the newest ticket may swap
/// the displayed model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    source_id: String,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    /// The model is attached under this node.
    Displayed(NodeId),
    /// A newer load was started after this one.
    Stale,
    /// The session is no longer active.
    Dropped,
    /// Fetch or parse failed; the previous model stays attached.
    Failed(ViewerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    Default,
    Pointer,
}

impl CursorStyle {
    pub fn css(self) -> &'static str {
        match self {
            CursorStyle::Default => "default",
            CursorStyle::Pointer => "pointer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Other,
}

impl PointerButton {
    /// Map a DOM `MouseEvent.button` value.
    pub fn from_dom(button: i16) -> Self {
        match button {
            0 => PointerButton::Primary,
            2 => PointerButton::Secondary,
            _ => PointerButton::Other,
        }
    }
}

struct HeldPointer {
    id: i32,
    button: PointerButton,
    last: PhysicalPosition<f64>,
}

fn spread(a: PhysicalPosition<f64>, b: PhysicalPosition<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

pub struct ViewerSession<S: Surface> {
    config: ViewerConfig,
    state: Lifecycle,
    size: PhysicalSize<u32>,
    scene: Scene,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    surface: Option<S>,
    lights: Vec<NodeId>,
    hotspots: HotspotRegistry,
    model: Option<NodeId>,
    source_id: Option<String>,
    generation: u64,
    pressed: Vec<HeldPointer>,
    travelled: f64,
    last_drag: f64,
    selected: Option<Annotation>,
    frame_handle: Option<Box<dyn Any>>,
    frames_drawn: u64,
}

impl<S: Surface> ViewerSession<S> {
    pub fn new(config: ViewerConfig) -> Self {
        let camera = PerspectiveCamera::new(&config.camera, 1.0);
        let controls = OrbitControls::new(config.controls.clone(), &camera);
        Self {
            scene: Scene::new(config.background),
            config,
            state: Lifecycle::Uninitialized,
            size: PhysicalSize::new(0, 0),
            camera,
            controls,
            surface: None,
            lights: Vec::new(),
            hotspots: HotspotRegistry::default(),
            model: None,
            source_id: None,
            generation: 0,
            pressed: Vec::new(),
            travelled: 0.0,
            last_drag: 0.0,
            selected: None,
            frame_handle: None,
            frames_drawn: 0,
        }
    }

    fn ensure_active(&self, operation: &'static str) -> Result<()> {
        match self.state {
            Lifecycle::Active => Ok(()),
            state => Err(ViewerError::lifecycle(operation, state)),
        }
    }

    /// Attach `surface`, install lights and hotspots and size everything to
    /// `size`.
    pub fn init(&mut self, size: PhysicalSize<u32>, surface: S) -> Result<()> {
        if self.state != Lifecycle::Uninitialized {
            return Err(ViewerError::lifecycle("init", self.state));
        }
        self.surface = Some(surface);
        self.lights = lighting::install(self.config.lighting, &mut self.scene);
        for hotspot in self.config.hotspots.clone() {
            self.hotspots.add(
                &mut self.scene,
                Point3::from(hotspot.position),
                hotspot.annotation,
                &self.config.marker,
            );
        }
        self.state = Lifecycle::Active;
        self.resize(size)?;
        log::info!(
            "viewer session active: {} lights, {} hotspots",
            self.lights.len(),
            self.hotspots.len()
        );
        Ok(())
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == Lifecycle::Active
    }

    /// Match camera aspect and surface size to the host container. A size
    /// with a zero side is ignored (the container is not laid out yet).
    pub fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        self.ensure_active("resize")?;
        if size.width == 0 || size.height == 0 {
            log::debug!("ignoring resize to {}x{}", size.width, size.height);
            return Ok(());
        }
        self.size = size;
        self.camera.aspect = size.width as f32 / size.height as f32;
        if let Some(surface) = self.surface.as_mut() {
            surface.resize(size);
        }
        Ok(())
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    fn release(&mut self, content: NodeContent) {
        match self.surface.as_mut() {
            Some(surface) => content.dispose(surface),
            None => drop(content),
        }
    }

    /// Replace the displayed model with `model` and frame it.
    ///
    /// The previous subtree is detached and its meshes released before the
    /// new one is attached.
    pub fn set_model(&mut self, model: ModelSubtree) -> Result<NodeId> {
        self.ensure_active("set model")?;
        if let Some(previous) = self.model.take() {
            if let Some(content) = self.scene.remove(previous) {
                self.release(content);
            }
        }
        log::info!(
            "displaying model {:?}: {} meshes, {} triangles",
            model.name,
            model.mesh_count(),
            model.triangle_count()
        );
        let id = self.scene.add(NodeContent::Model(model));
        self.model = Some(id);
        self.fit_camera_to_object(id)?;
        Ok(id)
    }

    /// Remove every child that is neither an installed light nor a registered
    /// hotspot, releasing its resources. Returns how many were removed.
    pub fn clear(&mut self) -> Result<usize> {
        self.ensure_active("clear")?;
        let lights = &self.lights;
        let hotspots = &self.hotspots;
        let removed = self
            .scene
            .drain_where(|node| lights.contains(&node.id) || hotspots.contains(node.id));
        let count = removed.len();
        for content in removed {
            self.release(content);
        }
        self.model = None;
        self.source_id = None;
        log::debug!("cleared {count} scene children");
        Ok(count)
    }

    /// Center the subtree on the origin and place the camera relative to its
    /// bounding diagonal.
    pub fn fit_camera_to_object(&mut self, id: NodeId) -> Result<()> {
        self.ensure_active("fit camera")?;
        let framing = self.config.framing.clone();
        let Some(model) = self.scene.model_mut(id) else {
            return Ok(());
        };
        let bbox = model.bounding_box();
        let diagonal = bbox.diagonal();
        if !diagonal.is_finite() || diagonal <= f32::EPSILON {
            log::warn!("model {:?} has no extent, keeping camera", model.name);
            return Ok(());
        }
        model.position -= bbox.center();

        self.controls.reset(&mut self.camera);
        self.camera.near = diagonal / framing.near_divisor;
        self.camera.far = diagonal * framing.far_factor;
        self.camera.position = Point3::new(
            0.0,
            framing.elevation * diagonal,
            framing.distance * diagonal,
        );
        self.controls.set_scale_unit(diagonal);
        self.controls.look_at_origin(&mut self.camera);
        self.controls.update(&mut self.camera);
        self.controls.save_state(&self.camera);
        log::debug!(
            "framed diagonal {diagonal}: distance {}, near {}, far {}",
            self.camera.distance(),
            self.camera.near,
            self.camera.far
        );
        Ok(())
    }

    pub fn add_hotspot(&mut self, position: Point3<f32>, annotation: Annotation) -> Result<NodeId> {
        self.ensure_active("add hotspot")?;
        Ok(self
            .hotspots
            .add(&mut self.scene, position, annotation, &self.config.marker))
    }

    pub fn hotspot_count(&self) -> usize {
        self.hotspots.len()
    }

    pub fn hotspots(&self) -> &HotspotRegistry {
        &self.hotspots
    }

    /// Nearest hotspot under a point in normalized device coordinates.
    pub fn hit_test(&self, ndc: Vector2<f32>) -> Option<HotspotHit> {
        let ray = self.camera.ray_from_ndc(ndc);
        self.hotspots.hit_test(&self.scene, &ray)
    }

    fn hit_at(&self, pos: PhysicalPosition<f64>) -> Option<HotspotHit> {
        self.hit_test(ndc_from_pointer(pos, self.size))
    }

    /// Track a pressed pointer. A second concurrent pointer turns the gesture
    /// into a pinch, which never ends in a selection.
    pub fn pointer_down(&mut self, id: i32, pos: PhysicalPosition<f64>, button: PointerButton) {
        if !self.is_active() {
            return;
        }
        self.pressed.retain(|p| p.id != id);
        if self.pressed.is_empty() {
            self.travelled = 0.0;
        } else {
            self.travelled = f64::INFINITY;
        }
        self.pressed.push(HeldPointer {
            id,
            button,
            last: pos,
        });
    }

    /// Orbit or pan while one pointer is held, dolly on a two-pointer pinch;
    /// otherwise report the cursor to show over `pos`.
    pub fn pointer_move(&mut self, id: i32, pos: PhysicalPosition<f64>) -> CursorStyle {
        if !self.is_active() {
            return CursorStyle::Default;
        }
        if self.pressed.is_empty() {
            return if self.config.cursor_feedback && self.hit_at(pos).is_some() {
                CursorStyle::Pointer
            } else {
                CursorStyle::Default
            };
        }
        let Some(index) = self.pressed.iter().position(|p| p.id == id) else {
            return CursorStyle::Default;
        };
        if self.pressed.len() > 1 {
            // Pinch between the first two pointers; extra fingers are ignored.
            if index < 2 {
                let other = self.pressed[1 - index].last;
                let before = spread(self.pressed[index].last, other);
                let after = spread(pos, other);
                self.pressed[index].last = pos;
                if before > 0.0 && after > 0.0 {
                    self.controls.dolly_by((before / after) as f32);
                }
            }
            return CursorStyle::Default;
        }
        let pointer = &mut self.pressed[index];
        let dx = pos.x - pointer.last.x;
        let dy = pos.y - pointer.last.y;
        pointer.last = pos;
        self.travelled += dx.hypot(dy);
        match pointer.button {
            PointerButton::Primary => self.controls.rotate_by_pixels(dx, dy, self.size.height),
            PointerButton::Secondary => self.controls.pan(dx, dy, &self.camera, self.size.height),
            PointerButton::Other => {}
        }
        CursorStyle::Default
    }

    /// Release a pointer; once none is held the gesture's travel decides
    /// whether the following click may select.
    pub fn pointer_up(&mut self, id: i32) {
        let before = self.pressed.len();
        self.pressed.retain(|p| p.id != id);
        if before > 0 && self.pressed.is_empty() {
            self.last_drag = self.travelled;
        }
    }

    /// Select the hotspot under `pos`. A miss leaves the selection untouched;
    /// so does the click that ends an orbit drag.
    pub fn pointer_click(&mut self, pos: PhysicalPosition<f64>) -> Option<Annotation> {
        if !self.is_active() {
            return None;
        }
        let dragged = std::mem::take(&mut self.last_drag);
        if dragged > CLICK_SLOP {
            return None;
        }
        let hit = self.hit_at(pos)?;
        log::debug!("hotspot {:?} selected at {}", hit.annotation.title, hit.distance);
        self.selected = Some(hit.annotation.clone());
        Some(hit.annotation)
    }

    pub fn wheel(&mut self, delta_y: f64) {
        if self.is_active() {
            self.controls.dolly(delta_y);
        }
    }

    pub fn selected(&self) -> Option<&Annotation> {
        self.selected.as_ref()
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// One frame: billboard markers, step the controller, draw.
    /// Returns `false` once the session is no longer active.
    pub fn tick(&mut self) -> Result<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        if self.config.billboard_hotspots {
            self.hotspots.face_camera(&mut self.scene, self.camera.position);
        }
        self.controls.update(&mut self.camera);

        let frame = Frame {
            view: self.camera.view_matrix(),
            projection: self.camera.projection_matrix(),
            eye: self.camera.position,
            background: self.scene.background,
            lights: self.scene.lights().collect(),
            items: self.scene.draw_items(),
        };
        if let Some(surface) = self.surface.as_mut() {
            surface.draw(&frame)?;
        }
        self.frames_drawn += 1;
        Ok(true)
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Keep the pending frame request alive; dropping it cancels the request.
    pub fn set_frame_handle(&mut self, handle: Box<dyn Any>) {
        if self.is_active() {
            self.frame_handle = Some(handle);
        }
    }

    /// Start a load. Any ticket issued earlier becomes stale.
    pub fn begin_load(&mut self, source_id: impl Into<String>) -> Result<LoadTicket> {
        self.ensure_active("load")?;
        self.generation += 1;
        let ticket = LoadTicket {
            generation: self.generation,
            source_id: source_id.into(),
        };
        log::debug!("load #{} started: {}", ticket.generation, ticket.source_id);
        Ok(ticket)
    }

    /// Apply a finished load if it is still the newest one.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<ModelSubtree>) -> LoadOutcome {
        if !self.is_active() {
            log::debug!("dropping load of {}: session {:?}", ticket.source_id, self.state);
            return LoadOutcome::Dropped;
        }
        if ticket.generation != self.generation {
            log::debug!(
                "dropping stale load #{} of {} (current #{})",
                ticket.generation,
                ticket.source_id,
                self.generation
            );
            return LoadOutcome::Stale;
        }
        let model = match result {
            Ok(model) => model,
            Err(err) => {
                let err = ViewerError::load(ticket.source_id, err);
                log::warn!("{err}");
                return LoadOutcome::Failed(err);
            }
        };
        match self.set_model(model) {
            Ok(id) => {
                self.source_id = Some(ticket.source_id);
                LoadOutcome::Displayed(id)
            }
            Err(err) => LoadOutcome::Failed(err),
        }
    }

    /// Source of the displayed model.
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// Cancel the frame request, release every node and detach the surface.
    /// Calling it again does nothing.
    pub fn dispose(&mut self) {
        if self.state == Lifecycle::Disposed {
            return;
        }
        self.frame_handle.take();
        let removed = self.scene.drain_where(|_| false);
        let count = removed.len();
        for content in removed {
            self.release(content);
        }
        self.lights.clear();
        self.hotspots.clear();
        self.model = None;
        self.source_id = None;
        self.selected = None;
        self.pressed.clear();
        if let Some(mut surface) = self.surface.take() {
            surface.detach();
        }
        self.state = Lifecycle::Disposed;
        log::info!("viewer session disposed, released {count} scene children");
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&ModelSubtree> {
        match self.scene.get(self.model?)? {
            NodeContent::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn model_id(&self) -> Option<NodeId> {
        self.model
    }

    /// Camera offset from the orbit target.
    pub fn camera_offset(&self) -> Vector3<f32> {
        self.camera.position - self.controls.target
    }
}

impl<S: Surface> Drop for ViewerSession<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
