//! End-to-end behaviour of a viewer session driven through its public API,
//! with an in-memory asset store, a recording surface and a manual frame
//! scheduler standing in for the browser.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use approx::assert_relative_eq;
use base64::Engine as _;
use winit::dpi::PhysicalSize;

use hotspot_viewer::loader::{load_into, AssetSource, ModelLoader, ModelSource};
use hotspot_viewer::render::frame_loop::{self, FrameScheduler};
use hotspot_viewer::render::scene::{Frame, MeshId};
use hotspot_viewer::render::viewer::{LoadOutcome, Lifecycle};
use hotspot_viewer::render::{ResourceRelease, Surface};
use hotspot_viewer::{Result, ViewerConfig, ViewerError, ViewerSession};

#[derive(Default)]
struct Recorded {
    draws: usize,
    released: Vec<MeshId>,
    detached: bool,
}

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Recorded>>);

impl ResourceRelease for Recorder {
    fn release_mesh(&mut self, mesh: MeshId) {
        self.0.borrow_mut().released.push(mesh);
    }
}

impl Surface for Recorder {
    fn resize(&mut self, _size: PhysicalSize<u32>) {}

    fn draw(&mut self, _frame: &Frame<'_>) -> Result<()> {
        self.0.borrow_mut().draws += 1;
        Ok(())
    }

    fn detach(&mut self) {
        self.0.borrow_mut().detached = true;
    }
}

struct Revoke {
    url: String,
    log: Rc<RefCell<Vec<String>>>,
}

impl AsRef<str> for Revoke {
    fn as_ref(&self) -> &str {
        &self.url
    }
}

impl Drop for Revoke {
    fn drop(&mut self) {
        self.log.borrow_mut().push(self.url.clone());
    }
}

#[derive(Default)]
struct Store {
    files: RefCell<HashMap<String, Vec<u8>>>,
    revoked: Rc<RefCell<Vec<String>>>,
}

impl Store {
    fn put(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        self.files.borrow_mut().insert(url.to_owned(), bytes.into());
    }
}

impl AssetSource for Store {
    type File = (String, Vec<u8>);
    type ObjectUrl = Revoke;

    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> {
        let bytes = self.files.borrow().get(url).cloned();
        let url = url.to_owned();
        async move { bytes.ok_or(ViewerError::Fetch(format!("not found: {url}"))) }
    }

    fn file_name(&self, file: &Self::File) -> String {
        file.0.clone()
    }

    fn object_url(&self, file: &Self::File) -> Result<Revoke> {
        let url = format!("blob:test/{}", file.0);
        self.put(&url, file.1.clone());
        Ok(Revoke {
            url,
            log: self.revoked.clone(),
        })
    }
}

/// Axis-aligned cube centred on `center` whose bounding diagonal is
/// `diagonal`.
fn cube_obj(diagonal: f32, center: [f32; 3]) -> String {
    let h = diagonal / (2.0 * 3f32.sqrt());
    let mut obj = String::from("o cube\n");
    for i in 0..8 {
        let sx = if i & 1 == 0 { -h } else { h };
        let sy = if i & 2 == 0 { -h } else { h };
        let sz = if i & 4 == 0 { -h } else { h };
        obj += &format!(
            "v {} {} {}\n",
            center[0] + sx,
            center[1] + sy,
            center[2] + sz
        );
    }
    for face in ["1 3 4 2", "5 6 8 7", "1 2 6 5", "3 7 8 4", "1 5 7 3", "2 4 8 6"] {
        obj += &format!("f {face}\n");
    }
    obj
}

fn triangle_gltf() -> String {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let bin: Vec<u8> = positions.iter().flat_map(|f| f.to_le_bytes()).collect();
    let data = base64::engine::general_purpose::STANDARD.encode(&bin);
    format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "mesh": 0 }}],
  "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 0 }} }}] }}],
  "buffers": [{{ "uri": "data:application/octet-stream;base64,{data}", "byteLength": 36 }}],
  "bufferViews": [{{ "buffer": 0, "byteLength": 36 }}],
  "accessors": [{{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                   "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }}]
}}"#
    )
}

fn session(config: ViewerConfig, size: PhysicalSize<u32>) -> (RefCell<ViewerSession<Recorder>>, Recorder) {
    let recorder = Recorder::default();
    let mut session = ViewerSession::new(config);
    session.init(size, recorder.clone()).unwrap();
    (RefCell::new(session), recorder)
}

#[test]
fn picked_obj_file_is_displayed_and_its_url_revoked() {
    let (session, _) = session(ViewerConfig::studio(), PhysicalSize::new(800, 600));
    let loader = ModelLoader::new(Store::default());
    let file = ("chair.obj".to_owned(), cube_obj(2.0, [0.0; 3]).into_bytes());

    let outcome = pollster::block_on(load_into(&session, &loader, ModelSource::File(file)));
    assert!(matches!(outcome, LoadOutcome::Displayed(_)));
    assert_eq!(session.borrow().model().unwrap().triangle_count(), 12);
    assert_eq!(session.borrow().source_id(), Some("chair.obj"));
    assert_eq!(*loader.assets().revoked.borrow(), vec!["blob:test/chair.obj"]);
}

#[test]
fn gltf_with_embedded_buffer_loads_from_url() {
    let (session, _) = session(ViewerConfig::basic(), PhysicalSize::new(800, 600));
    let store = Store::default();
    store.put("assets/models/scene.gltf", triangle_gltf());
    let loader = ModelLoader::new(store);

    let outcome = pollster::block_on(load_into(
        &session,
        &loader,
        ModelSource::Url("assets/models/scene.gltf".into()),
    ));
    assert!(matches!(outcome, LoadOutcome::Displayed(_)));
    let session = session.borrow();
    let model = session.model().unwrap();
    assert_eq!(model.name, "scene.gltf");
    assert_eq!(model.triangle_count(), 1);
}

#[test]
fn failed_load_keeps_previous_model_and_revokes_url() {
    let (session, recorder) = session(ViewerConfig::studio(), PhysicalSize::new(800, 600));
    let store = Store::default();
    store.put("a.obj", cube_obj(2.0, [0.0; 3]));
    let loader = ModelLoader::new(store);
    pollster::block_on(load_into(&session, &loader, ModelSource::Url("a.obj".into())));

    let broken = ("broken.glb".to_owned(), b"glTF\x02\0\0\0garbage".to_vec());
    match pollster::block_on(load_into(&session, &loader, ModelSource::File(broken))) {
        LoadOutcome::Failed(ViewerError::Load { source_id, .. }) => assert_eq!(source_id, "broken.glb"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(session.borrow().source_id(), Some("a.obj"));
    assert_eq!(session.borrow().scene().models().count(), 1);
    assert!(recorder.0.borrow().released.is_empty());
    assert_eq!(loader.assets().revoked.borrow().len(), 1);

    let missing = pollster::block_on(load_into(&session, &loader, ModelSource::Url("gone.obj".into())));
    assert!(matches!(missing, LoadOutcome::Failed(ViewerError::Load { .. })));
    assert_eq!(session.borrow().source_id(), Some("a.obj"));
}

#[test]
fn superseded_load_is_discarded() {
    let (session, _) = session(ViewerConfig::studio(), PhysicalSize::new(800, 600));
    let store = Store::default();
    store.put("slow.obj", cube_obj(1.0, [0.0; 3]));
    store.put("fast.obj", cube_obj(3.0, [0.0; 3]));
    let loader = ModelLoader::new(store);

    let slow = session.borrow_mut().begin_load("slow.obj").unwrap();
    let fast = pollster::block_on(load_into(&session, &loader, ModelSource::Url("fast.obj".into())));
    assert!(matches!(fast, LoadOutcome::Displayed(_)));

    let late = pollster::block_on(loader.load(ModelSource::Url("slow.obj".into())));
    let outcome = session.borrow_mut().finish_load(slow, late);
    assert!(matches!(outcome, LoadOutcome::Stale));
    assert_eq!(session.borrow().source_id(), Some("fast.obj"));
    assert_eq!(session.borrow().scene().models().count(), 1);
}

#[test]
fn framing_and_swap_on_studio_viewer() {
    let (session, recorder) = session(ViewerConfig::studio(), PhysicalSize::new(800, 600));
    let store = Store::default();
    store.put("a.obj", cube_obj(2.0, [5.0, -3.0, 1.0]));
    store.put("b.obj", cube_obj(1.0, [0.0; 3]));
    let loader = ModelLoader::new(store);

    pollster::block_on(load_into(&session, &loader, ModelSource::Url("a.obj".into())));
    let a_meshes = session.borrow().model().unwrap().mesh_ids();
    {
        let session = session.borrow();
        let camera = session.camera();
        assert_relative_eq!(camera.far, 20.0, epsilon = 1e-3);
        assert_relative_eq!(camera.near, 0.02, epsilon = 1e-5);
        assert_relative_eq!(camera.aspect, 800.0 / 600.0);
        let center = session.model().unwrap().bounding_box().center();
        assert_relative_eq!(center.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(center.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(center.z, 0.0, epsilon = 1e-4);
    }

    pollster::block_on(load_into(&session, &loader, ModelSource::Url("b.obj".into())));
    let session = session.borrow();
    assert_eq!(session.scene().models().count(), 1);
    assert_eq!(session.model().unwrap().name, "b.obj");
    let recorded = recorder.0.borrow();
    assert!(a_meshes.iter().all(|id| recorded.released.contains(id)));
}

#[test]
fn resize_tracks_container_aspect() {
    let (session, _) = session(ViewerConfig::basic(), PhysicalSize::new(800, 600));
    let mut session = session.into_inner();
    session.resize(PhysicalSize::new(400, 300)).unwrap();
    assert_relative_eq!(session.camera().aspect, 800.0 / 600.0);
    session.resize(PhysicalSize::new(800, 400)).unwrap();
    assert_relative_eq!(session.camera().aspect, 2.0);
    assert_eq!(session.size(), PhysicalSize::new(800, 400));
}

#[test]
fn framing_scales_with_model_size() {
    let ratio = |diagonal: f32| {
        let (session, _) = session(ViewerConfig::studio(), PhysicalSize::new(800, 600));
        let store = Store::default();
        store.put("m.obj", cube_obj(diagonal, [0.0; 3]));
        let loader = ModelLoader::new(store);
        pollster::block_on(load_into(&session, &loader, ModelSource::Url("m.obj".into())));
        let session = session.borrow();
        (
            session.camera().distance() / diagonal,
            session.camera().far / diagonal,
            session.controls().min_distance() / diagonal,
        )
    };
    let small = ratio(1.0);
    let large = ratio(1000.0);
    assert_relative_eq!(small.0, large.0, max_relative = 1e-3);
    assert_relative_eq!(small.1, large.1, max_relative = 1e-3);
    assert_relative_eq!(small.2, large.2, max_relative = 1e-3);
}

struct Manual {
    queue: RefCell<Vec<(Box<dyn FnOnce(f64)>, Rc<Cell<bool>>)>>,
}

struct Ticket(Rc<Cell<bool>>);

impl Drop for Ticket {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

impl Manual {
    /// Run every pending, non-cancelled callback once.
    fn fire(&self) -> usize {
        let pending = std::mem::take(&mut *self.queue.borrow_mut());
        let mut fired = 0;
        for (callback, cancelled) in pending {
            if !cancelled.get() {
                callback(0.0);
                fired += 1;
            }
        }
        fired
    }
}

impl FrameScheduler for Manual {
    type Handle = Ticket;

    fn request(&self, callback: Box<dyn FnOnce(f64)>) -> Ticket {
        let cancelled = Rc::new(Cell::new(false));
        self.queue.borrow_mut().push((callback, cancelled.clone()));
        Ticket(cancelled)
    }
}

#[test]
fn no_frame_is_drawn_after_dispose() {
    let (session, recorder) = session(ViewerConfig::studio(), PhysicalSize::new(800, 600));
    let session = Rc::new(session);
    let frames = Rc::new(Manual {
        queue: RefCell::new(Vec::new()),
    });
    frame_loop::start(&session, frames.clone());

    assert_eq!(frames.fire(), 1);
    assert_eq!(frames.fire(), 1);
    assert_eq!(recorder.0.borrow().draws, 2);

    session.borrow_mut().dispose();
    assert_eq!(session.borrow().state(), Lifecycle::Disposed);
    assert!(recorder.0.borrow().detached);
    assert_eq!(frames.fire(), 0);
    assert_eq!(recorder.0.borrow().draws, 2);
}

#[test]
fn bundled_sample_model_loads() {
    let (session, _) = session(ViewerConfig::studio(), PhysicalSize::new(800, 600));
    let store = Store::default();
    store.put(
        "assets/models/scene.gltf",
        include_str!("../assets/models/scene.gltf"),
    );
    let loader = ModelLoader::new(store);
    let outcome = pollster::block_on(load_into(
        &session,
        &loader,
        ModelSource::Url("assets/models/scene.gltf".into()),
    ));
    assert!(matches!(outcome, LoadOutcome::Displayed(_)));
    assert_eq!(session.borrow().model().unwrap().triangle_count(), 12);
}
