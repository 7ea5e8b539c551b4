//! Binds a [`ViewerSession`] to a DOM container: canvas, GPU surface, pointer
//! and resize listeners, animation frames and async loads.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_events::{EventListener, EventListenerOptions};
use leptos::spawn_local;
use wasm_bindgen::JsCast;
use web_sys::{Event, File, HtmlCanvasElement, HtmlElement, MouseEvent, PointerEvent, WheelEvent};
use winit::dpi::{LogicalPosition, LogicalSize, PhysicalPosition, PhysicalSize};

use crate::config::{PointerFeedback, ViewerConfig};
use crate::loader::browser::BrowserAssets;
use crate::loader::{self, ModelLoader, ModelSource};
use crate::render::frame_loop::{self, AnimationFrames};
use crate::render::hotspot::Annotation;
use crate::render::render::Renderer;
use crate::render::viewer::{LoadOutcome, PointerButton, ViewerSession};
use crate::render::Surface;

/// Hand-offs into the reactive layer.
#[derive(Clone)]
pub struct HostCallbacks {
    pub on_select: Rc<dyn Fn(Annotation)>,
    pub on_loading: Rc<dyn Fn(bool)>,
    pub on_error: Rc<dyn Fn(Option<String>)>,
}

pub struct ViewerHost {
    session: Rc<RefCell<ViewerSession<Renderer>>>,
    loader: Rc<ModelLoader<BrowserAssets>>,
    container: HtmlElement,
    canvas: HtmlCanvasElement,
    listeners: RefCell<Vec<EventListener>>,
    callbacks: HostCallbacks,
}

fn device_pixel_ratio() -> f64 {
    web_sys::window()
        .map(|w| w.device_pixel_ratio())
        .unwrap_or(1.0)
}

fn measure(container: &HtmlElement) -> PhysicalSize<u32> {
    let rect = container.get_bounding_client_rect();
    LogicalSize::new(rect.width(), rect.height()).to_physical(device_pixel_ratio())
}

fn pointer_position(event: &MouseEvent) -> PhysicalPosition<f64> {
    LogicalPosition::new(event.offset_x() as f64, event.offset_y() as f64)
        .to_physical(device_pixel_ratio())
}

#[derive(Debug, PartialEq)]
enum Disclosure {
    Inline(Annotation),
    Alert(String),
}

/// Decide how a picked annotation is shown. The session borrow ends here, so
/// callbacks and the blocking alert may re-enter it.
fn disclosure<S: Surface>(session: &RefCell<ViewerSession<S>>, annotation: Annotation) -> Disclosure {
    let feedback = session.borrow().config().pointer_feedback;
    match feedback {
        PointerFeedback::Inline => Disclosure::Inline(annotation),
        PointerFeedback::Alert => Disclosure::Alert(annotation.alert_text()),
    }
}

impl ViewerHost {
    /// Create the canvas inside `container`, start the session and kick off
    /// the first load.
    pub async fn mount(
        container: HtmlElement,
        config: ViewerConfig,
        model_url: String,
        callbacks: HostCallbacks,
    ) -> anyhow::Result<Rc<Self>> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or(anyhow::anyhow!("no document"))?;
        let canvas: HtmlCanvasElement = document
            .create_element("canvas")
            .map_err(|e| anyhow::anyhow!("failed to create canvas: {e:?}"))?
            .dyn_into()
            .map_err(|_| anyhow::anyhow!("created element is not a canvas"))?;
        let style = canvas.style();
        for (property, value) in [
            ("width", "100%"),
            ("height", "100%"),
            ("display", "block"),
            ("touch-action", "none"),
        ] {
            style
                .set_property(property, value)
                .map_err(|e| anyhow::anyhow!("failed to style canvas: {e:?}"))?;
        }
        container
            .append_child(&canvas)
            .map_err(|e| anyhow::anyhow!("failed to attach canvas: {e:?}"))?;

        let size = measure(&container);
        canvas.set_width(size.width.max(1));
        canvas.set_height(size.height.max(1));
        let renderer = Renderer::new(canvas.clone(), size.width, size.height).await?;

        let mut session = ViewerSession::new(config);
        session.init(size, renderer)?;
        let host = Rc::new(Self {
            session: Rc::new(RefCell::new(session)),
            loader: Rc::new(ModelLoader::new(BrowserAssets)),
            container,
            canvas,
            listeners: RefCell::new(Vec::new()),
            callbacks,
        });

        host.load(ModelSource::Url(model_url));
        host.install_pointer_listeners();
        frame_loop::start(&host.session, Rc::new(AnimationFrames));
        host.install_resize_listener();
        // Layout may have settled while the surface was being created.
        host.resize();
        Ok(host)
    }

    /// Load in the background; the current model keeps rendering meanwhile.
    pub fn load(self: &Rc<Self>, source: ModelSource<File>) {
        let host = Rc::clone(self);
        (self.callbacks.on_loading)(true);
        spawn_local(async move {
            // Let the loading indicator paint before parsing blocks the thread.
            gloo_timers::future::TimeoutFuture::new(0).await;
            let outcome = loader::load_into(&host.session, &host.loader, source).await;
            match outcome {
                LoadOutcome::Displayed(_) => (host.callbacks.on_error)(None),
                LoadOutcome::Failed(err) => {
                    log::error!("{err}");
                    (host.callbacks.on_error)(Some(err.to_string()));
                }
                // A newer load owns the indicator.
                LoadOutcome::Stale => return,
                LoadOutcome::Dropped => {}
            }
            (host.callbacks.on_loading)(false);
        });
    }

    pub fn resize(&self) {
        let size = measure(&self.container);
        if let Err(err) = self.session.borrow_mut().resize(size) {
            log::warn!("{err}");
        }
    }

    pub fn clear_selection(&self) {
        self.session.borrow_mut().clear_selection();
    }

    fn install_pointer_listeners(self: &Rc<Self>) {
        let mut listeners = Vec::new();

        // Capture keeps a drag tracked after the pointer leaves the canvas.
        let session = self.session.clone();
        let canvas = self.canvas.clone();
        listeners.push(EventListener::new(&self.canvas, "pointerdown", move |event: &Event| {
            let Some(event) = event.dyn_ref::<PointerEvent>() else {
                return;
            };
            if let Err(err) = canvas.set_pointer_capture(event.pointer_id()) {
                log::debug!("failed to capture pointer: {err:?}");
            }
            session.borrow_mut().pointer_down(
                event.pointer_id(),
                pointer_position(event),
                PointerButton::from_dom(event.button()),
            );
        }));

        let session = self.session.clone();
        let canvas = self.canvas.clone();
        listeners.push(EventListener::new(&self.canvas, "pointermove", move |event: &Event| {
            let Some(event) = event.dyn_ref::<PointerEvent>() else {
                return;
            };
            let cursor = session
                .borrow_mut()
                .pointer_move(event.pointer_id(), pointer_position(event));
            if let Err(err) = canvas.style().set_property("cursor", cursor.css()) {
                log::debug!("failed to set cursor: {err:?}");
            }
        }));

        for kind in ["pointerup", "pointercancel"] {
            let session = self.session.clone();
            listeners.push(EventListener::new(&self.canvas, kind, move |event: &Event| {
                if let Some(event) = event.dyn_ref::<PointerEvent>() {
                    session.borrow_mut().pointer_up(event.pointer_id());
                }
            }));
        }

        let host = Rc::downgrade(self);
        listeners.push(EventListener::new(&self.canvas, "click", move |event: &Event| {
            let (Some(event), Some(host)) = (event.dyn_ref::<MouseEvent>(), host.upgrade()) else {
                return;
            };
            let picked = host.session.borrow_mut().pointer_click(pointer_position(event));
            if let Some(annotation) = picked {
                host.disclose(annotation);
            }
        }));

        let session = self.session.clone();
        listeners.push(EventListener::new_with_options(
            &self.canvas,
            "wheel",
            EventListenerOptions::enable_prevent_default(),
            move |event: &Event| {
                let Some(event) = event.dyn_ref::<WheelEvent>() else {
                    return;
                };
                event.prevent_default();
                session.borrow_mut().wheel(event.delta_y());
            },
        ));

        // Right drag pans.
        listeners.push(EventListener::new_with_options(
            &self.canvas,
            "contextmenu",
            EventListenerOptions::enable_prevent_default(),
            |event: &Event| event.prevent_default(),
        ));

        self.listeners.borrow_mut().extend(listeners);
    }

    fn install_resize_listener(self: &Rc<Self>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let host = Rc::downgrade(self);
        let listener = EventListener::new(&window, "resize", move |_event: &Event| {
            if let Some(host) = host.upgrade() {
                host.resize();
            }
        });
        self.listeners.borrow_mut().push(listener);
    }

    fn disclose(&self, annotation: Annotation) {
        match disclosure(&self.session, annotation) {
            Disclosure::Inline(annotation) => (self.callbacks.on_select)(annotation),
            Disclosure::Alert(message) => {
                if let Some(Err(err)) = web_sys::window().map(|w| w.alert_with_message(&message)) {
                    log::warn!("alert failed: {err:?}");
                }
            }
        }
    }

    /// Remove listeners, stop the frame loop and release the GPU surface.
    pub fn dispose(&self) {
        self.listeners.borrow_mut().clear();
        self.session.borrow_mut().dispose();
    }
}
