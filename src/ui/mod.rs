use std::cell::{Cell, RefCell};
use std::ops::Deref;
use std::rc::Rc;

use leptos::*;

use crate::config::ViewerConfig;
use crate::loader::ModelSource;
use crate::render::hotspot::Annotation;

mod canvas;
pub use canvas::{HostCallbacks, ViewerHost};

type HostSlot = Rc<RefCell<Option<Rc<ViewerHost>>>>;

#[component]
fn AnnotationCard<F>(annotation: Annotation, on_close: F) -> impl IntoView
where
    F: Fn() + 'static,
{
    view! {
        <div class = "absolute top-4 right-4 max-w-xs p-4 rounded shadow bg-white">
            <div class = "flex items-start justify-between">
                <h3 class = "font-semibold text-emerald-900">{annotation.title}</h3>
                <button on:click = move |_| on_close() class = "ml-2 w-6 h-6 hover:bg-emerald-100 rounded-full">
                    <svg viewBox="0 0 24 24" stroke-linecap="round" class = "w-4 h-4 m-1 stroke-2 stroke-emerald-900"><line x1="18" y1="6" x2="6" y2="18"></line><line x1="6" y1="6" x2="18" y2="18"></line></svg>
                </button>
            </div>
            <p class = "mt-2 text-sm text-gray-700">{annotation.description}</p>
        </div>
    }
}

/// A single viewer instance bound to its own container.
///
/// The session lives as long as the component; unmounting disposes it.
#[component]
pub fn ProductViewer(
    #[prop(into)] model_url: String,
    #[prop(optional)] config: ViewerConfig,
) -> impl IntoView {
    let (selected, set_selected) = create_signal(None::<Annotation>);
    let (loading, set_loading) = create_signal(false);
    let (load_error, set_load_error) = create_signal(None::<String>);
    let container = create_node_ref::<html::Div>();
    let file_input = create_node_ref::<html::Input>();
    let host: HostSlot = Default::default();
    let unmounted = Rc::new(Cell::new(false));

    {
        let host = host.clone();
        let unmounted = unmounted.clone();
        container.on_load(move |div| {
            let element: web_sys::HtmlElement = div.deref().clone().into();
            let callbacks = HostCallbacks {
                on_select: Rc::new(move |annotation| set_selected.set(Some(annotation))),
                on_loading: Rc::new(move |busy| set_loading.set(busy)),
                on_error: Rc::new(move |message| set_load_error.set(message)),
            };
            spawn_local(async move {
                match ViewerHost::mount(element, config, model_url, callbacks).await {
                    Ok(mounted) if unmounted.get() => mounted.dispose(),
                    Ok(mounted) => *host.borrow_mut() = Some(mounted),
                    Err(err) => {
                        log::error!("failed to start viewer: {err:?}");
                        set_load_error.set(Some(err.to_string()));
                    }
                }
            });
        });
    }

    {
        let host = host.clone();
        on_cleanup(move || {
            unmounted.set(true);
            if let Some(host) = host.borrow_mut().take() {
                host.dispose();
            }
        });
    }

    let on_change = {
        let host = host.clone();
        move |_| {
            let Some(input) = file_input.get() else {
                return;
            };
            let Some(file) = input.files().and_then(|files| files.item(0)) else {
                return;
            };
            if let Some(host) = host.borrow().as_ref() {
                host.load(ModelSource::File(file));
            }
            // Picking the same file again must still fire `change`.
            input.set_value("");
        }
    };

    let close = move || {
        set_selected.set(None);
        if let Some(host) = host.borrow().as_ref() {
            host.clear_selection();
        }
    };
    let close = Rc::new(close);

    view! {
        <div class = "relative w-full h-full">
            <div node_ref = container class = "w-full h-full"></div>
            <div class = "absolute top-4 left-4 flex items-center gap-2">
                <input type = "file" node_ref = file_input id = "model-file" on:change = on_change accept = ".glb,.gltf,.obj" class = "hidden"/>
                <label for = "model-file" class = "px-3 py-1 rounded-full border border-emerald-600 bg-emerald-100 hover:bg-emerald-200 cursor-pointer">
                    "Open model"
                </label>
                <span class = "text-sm text-gray-600" class:hidden = move || !loading.get()>"Loading…"</span>
            </div>
            {move || load_error.get().map(|message| view! {
                <div class = "absolute bottom-4 left-4 px-3 py-2 rounded bg-red-100 text-red-900 text-sm">{message}</div>
            })}
            {move || {
                let close = close.clone();
                selected.get().map(|annotation| view! {
                    <AnnotationCard annotation on_close = move || close()/>
                })
            }}
        </div>
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flavour {
    Basic,
    Studio,
}

/// Tabs switching between the plain and the studio viewer. Switching unmounts
/// the previous viewer, which releases its GPU resources.
#[component]
pub fn App(#[prop(into)] model_url: String, #[prop(optional)] config: ViewerConfig) -> impl IntoView {
    let (flavour, set_flavour) = create_signal(Flavour::Studio);
    const TAB: &str = "px-3 py-1 rounded-full border border-emerald-600 hover:bg-emerald-200";
    const ACTIVE_TAB: &str = "px-3 py-1 rounded-full border border-emerald-600 bg-emerald-100";
    let tab_class = move |f: Flavour| move || if flavour.get() == f { ACTIVE_TAB } else { TAB };

    view! {
        <div class = "flex flex-col w-full h-full">
            <nav class = "flex gap-2 p-2">
                <button class = tab_class(Flavour::Basic) on:click = move |_| set_flavour.set(Flavour::Basic)>"Basic"</button>
                <button class = tab_class(Flavour::Studio) on:click = move |_| set_flavour.set(Flavour::Studio)>"Studio"</button>
            </nav>
            <div class = "flex-1">
                {move || {
                    let model_url = model_url.clone();
                    match flavour.get() {
                        Flavour::Basic => view! { <ProductViewer model_url config = ViewerConfig::basic()/> }.into_view(),
                        Flavour::Studio => view! { <ProductViewer model_url config = config.clone()/> }.into_view(),
                    }
                }}
            </div>
        </div>
    }
}
