use anyhow::Result;
use hotspot_viewer::{App, ViewerConfig};
use leptos::*;

extern crate console_error_panic_hook;
use std::panic;

const DEFAULT_MODEL_URL: &str = "assets/models/scene.gltf";

/// Optional `<script id="viewer-config" type="application/json">` override.
fn page_config(document: &web_sys::Document) -> ViewerConfig {
    let Some(script) = document.get_element_by_id("viewer-config") else {
        return ViewerConfig::default();
    };
    let json = script.text_content().unwrap_or_default();
    ViewerConfig::from_json(&json).unwrap_or_else(|err| {
        log::warn!("ignoring viewer-config: {err}");
        ViewerConfig::default()
    })
}

fn main() -> Result<()> {
    panic::set_hook(Box::new(console_error_panic_hook::hook));
    console_log::init_with_level(log::Level::Debug)?;

    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or(anyhow::anyhow!("no document"))?;
    let config = page_config(&document);
    let model_url = document
        .body()
        .and_then(|body| body.get_attribute("data-model-url"))
        .unwrap_or_else(|| DEFAULT_MODEL_URL.to_owned());
    log::info!("viewer starting with {model_url}");

    mount_to_body(move || view! { <App model_url = model_url.clone() config = config.clone()/> });
    Ok(())
}
