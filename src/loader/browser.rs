//! Browser-backed asset access: `fetch` for URLs, object URLs for picked files.

use std::future::Future;

use js_sys::Uint8Array;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{File, Response};

use super::AssetSource;
use crate::error::{Result, ViewerError};

fn js_error(context: &str, err: JsValue) -> ViewerError {
    ViewerError::Fetch(format!("{context}: {err:?}"))
}

/// An object URL that is revoked when dropped.
#[derive(Debug)]
pub struct ObjectUrl(String);

impl AsRef<str> for ObjectUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        if let Err(err) = web_sys::Url::revoke_object_url(&self.0) {
            log::warn!("failed to revoke {}: {err:?}", self.0);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserAssets;

async fn fetch_bytes(url: String) -> Result<Vec<u8>> {
    let window = web_sys::window().ok_or_else(|| ViewerError::Fetch("no window".to_owned()))?;
    let response = JsFuture::from(window.fetch_with_str(&url))
        .await
        .map_err(|e| js_error(&url, e))?;
    let response: Response = response
        .dyn_into()
        .map_err(|e| js_error("fetch did not return a Response", e))?;
    if !response.ok() {
        return Err(ViewerError::Fetch(format!(
            "{url}: HTTP {} {}",
            response.status(),
            response.status_text()
        )));
    }
    let buffer = response.array_buffer().map_err(|e| js_error(&url, e))?;
    let buffer = JsFuture::from(buffer)
        .await
        .map_err(|e| js_error(&url, e))?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

impl AssetSource for BrowserAssets {
    type File = File;
    type ObjectUrl = ObjectUrl;

    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> {
        fetch_bytes(url.to_owned())
    }

    fn file_name(&self, file: &File) -> String {
        file.name()
    }

    fn object_url(&self, file: &File) -> Result<ObjectUrl> {
        web_sys::Url::create_object_url_with_blob(file)
            .map(ObjectUrl)
            .map_err(|e| js_error("failed to create object URL", e))
    }
}
