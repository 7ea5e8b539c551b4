//! Model loading
//!
//! A [`ModelLoader`] turns a URL or a user-picked file into a
//! [`ModelSubtree`]. Bytes come from an [`AssetSource`], so the parsing side
//! runs the same natively and in the browser.

use std::cell::RefCell;
use std::future::Future;

use crate::error::{Result, ViewerError};
use crate::render::scene::ModelSubtree;
use crate::render::viewer::{LoadOutcome, ViewerSession};
use crate::render::Surface;

pub mod browser;
mod gltf;
mod obj;

/// Where a model comes from.
#[derive(Debug, Clone)]
pub enum ModelSource<F> {
    Url(String),
    /// A transient handle, e.g. a file picked by the user.
    File(F),
}

/// Byte access for the loader.
pub trait AssetSource {
    type File;
    /// Addressable reference to a file's bytes, released when dropped.
    type ObjectUrl: AsRef<str>;

    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>>;

    fn file_name(&self, file: &Self::File) -> String;

    fn object_url(&self, file: &Self::File) -> Result<Self::ObjectUrl>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Glb,
    Gltf,
    Obj,
}

impl ModelFormat {
    /// Pick a parser from the GLB magic, then the file extension, then the
    /// leading content.
    pub fn detect(name: &str, bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(b"glTF") {
            return Ok(ModelFormat::Glb);
        }
        let path = name.split(['?', '#']).next().unwrap_or(name);
        let extension = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("glb") => return Ok(ModelFormat::Glb),
            Some("gltf") => return Ok(ModelFormat::Gltf),
            Some("obj") => return Ok(ModelFormat::Obj),
            _ => {}
        }
        let text = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') {
            return Ok(ModelFormat::Gltf);
        }
        if trimmed
            .lines()
            .any(|line| line.starts_with("v ") || line.starts_with("f "))
        {
            return Ok(ModelFormat::Obj);
        }
        Err(ViewerError::UnsupportedFormat(name.to_owned()))
    }
}

/// Resolve `reference` against the URL of the document that contains it.
pub fn resolve_url(base: &str, reference: &str) -> Result<String> {
    if reference.contains("://") || reference.starts_with('/') {
        return Ok(reference.to_owned());
    }
    if base.starts_with("blob:") || base.starts_with("data:") {
        return Err(ViewerError::Fetch(format!(
            "cannot resolve {reference} relative to a local file"
        )));
    }
    let base = base.split(['?', '#']).next().unwrap_or(base);
    let mut parts: Vec<&str> = match base.rfind('/') {
        Some(i) => base[..i].split('/').collect(),
        None => Vec::new(),
    };
    for segment in reference.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

pub struct ModelLoader<A> {
    assets: A,
}

impl<A: AssetSource> ModelLoader<A> {
    pub fn new(assets: A) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    /// Identifier used in logs and load errors.
    pub fn describe(&self, source: &ModelSource<A::File>) -> String {
        match source {
            ModelSource::Url(url) => url.clone(),
            ModelSource::File(file) => self.assets.file_name(file),
        }
    }

    pub async fn load(&self, source: ModelSource<A::File>) -> Result<ModelSubtree> {
        match source {
            ModelSource::Url(url) => {
                let bytes = self.assets.fetch(&url).await?;
                self.parse(&url, &url, &bytes).await
            }
            ModelSource::File(file) => {
                let name = self.assets.file_name(&file);
                // Revoked when this scope ends, whatever the outcome.
                let object_url = self.assets.object_url(&file)?;
                let bytes = self.assets.fetch(object_url.as_ref()).await?;
                self.parse(&name, object_url.as_ref(), &bytes).await
            }
        }
    }

    async fn parse(&self, name: &str, base_url: &str, bytes: &[u8]) -> Result<ModelSubtree> {
        let model = match ModelFormat::detect(name, bytes)? {
            ModelFormat::Glb | ModelFormat::Gltf => {
                gltf::parse(&self.assets, base_url, display_name(name), bytes).await?
            }
            ModelFormat::Obj => obj::parse(display_name(name), bytes)?,
        };
        if model.mesh_count() == 0 {
            return Err(ViewerError::Parse(format!("{name} contains no triangle meshes")));
        }
        log::debug!(
            "parsed {name}: {} meshes, {} triangles",
            model.mesh_count(),
            model.triangle_count()
        );
        Ok(model)
    }
}

fn display_name(name: &str) -> &str {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    path.rsplit('/').next().unwrap_or(path)
}

/// Load `source` and hand the result to `session`.
///
/// The session is not borrowed across the await, so frames keep rendering
/// the previous model while the load is in flight.
pub async fn load_into<S, A>(
    session: &RefCell<ViewerSession<S>>,
    loader: &ModelLoader<A>,
    source: ModelSource<A::File>,
) -> LoadOutcome
where
    S: Surface,
    A: AssetSource,
{
    let source_id = loader.describe(&source);
    let ticket = match session.borrow_mut().begin_load(source_id) {
        Ok(ticket) => ticket,
        Err(err) => return LoadOutcome::Failed(err),
    };
    let result = loader.load(source).await;
    session.borrow_mut().finish_load(ticket, result)
}
