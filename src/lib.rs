//! Interactive 3D product viewer with clickable hotspots.
//!
//! The core ([`render::viewer::ViewerSession`], the loaders and the scene
//! graph) is platform neutral; [`ui`] binds it to a browser page through
//! leptos, wgpu and the DOM.

pub mod config;
pub mod error;
pub mod loader;
pub mod render;
pub mod ui;

pub use config::ViewerConfig;
pub use error::{Result, ViewerError};
pub use render::viewer::ViewerSession;
pub use ui::{App, ProductViewer};
