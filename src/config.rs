//! Viewer configuration
//!
//! One record covers both viewer flavours: the plain orbit viewer and the
//! studio viewer with a three-point light rig, clamped controller and
//! billboarded markers. Every field has a default, so a host page can pass a
//! partial JSON document and only override what it needs.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::render::hotspot::Annotation;

/// Light sources installed once at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingRig {
    /// One ambient and one directional light.
    Basic,
    /// Ambient plus key, fill and rim directional lights.
    Studio,
}

/// How a hotspot selection is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerFeedback {
    /// Update the reactive selection state shown next to the canvas.
    Inline,
    /// Show a blocking alert with the annotation.
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerShape {
    Sphere,
    Disc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: 35.0,
            near: 0.1,
            far: 100.0,
            position: [0.0, 0.6, 2.5],
        }
    }
}

/// Orbit controller settings.
///
/// `min_distance` and `max_distance` are measured in bounding diagonals of
/// the framed model (a diagonal of 1.0 is assumed until a model is framed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_pan: bool,
    pub enable_zoom: bool,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            enable_damping: true,
            damping_factor: 0.05,
            enable_pan: true,
            enable_zoom: true,
            min_distance: 0.0,
            max_distance: f32::MAX,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerStyle {
    pub shape: MarkerShape,
    pub radius: f32,
    pub color: [f32; 3],
    pub opacity: f32,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            shape: MarkerShape::Sphere,
            radius: 0.03,
            color: [1.0, 0.0, 0.0],
            opacity: 1.0,
        }
    }
}

/// Auto-framing factors, all relative to the bounding diagonal `d`.
///
/// The camera is placed at `(0, elevation * d, distance * d)` looking at the
/// origin, with `near = d / near_divisor` and `far = d * far_factor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Framing {
    pub elevation: f32,
    pub distance: f32,
    pub near_divisor: f32,
    pub far_factor: f32,
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            elevation: 0.5,
            distance: 1.0,
            near_divisor: 100.0,
            far_factor: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotSpec {
    pub position: [f32; 3],
    pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub background: [f32; 3],
    pub camera: CameraConfig,
    pub controls: ControlsConfig,
    pub lighting: LightingRig,
    pub marker: MarkerStyle,
    pub billboard_hotspots: bool,
    pub pointer_feedback: PointerFeedback,
    pub cursor_feedback: bool,
    pub framing: Framing,
    pub hotspots: Vec<HotspotSpec>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::studio()
    }
}

impl ViewerConfig {
    /// Plain orbit viewer: permissive controller, single key light, click
    /// opens an alert.
    pub fn basic() -> Self {
        Self {
            background: hex_rgb(0xf0f0f0),
            camera: CameraConfig {
                fov_deg: 45.0,
                near: 0.1,
                far: 1000.0,
                position: [0.0, 1.5, 3.0],
            },
            controls: ControlsConfig::default(),
            lighting: LightingRig::Basic,
            marker: MarkerStyle::default(),
            billboard_hotspots: false,
            pointer_feedback: PointerFeedback::Alert,
            cursor_feedback: false,
            framing: Framing::default(),
            hotspots: vec![HotspotSpec {
                position: [0.0, 0.8, 0.0],
                annotation: Annotation::new("Material Info", "Made from reinforced carbon fiber"),
            }],
        }
    }

    /// Product-page viewer: clamped cinematic controller, three-point light
    /// rig, billboarded disc markers and inline selection.
    pub fn studio() -> Self {
        Self {
            background: hex_rgb(0xf7f7f7),
            camera: CameraConfig::default(),
            controls: ControlsConfig {
                damping_factor: 0.08,
                enable_pan: false,
                min_distance: 1.2,
                max_distance: 4.0,
                min_polar_angle: PI / 4.0,
                max_polar_angle: PI / 1.8,
                ..ControlsConfig::default()
            },
            lighting: LightingRig::Studio,
            marker: MarkerStyle {
                shape: MarkerShape::Disc,
                radius: 0.04,
                color: hex_rgb(0xff5a5f),
                opacity: 0.9,
            },
            billboard_hotspots: true,
            pointer_feedback: PointerFeedback::Inline,
            cursor_feedback: true,
            framing: Framing {
                elevation: 0.4,
                distance: 1.2,
                near_divisor: 100.0,
                far_factor: 10.0,
            },
            hotspots: vec![HotspotSpec {
                position: [0.0, 0.8, 0.0],
                annotation: Annotation::new("Material", "Reinforced carbon fiber body"),
            }],
        }
    }

    /// Parse a JSON override. Missing fields fall back to the studio preset.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// `0xRRGGBB` sRGB to linear `[r, g, b]` in `0.0..=1.0`, the space the shaders
/// and the sRGB surface's clear colour work in.
pub fn hex_rgb(hex: u32) -> [f32; 3] {
    [hex >> 16, hex >> 8, hex].map(|channel| srgb_to_linear((channel & 0xff) as f32 / 255.0))
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn partial_json_keeps_studio_defaults() {
        let config = ViewerConfig::from_json(r#"{ "pointer_feedback": "alert" }"#).unwrap();
        assert_eq!(config.pointer_feedback, PointerFeedback::Alert);
        assert_eq!(config.lighting, LightingRig::Studio);
        assert_eq!(config.marker.shape, MarkerShape::Disc);
        assert_relative_eq!(config.framing.far_factor, 10.0);
    }

    #[test]
    fn nested_override_fills_remaining_fields() {
        let config =
            ViewerConfig::from_json(r#"{ "controls": { "enable_pan": false, "max_distance": 8.0 } }"#)
                .unwrap();
        assert!(!config.controls.enable_pan);
        assert_relative_eq!(config.controls.max_distance, 8.0);
        assert!(config.controls.enable_damping);
        assert_relative_eq!(config.controls.damping_factor, 0.05);
    }

    #[test]
    fn hotspots_round_trip_through_json() {
        let json = r#"{
            "hotspots": [
                { "position": [1.0, 2.0, 3.0],
                  "annotation": { "title": "Strap", "description": "Vegan leather" } }
            ]
        }"#;
        let config = ViewerConfig::from_json(json).unwrap();
        assert_eq!(config.hotspots.len(), 1);
        assert_eq!(config.hotspots[0].annotation.title, "Strap");
        assert_eq!(config.hotspots[0].position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = ViewerConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, crate::error::ViewerError::Config(_)));
    }

    #[test]
    fn presets_differ_where_the_variants_differ() {
        let basic = ViewerConfig::basic();
        let studio = ViewerConfig::studio();
        assert_eq!(basic.lighting, LightingRig::Basic);
        assert_eq!(basic.pointer_feedback, PointerFeedback::Alert);
        assert!(basic.controls.enable_pan);
        assert!(!studio.controls.enable_pan);
        assert!(studio.billboard_hotspots && !basic.billboard_hotspots);
    }

    #[test]
    fn hex_colors() {
        let red = hex_rgb(0xff0000);
        assert_relative_eq!(red[0], 1.0, epsilon = 1e-6);
        assert_eq!(&red[1..], &[0.0, 0.0]);
        assert_relative_eq!(hex_rgb(0xf0f0f0)[1], 0.871_367, epsilon = 1e-5);
        assert_relative_eq!(hex_rgb(0x808080)[0], 0.215_861, epsilon = 1e-5);
        let marker = hex_rgb(0xff5a5f);
        assert_relative_eq!(marker[1], 0.102_242, epsilon = 1e-5);
        assert_relative_eq!(marker[2], 0.114_435, epsilon = 1e-5);
    }
}
