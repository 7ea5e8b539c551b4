use cgmath::Point3;

use super::scene::{Light, NodeContent, NodeId, Scene};
use crate::config::LightingRig;

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

fn directional(intensity: f32, x: f32, y: f32, z: f32) -> Light {
    Light::Directional {
        color: WHITE,
        intensity,
        position: Point3::new(x, y, z),
    }
}

pub fn lights(rig: LightingRig) -> Vec<Light> {
    match rig {
        LightingRig::Basic => vec![
            Light::Ambient {
                color: WHITE,
                intensity: 0.6,
            },
            directional(0.8, 5.0, 10.0, 7.0),
        ],
        LightingRig::Studio => vec![
            Light::Ambient {
                color: WHITE,
                intensity: 0.4,
            },
            // key
            directional(0.8, 5.0, 5.0, 5.0),
            // fill
            directional(0.5, -5.0, 2.0, 5.0),
            // rim
            directional(0.4, 0.0, 5.0, -5.0),
        ],
    }
}

/// Add the rig's lights to `scene`; they live as long as the session.
pub fn install(rig: LightingRig, scene: &mut Scene) -> Vec<NodeId> {
    lights(rig)
        .into_iter()
        .map(|light| scene.add(NodeContent::Light(light)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directional_count(lights: &[Light]) -> usize {
        lights
            .iter()
            .filter(|l| matches!(l, Light::Directional { .. }))
            .count()
    }

    #[test]
    fn basic_rig_has_one_key_light() {
        let lights = lights(LightingRig::Basic);
        assert_eq!(lights.len(), 2);
        assert_eq!(directional_count(&lights), 1);
        assert!(matches!(lights[0], Light::Ambient { intensity, .. } if intensity == 0.6));
    }

    #[test]
    fn studio_rig_has_key_fill_and_rim() {
        let lights = lights(LightingRig::Studio);
        assert_eq!(directional_count(&lights), 3);
        match &lights[3] {
            Light::Directional { position, .. } => assert!(position.z < 0.0),
            other => panic!("unexpected light {other:?}"),
        }
    }

    #[test]
    fn install_adds_scene_children() {
        let mut scene = Scene::new(WHITE);
        let ids = install(LightingRig::Studio, &mut scene);
        assert_eq!(ids.len(), 4);
        assert_eq!(scene.lights().count(), 4);
    }
}
