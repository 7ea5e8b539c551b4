//! Damped orbit controller
//!
//! Keeps the camera on a sphere around `target`. Input accumulates into
//! per-frame deltas which `update` applies (and, with damping on, decays) once
//! per rendered frame.

use std::f32::consts::PI;

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3, Zero};

use super::camera::PerspectiveCamera;
use crate::config::ControlsConfig;

const EPS: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Point3<f32>,
    config: ControlsConfig,
    /// Length unit of the distance clamps: the framed model's diagonal.
    scale_unit: f32,
    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    pan_offset: Vector3<f32>,
    saved_target: Point3<f32>,
    saved_position: Point3<f32>,
}

impl OrbitControls {
    pub fn new(config: ControlsConfig, camera: &PerspectiveCamera) -> Self {
        Self {
            target: camera.target,
            config,
            scale_unit: 1.0,
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_offset: Vector3::zero(),
            saved_target: camera.target,
            saved_position: camera.position,
        }
    }

    pub fn config(&self) -> &ControlsConfig {
        &self.config
    }

    pub fn set_scale_unit(&mut self, unit: f32) {
        if unit.is_finite() && unit > 0.0 {
            self.scale_unit = unit;
        }
    }

    pub fn min_distance(&self) -> f32 {
        self.config.min_distance * self.scale_unit
    }

    pub fn max_distance(&self) -> f32 {
        self.config.max_distance * self.scale_unit
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.theta_delta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.phi_delta -= angle;
    }

    /// Drag rotation: a drag across the full viewport height is one turn.
    pub fn rotate_by_pixels(&mut self, dx: f64, dy: f64, viewport_height: u32) {
        let h = viewport_height.max(1) as f32;
        let speed = self.config.rotate_speed;
        self.rotate_left(2.0 * PI * dx as f32 / h * speed);
        self.rotate_up(2.0 * PI * dy as f32 / h * speed);
    }

    /// Wheel zoom, 5% per notch; negative `delta_y` moves closer.
    pub fn dolly(&mut self, delta_y: f64) {
        if !self.config.enable_zoom || delta_y == 0.0 {
            return;
        }
        let step = 0.95f32.powf(self.config.zoom_speed);
        if delta_y < 0.0 {
            self.scale *= step;
        } else {
            self.scale /= step;
        }
    }

    /// Scale the orbit radius by `factor` (below 1 moves closer), as a pinch
    /// does. Degenerate factors are ignored.
    pub fn dolly_by(&mut self, factor: f32) {
        if !self.config.enable_zoom || !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.scale *= factor;
    }

    /// Screen-space pan, scaled so the point under the target tracks the pointer.
    pub fn pan(&mut self, dx: f64, dy: f64, camera: &PerspectiveCamera, viewport_height: u32) {
        if !self.config.enable_pan {
            return;
        }
        let offset = camera.position - self.target;
        let target_distance = offset.magnitude() * (cgmath::Rad::from(camera.fov).0 / 2.0).tan();
        let h = viewport_height.max(1) as f32;
        let forward = -offset.normalize();
        let right = forward.cross(camera.up).normalize();
        let up = right.cross(forward);
        self.pan_offset += right * (-2.0 * dx as f32 * target_distance / h);
        self.pan_offset += up * (2.0 * dy as f32 * target_distance / h);
    }

    /// Apply pending input to `camera`. Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let offset = camera.position - self.target;
        let mut radius = offset.magnitude();
        let (mut theta, mut phi) = if radius < EPS {
            (0.0, PI / 2.0)
        } else {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        };

        let step = if self.config.enable_damping {
            self.config.damping_factor
        } else {
            1.0
        };
        theta += self.theta_delta * step;
        phi += self.phi_delta * step;
        phi = phi
            .max(self.config.min_polar_angle)
            .min(self.config.max_polar_angle)
            .max(EPS)
            .min(PI - EPS);

        radius = (radius * self.scale)
            .max(self.min_distance())
            .min(self.max_distance());

        self.target += self.pan_offset * step;

        let offset = Vector3::new(
            radius * phi.sin() * theta.sin(),
            radius * phi.cos(),
            radius * phi.sin() * theta.cos(),
        );
        let previous = camera.position;
        camera.position = self.target + offset;
        camera.target = self.target;

        if self.config.enable_damping {
            self.theta_delta *= 1.0 - step;
            self.phi_delta *= 1.0 - step;
            self.pan_offset *= 1.0 - step;
        } else {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
            self.pan_offset = Vector3::zero();
        }
        self.scale = 1.0;

        (camera.position - previous).magnitude2() > EPS * EPS
    }

    pub fn save_state(&mut self, camera: &PerspectiveCamera) {
        self.saved_target = self.target;
        self.saved_position = camera.position;
    }

    /// Drop pending input and return to the last saved state.
    pub fn reset(&mut self, camera: &mut PerspectiveCamera) {
        self.target = self.saved_target;
        camera.position = self.saved_position;
        camera.target = self.target;
        self.theta_delta = 0.0;
        self.phi_delta = 0.0;
        self.pan_offset = Vector3::zero();
        self.scale = 1.0;
    }

    pub fn look_at_origin(&mut self, camera: &mut PerspectiveCamera) {
        self.target = Point3::origin();
        camera.target = self.target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use approx::assert_relative_eq;

    fn setup(config: ControlsConfig) -> (OrbitControls, PerspectiveCamera) {
        let camera = PerspectiveCamera::new(
            &CameraConfig {
                position: [0.0, 0.0, 4.0],
                ..CameraConfig::default()
            },
            1.0,
        );
        (OrbitControls::new(config, &camera), camera)
    }

    fn undamped() -> ControlsConfig {
        ControlsConfig {
            enable_damping: false,
            ..ControlsConfig::default()
        }
    }

    #[test]
    fn update_without_input_keeps_camera() {
        let (mut controls, mut camera) = setup(ControlsConfig::default());
        assert!(!controls.update(&mut camera));
        assert_relative_eq!(camera.position.z, 4.0, epsilon = 1e-5);
    }

    #[test]
    fn rotate_left_orbits_at_constant_distance() {
        let (mut controls, mut camera) = setup(undamped());
        controls.rotate_left(-PI / 2.0);
        assert!(controls.update(&mut camera));
        assert_relative_eq!(camera.position.x, 4.0, epsilon = 1e-4);
        assert_relative_eq!(camera.position.z, 0.0, epsilon = 1e-4);
        assert_relative_eq!(camera.distance(), 4.0, epsilon = 1e-4);
    }

    #[test]
    fn polar_angle_is_clamped() {
        let (mut controls, mut camera) = setup(ControlsConfig {
            min_polar_angle: PI / 4.0,
            max_polar_angle: PI / 1.8,
            ..undamped()
        });
        controls.rotate_up(PI);
        controls.update(&mut camera);
        let polar = (camera.position.y / camera.distance()).acos();
        assert_relative_eq!(polar, PI / 4.0, epsilon = 1e-4);
    }

    #[test]
    fn dolly_is_clamped_in_scale_units() {
        let (mut controls, mut camera) = setup(ControlsConfig {
            min_distance: 1.2,
            max_distance: 4.0,
            ..undamped()
        });
        for _ in 0..200 {
            controls.dolly(-1.0);
        }
        controls.update(&mut camera);
        assert_relative_eq!(camera.distance(), 1.2, epsilon = 1e-4);

        controls.set_scale_unit(10.0);
        for _ in 0..200 {
            controls.dolly(1.0);
        }
        controls.update(&mut camera);
        assert_relative_eq!(camera.distance(), 40.0, epsilon = 1e-3);
    }

    #[test]
    fn zoom_disabled_ignores_wheel() {
        let (mut controls, mut camera) = setup(ControlsConfig {
            enable_zoom: false,
            ..undamped()
        });
        controls.dolly(-3.0);
        controls.update(&mut camera);
        assert_relative_eq!(camera.distance(), 4.0, epsilon = 1e-5);
    }

    #[test]
    fn pinch_factor_scales_radius() {
        let (mut controls, mut camera) = setup(undamped());
        controls.dolly_by(0.5);
        controls.update(&mut camera);
        assert_relative_eq!(camera.distance(), 2.0, epsilon = 1e-4);

        controls.dolly_by(0.0);
        controls.dolly_by(f32::NAN);
        controls.update(&mut camera);
        assert_relative_eq!(camera.distance(), 2.0, epsilon = 1e-4);

        let (mut locked, mut camera) = setup(ControlsConfig {
            enable_zoom: false,
            ..undamped()
        });
        locked.dolly_by(0.5);
        locked.update(&mut camera);
        assert_relative_eq!(camera.distance(), 4.0, epsilon = 1e-5);
    }

    #[test]
    fn damping_spreads_rotation_over_frames() {
        let (mut controls, mut camera) = setup(ControlsConfig {
            damping_factor: 0.1,
            ..ControlsConfig::default()
        });
        controls.rotate_left(-1.0);
        controls.update(&mut camera);
        let first = camera.position.x.atan2(camera.position.z);
        assert_relative_eq!(first, 0.1, epsilon = 1e-4);
        for _ in 0..200 {
            controls.update(&mut camera);
        }
        let settled = camera.position.x.atan2(camera.position.z);
        assert_relative_eq!(settled, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn pan_moves_target_only_when_enabled() {
        let (mut controls, mut camera) = setup(undamped());
        controls.pan(100.0, 0.0, &camera.clone(), 600);
        controls.update(&mut camera);
        assert!(controls.target.x < 0.0);
        assert_relative_eq!(camera.distance(), 4.0, epsilon = 1e-4);

        let (mut locked, mut camera) = setup(ControlsConfig {
            enable_pan: false,
            ..undamped()
        });
        locked.pan(100.0, 0.0, &camera.clone(), 600);
        locked.update(&mut camera);
        assert_eq!(locked.target, Point3::origin());
    }

    #[test]
    fn reset_restores_saved_state() {
        let (mut controls, mut camera) = setup(undamped());
        controls.rotate_left(1.0);
        controls.dolly(1.0);
        controls.update(&mut camera);
        controls.rotate_left(0.5);
        controls.reset(&mut camera);
        assert_eq!(camera.position, Point3::new(0.0, 0.0, 4.0));
        assert!(!controls.update(&mut camera));
    }
}
