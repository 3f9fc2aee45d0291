use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::math::EulerRot;
use bevy::prelude::*;

use constants::render_settings::{
    BASE_CAMERA_DISTANCE, BASE_FOV_DEGREES, OSCILLATION_LIMIT, OSCILLATION_STEP,
};

/// Orbit pose around a fixed target. The camera transform converges on the
/// pose described here; RPC handlers mutate this resource, never the
/// transform directly (reset is the one exception, which also snaps).
#[derive(Resource)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
}

impl OrbitCamera {
    /// Distance that keeps the plane's apparent size fixed relative to the
    /// base pose: d = base_distance * tan(base_fov/2) / tan(fov/2).
    pub fn distance_for_fov(fov_degrees: f32) -> f32 {
        let base = (BASE_FOV_DEGREES * 0.5).to_radians().tan();
        let current = (fov_degrees * 0.5).to_radians().tan();
        BASE_CAMERA_DISTANCE * base / current
    }

    /// Restore the initial distance-1 pose aimed at the origin.
    pub fn reset(&mut self) {
        self.target = Vec3::ZERO;
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.distance = BASE_CAMERA_DISTANCE;
    }

    /// World-space camera position for the current pose.
    pub fn position(&self) -> Vec3 {
        let rotation = Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0);
        self.target + rotation * (Vec3::Z * self.distance)
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            distance: BASE_CAMERA_DISTANCE,
        }
    }
}

/// Side-to-side sway toggled from the host page. While enabled, the camera's
/// horizontal offset advances a fixed step per frame and reverses beyond the
/// configured limit.
#[derive(Resource)]
pub struct Oscillation {
    pub enabled: bool,
    pub direction: f32,
    pub offset: f32,
}

impl Oscillation {
    /// Advance one frame and return the horizontal offset to apply.
    pub fn advance(&mut self) -> f32 {
        self.offset += self.direction * OSCILLATION_STEP;
        if self.offset > OSCILLATION_LIMIT || self.offset < -OSCILLATION_LIMIT {
            self.direction = -self.direction;
        }
        self.offset
    }
}

impl Default for Oscillation {
    fn default() -> Self {
        Self {
            enabled: false,
            direction: 1.0,
            offset: 0.0,
        }
    }
}

/// Mouse orbit and dolly around the target, smoothed toward the pose in
/// [`OrbitCamera`].
pub fn camera_controller(
    mut camera_query: Query<&mut Transform, With<Camera3d>>,
    mut orbit: ResMut<OrbitCamera>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    mut mouse_motion: EventReader<MouseMotion>,
    mut scroll_events: EventReader<MouseWheel>,
    time: Res<Time>,
) {
    let Ok(mut camera_transform) = camera_query.single_mut() else {
        return;
    };

    let mouse_delta: Vec2 = mouse_motion.read().map(|m| m.delta).sum();

    // Left drag orbits the target
    if mouse_button.pressed(MouseButton::Left) && mouse_delta != Vec2::ZERO {
        let yaw_sens = 0.005;
        let pitch_sens = 0.004;
        orbit.yaw += -mouse_delta.x * yaw_sens;
        orbit.pitch += -mouse_delta.y * pitch_sens;
        orbit.pitch = orbit.pitch.clamp(-1.55, 1.55);
    }

    // Wheel dollies along the view axis
    let mut scroll_accum = 0.0;
    for ev in scroll_events.read() {
        scroll_accum += match ev.unit {
            MouseScrollUnit::Line => ev.y * 1.0,
            MouseScrollUnit::Pixel => ev.y * 0.05,
        };
    }
    if scroll_accum.abs() > f32::EPSILON {
        orbit.distance = (orbit.distance * (1.0 - scroll_accum * 0.1)).clamp(0.05, 50.0);
    }

    let target_pos = orbit.position();
    let target_rot = Transform::from_translation(target_pos)
        .looking_at(orbit.target, Vec3::Y)
        .rotation;

    let lerp_speed = (12.0 * time.delta_secs()).min(1.0);
    camera_transform.translation = camera_transform.translation.lerp(target_pos, lerp_speed);
    camera_transform.rotation = camera_transform.rotation.slerp(target_rot, lerp_speed);
}

/// Apply the sway offset on top of the orbit pose, keeping the camera aimed
/// at the target every frame.
pub fn camera_oscillation(
    mut oscillation: ResMut<Oscillation>,
    orbit: Res<OrbitCamera>,
    mut camera_query: Query<&mut Transform, With<Camera3d>>,
) {
    if !oscillation.enabled {
        return;
    }
    let Ok(mut camera_transform) = camera_query.single_mut() else {
        return;
    };

    let offset = oscillation.advance();
    camera_transform.translation.x += offset;
    let target = orbit.target;
    camera_transform.look_at(target, Vec3::Y);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fov_distance_law_is_exact() {
        // Base pose maps to itself.
        assert!((OrbitCamera::distance_for_fov(45.0) - 1.0).abs() < 1e-6);

        // d(f) = tan(22.5 deg) / tan(f / 2)
        let d90 = OrbitCamera::distance_for_fov(90.0);
        let expected = (22.5f32).to_radians().tan() / (45.0f32).to_radians().tan();
        assert!((d90 - expected).abs() < 1e-6, "got {d90}, want {expected}");

        // Narrower field of view pushes the camera back.
        assert!(OrbitCamera::distance_for_fov(20.0) > 1.0);
        assert!(OrbitCamera::distance_for_fov(90.0) < 1.0);
    }

    #[test]
    fn reset_restores_base_pose() {
        let mut orbit = OrbitCamera {
            target: Vec3::new(0.2, -0.1, 0.0),
            yaw: 1.0,
            pitch: -0.4,
            distance: 0.3,
        };
        orbit.reset();
        assert_eq!(orbit.target, Vec3::ZERO);
        assert_eq!(orbit.yaw, 0.0);
        assert_eq!(orbit.pitch, 0.0);
        assert!((orbit.distance - 1.0).abs() < f32::EPSILON);
        assert!((orbit.position() - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn oscillation_reverses_at_limit() {
        let mut sway = Oscillation {
            enabled: true,
            direction: 1.0,
            offset: 0.0,
        };

        // Walk forward until the offset crosses the limit, then make sure the
        // direction flips and the offset heads back toward zero.
        let mut steps = 0;
        while sway.direction > 0.0 {
            sway.advance();
            steps += 1;
            assert!(steps < 200, "sway never reversed");
        }
        assert!(sway.offset > OSCILLATION_LIMIT);

        let before = sway.offset;
        sway.advance();
        assert!(sway.offset < before);
    }
}
