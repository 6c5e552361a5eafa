//! Locomotion and head-aim integration.

use crate::config::{HeadRestConfig, HeadTrackingConfig};
use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// Wrap an angle into (-PI, PI]
pub fn wrap_angle(angle: f32) -> f32 {
    PI - (PI - angle).rem_euclid(TAU)
}

/// Signed shortest rotation from `from` to `to`, in (-PI, PI]
pub fn shortest_angle(from: f32, to: f32) -> f32 {
    wrap_angle(to - from)
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Yaw that faces along `dir` (0 faces +Z)
pub fn yaw_towards(dir: Vec3) -> f32 {
    dir.x.atan2(dir.z)
}

/// Rotate toward `desired` by at most `max_step` radians without overshooting
pub fn step_yaw(current: f32, desired: f32, max_step: f32) -> f32 {
    let error = shortest_angle(current, desired);
    wrap_angle(current + error.signum() * error.abs().min(max_step.max(0.0)))
}

/// Advance toward `target` by at most `max_distance` without overshooting
pub fn step_position(position: Vec3, target: Vec3, max_distance: f32) -> Vec3 {
    let offset = target - position;
    let distance = offset.length();
    if distance <= f32::EPSILON {
        return target;
    }
    let travel = max_distance.max(0.0).min(distance);
    if travel >= distance {
        target
    } else {
        position + offset / distance * travel
    }
}

/// Smooth the head's Euler rotation toward the pointer. `pointer` is in [-1, 1].
pub fn aim_head(rotation: Vec3, pointer: Vec2, tracking: &HeadTrackingConfig) -> Vec3 {
    let desired_yaw = pointer.x * tracking.horizontal_sensitivity;
    let desired_pitch = -pointer.y * tracking.vertical_sensitivity;
    Vec3::new(
        lerp(rotation.x, desired_pitch, tracking.smoothness)
            .clamp(-tracking.max_rotation_x, tracking.max_rotation_x),
        lerp(rotation.y, desired_yaw, tracking.smoothness)
            .clamp(-tracking.max_rotation_y, tracking.max_rotation_y),
        rotation.z,
    )
}

/// Smooth the head's Euler rotation toward the rest pose
pub fn relax_head(rotation: Vec3, rest: &HeadRestConfig) -> Vec3 {
    Vec3::new(
        lerp(rotation.x, rest.x, rest.smoothness),
        lerp(rotation.y, rest.y, rest.smoothness),
        lerp(rotation.z, rest.z, rest.smoothness),
    )
}
