//! Tunable constants for the robot stage.
//!
//! Every field has a default matching the shipped behaviour, and every struct is
//! `#[serde(default)]` so a JSON override file only needs the keys it changes.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub movement: MovementConfig,
    pub animation: AnimationConfig,
    pub physics: PhysicsConfig,
    pub interaction: InteractionConfig,
    pub scene: SceneConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub walking: WalkingConfig,
    pub head: HeadConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkingConfig {
    /// Linear speed in units per second
    pub speed: f32,
    /// Arrival threshold; at or below this distance the character snaps to the target
    pub min_distance: f32,
    /// Maximum yaw velocity in radians per second
    pub turn_rate: f32,
}

impl Default for WalkingConfig {
    fn default() -> Self {
        Self {
            speed: 2.0,
            min_distance: 0.1,
            turn_rate: 8.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadConfig {
    pub tracking: HeadTrackingConfig,
    pub rest: HeadRestConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadTrackingConfig {
    pub horizontal_sensitivity: f32,
    pub vertical_sensitivity: f32,
    /// Exponential smoothing factor applied on every pointer move
    pub smoothness: f32,
    /// Pitch clamp (radians, symmetric)
    pub max_rotation_x: f32,
    /// Yaw clamp (radians, symmetric)
    pub max_rotation_y: f32,
}

impl Default for HeadTrackingConfig {
    fn default() -> Self {
        Self {
            horizontal_sensitivity: 1.2,
            vertical_sensitivity: 0.8,
            smoothness: 0.2,
            max_rotation_x: PI / 2.0,
            max_rotation_y: PI / 1.2,
        }
    }
}

/// Neutral head pose the joint relaxes toward once the pointer goes idle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadRestConfig {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub smoothness: f32,
}

impl Default for HeadRestConfig {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            smoothness: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub idle_clip: String,
    pub walking_clip: String,
    /// Extra clip names never chosen as a gesture (idle and walking are always excluded)
    pub exclude_from_random: Vec<String>,
    pub time_scale: TimeScaleConfig,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            idle_clip: "Idle".to_string(),
            walking_clip: "Walking".to_string(),
            exclude_from_random: Vec::new(),
            time_scale: TimeScaleConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeScaleConfig {
    pub default: f32,
    pub walking: f32,
    pub idle: f32,
}

impl Default for TimeScaleConfig {
    fn default() -> Self {
        Self {
            default: 1.0,
            walking: 1.2,
            idle: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Carried for completeness; nothing is simulated.
    pub gravity: f32,
    /// Height at which walk targets are placed above the ground plane
    pub ground_offset: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: -9.8,
            ground_offset: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub pointer_idle_timeout_ms: u64,
    /// Ground hits beyond this absolute x/z are not walkable
    pub ground_half_extent: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            pointer_idle_timeout_ms: 2000,
            ground_half_extent: 10.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub camera_position: [f32; 3],
    pub camera_target: [f32; 3],
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub ground_size: f32,
    pub character_home: [f32; 3],
    pub character_home_yaw_degrees: f32,
    /// Half extents of the box used to pick the character with the pointer
    pub character_pick_half_extents: [f32; 3],
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            camera_position: [8.0, 4.0, 8.0],
            camera_target: [0.0, 1.0, 0.0],
            fov_y_degrees: 45.0,
            near: 0.5,
            far: 1000.0,
            ground_size: 20.0,
            character_home: [0.0, 0.1, 0.0],
            character_home_yaw_degrees: 45.0,
            character_pick_half_extents: [0.5, 1.0, 0.5],
        }
    }
}

impl RobotConfig {
    /// Parse a (possibly partial) JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RobotConfig =
            serde_json::from_str(json).context("Failed to parse robot config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let walking = &self.movement.walking;
        if !is_positive_finite(walking.speed) {
            bail!("movement.walking.speed must be positive, got {}", walking.speed);
        }
        if !is_positive_finite(walking.turn_rate) {
            bail!("movement.walking.turn_rate must be positive, got {}", walking.turn_rate);
        }
        if !(walking.min_distance >= 0.0 && walking.min_distance.is_finite()) {
            bail!("movement.walking.min_distance must not be negative, got {}", walking.min_distance);
        }

        let smoothing = [
            ("movement.head.tracking.smoothness", self.movement.head.tracking.smoothness),
            ("movement.head.rest.smoothness", self.movement.head.rest.smoothness),
        ];
        for (key, value) in smoothing {
            if !(value > 0.0 && value <= 1.0) {
                bail!("{} must be in (0, 1], got {}", key, value);
            }
        }

        let scales = &self.animation.time_scale;
        for (key, value) in [
            ("animation.time_scale.default", scales.default),
            ("animation.time_scale.walking", scales.walking),
            ("animation.time_scale.idle", scales.idle),
        ] {
            if !is_positive_finite(value) {
                bail!("{} must be positive, got {}", key, value);
            }
        }
        if self.interaction.pointer_idle_timeout_ms == 0 {
            bail!("interaction.pointer_idle_timeout_ms must be non-zero");
        }
        Ok(())
    }

    /// Clip names that are never picked as gestures
    pub fn reserved_clip_names(&self) -> [&str; 2] {
        [&self.animation.idle_clip, &self.animation.walking_clip]
    }
}

fn is_positive_finite(value: f32) -> bool {
    value > 0.0 && value.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_defaults() {
        let config = RobotConfig::default();
        assert_eq!(config.movement.walking.speed, 2.0);
        assert_eq!(config.movement.walking.min_distance, 0.1);
        assert_eq!(config.movement.walking.turn_rate, 8.0);
    }

    #[test]
    fn test_head_tracking_defaults() {
        let head = RobotConfig::default().movement.head;
        assert_eq!(head.tracking.horizontal_sensitivity, 1.2);
        assert_eq!(head.tracking.vertical_sensitivity, 0.8);
        assert_eq!(head.tracking.smoothness, 0.2);
        assert_eq!(head.rest.smoothness, 0.1);
        assert!((head.tracking.max_rotation_y - PI / 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_animation_and_physics_defaults() {
        let config = RobotConfig::default();
        assert_eq!(config.animation.time_scale.walking, 1.2);
        assert_eq!(config.animation.time_scale.idle, 1.0);
        assert_eq!(config.physics.gravity, -9.8);
        assert_eq!(config.physics.ground_offset, 0.1);
        assert_eq!(config.interaction.pointer_idle_timeout_ms, 2000);
        assert_eq!(config.reserved_clip_names(), ["Idle", "Walking"]);
    }

    #[test]
    fn test_partial_json_override() {
        let json = r#"{ "movement": { "walking": { "speed": 3.5 } },
                        "animation": { "exclude_from_random": ["Death"] } }"#;
        let config = RobotConfig::from_json_str(json).unwrap();
        assert_eq!(config.movement.walking.speed, 3.5);
        // Untouched siblings keep their defaults
        assert_eq!(config.movement.walking.min_distance, 0.1);
        assert_eq!(config.movement.head, HeadConfig::default());
        assert_eq!(config.animation.exclude_from_random, vec!["Death".to_string()]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RobotConfig::default();
        config.movement.walking.speed = 0.0;
        assert!(config.validate().is_err());

        let mut config = RobotConfig::default();
        config.movement.head.tracking.smoothness = 1.5;
        assert!(config.validate().is_err());

        let mut config = RobotConfig::default();
        config.interaction.pointer_idle_timeout_ms = 0;
        assert!(config.validate().is_err());

        assert!(RobotConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = RobotConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }

    #[test]
    fn test_validate_rejects_nan_and_infinite() {
        assert!(RobotConfig::default().validate().is_ok());

        let mut config = RobotConfig::default();
        config.movement.walking.speed = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = RobotConfig::default();
        config.movement.walking.turn_rate = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = RobotConfig::default();
        config.movement.walking.min_distance = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = RobotConfig::default();
        config.animation.time_scale.walking = f32::NAN;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("animation.time_scale.walking"));

        let mut config = RobotConfig::default();
        config.animation.time_scale.default = f32::INFINITY;
        assert!(config.validate().is_err());
    }
}
