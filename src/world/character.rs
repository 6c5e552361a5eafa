//! The stage character: skeleton, bone table, clips, mixer and root pose.

use crate::config::RobotConfig;
use crate::world::animation::{AnimationMixer, ClipTable};
use crate::world::gltf_loader::CharacterAsset;
use crate::world::rig::{is_head_bone_name, BoneRig, HeadJoint};
use crate::world::skeleton::Skeleton;
use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Root position and yaw, plus the home pose captured at load time
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CharacterPose {
    pub position: Vec3,
    pub yaw: f32,
    pub home_position: Vec3,
    pub home_yaw: f32,
}

impl CharacterPose {
    pub fn at_home(home_position: Vec3, home_yaw: f32) -> Self {
        Self {
            position: home_position,
            yaw: home_yaw,
            home_position,
            home_yaw,
        }
    }

    pub fn restore_home_rotation(&mut self) {
        self.yaw = self.home_yaw;
    }

    pub fn restore_home(&mut self) {
        self.position = self.home_position;
        self.yaw = self.home_yaw;
    }
}

pub struct Character {
    pub name: String,
    pub skeleton: Arc<Skeleton>,
    pub rig: BoneRig,
    /// Present only when the rig has a head bone
    pub head: Option<HeadJoint>,
    pub clips: ClipTable,
    pub mixer: AnimationMixer,
    pub pose: CharacterPose,
}

impl Character {
    pub fn from_asset(asset: CharacterAsset, config: &RobotConfig) -> Result<Self> {
        let CharacterAsset { name, skeleton, clips } = asset;
        let rig = BoneRig::resolve(&skeleton)
            .with_context(|| format!("Failed to resolve bones for '{}'", name))?;

        let head = rig.head.and_then(|i| {
            skeleton
                .bone(i)
                .map(|bone| HeadJoint::from_bind(i, bone.local_transform))
        });
        if head.is_none() {
            warn!("No head or neck bone in '{}', head tracking disabled", name);
        }

        let mut clips = ClipTable::from_clips(
            clips,
            &config.animation.idle_clip,
            &config.animation.walking_clip,
        );
        clips.derive_head_free_idle(&skeleton, is_head_bone_name);

        let skeleton = Arc::new(skeleton);
        let mixer = AnimationMixer::new(skeleton.clone(), &clips);
        let pose = CharacterPose::at_home(
            Vec3::from_array(config.scene.character_home),
            config.scene.character_home_yaw_degrees.to_radians(),
        );

        info!(
            "Character '{}': {} bones, clips [{}], head {}",
            name,
            skeleton.len(),
            clips.names().join(", "),
            head.as_ref()
                .and_then(|h| skeleton.bone(h.bone))
                .map(|b| b.name.as_str())
                .unwrap_or("none")
        );

        Ok(Self {
            name,
            skeleton,
            rig,
            head,
            clips,
            mixer,
            pose,
        })
    }

    pub fn head_bone_name(&self) -> Option<&str> {
        self.head
            .as_ref()
            .and_then(|h| self.skeleton.bone(h.bone))
            .map(|b| b.name.as_str())
    }

    /// Mixer pose with the head joint written over its bone when `override_head` is set
    pub fn local_pose(&self, override_head: bool) -> Vec<Mat4> {
        let mut pose = self.mixer.sample_local_pose();
        if override_head {
            if let Some(head) = &self.head {
                if let Some(slot) = pose.get_mut(head.bone) {
                    *slot = head.local_transform();
                }
            }
        }
        pose
    }
}
