//! Named-bone discovery.
//!
//! Bones are matched once after loading by case-insensitive name patterns. Both the
//! `LeftArm` / `left_arm` prefix style and the `Arm.L` / `arm_left` suffix style are
//! recognised. The result is a typed table; nothing is re-resolved per frame.

use crate::world::skeleton::Skeleton;
use anyhow::{Context, Result};
use glam::{EulerRot, Mat4, Quat, Vec3};
use regex::Regex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoneRole {
    Head,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
}

impl BoneRole {
    pub const ALL: [BoneRole; 5] = [
        BoneRole::Head,
        BoneRole::LeftArm,
        BoneRole::RightArm,
        BoneRole::LeftLeg,
        BoneRole::RightLeg,
    ];

    /// Patterns in priority order; the first pattern with any match wins.
    fn patterns(self) -> &'static [&'static str] {
        match self {
            BoneRole::Head => &[r"(?i)head", r"(?i)neck"],
            BoneRole::LeftArm => &[
                r"(?i)left[_ ]?(arm|shoulder)",
                r"(?i)(arm|shoulder)([._ ]?l|[._ ]left)$",
            ],
            BoneRole::RightArm => &[
                r"(?i)right[_ ]?(arm|shoulder)",
                r"(?i)(arm|shoulder)([._ ]?r|[._ ]right)$",
            ],
            BoneRole::LeftLeg => &[
                r"(?i)left[_ ]?(up)?(leg|thigh)",
                r"(?i)(leg|thigh)([._ ]?l|[._ ]left)$",
            ],
            BoneRole::RightLeg => &[
                r"(?i)right[_ ]?(up)?(leg|thigh)",
                r"(?i)(leg|thigh)([._ ]?r|[._ ]right)$",
            ],
        }
    }
}

/// Bones resolved by role. Any entry may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoneRig {
    pub head: Option<usize>,
    pub left_arm: Option<usize>,
    pub right_arm: Option<usize>,
    pub left_leg: Option<usize>,
    pub right_leg: Option<usize>,
}

impl BoneRig {
    /// Scan the skeleton in parent-first order and keep the first match per role
    pub fn resolve(skeleton: &Skeleton) -> Result<Self> {
        let mut rig = BoneRig::default();
        for role in BoneRole::ALL {
            let mut found = None;
            for pattern in role.patterns() {
                let re = Regex::new(pattern)
                    .with_context(|| format!("Invalid bone pattern for {:?}: {}", role, pattern))?;
                found = skeleton.bones.iter().position(|b| re.is_match(&b.name));
                if found.is_some() {
                    break;
                }
            }
            *rig.slot_mut(role) = found;
        }

        log::debug!(
            "Bone rig: {}",
            BoneRole::ALL
                .iter()
                .map(|&r| format!(
                    "{:?}={}",
                    r,
                    rig.get(r)
                        .and_then(|i| skeleton.bone(i))
                        .map(|b| b.name.as_str())
                        .unwrap_or("-")
                ))
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok(rig)
    }

    pub fn get(&self, role: BoneRole) -> Option<usize> {
        match role {
            BoneRole::Head => self.head,
            BoneRole::LeftArm => self.left_arm,
            BoneRole::RightArm => self.right_arm,
            BoneRole::LeftLeg => self.left_leg,
            BoneRole::RightLeg => self.right_leg,
        }
    }

    fn slot_mut(&mut self, role: BoneRole) -> &mut Option<usize> {
        match role {
            BoneRole::Head => &mut self.head,
            BoneRole::LeftArm => &mut self.left_arm,
            BoneRole::RightArm => &mut self.right_arm,
            BoneRole::LeftLeg => &mut self.left_leg,
            BoneRole::RightLeg => &mut self.right_leg,
        }
    }
}

/// True for bone names the head-free idle clip must not animate
pub fn is_head_bone_name(name: &str) -> bool {
    name.to_lowercase().contains("head")
}

/// The head bone's local transform, with rotation held as XYZ Euler angles so the
/// aim filter can smooth pitch and yaw independently.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadJoint {
    pub bone: usize,
    /// x = pitch, y = yaw, z = roll (radians)
    pub rotation: Vec3,
    pub translation: Vec3,
    pub scale: Vec3,
}

impl HeadJoint {
    pub fn from_bind(bone: usize, local: Mat4) -> Self {
        let (scale, rotation, translation) = local.to_scale_rotation_translation();
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        Self {
            bone,
            rotation: Vec3::new(x, y, z),
            translation,
            scale,
        }
    }

    pub fn local_transform(&self) -> Mat4 {
        let r = self.rotation;
        Mat4::from_scale_rotation_translation(
            self.scale,
            Quat::from_euler(EulerRot::XYZ, r.x, r.y, r.z),
            self.translation,
        )
    }

    pub fn reset(&mut self) {
        self.rotation = Vec3::ZERO;
    }
}
