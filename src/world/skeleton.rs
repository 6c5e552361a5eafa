//! Skeleton and keyframe data shared by the loader and the mixer.
//!
//! Local transforms are stored as `Mat4` in parent space; clip sampling produces one
//! local matrix per bone, falling back to the bind-pose local transform for bones the
//! clip does not animate.

use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;

/// A joint in the skeleton hierarchy
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub parent_index: Option<usize>,
    /// Mesh space to bone space
    pub inverse_bind_matrix: Mat4,
    /// Bind-pose transform relative to the parent
    pub local_transform: Mat4,
}

#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
    pub bone_names: HashMap<String, usize>,
    pub root_bones: Vec<usize>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_bone_index(&self, name: &str) -> Option<usize> {
        self.bone_names.get(name).copied()
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Append a bone. Parents must be added before their children.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<usize>,
        inverse_bind: Mat4,
        local: Mat4,
    ) -> usize {
        let name = name.into();
        let index = self.bones.len();
        // First bone wins on duplicate names
        self.bone_names.entry(name.clone()).or_insert(index);
        if parent.is_none() {
            self.root_bones.push(index);
        }
        self.bones.push(Bone {
            name,
            parent_index: parent,
            inverse_bind_matrix: inverse_bind,
            local_transform: local,
        });
        index
    }

    /// Bind-pose local transforms, one per bone
    pub fn bind_pose(&self) -> Vec<Mat4> {
        self.bones.iter().map(|b| b.local_transform).collect()
    }

    /// Model-space transform of every bone for the given local pose.
    /// Bones missing from `local` use their bind transform.
    pub fn global_transforms(&self, local: &[Mat4]) -> Vec<Mat4> {
        let mut globals = vec![Mat4::IDENTITY; self.bones.len()];
        for (i, bone) in self.bones.iter().enumerate() {
            let l = local.get(i).copied().unwrap_or(bone.local_transform);
            globals[i] = match bone.parent_index {
                Some(p) if p < i => globals[p] * l,
                _ => l,
            };
        }
        globals
    }
}

/// Keyframe tracks targeting a single bone
#[derive(Clone, Debug, Default)]
pub struct BoneKeyframes {
    pub bone_index: usize,
    pub position_keys: Vec<(f32, Vec3)>,
    pub rotation_keys: Vec<(f32, Quat)>,
    pub scale_keys: Vec<(f32, Vec3)>,
}

impl BoneKeyframes {
    pub fn new(bone_index: usize) -> Self {
        Self {
            bone_index,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position_keys.is_empty() && self.rotation_keys.is_empty() && self.scale_keys.is_empty()
    }

    fn last_key_time(&self) -> f32 {
        let last = |t: Option<f32>| t.unwrap_or(0.0);
        last(self.position_keys.last().map(|k| k.0))
            .max(last(self.rotation_keys.last().map(|k| k.0)))
            .max(last(self.scale_keys.last().map(|k| k.0)))
    }
}

/// A named clip with keyframes for some or all bones
#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<BoneKeyframes>,
}

impl AnimationClip {
    pub fn new(name: &str, duration: f32) -> Self {
        Self {
            name: name.to_string(),
            duration,
            channels: Vec::new(),
        }
    }

    /// Build a clip whose duration is the last key time across all channels
    pub fn from_channels(name: &str, channels: Vec<BoneKeyframes>) -> Self {
        let duration = channels
            .iter()
            .map(BoneKeyframes::last_key_time)
            .fold(0.0, f32::max);
        Self {
            name: name.to_string(),
            duration,
            channels,
        }
    }

    pub fn animates_bone(&self, bone_index: usize) -> bool {
        self.channels.iter().any(|c| c.bone_index == bone_index)
    }

    /// Copy of this clip under a new name keeping only the channels `keep` accepts.
    /// Duration is preserved so the derived clip loops in step with the source.
    pub fn filtered<F>(&self, name: &str, mut keep: F) -> Self
    where
        F: FnMut(&BoneKeyframes) -> bool,
    {
        Self {
            name: name.to_string(),
            duration: self.duration,
            channels: self.channels.iter().filter(|c| keep(c)).cloned().collect(),
        }
    }

    /// Local pose at `time` (clamped to the clip range).
    ///
    /// Animated components override the bind transform; components a channel does not
    /// key keep their bind-pose value.
    pub fn sample(&self, time: f32, skeleton: &Skeleton) -> Vec<Mat4> {
        let t = time.clamp(0.0, self.duration.max(0.0));
        let mut transforms = skeleton.bind_pose();

        for channel in &self.channels {
            let Some(bind) = transforms.get(channel.bone_index).copied() else {
                continue;
            };
            let (bind_scale, bind_rot, bind_pos) = bind.to_scale_rotation_translation();

            let pos = sample_vec3(&channel.position_keys, t).unwrap_or(bind_pos);
            let rot = sample_quat(&channel.rotation_keys, t).unwrap_or(bind_rot);
            let scale = sample_vec3(&channel.scale_keys, t).unwrap_or(bind_scale);

            transforms[channel.bone_index] = Mat4::from_scale_rotation_translation(scale, rot, pos);
        }

        transforms
    }
}

/// Index of the last key at or before `time` and the interpolation factor toward the next
fn key_span<T>(keys: &[(f32, T)], time: f32) -> (usize, usize, f32) {
    let prev = keys.iter().rposition(|(t, _)| *t <= time).unwrap_or(0);
    let next = (prev + 1).min(keys.len() - 1);
    if prev == next {
        return (prev, next, 0.0);
    }
    let (t0, t1) = (keys[prev].0, keys[next].0);
    let factor = if t1 - t0 > 0.0 {
        ((time - t0) / (t1 - t0)).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (prev, next, factor)
}

fn sample_vec3(keys: &[(f32, Vec3)], time: f32) -> Option<Vec3> {
    if keys.is_empty() {
        return None;
    }
    let (a, b, f) = key_span(keys, time);
    Some(keys[a].1.lerp(keys[b].1, f))
}

fn sample_quat(keys: &[(f32, Quat)], time: f32) -> Option<Quat> {
    if keys.is_empty() {
        return None;
    }
    let (a, b, f) = key_span(keys, time);
    Some(keys[a].1.slerp(keys[b].1, f))
}
