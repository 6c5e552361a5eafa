//! Clip table and animation mixer for the stage character.
//!
//! - `ClipTable`: the loaded clips, with fixed roles (idle, walking) and named lookup
//!   for everything else the asset provides
//! - `AnimationMixer`: per-clip actions advanced by elapsed time, played looping or
//!   once with clamp-on-finish
//! - `SkinningPalette`: final bone matrices ready for upload by a renderer host

use crate::world::skeleton::{AnimationClip, Skeleton};
use glam::Mat4;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum bones per skeleton (matches shader UBO size)
pub const MAX_BONES: usize = 128;

/// Index of a clip in the `ClipTable`
pub type ClipId = usize;

// ============================================================================
// Clip table
// ============================================================================

/// Clips the interaction logic addresses by role rather than by name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClipRole {
    Idle,
    Walking,
}

#[derive(Clone, Debug, Default)]
pub struct ClipTable {
    clips: Vec<Arc<AnimationClip>>,
    by_name: HashMap<String, ClipId>,
    idle: Option<ClipId>,
    walking: Option<ClipId>,
}

impl ClipTable {
    /// Index the clips and bind the idle/walking roles by name
    pub fn from_clips(clips: Vec<AnimationClip>, idle_name: &str, walking_name: &str) -> Self {
        let mut by_name = HashMap::new();
        for (id, clip) in clips.iter().enumerate() {
            by_name.entry(clip.name.clone()).or_insert(id);
        }
        let idle = by_name.get(idle_name).copied();
        let walking = by_name.get(walking_name).copied();
        Self {
            clips: clips.into_iter().map(Arc::new).collect(),
            by_name,
            idle,
            walking,
        }
    }

    pub fn role(&self, role: ClipRole) -> Option<ClipId> {
        match role {
            ClipRole::Idle => self.idle,
            ClipRole::Walking => self.walking,
        }
    }

    /// Lookup by the name the clip was loaded under
    pub fn id(&self, name: &str) -> Option<ClipId> {
        self.by_name.get(name).copied()
    }

    pub fn clip(&self, id: ClipId) -> Option<&Arc<AnimationClip>> {
        self.clips.get(id)
    }

    /// Name of the clip data currently stored at `id`
    pub fn name(&self, id: ClipId) -> Option<&str> {
        self.clips.get(id).map(|c| c.name.as_str())
    }

    pub fn names(&self) -> Vec<&str> {
        self.clips.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn clips(&self) -> &[Arc<AnimationClip>] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Clips eligible for a random gesture: everything except the role clips and
    /// the names in `exclude`.
    pub fn gesture_candidates(&self, exclude: &[String]) -> Vec<ClipId> {
        (0..self.clips.len())
            .filter(|&id| Some(id) != self.idle && Some(id) != self.walking)
            .filter(|&id| {
                let loaded_as = self
                    .by_name
                    .iter()
                    .filter(|&(_, &v)| v == id)
                    .map(|(k, _)| k.as_str());
                let mut names = loaded_as.chain(self.name(id));
                !names.any(|n| exclude.iter().any(|e| e == n))
            })
            .collect()
    }

    /// Replace the idle clip in place with a copy that has no channels on bones
    /// matching `is_head_bone`, named `IdleNoHead`. Returns false when there is no
    /// idle clip.
    pub fn derive_head_free_idle<F>(&mut self, skeleton: &Skeleton, is_head_bone: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        let Some(idle) = self.idle else {
            return false;
        };
        let source = &self.clips[idle];
        let derived = source.filtered("IdleNoHead", |channel| {
            skeleton
                .bone(channel.bone_index)
                .map(|b| !is_head_bone(&b.name))
                .unwrap_or(true)
        });
        log::debug!(
            "Derived IdleNoHead from '{}': {} -> {} channels",
            source.name,
            source.channels.len(),
            derived.channels.len()
        );
        self.by_name.entry(derived.name.clone()).or_insert(idle);
        self.clips[idle] = Arc::new(derived);
        true
    }
}

// ============================================================================
// Mixer
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    /// Wrap back to the start forever
    Repeat,
    /// Play to the end once
    Once,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayOptions {
    pub loop_mode: LoopMode,
    /// Hold the final frame after a `Once` clip ends instead of releasing it
    pub clamp_when_finished: bool,
    pub time_scale: f32,
}

impl PlayOptions {
    pub fn looping() -> Self {
        Self {
            loop_mode: LoopMode::Repeat,
            clamp_when_finished: false,
            time_scale: 1.0,
        }
    }

    pub fn once_clamped() -> Self {
        Self {
            loop_mode: LoopMode::Once,
            clamp_when_finished: true,
            time_scale: 1.0,
        }
    }

    pub fn with_time_scale(mut self, time_scale: f32) -> Self {
        self.time_scale = time_scale;
        self
    }
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self::looping()
    }
}

/// Playback state of one clip inside the mixer
#[derive(Clone, Debug)]
pub struct ClipAction {
    pub clip: ClipId,
    pub time: f32,
    pub options: PlayOptions,
    /// False once a `Once` clip reached its end
    pub running: bool,
}

/// Advances the active clip actions and evaluates the combined pose
#[derive(Clone, Debug)]
pub struct AnimationMixer {
    skeleton: Arc<Skeleton>,
    clips: Vec<Arc<AnimationClip>>,
    actions: Vec<ClipAction>,
}

impl AnimationMixer {
    pub fn new(skeleton: Arc<Skeleton>, table: &ClipTable) -> Self {
        Self {
            skeleton,
            clips: table.clips().to_vec(),
            actions: Vec::new(),
        }
    }

    /// Start `clip` from time zero. Replaces any existing action for the same clip.
    pub fn play(&mut self, clip: ClipId, options: PlayOptions) -> bool {
        if clip >= self.clips.len() {
            log::warn!("Mixer: no clip with id {}", clip);
            return false;
        }
        self.actions.retain(|a| a.clip != clip);
        self.actions.push(ClipAction {
            clip,
            time: 0.0,
            options,
            running: true,
        });
        true
    }

    pub fn stop(&mut self, clip: ClipId) {
        self.actions.retain(|a| a.clip != clip);
    }

    pub fn stop_all(&mut self) {
        self.actions.clear();
    }

    pub fn advance(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let clips = &self.clips;
        self.actions.retain_mut(|action| {
            if !action.running {
                return true;
            }
            let duration = clips[action.clip].duration;
            action.time += dt * action.options.time_scale;
            match action.options.loop_mode {
                LoopMode::Repeat => {
                    action.time = if duration > 0.0 {
                        action.time.rem_euclid(duration)
                    } else {
                        0.0
                    };
                    true
                }
                LoopMode::Once => {
                    if action.time >= duration {
                        action.time = duration;
                        action.running = false;
                        action.options.clamp_when_finished
                    } else {
                        true
                    }
                }
            }
        });
    }

    /// Clip length in seconds (unscaled)
    pub fn duration(&self, clip: ClipId) -> Option<f32> {
        self.clips.get(clip).map(|c| c.duration)
    }

    pub fn action(&self, clip: ClipId) -> Option<&ClipAction> {
        self.actions.iter().find(|a| a.clip == clip)
    }

    /// True while the clip is advancing (a clamped, finished clip is not playing)
    pub fn is_playing(&self, clip: ClipId) -> bool {
        self.action(clip).map(|a| a.running).unwrap_or(false)
    }

    /// Clips currently contributing to the pose, in start order
    pub fn active_clips(&self) -> Vec<ClipId> {
        self.actions.iter().map(|a| a.clip).collect()
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    /// Local pose of every bone: bind pose with no active clips, otherwise an even
    /// blend of all active actions.
    pub fn sample_local_pose(&self) -> Vec<Mat4> {
        let mut pose: Option<Vec<Mat4>> = None;
        for (i, action) in self.actions.iter().enumerate() {
            let sampled = self.clips[action.clip].sample(action.time, &self.skeleton);
            pose = Some(match pose {
                None => sampled,
                Some(acc) => blend_poses(&acc, &sampled, 1.0 / (i as f32 + 1.0)),
            });
        }
        pose.unwrap_or_else(|| self.skeleton.bind_pose())
    }
}

/// Blend two poses together using linear interpolation
///
/// Performs component-wise TRS blending:
/// - Position: lerp
/// - Rotation: slerp
/// - Scale: lerp
pub fn blend_poses(a: &[Mat4], b: &[Mat4], factor: f32) -> Vec<Mat4> {
    let factor = factor.clamp(0.0, 1.0);
    a.iter()
        .zip(b)
        .map(|(a, b)| {
            let (scale_a, rot_a, trans_a) = a.to_scale_rotation_translation();
            let (scale_b, rot_b, trans_b) = b.to_scale_rotation_translation();
            Mat4::from_scale_rotation_translation(
                scale_a.lerp(scale_b, factor),
                rot_a.slerp(rot_b, factor),
                trans_a.lerp(trans_b, factor),
            )
        })
        .collect()
}

// ============================================================================
// Skinning
// ============================================================================

/// skinning_matrix[i] = global_transform[i] * inverse_bind_matrix[i]
pub fn compute_skinning_matrices(skeleton: &Skeleton, local_pose: &[Mat4]) -> Vec<Mat4> {
    skeleton
        .global_transforms(local_pose)
        .iter()
        .zip(&skeleton.bones)
        .take(MAX_BONES)
        .map(|(global, bone)| *global * bone.inverse_bind_matrix)
        .collect()
}

/// Bone matrices ready for GPU upload
#[derive(Clone, Debug)]
pub struct SkinningPalette {
    pub bone_matrices: Vec<Mat4>,
    /// Set when matrices need re-upload
    pub dirty: bool,
}

impl SkinningPalette {
    pub fn new(bone_count: usize) -> Self {
        Self {
            bone_matrices: vec![Mat4::IDENTITY; bone_count.min(MAX_BONES)],
            dirty: true,
        }
    }

    pub fn update_from(&mut self, matrices: Vec<Mat4>) {
        self.bone_matrices = matrices;
        self.dirty = true;
    }

    /// Flat column-major f32 array padded with identity to `MAX_BONES`
    pub fn as_gpu_buffer(&self) -> Vec<f32> {
        let mut buffer = Vec::with_capacity(MAX_BONES * 16);
        for mat in self.bone_matrices.iter().take(MAX_BONES) {
            buffer.extend_from_slice(&mat.to_cols_array());
        }
        while buffer.len() < MAX_BONES * 16 {
            buffer.extend_from_slice(&Mat4::IDENTITY.to_cols_array());
        }
        buffer
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
