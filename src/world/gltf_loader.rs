//! Character asset loader
//!
//! Reads the skeleton and animation clips of a rigged character from glTF 2.0
//! (`.gltf` JSON or `.glb` binary). Meshes and materials are ignored; the stage only
//! needs the joint hierarchy, bind matrices and keyframes.
//!
//! Bones come from the first skin's joint list. Files without a skin fall back to
//! treating every node as a bone so that node-animated rigs still load.

use crate::world::skeleton::{AnimationClip, BoneKeyframes, Skeleton};
use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Quat, Vec3};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// The loaded character: skeleton plus every clip the file carries
#[derive(Clone, Debug)]
pub struct CharacterAsset {
    pub name: String,
    pub skeleton: Skeleton,
    pub clips: Vec<AnimationClip>,
}

impl CharacterAsset {
    pub fn clip_names(&self) -> Vec<&str> {
        self.clips.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Load a character from a file path. External buffers resolve relative to the file.
pub fn load_character_file(path: impl AsRef<Path>) -> Result<CharacterAsset> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read character model: {}", path.display()))?;
    let mut asset = load_character_from_bytes(&data, path.parent())
        .with_context(|| format!("Failed to load character model: {}", path.display()))?;
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        asset.name = stem.to_string();
    }
    Ok(asset)
}

/// Load a character from `.glb` or `.gltf` bytes
pub fn load_character_from_bytes(data: &[u8], base_dir: Option<&Path>) -> Result<CharacterAsset> {
    let (json_text, bin_chunk) = if data.len() >= 4 && &data[0..4] == GLB_MAGIC {
        parse_glb(data)?
    } else {
        (String::from_utf8_lossy(data).into_owned(), Vec::new())
    };

    let json: Value = serde_json::from_str(&json_text).context("Failed to parse glTF JSON")?;
    let doc = GltfDocument::new(json, &bin_chunk, base_dir)?;

    let (skeleton, node_to_bone) = doc.build_skeleton()?;
    if skeleton.is_empty() {
        bail!("Model has no nodes to build a skeleton from");
    }

    let mut clips = Vec::new();
    for (i, animation) in doc.array("animations").iter().enumerate() {
        match doc.extract_clip(i, animation, &node_to_bone) {
            Ok(clip) => clips.push(clip),
            Err(e) => log::warn!("Skipping animation {}: {:#}", i, e),
        }
    }

    let scene_index = doc.json.get("scene").and_then(Value::as_u64).unwrap_or(0) as usize;
    let name = doc
        .array("scenes")
        .get(scene_index)
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("character")
        .to_string();

    log::info!(
        "Loaded character: {} bones, {} clips [{}]",
        skeleton.len(),
        clips.len(),
        clips.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
    );

    Ok(CharacterAsset {
        name,
        skeleton,
        clips,
    })
}

// ============================================================================
// GLB container
// ============================================================================

/// Split a GLB container into its JSON text and optional BIN chunk
fn parse_glb(data: &[u8]) -> Result<(String, Vec<u8>)> {
    if data.len() < 20 {
        bail!("GLB file too short ({} bytes)", data.len());
    }
    let version = read_u32_le(data, 4);
    if version != 2 {
        bail!("Unsupported GLB version {}", version);
    }
    let total_length = (read_u32_le(data, 8) as usize).min(data.len());

    let mut json_text = None;
    let mut bin = Vec::new();
    let mut offset = 12;
    while offset + 8 <= total_length {
        let chunk_len = read_u32_le(data, offset) as usize;
        let chunk_type = read_u32_le(data, offset + 4);
        let start = offset + 8;
        let end = start
            .checked_add(chunk_len)
            .filter(|&e| e <= total_length)
            .ok_or_else(|| anyhow!("Invalid GLB: chunk extends past file"))?;

        match chunk_type {
            CHUNK_JSON => {
                json_text = Some(String::from_utf8_lossy(&data[start..end]).into_owned());
            }
            CHUNK_BIN if bin.is_empty() => bin = data[start..end].to_vec(),
            _ => {}
        }
        offset = end;
    }

    let json_text = json_text.ok_or_else(|| anyhow!("Invalid GLB: missing JSON chunk"))?;
    Ok((json_text, bin))
}

fn read_u32_le(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn decode_base64(input: &str) -> Result<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut output = Vec::with_capacity(input.len() * 3 / 4);
    let mut acc = 0u32;
    let mut bits = 0;
    for &byte in input.as_bytes() {
        if matches!(byte, b'=' | b'\n' | b'\r' | b' ') {
            continue;
        }
        let value = ALPHABET
            .iter()
            .position(|&c| c == byte)
            .ok_or_else(|| anyhow!("Invalid base64 character {:?}", byte as char))? as u32;
        acc = (acc << 6) | value;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            output.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Ok(output)
}

// ============================================================================
// Document access
// ============================================================================

struct GltfDocument {
    json: Value,
    buffers: Vec<Vec<u8>>,
}

/// Location of an accessor's elements inside a buffer
struct AccessorView {
    buffer: usize,
    offset: usize,
    count: usize,
    stride: usize,
}

impl GltfDocument {
    fn new(json: Value, bin_chunk: &[u8], base_dir: Option<&Path>) -> Result<Self> {
        let mut buffers = Vec::new();
        for (i, buffer) in json
            .get("buffers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .enumerate()
        {
            let data = match buffer.get("uri").and_then(Value::as_str) {
                Some(uri) if uri.starts_with("data:") => {
                    let (_, payload) = uri
                        .split_once(',')
                        .ok_or_else(|| anyhow!("Buffer {} has a malformed data URI", i))?;
                    decode_base64(payload).with_context(|| format!("Buffer {} data URI", i))?
                }
                Some(uri) => {
                    let path = base_dir.map(|d| d.join(uri)).unwrap_or_else(|| uri.into());
                    std::fs::read(&path)
                        .with_context(|| format!("Failed to read buffer: {}", path.display()))?
                }
                None => bin_chunk.to_vec(),
            };
            buffers.push(data);
        }
        if buffers.is_empty() && !bin_chunk.is_empty() {
            buffers.push(bin_chunk.to_vec());
        }
        Ok(Self { json, buffers })
    }

    fn array(&self, key: &str) -> &[Value] {
        self.json
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn node_name(&self, index: usize) -> String {
        self.array("nodes")
            .get(index)
            .and_then(|n| n.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", index))
    }

    /// child node -> parent node
    fn node_parents(&self) -> HashMap<usize, usize> {
        let mut parents = HashMap::new();
        for (parent, node) in self.array("nodes").iter().enumerate() {
            for child in node
                .get("children")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                if let Some(child) = child.as_u64() {
                    parents.insert(child as usize, parent);
                }
            }
        }
        parents
    }

    /// Build the skeleton with parents ordered before children.
    /// Returns the skeleton and a node index -> bone index map.
    fn build_skeleton(&self) -> Result<(Skeleton, HashMap<usize, usize>)> {
        let nodes = self.array("nodes");
        let parents = self.node_parents();

        let (joints, inverse_binds): (Vec<usize>, Vec<Mat4>) = match self.array("skins").first() {
            Some(skin) => {
                let joints: Vec<usize> = skin
                    .get("joints")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(Value::as_u64)
                    .map(|j| j as usize)
                    .filter(|&j| j < nodes.len())
                    .collect();
                let ibms = match skin.get("inverseBindMatrices").and_then(Value::as_u64) {
                    Some(accessor) => self
                        .read_mat4s(accessor as usize)
                        .context("Failed to read inverse bind matrices")?,
                    None => Vec::new(),
                };
                (joints, ibms)
            }
            None => {
                log::debug!("No skin found, using all {} nodes as bones", nodes.len());
                ((0..nodes.len()).collect(), Vec::new())
            }
        };

        let depth = |mut node: usize| {
            let mut d = 0;
            while let Some(&p) = parents.get(&node) {
                node = p;
                d += 1;
                if d > nodes.len() {
                    break;
                }
            }
            d
        };
        let mut order: Vec<(usize, usize)> = joints.iter().copied().enumerate().collect();
        order.sort_by_key(|&(_, node)| depth(node));

        let mut skeleton = Skeleton::new();
        let mut node_to_bone = HashMap::new();
        for (joint_slot, node) in order {
            let parent_bone = nearest_bone_ancestor(node, &parents, &node_to_bone);
            let local = node_transform(nodes.get(node));
            let inverse_bind = inverse_binds.get(joint_slot).copied().unwrap_or_else(|| {
                let global = parent_bone
                    .map(|p| skeleton_global(&skeleton, p))
                    .unwrap_or(Mat4::IDENTITY)
                    * local;
                global.inverse()
            });
            let bone = skeleton.add_bone(self.node_name(node), parent_bone, inverse_bind, local);
            node_to_bone.insert(node, bone);
        }
        Ok((skeleton, node_to_bone))
    }

    fn accessor_view(&self, index: usize, element_size: usize) -> Result<AccessorView> {
        let accessor = self
            .array("accessors")
            .get(index)
            .ok_or_else(|| anyhow!("Accessor {} not found", index))?;
        let field = |v: &Value, k: &str| v.get(k).and_then(Value::as_u64).map(|n| n as usize);

        let view_index =
            field(accessor, "bufferView").ok_or_else(|| anyhow!("Accessor {} has no bufferView", index))?;
        let count = field(accessor, "count").ok_or_else(|| anyhow!("Accessor {} has no count", index))?;
        let component_type = field(accessor, "componentType").unwrap_or(5126);
        if component_type != 5126 {
            bail!("Accessor {} is not FLOAT (componentType {})", index, component_type);
        }

        let view = self
            .array("bufferViews")
            .get(view_index)
            .ok_or_else(|| anyhow!("Buffer view {} not found", view_index))?;
        let buffer = field(view, "buffer").unwrap_or(0);
        let offset = field(view, "byteOffset").unwrap_or(0) + field(accessor, "byteOffset").unwrap_or(0);
        let stride = field(view, "byteStride").filter(|&s| s > 0).unwrap_or(element_size);

        let data = self
            .buffers
            .get(buffer)
            .ok_or_else(|| anyhow!("Buffer {} not found", buffer))?;
        if count > 0 && offset + (count - 1) * stride + element_size > data.len() {
            bail!("Accessor {} reads past the end of buffer {}", index, buffer);
        }
        Ok(AccessorView {
            buffer,
            offset,
            count,
            stride,
        })
    }

    /// Read `N` little-endian floats per element
    fn read_floats<const N: usize>(&self, accessor: usize) -> Result<Vec<[f32; N]>> {
        let view = self.accessor_view(accessor, N * 4)?;
        let data = &self.buffers[view.buffer];
        Ok((0..view.count)
            .map(|i| {
                let start = view.offset + i * view.stride;
                let mut out = [0.0f32; N];
                for (j, v) in out.iter_mut().enumerate() {
                    let at = start + j * 4;
                    *v = f32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
                }
                out
            })
            .collect())
    }

    fn read_mat4s(&self, accessor: usize) -> Result<Vec<Mat4>> {
        Ok(self.read_floats::<16>(accessor)?.iter().map(Mat4::from_cols_array).collect())
    }

    fn extract_clip(
        &self,
        index: usize,
        animation: &Value,
        node_to_bone: &HashMap<usize, usize>,
    ) -> Result<AnimationClip> {
        let name = animation
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("animation_{}", index));
        let samplers = animation
            .get("samplers")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Animation '{}' has no samplers", name))?;

        let mut tracks: HashMap<usize, BoneKeyframes> = HashMap::new();
        for channel in animation
            .get("channels")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            let Some(target) = channel.get("target") else { continue };
            let Some(bone) = target
                .get("node")
                .and_then(Value::as_u64)
                .and_then(|n| node_to_bone.get(&(n as usize)).copied())
            else {
                continue;
            };
            let Some(sampler) = channel
                .get("sampler")
                .and_then(Value::as_u64)
                .and_then(|s| samplers.get(s as usize))
            else {
                continue;
            };
            let input = sampler.get("input").and_then(Value::as_u64).unwrap_or(0) as usize;
            let output = sampler.get("output").and_then(Value::as_u64).unwrap_or(0) as usize;

            let times: Vec<f32> = self.read_floats::<1>(input)?.into_iter().map(|[t]| t).collect();
            if let Some(bad) = times.iter().find(|t| !t.is_finite() || **t < 0.0) {
                bail!("Animation '{}' has invalid key time {}", name, bad);
            }
            let track = tracks.entry(bone).or_insert_with(|| BoneKeyframes::new(bone));

            match target.get("path").and_then(Value::as_str).unwrap_or("") {
                "translation" => {
                    let values = self.read_floats::<3>(output)?;
                    track
                        .position_keys
                        .extend(times.iter().zip(values).map(|(&t, v)| (t, Vec3::from_array(v))));
                }
                "rotation" => {
                    let values = self.read_floats::<4>(output)?;
                    track.rotation_keys.extend(
                        times
                            .iter()
                            .zip(values)
                            .map(|(&t, v)| (t, Quat::from_array(v).normalize())),
                    );
                }
                "scale" => {
                    let values = self.read_floats::<3>(output)?;
                    track
                        .scale_keys
                        .extend(times.iter().zip(values).map(|(&t, v)| (t, Vec3::from_array(v))));
                }
                other => log::debug!("Animation '{}': ignoring channel path '{}'", name, other),
            }
        }

        let mut channels: Vec<BoneKeyframes> = tracks.into_values().filter(|t| !t.is_empty()).collect();
        channels.sort_by_key(|c| c.bone_index);
        for channel in &mut channels {
            channel.position_keys.sort_by(|a, b| a.0.total_cmp(&b.0));
            channel.rotation_keys.sort_by(|a, b| a.0.total_cmp(&b.0));
            channel.scale_keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
        Ok(AnimationClip::from_channels(&name, channels))
    }
}

fn nearest_bone_ancestor(
    node: usize,
    parents: &HashMap<usize, usize>,
    node_to_bone: &HashMap<usize, usize>,
) -> Option<usize> {
    let mut current = node;
    for _ in 0..=parents.len() {
        let parent = *parents.get(&current)?;
        if let Some(&bone) = node_to_bone.get(&parent) {
            return Some(bone);
        }
        current = parent;
    }
    None
}

fn skeleton_global(skeleton: &Skeleton, bone: usize) -> Mat4 {
    let mut m = Mat4::IDENTITY;
    let mut current = Some(bone);
    while let Some(i) = current {
        let b = &skeleton.bones[i];
        m = b.local_transform * m;
        current = b.parent_index;
    }
    m
}

fn node_transform(node: Option<&Value>) -> Mat4 {
    let Some(node) = node else {
        return Mat4::IDENTITY;
    };

    let floats = |key: &str| -> Option<Vec<f32>> {
        node.get(key)?
            .as_array()?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    };

    if let Some(m) = floats("matrix").filter(|m| m.len() == 16) {
        let mut cols = [0.0f32; 16];
        cols.copy_from_slice(&m);
        return Mat4::from_cols_array(&cols);
    }

    let translation = floats("translation")
        .filter(|t| t.len() == 3)
        .map(|t| Vec3::new(t[0], t[1], t[2]))
        .unwrap_or(Vec3::ZERO);
    let rotation = floats("rotation")
        .filter(|r| r.len() == 4)
        .map(|r| Quat::from_xyzw(r[0], r[1], r[2], r[3]).normalize())
        .unwrap_or(Quat::IDENTITY);
    let scale = floats("scale")
        .filter(|s| s.len() == 3)
        .map(|s| Vec3::new(s[0], s[1], s[2]))
        .unwrap_or(Vec3::ONE);

    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

// ============================================================================
// Procedural test robot
// ============================================================================

/// A small humanoid with Idle, Walking and three gesture clips.
///
/// Used by the headless driver when no model is given and by the tests.
pub fn create_test_robot() -> CharacterAsset {
    let mut skeleton = Skeleton::new();
    let add = |skeleton: &mut Skeleton, name: &str, parent: Option<usize>, offset: Vec3| {
        let local = Mat4::from_translation(offset);
        let global = parent.map(|p| skeleton_global(skeleton, p)).unwrap_or(Mat4::IDENTITY) * local;
        skeleton.add_bone(name, parent, global.inverse(), local)
    };

    let hips = add(&mut skeleton, "Hips", None, Vec3::new(0.0, 1.0, 0.0));
    let spine = add(&mut skeleton, "Spine", Some(hips), Vec3::new(0.0, 0.3, 0.0));
    let neck = add(&mut skeleton, "Neck", Some(spine), Vec3::new(0.0, 0.35, 0.0));
    let head = add(&mut skeleton, "Head", Some(neck), Vec3::new(0.0, 0.15, 0.0));
    let left_arm = add(&mut skeleton, "LeftArm", Some(spine), Vec3::new(0.3, 0.3, 0.0));
    let right_arm = add(&mut skeleton, "RightArm", Some(spine), Vec3::new(-0.3, 0.3, 0.0));
    let left_leg = add(&mut skeleton, "LeftLeg", Some(hips), Vec3::new(0.15, -0.1, 0.0));
    let right_leg = add(&mut skeleton, "RightLeg", Some(hips), Vec3::new(-0.15, -0.1, 0.0));

    let swing = |bone: usize, axis: Vec3, amplitude: f32, period: f32| BoneKeyframes {
        bone_index: bone,
        rotation_keys: vec![
            (0.0, Quat::IDENTITY),
            (period * 0.25, Quat::from_axis_angle(axis, amplitude)),
            (period * 0.75, Quat::from_axis_angle(axis, -amplitude)),
            (period, Quat::IDENTITY),
        ],
        ..Default::default()
    };

    let idle = AnimationClip::from_channels(
        "Idle",
        vec![
            swing(spine, Vec3::X, 0.05, 2.0),
            swing(head, Vec3::Y, 0.15, 2.0),
        ],
    );
    let walking = AnimationClip::from_channels(
        "Walking",
        vec![
            swing(left_leg, Vec3::X, 0.5, 1.0),
            swing(right_leg, Vec3::X, -0.5, 1.0),
            swing(left_arm, Vec3::X, -0.35, 1.0),
            swing(right_arm, Vec3::X, 0.35, 1.0),
        ],
    );
    let wave = AnimationClip::from_channels(
        "Wave",
        vec![BoneKeyframes {
            bone_index: right_arm,
            rotation_keys: vec![
                (0.0, Quat::IDENTITY),
                (0.3, Quat::from_rotation_z(-2.4)),
                (0.6, Quat::from_rotation_z(-2.0)),
                (0.9, Quat::from_rotation_z(-2.4)),
                (1.5, Quat::IDENTITY),
            ],
            ..Default::default()
        }],
    );
    let jump = AnimationClip::from_channels(
        "Jump",
        vec![BoneKeyframes {
            bone_index: hips,
            position_keys: vec![
                (0.0, Vec3::new(0.0, 1.0, 0.0)),
                (0.3, Vec3::new(0.0, 0.85, 0.0)),
                (0.6, Vec3::new(0.0, 1.6, 0.0)),
                (1.0, Vec3::new(0.0, 1.0, 0.0)),
            ],
            ..Default::default()
        }],
    );
    let thumbs_up = AnimationClip::from_channels(
        "ThumbsUp",
        vec![
            BoneKeyframes {
                bone_index: left_arm,
                rotation_keys: vec![
                    (0.0, Quat::IDENTITY),
                    (0.4, Quat::from_rotation_x(-1.3)),
                    (0.8, Quat::from_rotation_x(-1.3)),
                    (1.2, Quat::IDENTITY),
                ],
                ..Default::default()
            },
            swing(head, Vec3::X, 0.1, 1.2),
        ],
    );

    CharacterAsset {
        name: "robot".to_string(),
        skeleton,
        clips: vec![idle, walking, wave, jump, thumbs_up],
    }
}
