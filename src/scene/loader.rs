use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use thiserror::Error;
use tinyjson::JsonValue;

use crate::scene::{Mesh, Node, Scene, Skin, VertexWeights};

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_CHUNK_JSON: u32 = 0x4E4F_534A;
const GLB_CHUNK_BIN: u32 = 0x004E_4942;

const MODE_TRIANGLES: usize = 4;

/// Errors that can occur while importing a glTF scene.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid glTF JSON: {0}")]
    Json(String),
    #[error("invalid glb container: {0}")]
    Glb(String),
    #[error("missing or malformed field \"{0}\"")]
    Field(String),
    #[error("accessor {index}: {reason}")]
    Accessor { index: usize, reason: String },
    #[error("unsupported glTF feature: {0}")]
    Unsupported(String),
}

type Object = HashMap<String, JsonValue>;

/// Loads a `.gltf` or `.glb` file. External buffers are resolved relative to
/// the file's directory.
pub fn load_scene(path: &Path) -> Result<Scene, SceneError> {
    let bytes = std::fs::read(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut scene = if bytes.starts_with(&GLB_MAGIC.to_le_bytes()) {
        let (json, bin) = split_glb(&bytes)?;
        parse_gltf(&json, bin, base_dir)?
    } else {
        let json = String::from_utf8(bytes)
            .map_err(|err| SceneError::Json(format!("not valid UTF-8: {err}")))?;
        parse_gltf(&json, None, base_dir)?
    };
    if scene.name.is_empty() {
        scene.name = name;
    }
    Ok(scene)
}

fn split_glb(bytes: &[u8]) -> Result<(String, Option<Vec<u8>>), SceneError> {
    let read_u32 = |offset: usize| {
        bytes
            .get(offset..offset + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| SceneError::Glb(format!("truncated at byte {offset}")))
    };
    let version = read_u32(4)?;
    if version != 2 {
        return Err(SceneError::Glb(format!("unsupported version {version}")));
    }
    let total_length = (read_u32(8)? as usize).min(bytes.len());

    let mut json = None;
    let mut bin = None;
    let mut offset = 12;
    while offset + 8 <= total_length {
        let chunk_length = read_u32(offset)? as usize;
        let chunk_type = read_u32(offset + 4)?;
        let start = offset + 8;
        let chunk = bytes
            .get(start..start + chunk_length)
            .ok_or_else(|| SceneError::Glb(format!("chunk at byte {offset} overruns file")))?;
        match chunk_type {
            GLB_CHUNK_JSON => {
                let text = std::str::from_utf8(chunk)
                    .map_err(|err| SceneError::Glb(format!("JSON chunk: {err}")))?;
                json = Some(text.to_string());
            }
            GLB_CHUNK_BIN if bin.is_none() => bin = Some(chunk.to_vec()),
            _ => {}
        }
        offset = start + chunk_length;
    }

    let json = json.ok_or_else(|| SceneError::Glb("no JSON chunk".into()))?;
    Ok((json, bin))
}

/// Parses a glTF JSON document. `glb_bin` is the BIN chunk of a GLB, which
/// stands in for the first buffer when that buffer has no uri.
pub fn parse_gltf(
    gltf: &str,
    glb_bin: Option<Vec<u8>>,
    base_dir: &Path,
) -> Result<Scene, SceneError> {
    let gltf: JsonValue = gltf
        .parse()
        .map_err(|err: tinyjson::JsonParseError| SceneError::Json(err.to_string()))?;
    let gltf = take_object(&gltf, "root")?;

    let mut glb_bin = glb_bin;
    let buffers_json = optional_array(gltf, "buffers")?;
    let mut buffers = Vec::with_capacity(buffers_json.len());
    for (i, buffer) in buffers_json.iter().enumerate() {
        let buffer = take_object(buffer, "buffers")?;
        let data = match buffer.get("uri") {
            Some(uri) => {
                let uri = uri
                    .get::<String>()
                    .ok_or_else(|| SceneError::Field("buffers.uri".into()))?;
                load_buffer_uri(uri, base_dir)?
            }
            // The BIN buffer of GLBs
            None if i == 0 => glb_bin
                .take()
                .ok_or_else(|| SceneError::Glb("buffer 0 has no uri and no BIN chunk".into()))?,
            None => return Err(SceneError::Field(format!("buffers[{i}].uri"))),
        };
        let byte_length = take_usize(field(buffer, "byteLength")?)?;
        if data.len() < byte_length {
            return Err(SceneError::Field(format!(
                "buffers[{i}].byteLength is {byte_length} but only {} bytes are available",
                data.len()
            )));
        }
        buffers.push(data);
    }

    let accessors = Accessors {
        accessors: optional_array(gltf, "accessors")?,
        buffer_views: optional_array(gltf, "bufferViews")?,
        buffers: &buffers,
    };

    let nodes_json = optional_array(gltf, "nodes")?;
    let mut nodes = Vec::with_capacity(nodes_json.len());
    let mut mesh_of_node = Vec::with_capacity(nodes_json.len());
    for node in nodes_json {
        let node = take_object(node, "nodes")?;
        let mut parsed = Node::new(optional_string(node, "name")?);
        parsed.child_node_indices = match node.get("children") {
            Some(children) => take_array(children, "children")?
                .iter()
                .map(take_usize)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        parsed.skin_index = node.get("skin").map(take_usize).transpose()?;
        if let Some(matrix_values) = node.get("matrix") {
            let matrix = take_floats(matrix_values, 16)?;
            let (scale, rotation, translation) =
                Mat4::from_cols_slice(&matrix).to_scale_rotation_translation();
            parsed.translation = translation;
            parsed.rotation = rotation;
            parsed.scale = scale;
        } else {
            if let Some(translation) = node.get("translation") {
                parsed.translation = take_vec3(translation)?;
            }
            if let Some(scale) = node.get("scale") {
                parsed.scale = take_vec3(scale)?;
            }
            if let Some(rotation) = node.get("rotation") {
                parsed.rotation = take_quat(rotation)?;
            }
        }
        mesh_of_node.push(node.get("mesh").map(take_usize).transpose()?);
        nodes.push(parsed);
    }

    let meshes_json = optional_array(gltf, "meshes")?;
    let mut meshes = Vec::new();
    let mut primitives_of_mesh = Vec::with_capacity(meshes_json.len());
    for (mesh_index, mesh) in meshes_json.iter().enumerate() {
        let mesh = take_object(mesh, "meshes")?;
        let name = optional_string(mesh, "name")?;
        let mut primitive_indices = Vec::new();
        for primitive in take_array(field(mesh, "primitives")?, "primitives")? {
            let primitive = take_object(primitive, "primitives")?;
            let mode = primitive.get("mode").map(take_usize).transpose()?;
            if mode.unwrap_or(MODE_TRIANGLES) != MODE_TRIANGLES {
                log::warn!(
                    "mesh {mesh_index} has a primitive with mode {:?}, only triangle lists are exported",
                    mode
                );
                continue;
            }
            primitive_indices.push(meshes.len());
            meshes.push(load_primitive(&accessors, primitive, name.clone())?);
        }
        primitives_of_mesh.push(primitive_indices);
    }
    for (node, mesh_index) in nodes.iter_mut().zip(mesh_of_node) {
        if let Some(mesh_index) = mesh_index {
            node.mesh_indices = primitives_of_mesh
                .get(mesh_index)
                .cloned()
                .ok_or_else(|| SceneError::Field(format!("nodes.mesh {mesh_index}")))?;
        }
    }

    let skins_json = optional_array(gltf, "skins")?;
    let mut skins = Vec::with_capacity(skins_json.len());
    for skin in skins_json {
        let skin = take_object(skin, "skins")?;
        let joints = take_array(field(skin, "joints")?, "joints")?
            .iter()
            .map(take_usize)
            .collect::<Result<Vec<_>, _>>()?;
        let inverse_bind_matrices = match skin.get("inverseBindMatrices") {
            Some(accessor) => {
                let (values, components) = accessors.read_floats(take_usize(accessor)?)?;
                if components != 16 {
                    return Err(SceneError::Field("skins.inverseBindMatrices".into()));
                }
                values.chunks_exact(16).map(Mat4::from_cols_slice).collect()
            }
            None => vec![Mat4::IDENTITY; joints.len()],
        };
        skins.push(Skin {
            name: optional_string(skin, "name")?,
            joints,
            inverse_bind_matrices,
        });
    }

    let material_names = optional_array(gltf, "materials")?
        .iter()
        .enumerate()
        .map(|(i, material)| {
            let name = optional_string(take_object(material, "materials")?, "name")?;
            Ok(if name.is_empty() {
                format!("material_{i}")
            } else {
                name
            })
        })
        .collect::<Result<Vec<_>, SceneError>>()?;

    let scenes_json = optional_array(gltf, "scenes")?;
    let scene_index = gltf.get("scene").map(take_usize).transpose()?.unwrap_or(0);
    let (name, root_nodes) = match scenes_json.get(scene_index) {
        Some(scene) => {
            let scene = take_object(scene, "scenes")?;
            let node_indices = match scene.get("nodes") {
                Some(nodes) => take_array(nodes, "scenes.nodes")?
                    .iter()
                    .map(take_usize)
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            (optional_string(scene, "name")?, node_indices)
        }
        None => {
            // No scenes: every node that is nobody's child is a root.
            let mut is_child = vec![false; nodes.len()];
            for node in &nodes {
                for &child in &node.child_node_indices {
                    if let Some(flag) = is_child.get_mut(child) {
                        *flag = true;
                    }
                }
            }
            let roots = (0..nodes.len()).filter(|&i| !is_child[i]).collect();
            (String::new(), roots)
        }
    };

    Ok(Scene {
        name,
        root_nodes,
        nodes,
        meshes,
        material_names,
        skins,
    })
}

fn load_primitive(
    accessors: &Accessors<'_>,
    primitive: &Object,
    name: String,
) -> Result<Mesh, SceneError> {
    let attributes = take_object(field(primitive, "attributes")?, "attributes")?;
    let attribute = |semantic: &str,
                     expected: &[usize]|
     -> Result<Option<(usize, Vec<f32>, usize)>, SceneError> {
        let Some(accessor) = attributes.get(semantic) else {
            return Ok(None);
        };
        let index = take_usize(accessor)?;
        let (values, components) = accessors.read_floats(index)?;
        if !expected.contains(&components) {
            let expected = expected
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" or ");
            return Err(SceneError::Accessor {
                index,
                reason: format!("{semantic} has {components} components, expected {expected}"),
            });
        }
        Ok(Some((index, values, components)))
    };

    let (_, positions, _) =
        attribute("POSITION", &[3])?.ok_or_else(|| SceneError::Field("attributes.POSITION".into()))?;
    let positions = positions
        .chunks_exact(3)
        .map(Vec3::from_slice)
        .collect::<Vec<_>>();

    // Every other vertex attribute needs exactly one element per position.
    let vertex_attribute =
        |semantic: &str, expected: &[usize]| -> Result<Option<(Vec<f32>, usize)>, SceneError> {
            let Some((index, values, components)) = attribute(semantic, expected)? else {
                return Ok(None);
            };
            let count = values.len() / components;
            if count != positions.len() {
                return Err(SceneError::Accessor {
                    index,
                    reason: format!(
                        "{semantic} has {count} elements, POSITION has {}",
                        positions.len()
                    ),
                });
            }
            Ok(Some((values, components)))
        };

    let normals = vertex_attribute("NORMAL", &[3])?
        .map(|(values, _)| values.chunks_exact(3).map(Vec3::from_slice).collect());
    let uvs = vertex_attribute("TEXCOORD_0", &[2])?
        .map(|(values, _)| values.chunks_exact(2).map(Vec2::from_slice).collect());
    let colors = vertex_attribute("COLOR_0", &[3, 4])?.map(|(values, components)| match components {
        3 => values
            .chunks_exact(3)
            .map(|c| Vec4::new(c[0], c[1], c[2], 1.0))
            .collect(),
        _ => values.chunks_exact(4).map(Vec4::from_slice).collect(),
    });
    let weights = match (
        vertex_attribute("JOINTS_0", &[4])?,
        vertex_attribute("WEIGHTS_0", &[4])?,
    ) {
        (Some((joints, _)), Some((weights, _))) => Some(
            joints
                .chunks_exact(4)
                .zip(weights.chunks_exact(4))
                .map(|(joints, weights)| VertexWeights {
                    joints: [
                        joints[0] as u16,
                        joints[1] as u16,
                        joints[2] as u16,
                        joints[3] as u16,
                    ],
                    weights: [weights[0], weights[1], weights[2], weights[3]],
                })
                .collect(),
        ),
        _ => None,
    };

    let indices = match primitive.get("indices") {
        Some(accessor) => accessors.read_indices(take_usize(accessor)?)?,
        None => (0..positions.len() as u32).collect(),
    };
    if let Some(&index) = indices.iter().find(|&&i| i as usize >= positions.len()) {
        return Err(SceneError::Field(format!(
            "indices: vertex {index} out of range"
        )));
    }
    let faces = indices
        .chunks_exact(3)
        .map(|face| [face[0], face[1], face[2]])
        .collect();

    Ok(Mesh {
        name,
        positions,
        normals,
        uvs,
        colors,
        faces,
        material_index: primitive.get("material").map(take_usize).transpose()?,
        weights,
    })
}

fn load_buffer_uri(uri: &str, base_dir: &Path) -> Result<Vec<u8>, SceneError> {
    if let Some(data) = uri.strip_prefix("data:") {
        let (_, payload) = data
            .split_once(";base64,")
            .ok_or_else(|| SceneError::Unsupported("non-base64 data uri".into()))?;
        return base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|err| SceneError::Field(format!("buffers.uri: {err}")));
    }
    let path = base_dir.join(uri);
    std::fs::read(&path).map_err(|source| SceneError::Io { path, source })
}

struct Accessors<'a> {
    accessors: &'a [JsonValue],
    buffer_views: &'a [JsonValue],
    buffers: &'a [Vec<u8>],
}

/// Where the elements of one accessor live and how they are encoded.
struct AccessorLayout<'a> {
    index: usize,
    /// `None` for an accessor without a buffer view, which reads as zeros.
    buffer: Option<&'a [u8]>,
    byte_offset: usize,
    stride: usize,
    count: usize,
    components: usize,
    component_type: usize,
    component_size: usize,
    normalized: bool,
}

impl AccessorLayout<'_> {
    fn read<T: Clone + Default>(&self, read: impl Fn(&[u8]) -> T) -> Result<Vec<T>, SceneError> {
        let Some(buffer) = self.buffer else {
            return Ok(vec![T::default(); self.count * self.components]);
        };
        let element_size = self.component_size * self.components;
        let mut values = Vec::with_capacity(self.count * self.components);
        for element in 0..self.count {
            let start = self.byte_offset + element * self.stride;
            let bytes = buffer
                .get(start..start + element_size)
                .ok_or_else(|| SceneError::Accessor {
                    index: self.index,
                    reason: format!("element {element} is out of bounds"),
                })?;
            values.extend(bytes.chunks_exact(self.component_size).map(&read));
        }
        Ok(values)
    }
}

impl Accessors<'_> {
    /// Reads an accessor into a flat list of floats, converting integer
    /// components (and normalizing them if the accessor says so). Returns the
    /// values and the component count per element.
    fn read_floats(&self, index: usize) -> Result<(Vec<f32>, usize), SceneError> {
        let layout = self.layout(index)?;
        let values = layout.read(|bytes| {
            read_component(bytes, layout.component_type, layout.normalized)
        })?;
        Ok((values, layout.components))
    }

    /// Reads a scalar index accessor without going through `f32`, which
    /// would round indices above 2^24.
    fn read_indices(&self, index: usize) -> Result<Vec<u32>, SceneError> {
        let layout = self.layout(index)?;
        if layout.components != 1 {
            return Err(SceneError::Accessor {
                index,
                reason: format!("indices have {} components", layout.components),
            });
        }
        let read: fn(&[u8]) -> u32 = match layout.component_type {
            5121 => |bytes: &[u8]| bytemuck::pod_read_unaligned::<u8>(bytes) as u32,
            5123 => |bytes: &[u8]| bytemuck::pod_read_unaligned::<u16>(bytes) as u32,
            5125 => |bytes: &[u8]| bytemuck::pod_read_unaligned::<u32>(bytes),
            component_type => {
                return Err(SceneError::Accessor {
                    index,
                    reason: format!("indices use component type {component_type}"),
                })
            }
        };
        layout.read(read)
    }

    fn layout(&self, index: usize) -> Result<AccessorLayout<'_>, SceneError> {
        let accessor_error = |reason: String| SceneError::Accessor { index, reason };
        let accessor = self
            .accessors
            .get(index)
            .ok_or_else(|| accessor_error("does not exist".into()))?;
        let accessor = take_object(accessor, "accessors")?;
        if accessor.contains_key("sparse") {
            return Err(SceneError::Unsupported("sparse accessors".into()));
        }

        let count = take_usize(field(accessor, "count")?)?;
        let components = match field(accessor, "type")?.get::<String>().map(String::as_str) {
            Some("SCALAR") => 1,
            Some("VEC2") => 2,
            Some("VEC3") => 3,
            Some("VEC4") => 4,
            Some("MAT4") => 16,
            type_ => return Err(accessor_error(format!("unexpected type {type_:?}"))),
        };
        let component_type = take_usize(field(accessor, "componentType")?)?;
        let component_size = match component_type {
            5120 | 5121 => 1,
            5122 | 5123 => 2,
            5125 | 5126 => 4,
            _ => return Err(accessor_error(format!("component type {component_type}"))),
        };
        let normalized = accessor
            .get("normalized")
            .and_then(|v| v.get::<bool>().copied())
            .unwrap_or(false);
        let mut layout = AccessorLayout {
            index,
            buffer: None,
            byte_offset: 0,
            stride: component_size * components,
            count,
            components,
            component_type,
            component_size,
            normalized,
        };

        let Some(view) = accessor.get("bufferView") else {
            return Ok(layout);
        };
        let view = self
            .buffer_views
            .get(take_usize(view)?)
            .ok_or_else(|| accessor_error("buffer view does not exist".into()))?;
        let view = take_object(view, "bufferViews")?;
        let buffer = self
            .buffers
            .get(take_usize(field(view, "buffer")?)?)
            .ok_or_else(|| accessor_error("buffer does not exist".into()))?;
        layout.buffer = Some(buffer.as_slice());
        layout.byte_offset = accessor.get("byteOffset").map(take_usize).transpose()?.unwrap_or(0)
            + view.get("byteOffset").map(take_usize).transpose()?.unwrap_or(0);
        if let Some(stride) = view.get("byteStride").map(take_usize).transpose()? {
            layout.stride = stride;
        }
        Ok(layout)
    }
}

fn read_component(bytes: &[u8], component_type: usize, normalized: bool) -> f32 {
    match component_type {
        5120 => {
            let v = bytemuck::pod_read_unaligned::<i8>(bytes) as f32;
            if normalized { (v / 127.0).max(-1.0) } else { v }
        }
        5121 => {
            let v = bytemuck::pod_read_unaligned::<u8>(bytes) as f32;
            if normalized { v / 255.0 } else { v }
        }
        5122 => {
            let v = bytemuck::pod_read_unaligned::<i16>(bytes) as f32;
            if normalized { (v / 32767.0).max(-1.0) } else { v }
        }
        5123 => {
            let v = bytemuck::pod_read_unaligned::<u16>(bytes) as f32;
            if normalized { v / 65535.0 } else { v }
        }
        5125 => bytemuck::pod_read_unaligned::<u32>(bytes) as f32,
        _ => bytemuck::pod_read_unaligned::<f32>(bytes),
    }
}

fn take_object<'a>(json_value: &'a JsonValue, what: &str) -> Result<&'a Object, SceneError> {
    json_value
        .get::<Object>()
        .ok_or_else(|| SceneError::Field(what.to_string()))
}

fn take_array<'a>(json_value: &'a JsonValue, what: &str) -> Result<&'a [JsonValue], SceneError> {
    json_value
        .get::<Vec<JsonValue>>()
        .map(Vec::as_slice)
        .ok_or_else(|| SceneError::Field(what.to_string()))
}

fn field<'a>(object: &'a Object, key: &str) -> Result<&'a JsonValue, SceneError> {
    object.get(key).ok_or_else(|| SceneError::Field(key.to_string()))
}

fn optional_array<'a>(object: &'a Object, key: &str) -> Result<&'a [JsonValue], SceneError> {
    match object.get(key) {
        Some(value) => take_array(value, key),
        None => Ok(&[]),
    }
}

fn optional_string(object: &Object, key: &str) -> Result<String, SceneError> {
    match object.get(key) {
        Some(value) => value
            .get::<String>()
            .cloned()
            .ok_or_else(|| SceneError::Field(key.to_string())),
        None => Ok(String::new()),
    }
}

/// Return usize if JsonValue is a non-negative number.
fn take_usize(json_value: &JsonValue) -> Result<usize, SceneError> {
    match json_value.get::<f64>() {
        Some(&i) if i >= 0.0 => Ok(i as usize),
        _ => Err(SceneError::Field(format!("expected an index, got {json_value:?}"))),
    }
}

fn take_floats(json_value: &JsonValue, len: usize) -> Result<Vec<f32>, SceneError> {
    let values = take_array(json_value, "number array")?;
    if values.len() != len {
        return Err(SceneError::Field(format!(
            "expected {len} numbers, got {}",
            values.len()
        )));
    }
    values
        .iter()
        .map(|value| {
            value
                .get::<f64>()
                .map(|&v| v as f32)
                .ok_or_else(|| SceneError::Field("number array".into()))
        })
        .collect()
}

fn take_vec3(json_value: &JsonValue) -> Result<Vec3, SceneError> {
    Ok(Vec3::from_slice(&take_floats(json_value, 3)?))
}

fn take_quat(json_value: &JsonValue) -> Result<Quat, SceneError> {
    let v = take_floats(json_value, 4)?;
    Ok(Quat::from_xyzw(v[0], v[1], v[2], v[3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_uri(bytes: &[u8]) -> String {
        format!(
            "data:application/octet-stream;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    fn triangle_gltf() -> String {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let indices: [u16; 3] = [0, 1, 2];
        let mut bytes = bytemuck::cast_slice::<Vec3, u8>(&positions).to_vec();
        bytes.extend_from_slice(bytemuck::cast_slice::<u16, u8>(&indices));
        bytes.extend_from_slice(&[0, 0]);
        format!(
            r#"{{
                "asset": {{ "version": "2.0" }},
                "scene": 0,
                "scenes": [{{ "name": "level", "nodes": [0] }}],
                "nodes": [{{ "name": "tri", "mesh": 0, "translation": [1, 2, 3] }}],
                "meshes": [{{ "name": "Tri", "primitives": [
                    {{ "attributes": {{ "POSITION": 0 }}, "indices": 1, "material": 0 }},
                    {{ "attributes": {{ "POSITION": 0 }}, "mode": 1 }}
                ] }}],
                "materials": [{{ "name": "stone" }}],
                "accessors": [
                    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" }},
                    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
                ],
                "bufferViews": [
                    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
                    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
                ],
                "buffers": [{{ "byteLength": {}, "uri": "{}" }}]
            }}"#,
            bytes.len(),
            data_uri(&bytes)
        )
    }

    #[test]
    fn parses_embedded_triangle() {
        let scene = parse_gltf(&triangle_gltf(), None, Path::new(".")).unwrap();
        assert_eq!("level", scene.name);
        assert_eq!(1, scene.meshes.len(), "line primitive should be skipped");

        let mesh = &scene.meshes[0];
        assert_eq!("Tri", mesh.name);
        assert_eq!(vec![[0, 1, 2]], mesh.faces);
        assert_eq!(Vec3::new(1.0, 0.0, 0.0), mesh.positions[1]);
        assert_eq!(Some("stone"), scene.material_name(mesh));

        assert_eq!(vec![0], scene.root_nodes);
        assert_eq!(vec![0], scene.nodes[0].mesh_indices);
        assert_eq!(Vec3::new(1.0, 2.0, 3.0), scene.nodes[0].translation);
    }

    #[test]
    fn reads_skin_weights_and_bind_matrices() {
        let positions: [f32; 3] = [0.0, 1.0, 0.0];
        let joints: [u8; 4] = [1, 0, 0, 0];
        let weights: [f32; 4] = [1.0, 0.0, 0.0, 0.0];
        let ibm = Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)).to_cols_array();
        let mut bytes = bytemuck::cast_slice::<f32, u8>(&positions).to_vec();
        bytes.extend_from_slice(&joints);
        bytes.extend_from_slice(bytemuck::cast_slice::<f32, u8>(&weights));
        bytes.extend_from_slice(bytemuck::cast_slice::<f32, u8>(&ibm));
        bytes.extend_from_slice(bytemuck::cast_slice::<f32, u8>(&ibm));
        let json = format!(
            r#"{{
                "nodes": [
                    {{ "name": "body", "mesh": 0, "skin": 0 }},
                    {{ "name": "root", "children": [2] }},
                    {{ "name": "arm" }}
                ],
                "meshes": [{{ "primitives": [
                    {{ "attributes": {{ "POSITION": 0, "JOINTS_0": 1, "WEIGHTS_0": 2 }} }}
                ] }}],
                "skins": [{{ "joints": [1, 2], "inverseBindMatrices": 3 }}],
                "accessors": [
                    {{ "bufferView": 0, "componentType": 5126, "count": 1, "type": "VEC3" }},
                    {{ "bufferView": 0, "byteOffset": 12, "componentType": 5121, "count": 1, "type": "VEC4" }},
                    {{ "bufferView": 0, "byteOffset": 16, "componentType": 5126, "count": 1, "type": "VEC4" }},
                    {{ "bufferView": 0, "byteOffset": 32, "componentType": 5126, "count": 2, "type": "MAT4" }}
                ],
                "bufferViews": [{{ "buffer": 0, "byteLength": {len} }}],
                "buffers": [{{ "byteLength": {len}, "uri": "{uri}" }}]
            }}"#,
            len = bytes.len(),
            uri = data_uri(&bytes)
        );

        let scene = parse_gltf(&json, None, Path::new(".")).unwrap();
        assert_eq!(vec![0, 1], scene.root_nodes);
        let weights = scene.meshes[0].weights.as_ref().unwrap();
        assert_eq!([1, 0, 0, 0], weights[0].joints);
        assert_eq!(1.0, weights[0].weights[0]);
        assert_eq!(2, scene.skins[0].inverse_bind_matrices.len());
        assert_eq!(
            Vec3::ZERO,
            scene.skins[0].inverse_bind_matrices[1].transform_point3(Vec3::new(0.0, 1.0, 0.0))
        );
    }

    #[test]
    fn glb_bin_chunk_backs_first_buffer() {
        let positions: [f32; 9] = [0.0; 9];
        let bin = bytemuck::cast_slice::<f32, u8>(&positions).to_vec();
        let json = r#"{
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
            "accessors": [{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" }],
            "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
            "buffers": [{ "byteLength": 36 }]
        }"#;

        let mut glb = Vec::new();
        let mut padded_json = json.as_bytes().to_vec();
        while padded_json.len() % 4 != 0 {
            padded_json.push(b' ');
        }
        let total = 12 + 8 + padded_json.len() + 8 + bin.len();
        glb.extend_from_slice(&GLB_MAGIC.to_le_bytes());
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(padded_json.len() as u32).to_le_bytes());
        glb.extend_from_slice(&GLB_CHUNK_JSON.to_le_bytes());
        glb.extend_from_slice(&padded_json);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(&GLB_CHUNK_BIN.to_le_bytes());
        glb.extend_from_slice(&bin);

        let (json, bin) = split_glb(&glb).unwrap();
        let scene = parse_gltf(&json, bin, Path::new(".")).unwrap();
        assert_eq!(1, scene.meshes.len());
        assert_eq!(1, scene.meshes[0].faces.len());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let json = r#"{
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
            "accessors": [{ "componentType": 5126, "count": 3, "type": "VEC2" }]
        }"#;
        let err = parse_gltf(json, None, Path::new(".")).unwrap_err();
        assert!(matches!(err, SceneError::Accessor { index: 0, .. }));
    }

    #[test]
    fn attribute_shorter_than_positions_is_rejected() {
        let json = r#"{
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0, "TEXCOORD_0": 1 } }] }],
            "accessors": [
                { "componentType": 5126, "count": 3, "type": "VEC3" },
                { "componentType": 5126, "count": 1, "type": "VEC2" }
            ]
        }"#;
        let err = parse_gltf(json, None, Path::new(".")).unwrap_err();
        assert!(matches!(err, SceneError::Accessor { index: 1, .. }), "{err}");
    }

    #[test]
    fn large_indices_keep_full_precision() {
        let indices: [u32; 2] = [16_777_217, 3];
        let buffers = vec![bytemuck::cast_slice::<u32, u8>(&indices).to_vec()];
        let accessors: JsonValue = r#"[
            { "bufferView": 0, "componentType": 5125, "count": 2, "type": "SCALAR" },
            { "bufferView": 0, "componentType": 5126, "count": 2, "type": "SCALAR" }
        ]"#
        .parse()
        .unwrap();
        let views: JsonValue = r#"[{ "buffer": 0, "byteLength": 8 }]"#.parse().unwrap();
        let accessors = Accessors {
            accessors: take_array(&accessors, "accessors").unwrap(),
            buffer_views: take_array(&views, "bufferViews").unwrap(),
            buffers: &buffers,
        };

        assert_eq!(vec![16_777_217, 3], accessors.read_indices(0).unwrap());
        // the same value through f32 rounds down
        assert_eq!(16_777_216.0, accessors.read_floats(0).unwrap().0[0]);
        assert!(matches!(
            accessors.read_indices(1),
            Err(SceneError::Accessor { index: 1, .. })
        ));
    }
}
