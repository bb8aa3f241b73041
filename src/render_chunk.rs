use std::collections::HashMap;
use std::rc::Rc;

use glam::{Mat3, Mat4};

use crate::error::Result;
use crate::extended_mesh::{ExtendedMesh, MeshSkin};
use crate::scene::{BoneHierarchy, Mesh, Scene, Skin};
use crate::settings::DisplayListSettings;

/// Layout of the last four bytes of every emitted vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexFormat {
    /// Normal xyz plus a fixed alpha, for lit materials.
    PosUvNormal,
    /// RGBA vertex color, for unlit materials.
    PosUvColor,
}

impl VertexFormat {
    pub fn suffix(self) -> &'static str {
        match self {
            VertexFormat::PosUvNormal => "_normal",
            VertexFormat::PosUvColor => "_color",
        }
    }
}

/// One drawable unit: a mesh, how its vertices are laid out and which
/// material it is drawn with.
#[derive(Debug, Clone)]
pub struct RenderChunk {
    pub mesh: Rc<ExtendedMesh>,
    pub vertex_format: VertexFormat,
    pub material: Option<String>,
}

/// Builds one render chunk per mesh primitive in the scene, in node
/// depth-first order.
///
/// Unskinned primitives get their node's world transform baked into their
/// vertices. Skinned primitives stay in mesh space and are bound to the
/// bone hierarchy through their skin's inverse bind matrices.
pub fn extract_chunks(
    scene: &Scene,
    bones: &BoneHierarchy,
    settings: &DisplayListSettings,
) -> Result<Vec<RenderChunk>> {
    let mut chunks = Vec::new();
    // Instances that end up with identical vertices share one chunk, so they
    // also share one vertex buffer. Keyed by mesh and skin.
    let mut shared: HashMap<(usize, Option<usize>), RenderChunk> = HashMap::new();
    for (transform, node) in scene.mesh_instances() {
        let skin_index = node.skin_index.filter(|&index| index < scene.skins.len());
        let skin = skin_index
            .and_then(|index| scene.skins.get(index))
            .map(|skin| mesh_skin(skin, bones));

        for &mesh_index in &node.mesh_indices {
            let Some(mesh) = scene.meshes.get(mesh_index) else {
                log::warn!("node \"{}\" references missing mesh {mesh_index}", node.name);
                continue;
            };
            let skinned = skin.is_some() && mesh.weights.is_some();
            let key = if skinned {
                Some((mesh_index, skin_index))
            } else if transform == Mat4::IDENTITY {
                Some((mesh_index, None))
            } else {
                None
            };
            if let Some(chunk) = key.and_then(|key| shared.get(&key)) {
                log::debug!("chunk \"{}\" reused by node \"{}\"", chunk.mesh.name(), node.name);
                chunks.push(chunk.clone());
                continue;
            }

            let mut mesh = mesh.clone();
            let skin = match skin.as_ref() {
                Some(skin) if skinned => Some(skin),
                _ => {
                    bake_transform(&mut mesh, transform);
                    None
                }
            };

            let material = scene.material_name(&mesh).map(String::from);
            let vertex_format = choose_vertex_format(&mesh, material.as_deref(), settings);
            let mesh = Rc::new(ExtendedMesh::new(mesh, skin, bones)?);
            log::debug!(
                "chunk \"{}\": {} faces, skinned: {}, material {:?}, {:?}",
                mesh.name(),
                mesh.mesh.faces.len(),
                mesh.is_skinned(),
                material,
                vertex_format
            );
            let chunk = RenderChunk {
                mesh,
                vertex_format,
                material,
            };
            if let Some(key) = key {
                shared.insert(key, chunk.clone());
            }
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}

/// Resolves every joint of a skin to its bone. Joint indices in vertex
/// weights are positions in this list, so a joint outside the hierarchy
/// keeps its slot as `None`.
fn mesh_skin(skin: &Skin, bones: &BoneHierarchy) -> MeshSkin {
    let joints = skin
        .joints
        .iter()
        .enumerate()
        .map(|(i, &joint)| {
            let Some(bone) = bones.bone_for_node(joint) else {
                log::warn!(
                    "skin \"{}\" joint {i} (node {joint}) is not part of the bone hierarchy",
                    skin.name
                );
                return None;
            };
            let offset = skin
                .inverse_bind_matrices
                .get(i)
                .copied()
                .unwrap_or(Mat4::IDENTITY);
            Some((bone, offset))
        })
        .collect();
    MeshSkin { joints }
}

fn bake_transform(mesh: &mut Mesh, transform: Mat4) {
    if transform == Mat4::IDENTITY {
        return;
    }
    for position in &mut mesh.positions {
        *position = transform.transform_point3(*position);
    }
    if let Some(normals) = &mut mesh.normals {
        let normal_transform = Mat3::from_mat4(transform).inverse().transpose();
        for normal in normals {
            *normal = (normal_transform * *normal).normalize_or_zero();
        }
    }
}

fn choose_vertex_format(
    mesh: &Mesh,
    material: Option<&str>,
    settings: &DisplayListSettings,
) -> VertexFormat {
    let preferred = material
        .and_then(|name| settings.materials.get(name))
        .and_then(|material| material.vertex_format);
    match preferred {
        Some(format) => format,
        None if mesh.normals.is_none() && mesh.colors.is_some() => VertexFormat::PosUvColor,
        None => VertexFormat::PosUvNormal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extended_mesh::tests::skinned_mesh;
    use crate::material::Material;
    use crate::scene::Node;
    use glam::{Vec3, Vec4};

    #[test]
    fn unskinned_meshes_are_baked_into_world_space() {
        let mut node = Node::new("prop");
        node.translation = Vec3::new(0.0, 10.0, 0.0);
        node.mesh_indices = vec![0];
        let scene = Scene {
            root_nodes: vec![0],
            nodes: vec![node],
            meshes: vec![Mesh {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                normals: Some(vec![Vec3::Z; 3]),
                faces: vec![[0, 1, 2]],
                ..Default::default()
            }],
            ..Default::default()
        };

        let chunks =
            extract_chunks(&scene, &BoneHierarchy::new(), &DisplayListSettings::default()).unwrap();
        assert_eq!(1, chunks.len());
        assert_eq!(Vec3::new(0.0, 10.0, 0.0), chunks[0].mesh.mesh.positions[0]);
        assert_eq!(VertexFormat::PosUvNormal, chunks[0].vertex_format);
        assert_eq!(None, chunks[0].material);
    }

    #[test]
    fn skinned_meshes_bind_to_bones() {
        let mut body = Node::new("body");
        body.mesh_indices = vec![0];
        body.skin_index = Some(0);
        // Translation is ignored for skinned meshes.
        body.translation = Vec3::new(5.0, 0.0, 0.0);
        let hip = Node::new("hip");
        let scene = Scene {
            root_nodes: vec![0, 1],
            nodes: vec![body, hip],
            meshes: vec![skinned_mesh(&[Some(0), Some(0), Some(0)], vec![[0, 1, 2]])],
            skins: vec![Skin {
                name: "rig".into(),
                joints: vec![1],
                inverse_bind_matrices: vec![Mat4::IDENTITY],
            }],
            ..Default::default()
        };
        let bones = BoneHierarchy::from_scene(&scene);

        let chunks = extract_chunks(&scene, &bones, &DisplayListSettings::default()).unwrap();
        let mesh = &chunks[0].mesh;
        assert_eq!(Vec3::ZERO, mesh.mesh.positions[0]);
        assert_eq!(bones.bone_for_node(1), mesh.vertex_bones[0]);
        assert_eq!(Some(&vec![0]), mesh.faces_for_bone.get(&bones.bone_for_node(1)));
    }

    #[test]
    fn joints_outside_the_hierarchy_keep_their_slot() {
        let mut body = Node::new("body");
        body.mesh_indices = vec![0];
        body.skin_index = Some(0);
        let mut hip = Node::new("hip");
        hip.child_node_indices = vec![2];
        let leg = Node::new("leg");
        // not reachable from any root, so it never becomes a bone
        let stray = Node::new("stray");
        let offset = |x: f32| Mat4::from_translation(Vec3::new(x, 0.0, 0.0));
        let scene = Scene {
            root_nodes: vec![0, 1],
            nodes: vec![body, hip, leg, stray],
            meshes: vec![skinned_mesh(
                &[Some(1), Some(1), Some(1), Some(2), Some(2), Some(2), Some(0)],
                vec![[0, 1, 2], [3, 4, 5]],
            )],
            skins: vec![Skin {
                name: "rig".into(),
                joints: vec![3, 1, 2],
                inverse_bind_matrices: vec![offset(3.0), offset(1.0), offset(2.0)],
            }],
            ..Default::default()
        };
        let bones = BoneHierarchy::from_scene(&scene);
        let hip = bones.bone_for_node(1);
        let leg = bones.bone_for_node(2);
        assert_eq!(None, bones.bone_for_node(3));

        let chunks = extract_chunks(&scene, &bones, &DisplayListSettings::default()).unwrap();
        let mesh = &chunks[0].mesh;
        assert_eq!(hip, mesh.vertex_bones[0]);
        assert_eq!(Some(offset(1.0)), mesh.point_inverse_transform[0]);
        assert_eq!(leg, mesh.vertex_bones[3]);
        assert_eq!(Some(offset(2.0)), mesh.point_inverse_transform[3]);
        assert_eq!(None, mesh.vertex_bones[6]);
        assert_eq!(Some(&vec![0]), mesh.faces_for_bone.get(&hip));
        assert_eq!(Some(&vec![1]), mesh.faces_for_bone.get(&leg));
    }

    #[test]
    fn instances_with_identical_vertices_share_a_mesh() {
        let mut skinned_a = Node::new("body_a");
        skinned_a.mesh_indices = vec![0];
        skinned_a.skin_index = Some(0);
        let mut skinned_b = Node::new("body_b");
        skinned_b.mesh_indices = vec![0];
        skinned_b.skin_index = Some(0);
        let hip = Node::new("hip");
        let mut prop_a = Node::new("prop_a");
        prop_a.mesh_indices = vec![1];
        let mut prop_b = Node::new("prop_b");
        prop_b.mesh_indices = vec![1];
        let mut moved = Node::new("prop_moved");
        moved.mesh_indices = vec![1];
        moved.translation = Vec3::new(0.0, 0.0, 4.0);
        let scene = Scene {
            root_nodes: vec![0, 1, 2, 3, 4, 5],
            nodes: vec![skinned_a, skinned_b, hip, prop_a, prop_b, moved],
            meshes: vec![
                skinned_mesh(&[Some(0), Some(0), Some(0)], vec![[0, 1, 2]]),
                Mesh {
                    positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                    faces: vec![[0, 1, 2]],
                    ..Default::default()
                },
            ],
            skins: vec![Skin {
                name: "rig".into(),
                joints: vec![2],
                inverse_bind_matrices: vec![Mat4::IDENTITY],
            }],
            ..Default::default()
        };
        let bones = BoneHierarchy::from_scene(&scene);

        let chunks = extract_chunks(&scene, &bones, &DisplayListSettings::default()).unwrap();
        assert_eq!(5, chunks.len());
        assert!(Rc::ptr_eq(&chunks[0].mesh, &chunks[1].mesh));
        assert!(Rc::ptr_eq(&chunks[2].mesh, &chunks[3].mesh));
        // a different world transform means different baked vertices
        assert!(!Rc::ptr_eq(&chunks[2].mesh, &chunks[4].mesh));
        assert_eq!(Vec3::new(0.0, 0.0, 4.0), chunks[4].mesh.mesh.positions[0]);
    }

    #[test]
    fn vertex_format_follows_material_then_attributes() {
        let mut settings = DisplayListSettings::default();
        settings.materials.insert(
            "unlit".into(),
            Material {
                name: "unlit".into(),
                vertex_format: Some(VertexFormat::PosUvColor),
                ..Default::default()
            },
        );
        let plain = Mesh::default();
        let colored = Mesh {
            colors: Some(vec![Vec4::ONE]),
            ..Default::default()
        };

        assert_eq!(
            VertexFormat::PosUvColor,
            choose_vertex_format(&plain, Some("unlit"), &settings)
        );
        assert_eq!(
            VertexFormat::PosUvColor,
            choose_vertex_format(&colored, None, &settings)
        );
        assert_eq!(
            VertexFormat::PosUvNormal,
            choose_vertex_format(&plain, Some("missing"), &settings)
        );
    }
}
