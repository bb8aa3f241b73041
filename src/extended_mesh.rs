use std::collections::BTreeMap;

use glam::{Mat3, Mat4, Vec3};

use crate::error::{ExportError, Result};
use crate::scene::{BoneHierarchy, BoneId, Mesh};

/// A parent/child pair of bones that a face is stretched across. The parent
/// is `None` when the child is a top-level bone attached to the model root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BonePair {
    pub parent: Option<BoneId>,
    pub child: BoneId,
}

/// Binds the joint indices stored in a mesh's vertex weights to bones of the
/// hierarchy. Entry `i` holds the bone and inverse bind matrix of joint `i`,
/// or `None` when that joint is not part of the hierarchy.
#[derive(Debug, Clone, Default)]
pub struct MeshSkin {
    pub joints: Vec<Option<(BoneId, Mat4)>>,
}

/// A mesh plus everything needed to draw it against a bone hierarchy.
///
/// Every face lands in exactly one bucket: either `faces_for_bone` (all of
/// its vertices belong to the same bone, `None` meaning unskinned) or
/// `bone_spanning_faces` (its vertices belong to a parent bone and one of
/// its children).
#[derive(Debug, Clone)]
pub struct ExtendedMesh {
    pub mesh: Mesh,
    pub bb_min: Vec3,
    pub bb_max: Vec3,
    /// Moves a skinned vertex from mesh space into its bone's local space.
    pub point_inverse_transform: Vec<Option<Mat4>>,
    pub normal_inverse_transform: Vec<Option<Mat3>>,
    pub vertex_bones: Vec<Option<BoneId>>,
    pub faces_for_bone: BTreeMap<Option<BoneId>, Vec<usize>>,
    pub bone_spanning_faces: BTreeMap<BonePair, Vec<usize>>,
}

impl ExtendedMesh {
    pub fn new(mesh: Mesh, skin: Option<&MeshSkin>, bones: &BoneHierarchy) -> Result<ExtendedMesh> {
        let vertex_count = mesh.vertex_count();
        let (bb_min, bb_max) = if mesh.positions.is_empty() {
            (Vec3::ZERO, Vec3::ZERO)
        } else {
            mesh.positions.iter().fold(
                (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
                |(min, max), &p| (min.min(p), max.max(p)),
            )
        };

        let mut extended = ExtendedMesh {
            mesh,
            bb_min,
            bb_max,
            point_inverse_transform: vec![None; vertex_count],
            normal_inverse_transform: vec![None; vertex_count],
            vertex_bones: vec![None; vertex_count],
            faces_for_bone: BTreeMap::new(),
            bone_spanning_faces: BTreeMap::new(),
        };

        if let (Some(skin), Some(weights)) = (skin, extended.mesh.weights.as_ref()) {
            for (vertex, weights) in weights.iter().enumerate().take(vertex_count) {
                let dominant = weights
                    .joints
                    .iter()
                    .zip(weights.weights)
                    .filter(|(_, weight)| *weight > 0.0)
                    .fold(None, |best: Option<(u16, f32)>, (&joint, weight)| match best {
                        Some((_, best_weight)) if best_weight >= weight => best,
                        _ => Some((joint, weight)),
                    });
                let Some((joint, _)) = dominant else {
                    continue;
                };
                let Some((bone, offset)) = skin.joints.get(joint as usize).copied().flatten()
                else {
                    log::warn!(
                        "mesh \"{}\" vertex {vertex} references unbound joint {joint}",
                        extended.mesh.name
                    );
                    continue;
                };
                extended.vertex_bones[vertex] = Some(bone);
                extended.point_inverse_transform[vertex] = Some(offset);
                extended.normal_inverse_transform[vertex] =
                    Some(Mat3::from_mat4(offset).inverse().transpose());
            }
        }

        extended.populate_faces_for_bone(bones)?;
        Ok(extended)
    }

    pub fn name(&self) -> &str {
        &self.mesh.name
    }

    pub fn is_skinned(&self) -> bool {
        self.vertex_bones.iter().any(Option::is_some)
    }

    pub fn is_face_one_bone(&self, face: usize) -> bool {
        let [a, b, c] = self.mesh.faces[face];
        let bone = self.vertex_bones[a as usize];
        self.vertex_bones[b as usize] == bone && self.vertex_bones[c as usize] == bone
    }

    /// Finds the parent/child pair a face spans. Faces touching more than two
    /// bones, or two bones that are not directly connected, cannot be drawn
    /// with a single matrix push and are rejected.
    pub fn transition_pair_for_face(&self, face: usize, bones: &BoneHierarchy) -> Result<BonePair> {
        let mut distinct: Vec<Option<BoneId>> = Vec::with_capacity(3);
        for &vertex in &self.mesh.faces[face] {
            let bone = self.vertex_bones[vertex as usize];
            if !distinct.contains(&bone) {
                distinct.push(bone);
            }
        }

        let topology_error = |reason: String| ExportError::UnsupportedTopology {
            mesh: self.mesh.name.clone(),
            face,
            reason,
        };
        match distinct[..] {
            [a, b] => {
                if let (true, Some(child)) = (bones.is_parent_of(a, b), b) {
                    Ok(BonePair { parent: a, child })
                } else if let (true, Some(child)) = (bones.is_parent_of(b, a), a) {
                    Ok(BonePair { parent: b, child })
                } else {
                    Err(topology_error(format!(
                        "bones {} and {} are not parent and child",
                        bone_label(bones, a),
                        bone_label(bones, b)
                    )))
                }
            }
            _ => Err(topology_error(format!(
                "face is weighted to {} different bones",
                distinct.len()
            ))),
        }
    }

    fn populate_faces_for_bone(&mut self, bones: &BoneHierarchy) -> Result<()> {
        for face in 0..self.mesh.faces.len() {
            if self.mesh.faces[face]
                .iter()
                .any(|&v| v as usize >= self.vertex_bones.len())
            {
                return Err(ExportError::UnsupportedTopology {
                    mesh: self.mesh.name.clone(),
                    face,
                    reason: "face references a vertex that does not exist".into(),
                });
            }
            if self.is_face_one_bone(face) {
                let bone = self.vertex_bones[self.mesh.faces[face][0] as usize];
                self.faces_for_bone.entry(bone).or_default().push(face);
            } else {
                let pair = self.transition_pair_for_face(face, bones)?;
                self.bone_spanning_faces.entry(pair).or_default().push(face);
            }
        }
        Ok(())
    }
}

fn bone_label(bones: &BoneHierarchy, bone: Option<BoneId>) -> String {
    match bone {
        Some(bone) => format!("\"{}\"", bones.bone(bone).name),
        None => "<root>".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scene::VertexWeights;

    pub(crate) fn weights_for(joint: u16) -> VertexWeights {
        VertexWeights {
            joints: [joint, 0, 0, 0],
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }

    /// One vertex per joint index in `vertex_joints`; `None` leaves the
    /// vertex unskinned.
    pub(crate) fn skinned_mesh(vertex_joints: &[Option<u16>], faces: Vec<[u32; 3]>) -> Mesh {
        Mesh {
            name: "body".into(),
            positions: (0..vertex_joints.len())
                .map(|i| Vec3::new(i as f32, 0.0, 0.0))
                .collect(),
            weights: Some(
                vertex_joints
                    .iter()
                    .map(|joint| match joint {
                        Some(joint) => weights_for(*joint),
                        None => VertexWeights::default(),
                    })
                    .collect(),
            ),
            faces,
            ..Default::default()
        }
    }

    fn rig() -> (BoneHierarchy, MeshSkin, [BoneId; 4]) {
        let mut bones = BoneHierarchy::new();
        let hip = bones.add_bone("hip", None, None);
        let spine = bones.add_bone("spine", Some(hip), None);
        let head = bones.add_bone("head", Some(spine), None);
        let leg = bones.add_bone("leg", Some(hip), None);
        let skin = MeshSkin {
            joints: [hip, spine, head, leg]
                .iter()
                .map(|&bone| Some((bone, Mat4::from_translation(Vec3::Y))))
                .collect(),
        };
        (bones, skin, [hip, spine, head, leg])
    }

    #[test]
    fn single_bone_faces_are_grouped_by_bone() {
        let (bones, skin, [hip, spine, ..]) = rig();
        let mesh = skinned_mesh(
            &[Some(0), Some(0), Some(0), Some(1), Some(1), Some(1)],
            vec![[0, 1, 2], [3, 4, 5]],
        );
        let mesh = ExtendedMesh::new(mesh, Some(&skin), &bones).unwrap();
        assert_eq!(Some(&vec![0]), mesh.faces_for_bone.get(&Some(hip)));
        assert_eq!(Some(&vec![1]), mesh.faces_for_bone.get(&Some(spine)));
        assert!(mesh.bone_spanning_faces.is_empty());
        assert!(mesh.point_inverse_transform.iter().all(Option::is_some));
    }

    #[test]
    fn spanning_pair_puts_parent_first_regardless_of_winding() {
        let (bones, skin, [hip, spine, ..]) = rig();
        let mesh = skinned_mesh(
            &[Some(1), Some(0), Some(0), Some(1)],
            vec![[0, 1, 2], [1, 3, 0]],
        );
        let mesh = ExtendedMesh::new(mesh, Some(&skin), &bones).unwrap();
        let pair = BonePair {
            parent: Some(hip),
            child: spine,
        };
        assert_eq!(Some(&vec![0, 1]), mesh.bone_spanning_faces.get(&pair));
        assert!(mesh.faces_for_bone.is_empty());
    }

    #[test]
    fn unskinned_to_top_level_bone_spans_from_root() {
        let (bones, skin, [hip, ..]) = rig();
        let mesh = skinned_mesh(&[None, Some(0), Some(0)], vec![[0, 1, 2]]);
        let mesh = ExtendedMesh::new(mesh, Some(&skin), &bones).unwrap();
        let pair = BonePair {
            parent: None,
            child: hip,
        };
        assert_eq!(Some(&vec![0]), mesh.bone_spanning_faces.get(&pair));
        assert_eq!(None, mesh.point_inverse_transform[0]);
    }

    #[test]
    fn three_bone_face_is_rejected() {
        let (bones, skin, _) = rig();
        let mesh = skinned_mesh(&[Some(0), Some(1), Some(2)], vec![[0, 1, 2]]);
        let err = ExtendedMesh::new(mesh, Some(&skin), &bones).unwrap_err();
        assert!(matches!(
            err,
            ExportError::UnsupportedTopology { face: 0, .. }
        ));
    }

    #[test]
    fn non_adjacent_bones_are_rejected() {
        let (bones, skin, _) = rig();
        // head and leg are cousins
        let mesh = skinned_mesh(&[Some(2), Some(3), Some(3)], vec![[0, 1, 2]]);
        let err = ExtendedMesh::new(mesh, Some(&skin), &bones).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedTopology { .. }));
    }

    #[test]
    fn dominant_bone_is_highest_weight() {
        let (bones, skin, [_, spine, ..]) = rig();
        let mut mesh = skinned_mesh(&[Some(0)], Vec::new());
        mesh.weights = Some(vec![VertexWeights {
            joints: [0, 1, 0, 0],
            weights: [0.3, 0.7, 0.0, 0.0],
        }]);
        let mesh = ExtendedMesh::new(mesh, Some(&skin), &bones).unwrap();
        assert_eq!(Some(spine), mesh.vertex_bones[0]);
    }

    #[test]
    fn bounding_box_covers_positions() {
        let mesh = Mesh {
            positions: vec![Vec3::new(-1.0, 2.0, 0.5), Vec3::new(3.0, -4.0, 0.0)],
            ..Default::default()
        };
        let mesh = ExtendedMesh::new(mesh, None, &BoneHierarchy::new()).unwrap();
        assert_eq!(Vec3::new(-1.0, -4.0, 0.0), mesh.bb_min);
        assert_eq!(Vec3::new(3.0, 2.0, 0.5), mesh.bb_max);
        assert!(!mesh.is_skinned());
    }
}
