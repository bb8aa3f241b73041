use std::collections::{HashMap, HashSet};

use glam::{Quat, Vec3};

use crate::scene::Scene;

/// Opaque handle of a bone. Issued by [`BoneHierarchy`] when the rig is
/// built and doubles as the bone's index into the runtime matrix table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoneId(u16);

impl BoneId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Bone {
    pub id: BoneId,
    pub name: String,
    pub parent: Option<BoneId>,
    pub children: Vec<BoneId>,
    /// Scene node this bone was created from, if any.
    pub node: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// The skeletal rig of a scene.
#[derive(Debug, Clone, Default)]
pub struct BoneHierarchy {
    bones: Vec<Bone>,
    roots: Vec<BoneId>,
    by_node: HashMap<usize, BoneId>,
}

impl BoneHierarchy {
    pub fn new() -> BoneHierarchy {
        BoneHierarchy::default()
    }

    /// Builds the rig from every node used as a joint by any skin in the
    /// scene. A bone's parent is its closest ancestor node that is also a
    /// joint, so helper nodes between joints are skipped.
    pub fn from_scene(scene: &Scene) -> BoneHierarchy {
        let joints = scene
            .skins
            .iter()
            .flat_map(|skin| skin.joints.iter().copied())
            .collect::<HashSet<_>>();

        let mut hierarchy = BoneHierarchy::new();
        let mut visited = HashSet::new();
        let mut node_queue = scene
            .root_nodes
            .iter()
            .rev()
            .map(|&i| (None, i))
            .collect::<Vec<_>>();
        while let Some((parent_bone, node_index)) = node_queue.pop() {
            let Some(node) = scene.nodes.get(node_index) else {
                continue;
            };
            if !visited.insert(node_index) {
                log::warn!("node {node_index} is reachable twice, ignoring the second path");
                continue;
            }
            let bone = if joints.contains(&node_index) {
                let name = if node.name.is_empty() {
                    format!("bone_{node_index}")
                } else {
                    node.name.clone()
                };
                let id = hierarchy.add_bone(name, parent_bone, Some(node_index));
                let bone = &mut hierarchy.bones[id.index()];
                bone.translation = node.translation;
                bone.rotation = node.rotation;
                bone.scale = node.scale;
                Some(id)
            } else {
                parent_bone
            };
            for &child in node.child_node_indices.iter().rev() {
                node_queue.push((bone, child));
            }
        }
        hierarchy
    }

    /// Adds a bone with an identity rest pose. The parent must already be
    /// part of the hierarchy.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<BoneId>,
        node: Option<usize>,
    ) -> BoneId {
        let id = BoneId(self.bones.len() as u16);
        self.bones.push(Bone {
            id,
            name: name.into(),
            parent,
            children: Vec::new(),
            node,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        });
        match parent {
            Some(parent) => self.bones[parent.index()].children.push(id),
            None => self.roots.push(id),
        }
        if let Some(node) = node {
            self.by_node.insert(node, id);
        }
        id
    }

    pub fn bone(&self, id: BoneId) -> &Bone {
        &self.bones[id.index()]
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bone_for_node(&self, node: usize) -> Option<BoneId> {
        self.by_node.get(&node).copied()
    }

    pub fn parent(&self, id: BoneId) -> Option<BoneId> {
        self.bone(id).parent
    }

    /// `true` if `child` hangs directly off `parent`. A `None` parent stands
    /// for the model root, which is the parent of every top-level bone.
    pub fn is_parent_of(&self, parent: Option<BoneId>, child: Option<BoneId>) -> bool {
        match child {
            Some(child) => self.parent(child) == parent,
            None => false,
        }
    }

    /// The chain of bones from the top-level bone down to `target`,
    /// inclusive. Empty for the model root.
    pub fn path_to(&self, target: Option<BoneId>) -> Vec<BoneId> {
        let mut path = Vec::new();
        let mut current = target;
        while let Some(bone) = current {
            path.push(bone);
            current = self.parent(bone);
        }
        path.reverse();
        path
    }

    /// Every bone in depth-first pre-order, children in insertion order.
    pub fn depth_first(&self) -> Vec<BoneId> {
        let mut order = Vec::with_capacity(self.bones.len());
        let mut stack = self.roots.iter().rev().copied().collect::<Vec<_>>();
        while let Some(bone) = stack.pop() {
            order.push(bone);
            stack.extend(self.bone(bone).children.iter().rev().copied());
        }
        order
    }
}
