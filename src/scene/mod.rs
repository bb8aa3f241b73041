use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

mod bones;
mod loader;

pub use bones::{BoneHierarchy, BoneId};
pub use loader::{load_scene, parse_gltf, SceneError};

/// An imported scene, flattened into plain arrays indexed by the nodes.
///
/// Mesh primitives are stored as separate [`Mesh`]es, so a glTF mesh with
/// three primitives shows up as three entries in `meshes`, all referenced by
/// the same node.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub name: String,
    pub root_nodes: Vec<usize>,
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
    pub material_names: Vec<String>,
    pub skins: Vec<Skin>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub mesh_indices: Vec<usize>,
    pub skin_index: Option<usize>,
    pub child_node_indices: Vec<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Node {
        Node {
            name: name.into(),
            mesh_indices: Vec::new(),
            skin_index: None,
            child_node_indices: Vec::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    pub fn transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Up to four bone influences of a single vertex. `joints` index into the
/// owning [`Skin`]'s joint list.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VertexWeights {
    pub joints: [u16; 4],
    pub weights: [f32; 4],
}

/// A triangle list with optional per-vertex attributes.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    pub colors: Option<Vec<Vec4>>,
    pub faces: Vec<[u32; 3]>,
    pub material_index: Option<usize>,
    pub weights: Option<Vec<VertexWeights>>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Skin {
    pub name: String,
    /// Node indices of the joints.
    pub joints: Vec<usize>,
    /// Transforms mesh space into the local space of the joint with the same
    /// index.
    pub inverse_bind_matrices: Vec<Mat4>,
}

impl Scene {
    /// Returns every node that carries meshes, paired with its world
    /// transform, in depth-first order starting from the root nodes.
    pub fn mesh_instances(&self) -> Vec<(Mat4, &Node)> {
        let mut instances = Vec::new();
        let mut node_queue = self
            .root_nodes
            .iter()
            .rev()
            .filter_map(|&i| self.nodes.get(i))
            .map(|node| (Mat4::IDENTITY, node))
            .collect::<Vec<_>>();
        while let Some((parent_transform, node)) = node_queue.pop() {
            let transform = parent_transform * node.transform();
            if !node.mesh_indices.is_empty() {
                instances.push((transform, node));
            }
            for &child_index in node.child_node_indices.iter().rev() {
                if let Some(child) = self.nodes.get(child_index) {
                    node_queue.push((transform, child));
                }
            }
        }
        instances
    }

    pub fn material_name(&self, mesh: &Mesh) -> Option<&str> {
        mesh.material_index
            .and_then(|index| self.material_names.get(index))
            .map(String::as_str)
    }
}
