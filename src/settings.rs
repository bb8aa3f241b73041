use std::collections::HashMap;

use glam::{EulerRot, Quat};

use crate::material::Material;

/// Vertex cache size of the F3DEX2 microcode.
pub const F3DEX2_VERTEX_CACHE_SIZE: usize = 32;
/// Vertex cache size of the original F3D microcode.
pub const F3D_VERTEX_CACHE_SIZE: usize = 16;

/// Everything that shapes the generated display lists.
#[derive(Debug, Clone)]
pub struct DisplayListSettings {
    /// Prepended to every emitted identifier.
    pub prefix: String,
    pub scale: f32,
    /// Applied to unskinned geometry and to the rest pose of top-level bones.
    pub rotate_model: Quat,
    /// Emit `gsSP2Triangles` for face pairs.
    pub has_tri2: bool,
    pub vertex_cache_size: usize,
    pub max_matrix_depth: usize,
    pub can_pop_multiple_matrices: bool,
    pub export_animation: bool,
    pub export_geometry: bool,
    pub emit_culling_box: bool,
    pub materials: HashMap<String, Material>,
}

impl Default for DisplayListSettings {
    fn default() -> Self {
        DisplayListSettings {
            prefix: "output".to_string(),
            scale: 256.0,
            rotate_model: Quat::IDENTITY,
            has_tri2: true,
            vertex_cache_size: F3DEX2_VERTEX_CACHE_SIZE,
            max_matrix_depth: 10,
            can_pop_multiple_matrices: true,
            export_animation: false,
            export_geometry: true,
            emit_culling_box: false,
            materials: HashMap::new(),
        }
    }
}

/// Builds the model rotation from Euler angles in degrees, applied in x, y,
/// z order.
pub fn rotation_from_euler_degrees(x: f32, y: f32, z: f32) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        x.to_radians(),
        y.to_radians(),
        z.to_radians(),
    )
}
