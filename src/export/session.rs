use std::collections::HashSet;
use std::fmt::Write;
use std::rc::Rc;

use glam::{Quat, Vec3};

use crate::error::Result;
use crate::export::vertex_buffer::VertexBufferDefinition;
use crate::extended_mesh::ExtendedMesh;
use crate::render_chunk::VertexFormat;
use crate::scene::Mesh;

/// Identifies a registered vertex buffer. Ids start at 1 and follow the order
/// buffers were first requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexBufferId(u32);

impl VertexBufferId {
    pub fn new(id: u32) -> VertexBufferId {
        VertexBufferId(id)
    }
}

/// State shared by everything written into one output file: the identifiers
/// already handed out, the vertex buffers to emit and the declarations that
/// go into the header.
#[derive(Debug)]
pub struct ExportSession {
    prefix: String,
    used_names: HashSet<String>,
    vertex_buffers: Vec<VertexBufferDefinition>,
    declarations: Vec<String>,
}

impl ExportSession {
    pub fn new(prefix: impl Into<String>) -> ExportSession {
        ExportSession {
            prefix: prefix.into(),
            used_names: HashSet::new(),
            vertex_buffers: Vec::new(),
            declarations: Vec::new(),
        }
    }

    /// Returns the buffer holding `mesh` in `vertex_format`, registering it
    /// the first time the pair is seen.
    pub fn get_vertex_buffer(
        &mut self,
        mesh: &Rc<ExtendedMesh>,
        vertex_format: VertexFormat,
    ) -> VertexBufferId {
        let existing = self.vertex_buffers.iter().position(|definition| {
            Rc::ptr_eq(&definition.target_mesh, mesh) && definition.vertex_format == vertex_format
        });
        if let Some(index) = existing {
            return VertexBufferId(index as u32 + 1);
        }

        let base = if mesh.name().is_empty() {
            "_mesh"
        } else {
            mesh.name()
        };
        let name = self.unique_name(&format!("{base}{}", vertex_format.suffix()));
        log::debug!("registered vertex buffer {name}");
        self.push_buffer(VertexBufferDefinition::new(mesh.clone(), name, vertex_format))
    }

    /// Registers an eight vertex box spanning `min..max`. Corner `i` takes the
    /// max on x when bit 2 is set, on y for bit 1 and on z for bit 0.
    pub fn get_culling_buffer(&mut self, name: &str, min: Vec3, max: Vec3) -> VertexBufferId {
        let positions = (0..8)
            .map(|corner| {
                Vec3::new(
                    if corner & 0b100 != 0 { max.x } else { min.x },
                    if corner & 0b010 != 0 { max.y } else { min.y },
                    if corner & 0b001 != 0 { max.z } else { min.z },
                )
            })
            .collect();
        let mesh = Mesh {
            name: name.to_string(),
            positions,
            ..Default::default()
        };
        // No faces and no skin, so there is nothing to partition.
        let mesh = ExtendedMesh {
            bb_min: min,
            bb_max: max,
            point_inverse_transform: vec![None; 8],
            normal_inverse_transform: vec![None; 8],
            vertex_bones: vec![None; 8],
            faces_for_bone: Default::default(),
            bone_spanning_faces: Default::default(),
            mesh,
        };

        let vertex_format = VertexFormat::PosUvColor;
        let name = self.unique_name(&format!("{name}{}", vertex_format.suffix()));
        self.push_buffer(VertexBufferDefinition::new(Rc::new(mesh), name, vertex_format))
    }

    fn push_buffer(&mut self, definition: VertexBufferDefinition) -> VertexBufferId {
        self.vertex_buffers.push(definition);
        VertexBufferId(self.vertex_buffers.len() as u32)
    }

    /// The emitted identifier of a buffer, or an empty string for an id this
    /// session never handed out.
    pub fn vertex_buffer_name(&self, id: VertexBufferId) -> &str {
        id.0.checked_sub(1)
            .and_then(|index| self.vertex_buffers.get(index as usize))
            .map(|definition| definition.name.as_str())
            .unwrap_or("")
    }

    pub fn vertex_buffer_count(&self) -> usize {
        self.vertex_buffers.len()
    }

    /// Produces `prefix_requested` restricted to C identifier characters,
    /// with `_1`, `_2`, ... appended until it no longer collides with an
    /// earlier name.
    pub fn unique_name(&mut self, requested: &str) -> String {
        let base = sanitize_identifier(&format!("{}_{}", self.prefix, requested));
        let mut name = base.clone();
        let mut index = 1;
        while self.used_names.contains(&name) {
            name = format!("{base}_{index}");
            index += 1;
        }
        self.used_names.insert(name.clone());
        name
    }

    /// Writes every registered buffer in id order and declares each one.
    pub fn generate_vertex_buffers(
        &mut self,
        output: &mut impl Write,
        scale: f32,
        rotate: Quat,
    ) -> Result<()> {
        for definition in &self.vertex_buffers {
            definition.generate(output, scale, rotate)?;
            writeln!(output)?;
        }
        let externs: Vec<String> = self
            .vertex_buffers
            .iter()
            .map(|definition| format!("extern Vtx {}[];", definition.name))
            .collect();
        self.declarations.extend(externs);
        Ok(())
    }

    pub fn declare(&mut self, declaration: String) {
        self.declarations.push(declaration);
    }

    pub fn declarations(&self) -> &[String] {
        &self.declarations
    }

    /// Include guard for the header that carries the declarations.
    pub fn header_guard(&self) -> String {
        format!("__{}_H__", sanitize_identifier(&self.prefix).to_uppercase())
    }
}

fn sanitize_identifier(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}
