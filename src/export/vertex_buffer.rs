use std::fmt::Write;
use std::rc::Rc;

use glam::Quat;

use crate::error::{ExportError, Result};
use crate::extended_mesh::ExtendedMesh;
use crate::render_chunk::VertexFormat;

/// Texture coordinates are signed 16-bit with 10 fractional bits.
const UV_SCALE: f32 = (1 << 10) as f32;

/// A mesh registered for emission as a `Vtx` array.
#[derive(Debug, Clone)]
pub struct VertexBufferDefinition {
    pub target_mesh: Rc<ExtendedMesh>,
    pub name: String,
    pub vertex_format: VertexFormat,
}

impl VertexBufferDefinition {
    pub fn new(
        target_mesh: Rc<ExtendedMesh>,
        name: String,
        vertex_format: VertexFormat,
    ) -> VertexBufferDefinition {
        VertexBufferDefinition {
            target_mesh,
            name,
            vertex_format,
        }
    }

    /// Writes the buffer. Unskinned vertices are rotated into the target
    /// orientation; skinned vertices are moved into their bone's space
    /// instead. Both are scaled afterwards.
    pub fn generate(&self, output: &mut impl Write, scale: f32, rotate: Quat) -> Result<()> {
        let extended = self.target_mesh.as_ref();
        let mesh = &extended.mesh;

        let mut text = String::new();
        writeln!(text, "Vtx {}[] = {{", self.name)?;
        for (i, &position) in mesh.positions.iter().enumerate() {
            let pos = match extended.point_inverse_transform[i] {
                Some(inverse) => inverse.transform_point3(position),
                None => rotate * position,
            } * scale;

            write!(
                text,
                "    {{{{{{{}, {}, {}}}, 0, {{",
                convert_to_short(pos.x)?,
                convert_to_short(pos.y)?,
                convert_to_short(pos.z)?
            )?;

            match &mesh.uvs {
                Some(uvs) => {
                    let uv = uvs[i];
                    write!(
                        text,
                        "{}, {}}}, {{",
                        convert_to_short(uv.x * UV_SCALE)?,
                        convert_to_short((1.0 - uv.y) * UV_SCALE)?
                    )?;
                }
                None => write!(text, "0, 0}}, {{")?,
            }

            match (self.vertex_format, &mesh.normals, &mesh.colors) {
                (VertexFormat::PosUvNormal, Some(normals), _) => {
                    let normal = match extended.normal_inverse_transform[i] {
                        Some(inverse) => (inverse * normals[i]).normalize_or_zero(),
                        None => rotate * normals[i],
                    };
                    write!(
                        text,
                        "{}, {}, {}, 255}}}}}},",
                        convert_normalized_range(normal.x),
                        convert_normalized_range(normal.y),
                        convert_normalized_range(normal.z)
                    )?;
                }
                (VertexFormat::PosUvColor, _, Some(colors)) => {
                    let color = colors[i];
                    write!(
                        text,
                        "{}, {}, {}, {}}}}}}},",
                        convert_byte_range(color.x),
                        convert_byte_range(color.y),
                        convert_byte_range(color.z),
                        convert_byte_range(color.w)
                    )?;
                }
                _ => write!(text, "0, 0, 0, 255}}}}}},")?,
            }
            writeln!(text)?;
        }
        writeln!(text, "}};")?;

        output.write_str(&text)?;
        Ok(())
    }
}

/// Truncates toward zero; anything outside the signed 16-bit range means the
/// model is too large for the target's fixed-point vertices.
pub fn convert_to_short(value: f32) -> Result<i16> {
    let truncated = value.trunc();
    if truncated < i16::MIN as f32 || truncated > i16::MAX as f32 || truncated.is_nan() {
        return Err(ExportError::ModelTooLarge { value });
    }
    Ok(truncated as i16)
}

/// Maps [-1, 1] onto a signed byte, clamping out of range values.
pub fn convert_normalized_range(value: f32) -> i8 {
    ((value * 128.0) as i32).clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

/// Maps [0, 1] onto an unsigned byte, clamping out of range values.
pub fn convert_byte_range(value: f32) -> u8 {
    ((value * 256.0) as i32).clamp(u8::MIN as i32, u8::MAX as i32) as u8
}
