use std::fmt::Write;

use crate::error::Result;
use crate::export::{ExportSession, VertexBufferId};
use crate::scene::BoneId;

/// A single display list command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Emitted as a C comment, never touches RCP state.
    Comment(String),
    /// Jumps into another named display list and returns.
    CallDisplayList(String),
    /// Loads `count` vertices starting at `offset` of a vertex buffer into the
    /// vertex cache, starting at `cache_slot`.
    VertexLoad {
        buffer: VertexBufferId,
        offset: u32,
        count: u32,
        cache_slot: u32,
    },
    /// Draws one triangle, or two with a single command, from cache slots.
    Triangles {
        first: [u32; 3],
        second: Option<[u32; 3]>,
    },
    /// Multiplies the bone's matrix onto the modelview stack.
    PushMatrix { bone: BoneId },
    PopMatrix { count: u32 },
    /// A command written verbatim, as supplied by a material definition.
    Macro(String),
}

/// An append-only list of commands, serialized as a `Gfx` array.
#[derive(Debug, Clone)]
pub struct DisplayList {
    name: String,
    commands: Vec<Command>,
}

impl DisplayList {
    /// `name` must already be unique within the export.
    pub fn new(name: String) -> DisplayList {
        DisplayList {
            name,
            commands: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_command(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn generate(&self, session: &ExportSession, output: &mut impl Write) -> Result<()> {
        writeln!(output, "Gfx {}[] = {{", self.name)?;
        for command in &self.commands {
            write!(output, "    ")?;
            match command {
                Command::Comment(text) => writeln!(output, "// {text}")?,
                Command::CallDisplayList(name) => writeln!(output, "gsSPDisplayList({name}),")?,
                Command::VertexLoad {
                    buffer,
                    offset,
                    count,
                    cache_slot,
                } => writeln!(
                    output,
                    "gsSPVertex(&{}[{offset}], {count}, {cache_slot}),",
                    session.vertex_buffer_name(*buffer)
                )?,
                Command::Triangles {
                    first: [a, b, c],
                    second: None,
                } => writeln!(output, "gsSP1Triangle({a}, {b}, {c}, 0),")?,
                Command::Triangles {
                    first: [a, b, c],
                    second: Some([d, e, f]),
                } => writeln!(output, "gsSP2Triangles({a}, {b}, {c}, 0, {d}, {e}, {f}, 0),")?,
                Command::PushMatrix { bone } => writeln!(
                    output,
                    "gsSPMatrix((Mtx*)MATRIX_TRANSFORM_SEGMENT_ADDRESS + {}, G_MTX_MODELVIEW | G_MTX_MUL | G_MTX_PUSH),",
                    bone.index()
                )?,
                Command::PopMatrix { count: 1 } => writeln!(output, "gsSPPopMatrix(G_MTX_MODELVIEW),")?,
                Command::PopMatrix { count } => {
                    writeln!(output, "gsSPPopMatrixN(G_MTX_MODELVIEW, {count}),")?
                }
                Command::Macro(text) => writeln!(output, "{text},")?,
            }
        }
        writeln!(output, "    gsSPEndDisplayList(),")?;
        writeln!(output, "}};")?;
        writeln!(output)?;
        Ok(())
    }
}
