//! Turns imported scenes into C source: material resources, vertex buffers
//! and the display lists that draw them, plus an optional header.

use std::fmt::Write;

use crate::error::Result;
use crate::material::MaterialCollector;
use crate::rcp::{generate_geometry, Command, DisplayList, RcpState};
use crate::render_chunk::{extract_chunks, RenderChunk};
use crate::scene::{BoneHierarchy, Scene};
use crate::settings::DisplayListSettings;

mod session;
mod skeleton;
mod vertex_buffer;

pub use session::{ExportSession, VertexBufferId};
pub use skeleton::generate_skeleton;

/// Segment the runtime points at its table of bone matrices.
const MATRIX_TRANSFORM_SEGMENT: u32 = 0xC;

/// The generated files, built completely before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutput {
    pub source: String,
    pub header: String,
}

/// Appends everything needed to draw `chunks` in order. Each chunk's
/// material is either called as a shared list or written inline, then its
/// geometry follows. The list ends back at the model root.
pub fn generate_mesh_into_dl_with_materials(
    chunks: &[RenderChunk],
    bones: &BoneHierarchy,
    collector: &MaterialCollector,
    settings: &DisplayListSettings,
    session: &mut ExportSession,
    display_list: &mut DisplayList,
) -> Result<()> {
    let mut rcp_state = RcpState::new(
        settings.vertex_cache_size,
        settings.max_matrix_depth,
        settings.can_pop_multiple_matrices,
    );

    for chunk in chunks {
        if let Some(name) = chunk.material.as_deref() {
            display_list.add_command(Command::Comment(format!("Material {name}")));
            let applied = match (
                collector.material_name_mapping.get(name),
                settings.materials.get(name),
            ) {
                (Some(shared), _) => {
                    display_list.add_command(Command::CallDisplayList(shared.clone()));
                    true
                }
                (None, Some(material)) => {
                    material.write_to_dl(&collector.resource_name_mapping, display_list);
                    true
                }
                (None, None) => false,
            };
            display_list.add_command(Command::Comment(format!("End Material {name}")));
            if applied {
                // Cached vertices were lit or shaded under the previous material.
                rcp_state.vertex_cache_mut().clear();
            }
        }

        let vertex_buffer = session.get_vertex_buffer(&chunk.mesh, chunk.vertex_format);
        generate_geometry(
            chunk,
            bones,
            &mut rcp_state,
            vertex_buffer,
            display_list,
            settings.has_tri2,
        )?;
    }

    rcp_state.traverse_to_bone(None, bones, display_list)
}

struct PreparedScene<'a> {
    scene: &'a Scene,
    bones: BoneHierarchy,
    chunks: Vec<RenderChunk>,
}

/// Exports every scene into one source file. All scenes share the
/// identifier namespace, the vertex buffers and the materials; each scene
/// gets its own top-level `model_gfx` list.
pub fn export_scenes(scenes: &[Scene], settings: &DisplayListSettings) -> Result<ExportOutput> {
    let mut session = ExportSession::new(settings.prefix.clone());
    let mut collector = MaterialCollector::new();

    let mut prepared = Vec::with_capacity(scenes.len());
    for scene in scenes {
        let bones = BoneHierarchy::from_scene(scene);
        let chunks = if settings.export_geometry {
            extract_chunks(scene, &bones, settings)?
        } else {
            Vec::new()
        };
        log::info!(
            "scene \"{}\": {} bones, {} chunks",
            scene.name,
            bones.len(),
            chunks.len()
        );
        collector.collect_material_resources(&chunks, settings);
        prepared.push(PreparedScene {
            scene,
            bones,
            chunks,
        });
    }

    let mut source = String::new();
    writeln!(source, "#include <ultra64.h>")?;
    writeln!(source)?;
    if settings.export_geometry && prepared.iter().any(|p| !p.bones.is_empty()) {
        writeln!(source, "#ifndef MATRIX_TRANSFORM_SEGMENT")?;
        writeln!(
            source,
            "#define MATRIX_TRANSFORM_SEGMENT 0x{MATRIX_TRANSFORM_SEGMENT:X}"
        )?;
        writeln!(source, "#endif")?;
        writeln!(
            source,
            "#define MATRIX_TRANSFORM_SEGMENT_ADDRESS (MATRIX_TRANSFORM_SEGMENT << 24)"
        )?;
        writeln!(source)?;
    }

    if settings.export_geometry {
        collector.generate_materials(&mut session, settings, &mut source)?;

        let mut display_lists = Vec::with_capacity(prepared.len());
        for scene in &prepared {
            let mut display_list = DisplayList::new(session.unique_name("model_gfx"));
            if settings.emit_culling_box {
                add_culling_box(&scene.chunks, &mut session, &mut display_list);
            }
            generate_mesh_into_dl_with_materials(
                &scene.chunks,
                &scene.bones,
                &collector,
                settings,
                &mut session,
                &mut display_list,
            )?;
            log::debug!(
                "{} for scene \"{}\": {} commands",
                display_list.name(),
                scene.scene.name,
                display_list.commands().len()
            );
            display_lists.push(display_list);
        }

        log::info!("writing {} vertex buffers", session.vertex_buffer_count());
        session.generate_vertex_buffers(&mut source, settings.scale, settings.rotate_model)?;
        for display_list in &display_lists {
            display_list.generate(&session, &mut source)?;
            session.declare(format!("extern Gfx {}[];", display_list.name()));
        }
    }

    if settings.export_animation {
        for scene in &prepared {
            generate_skeleton(
                &scene.bones,
                &mut session,
                settings.scale,
                settings.rotate_model,
                &mut source,
            )?;
        }
    }

    let header = generate_header(&session)?;
    Ok(ExportOutput { source, header })
}

/// Loads a box around every chunk and lets the RSP skip the rest of the
/// list when the box is off screen.
///
/// The box is loaded at the model root, so it is built from mesh space
/// bounds. Skinned vertices are stored bone-local, but the bone matrices
/// they are drawn under bring them back to mesh space in the rest pose.
fn add_culling_box(
    chunks: &[RenderChunk],
    session: &mut ExportSession,
    display_list: &mut DisplayList,
) {
    let Some((min, max)) = chunks
        .iter()
        .map(|chunk| (chunk.mesh.bb_min, chunk.mesh.bb_max))
        .reduce(|(min_a, max_a), (min_b, max_b)| (min_a.min(min_b), max_a.max(max_b)))
    else {
        return;
    };
    let buffer = session.get_culling_buffer("cull", min, max);
    display_list.add_command(Command::VertexLoad {
        buffer,
        offset: 0,
        count: 8,
        cache_slot: 0,
    });
    display_list.add_command(Command::Macro("gsSPCullDisplayList(0, 7)".to_string()));
}

fn generate_header(session: &ExportSession) -> Result<String> {
    let guard = session.header_guard();
    let mut header = String::new();
    writeln!(header, "#ifndef {guard}")?;
    writeln!(header, "#define {guard}")?;
    writeln!(header)?;
    writeln!(header, "#include <ultra64.h>")?;
    writeln!(header)?;
    for declaration in session.declarations() {
        writeln!(header, "{declaration}")?;
    }
    writeln!(header)?;
    writeln!(header, "#endif")?;
    Ok(header)
}
