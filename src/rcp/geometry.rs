use std::collections::{BTreeSet, HashMap};

use crate::error::Result;
use crate::export::VertexBufferId;
use crate::extended_mesh::{BonePair, ExtendedMesh};
use crate::rcp::{Command, DisplayList, RcpState};
use crate::render_chunk::RenderChunk;
use crate::scene::{BoneHierarchy, BoneId};

/// Emits the vertex loads, matrix changes and triangles that draw a chunk.
///
/// Faces are visited bone by bone in depth-first order: unskinned faces
/// first, then for each bone the faces spanning from its parent followed by
/// the faces it owns outright. Matrices only change right before a vertex
/// load, since vertices are transformed when they enter the cache.
pub fn generate_geometry(
    chunk: &RenderChunk,
    bones: &BoneHierarchy,
    rcp_state: &mut RcpState,
    vertex_buffer: VertexBufferId,
    display_list: &mut DisplayList,
    has_tri2: bool,
) -> Result<()> {
    let mesh = chunk.mesh.as_ref();
    let mut drawer = FaceDrawer {
        mesh,
        bones,
        rcp_state,
        vertex_buffer,
        display_list,
        has_tri2,
    };

    if let Some(faces) = mesh.faces_for_bone.get(&None) {
        drawer.draw_faces(faces, &[None])?;
    }
    for bone in bones.depth_first() {
        let parent = bones.parent(bone);
        let pair = BonePair {
            parent,
            child: bone,
        };
        if let Some(faces) = mesh.bone_spanning_faces.get(&pair) {
            drawer.draw_faces(faces, &[parent, Some(bone)])?;
        }
        if let Some(faces) = mesh.faces_for_bone.get(&Some(bone)) {
            drawer.draw_faces(faces, &[Some(bone)])?;
        }
    }
    Ok(())
}

struct FaceDrawer<'a> {
    mesh: &'a ExtendedMesh,
    bones: &'a BoneHierarchy,
    rcp_state: &'a mut RcpState,
    vertex_buffer: VertexBufferId,
    display_list: &'a mut DisplayList,
    has_tri2: bool,
}

impl FaceDrawer<'_> {
    /// Splits `faces` into batches whose vertices fit in the cache at once
    /// and draws each batch. `phases` lists the bones the vertices belong
    /// to, in the order they get loaded.
    fn draw_faces(&mut self, faces: &[usize], phases: &[Option<BoneId>]) -> Result<()> {
        let capacity = self.rcp_state.vertex_cache().capacity();
        let mut batch = Vec::new();
        let mut batch_vertices = BTreeSet::new();
        for &face in faces {
            let vertices = self.mesh.mesh.faces[face];
            let added = vertices
                .iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .filter(|v| !batch_vertices.contains(*v))
                .count();
            if !batch.is_empty() && batch_vertices.len() + added > capacity {
                self.draw_batch(&batch, &batch_vertices, phases)?;
                batch.clear();
                batch_vertices.clear();
            }
            batch.push(face);
            batch_vertices.extend(vertices);
        }
        if !batch.is_empty() {
            self.draw_batch(&batch, &batch_vertices, phases)?;
        }
        Ok(())
    }

    fn draw_batch(
        &mut self,
        faces: &[usize],
        vertices: &BTreeSet<u32>,
        phases: &[Option<BoneId>],
    ) -> Result<()> {
        let buffer = self.vertex_buffer;
        let cache = self.rcp_state.vertex_cache_mut();
        let missing = vertices
            .iter()
            .copied()
            .filter(|&v| cache.slot_of(buffer, v).is_none())
            .collect::<Vec<_>>();
        let to_load = if missing.len() <= cache.remaining() {
            missing
        } else {
            cache.clear();
            vertices.iter().copied().collect()
        };

        for &phase in phases {
            let phase_vertices = to_load
                .iter()
                .copied()
                .filter(|&v| self.mesh.vertex_bones[v as usize] == phase)
                .collect::<Vec<_>>();
            if phase_vertices.is_empty() {
                continue;
            }
            self.rcp_state
                .traverse_to_bone(phase, self.bones, self.display_list)?;
            for (first, count) in contiguous_runs(&phase_vertices) {
                let cache_slot = self
                    .rcp_state
                    .vertex_cache_mut()
                    .allocate(buffer, first, count);
                self.display_list.add_command(Command::VertexLoad {
                    buffer,
                    offset: first,
                    count,
                    cache_slot,
                });
            }
        }

        let cache = self.rcp_state.vertex_cache();
        let slots = vertices
            .iter()
            .filter_map(|&v| cache.slot_of(buffer, v).map(|slot| (v, slot)))
            .collect::<HashMap<_, _>>();
        let triangle = |face: usize| self.mesh.mesh.faces[face].map(|v| slots[&v]);

        if self.has_tri2 {
            for pair in faces.chunks(2) {
                self.display_list.add_command(Command::Triangles {
                    first: triangle(pair[0]),
                    second: pair.get(1).map(|&face| triangle(face)),
                });
            }
        } else {
            for &face in faces {
                self.display_list.add_command(Command::Triangles {
                    first: triangle(face),
                    second: None,
                });
            }
        }
        Ok(())
    }
}

/// Groups sorted vertex indices into `(first, count)` runs of consecutive
/// indices.
fn contiguous_runs(vertices: &[u32]) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &vertex in vertices {
        match runs.last_mut() {
            Some((first, count)) if *first + *count == vertex => *count += 1,
            _ => runs.push((vertex, 1)),
        }
    }
    runs
}
