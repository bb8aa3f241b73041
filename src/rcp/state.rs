use crate::error::{ExportError, Result};
use crate::export::VertexBufferId;
use crate::rcp::{Command, DisplayList};
use crate::scene::{BoneHierarchy, BoneId};

/// Tracks which buffer vertices occupy the RSP vertex cache.
///
/// Slots are handed out bump-allocator style: each load goes right after the
/// previous one, and once the cache is full it is cleared and filling starts
/// over at slot 0.
#[derive(Debug, Clone)]
pub struct VertexCache {
    slots: Vec<Option<(VertexBufferId, u32)>>,
    offset: usize,
}

impl VertexCache {
    pub fn new(size: usize) -> VertexCache {
        VertexCache {
            slots: vec![None; size],
            offset: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn remaining(&self) -> usize {
        self.slots.len() - self.offset
    }

    pub fn slot_of(&self, buffer: VertexBufferId, vertex: u32) -> Option<u32> {
        self.slots
            .iter()
            .position(|slot| *slot == Some((buffer, vertex)))
            .map(|slot| slot as u32)
    }

    /// Places consecutive buffer vertices `first..first + count` and returns
    /// the first slot used. The caller checks [`VertexCache::remaining`]
    /// first.
    pub fn allocate(&mut self, buffer: VertexBufferId, first: u32, count: u32) -> u32 {
        let start = self.offset;
        for (i, slot) in self.slots[start..start + count as usize].iter_mut().enumerate() {
            *slot = Some((buffer, first + i as u32));
        }
        self.offset += count as usize;
        start as u32
    }

    pub fn clear(&mut self) {
        self.offset = 0;
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

/// The parts of RCP state that decide which commands need to be emitted:
/// vertex cache contents and the bones currently multiplied onto the
/// modelview matrix stack.
#[derive(Debug, Clone)]
pub struct RcpState {
    vertex_cache: VertexCache,
    max_matrix_depth: usize,
    can_pop_multiple_matrices: bool,
    bone_path: Vec<BoneId>,
}

impl RcpState {
    pub fn new(
        vertex_cache_size: usize,
        max_matrix_depth: usize,
        can_pop_multiple_matrices: bool,
    ) -> RcpState {
        RcpState {
            vertex_cache: VertexCache::new(vertex_cache_size),
            max_matrix_depth,
            can_pop_multiple_matrices,
            bone_path: Vec::new(),
        }
    }

    pub fn vertex_cache(&self) -> &VertexCache {
        &self.vertex_cache
    }

    pub fn vertex_cache_mut(&mut self) -> &mut VertexCache {
        &mut self.vertex_cache
    }

    /// Bones currently on the matrix stack, outermost first.
    pub fn bone_path(&self) -> &[BoneId] {
        &self.bone_path
    }

    /// Pops matrices until the loaded bones are a prefix of the path to
    /// `target`, then pushes the rest of that path. `None` returns to the
    /// model root.
    pub fn traverse_to_bone(
        &mut self,
        target: Option<BoneId>,
        bones: &BoneHierarchy,
        display_list: &mut DisplayList,
    ) -> Result<()> {
        let target_path = bones.path_to(target);
        if target_path.len() > self.max_matrix_depth {
            let bone = target.map(|bone| bones.bone(bone).name.clone()).unwrap_or_default();
            return Err(ExportError::MatrixStackDepthExceeded {
                bone,
                depth: target_path.len(),
                max: self.max_matrix_depth,
            });
        }

        let shared = self
            .bone_path
            .iter()
            .zip(&target_path)
            .take_while(|(current, wanted)| current == wanted)
            .count();

        let pops = (self.bone_path.len() - shared) as u32;
        if pops > 0 {
            if self.can_pop_multiple_matrices {
                display_list.add_command(Command::PopMatrix { count: pops });
            } else {
                for _ in 0..pops {
                    display_list.add_command(Command::PopMatrix { count: 1 });
                }
            }
            self.bone_path.truncate(shared);
        }

        for &bone in &target_path[shared..] {
            display_list.add_command(Command::PushMatrix { bone });
            self.bone_path.push(bone);
        }
        Ok(())
    }
}
