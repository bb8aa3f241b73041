use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write;
use std::rc::Rc;

use crate::error::Result;
use crate::export::ExportSession;
use crate::material::{Material, MaterialResource};
use crate::rcp::DisplayList;
use crate::render_chunk::RenderChunk;
use crate::settings::DisplayListSettings;

/// Counts how often each material is used across every exported scene and
/// gathers the resources they need, so resources are emitted once and
/// materials used more than once can share a display list.
#[derive(Debug, Default)]
pub struct MaterialCollector {
    used_resources: Vec<Rc<MaterialResource>>,
    seen_resources: HashSet<String>,
    material_use_count: BTreeMap<String, usize>,
    scene_count: usize,
    /// Resource name to emitted identifier, filled by `generate_materials`.
    pub resource_name_mapping: HashMap<String, String>,
    /// Material name to the display list it was promoted into.
    pub material_name_mapping: HashMap<String, String>,
}

impl MaterialCollector {
    pub fn new() -> MaterialCollector {
        MaterialCollector::default()
    }

    /// Records one use of `material_name`. Names without a definition in
    /// `settings` are drawn without a material.
    pub fn use_material(&mut self, material_name: &str, settings: &DisplayListSettings) {
        let Some(material) = settings.materials.get(material_name) else {
            log::warn!("no definition for material \"{material_name}\", drawing without one");
            return;
        };

        let count = self
            .material_use_count
            .entry(material_name.to_string())
            .or_insert(0);
        *count += 1;
        if *count > 1 {
            return;
        }

        for resource in &material.used_resources {
            if self.seen_resources.insert(resource.name.clone()) {
                self.used_resources.push(resource.clone());
            }
        }
    }

    /// Counts every material referenced by the chunks of one scene.
    pub fn collect_material_resources(
        &mut self,
        chunks: &[RenderChunk],
        settings: &DisplayListSettings,
    ) {
        for chunk in chunks {
            if let Some(material) = &chunk.material {
                self.use_material(material, settings);
            }
        }
        self.scene_count += 1;
    }

    pub fn use_count(&self, material_name: &str) -> usize {
        self.material_use_count
            .get(material_name)
            .copied()
            .unwrap_or(0)
    }

    /// Writes every collected resource and a display list for each material
    /// that gets called from more than one place. Materials used once in a
    /// single scene are left to be inlined where they are used.
    pub fn generate_materials(
        &mut self,
        session: &mut ExportSession,
        settings: &DisplayListSettings,
        output: &mut impl Write,
    ) -> Result<()> {
        Material::write_resources(
            &self.used_resources,
            &mut self.resource_name_mapping,
            session,
            output,
        )?;

        for (name, &count) in &self.material_use_count {
            if count <= 1 && self.scene_count <= 1 {
                continue;
            }
            let Some(material) = settings.materials.get(name) else {
                continue;
            };

            let mut display_list = DisplayList::new(session.unique_name(name));
            material.write_to_dl(&self.resource_name_mapping, &mut display_list);
            display_list.generate(session, output)?;
            session.declare(format!("extern Gfx {}[];", display_list.name()));
            log::debug!("material \"{name}\" shared as {}", display_list.name());
            self.material_name_mapping
                .insert(name.clone(), display_list.name().to_string());
        }
        Ok(())
    }
}
