use std::collections::HashMap;
use std::fmt::Write;
use std::rc::Rc;

use crate::error::Result;
use crate::export::ExportSession;
use crate::rcp::{Command, DisplayList};
use crate::render_chunk::VertexFormat;

mod collector;
mod loader;

pub use collector::MaterialCollector;
pub use loader::{load_material_file, parse_material_file, MaterialError};

/// Data a material needs emitted once per export, e.g. a texture image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialResource {
    pub name: String,
    /// Element type of the emitted array, e.g. `u64`.
    pub c_type: String,
    /// File pulled into the array initializer with `#include`.
    pub include: String,
}

/// A named sequence of state-setting commands. Commands are templates:
/// `{resource}` is replaced by the identifier the resource was emitted
/// under.
#[derive(Debug, Clone, Default)]
pub struct Material {
    pub name: String,
    pub used_resources: Vec<Rc<MaterialResource>>,
    pub commands: Vec<String>,
    pub vertex_format: Option<VertexFormat>,
}

impl Material {
    /// Writes every resource and records the identifier each one received in
    /// `name_mapping`.
    pub fn write_resources(
        resources: &[Rc<MaterialResource>],
        name_mapping: &mut HashMap<String, String>,
        session: &mut ExportSession,
        output: &mut impl Write,
    ) -> Result<()> {
        for resource in resources {
            let identifier = session.unique_name(&resource.name);
            writeln!(output, "{} {}[] = {{", resource.c_type, identifier)?;
            writeln!(output, "#include \"{}\"", resource.include)?;
            writeln!(output, "}};")?;
            writeln!(output)?;
            session.declare(format!("extern {} {}[];", resource.c_type, identifier));
            name_mapping.insert(resource.name.clone(), identifier);
        }
        Ok(())
    }

    pub fn write_to_dl(&self, name_mapping: &HashMap<String, String>, display_list: &mut DisplayList) {
        for command in &self.commands {
            display_list.add_command(Command::Macro(substitute(command, name_mapping)));
        }
    }
}

fn substitute(template: &str, name_mapping: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match name_mapping.get(key) {
                    Some(identifier) => result.push_str(identifier),
                    None => {
                        log::warn!("material command references unknown resource \"{key}\"");
                        result.push_str(&rest[start..start + end + 2]);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_replaced_with_identifiers() {
        let mapping = HashMap::from([("brick".to_string(), "lvl_brick".to_string())]);
        assert_eq!(
            "gsDPSetTextureImage(G_IM_FMT_RGBA, G_IM_SIZ_16b, 1, lvl_brick)",
            substitute(
                "gsDPSetTextureImage(G_IM_FMT_RGBA, G_IM_SIZ_16b, 1, {brick})",
                &mapping
            )
        );
        assert_eq!("a {missing} b", substitute("a {missing} b", &mapping));
        assert_eq!("open {", substitute("open {", &mapping));
    }

    #[test]
    fn resources_are_written_once_with_unique_names() {
        let mut session = ExportSession::new("lvl");
        let mut mapping = HashMap::new();
        let mut output = String::new();
        let resource = Rc::new(MaterialResource {
            name: "brick".into(),
            c_type: "u64".into(),
            include: "brick.rgba16.inc.c".into(),
        });
        Material::write_resources(&[resource], &mut mapping, &mut session, &mut output).unwrap();

        assert_eq!(
            "u64 lvl_brick[] = {\n#include \"brick.rgba16.inc.c\"\n};\n\n",
            output
        );
        assert_eq!(Some(&"lvl_brick".to_string()), mapping.get("brick"));
        assert_eq!(vec!["extern u64 lvl_brick[];".to_string()], session.declarations());
    }
}
