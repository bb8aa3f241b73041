//! Reads material definitions from JSON.
//!
//! ```json
//! {
//!     "resources": {
//!         "brick": { "type": "u64", "include": "textures/brick.rgba16.inc.c" }
//!     },
//!     "materials": {
//!         "stone": {
//!             "resources": ["brick"],
//!             "vertexFormat": "normal",
//!             "gfx": ["gsDPPipeSync()", "gsDPSetTextureImage(G_IM_FMT_RGBA, G_IM_SIZ_16b, 1, {brick})"]
//!         }
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tinyjson::JsonValue;

use crate::material::{Material, MaterialResource};
use crate::render_chunk::VertexFormat;

#[derive(Error, Debug)]
pub enum MaterialError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid material JSON: {0}")]
    Json(String),
    #[error("material file field \"{0}\" is missing or malformed")]
    Field(String),
    #[error("material \"{material}\" uses undefined resource \"{resource}\"")]
    UnknownResource { material: String, resource: String },
    #[error("material \"{material}\" has unknown vertex format \"{format}\"")]
    UnknownVertexFormat { material: String, format: String },
}

type Object = HashMap<String, JsonValue>;

pub fn load_material_file(path: &Path) -> Result<HashMap<String, Material>, MaterialError> {
    let text = std::fs::read_to_string(path).map_err(|source| MaterialError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_material_file(&text)
}

pub fn parse_material_file(text: &str) -> Result<HashMap<String, Material>, MaterialError> {
    let json: JsonValue = text
        .parse()
        .map_err(|err: tinyjson::JsonParseError| MaterialError::Json(err.to_string()))?;
    let root = take_object(&json, "root")?;

    let mut resources = HashMap::new();
    if let Some(resources_json) = root.get("resources") {
        for (name, resource) in take_object(resources_json, "resources")? {
            let resource = take_object(resource, name)?;
            resources.insert(
                name.clone(),
                Rc::new(MaterialResource {
                    name: name.clone(),
                    c_type: match resource.get("type") {
                        Some(c_type) => take_string(c_type, "type")?.to_string(),
                        None => "u64".to_string(),
                    },
                    include: take_string(field(resource, "include")?, "include")?.to_string(),
                }),
            );
        }
    }

    let mut materials = HashMap::new();
    let Some(materials_json) = root.get("materials") else {
        return Ok(materials);
    };
    for (name, material) in take_object(materials_json, "materials")? {
        let material = take_object(material, name)?;

        let mut used_resources = Vec::new();
        for resource in optional_strings(material, "resources")? {
            let resource = resources
                .get(resource)
                .ok_or_else(|| MaterialError::UnknownResource {
                    material: name.clone(),
                    resource: resource.to_string(),
                })?;
            used_resources.push(Rc::clone(resource));
        }

        let vertex_format = match material.get("vertexFormat") {
            Some(format) => match take_string(format, "vertexFormat")? {
                "normal" => Some(VertexFormat::PosUvNormal),
                "color" => Some(VertexFormat::PosUvColor),
                other => {
                    return Err(MaterialError::UnknownVertexFormat {
                        material: name.clone(),
                        format: other.to_string(),
                    })
                }
            },
            None => None,
        };

        materials.insert(
            name.clone(),
            Material {
                name: name.clone(),
                used_resources,
                commands: optional_strings(material, "gfx")?
                    .into_iter()
                    .map(String::from)
                    .collect(),
                vertex_format,
            },
        );
    }
    Ok(materials)
}

fn take_object<'a>(value: &'a JsonValue, what: &str) -> Result<&'a Object, MaterialError> {
    value
        .get::<Object>()
        .ok_or_else(|| MaterialError::Field(what.to_string()))
}

fn take_string<'a>(value: &'a JsonValue, what: &str) -> Result<&'a str, MaterialError> {
    value
        .get::<String>()
        .map(String::as_str)
        .ok_or_else(|| MaterialError::Field(what.to_string()))
}

fn field<'a>(object: &'a Object, key: &str) -> Result<&'a JsonValue, MaterialError> {
    object.get(key).ok_or_else(|| MaterialError::Field(key.to_string()))
}

fn optional_strings<'a>(object: &'a Object, key: &str) -> Result<Vec<&'a str>, MaterialError> {
    let Some(value) = object.get(key) else {
        return Ok(Vec::new());
    };
    value
        .get::<Vec<JsonValue>>()
        .ok_or_else(|| MaterialError::Field(key.to_string()))?
        .iter()
        .map(|item| take_string(item, key))
        .collect()
}
