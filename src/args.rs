//! Command line arguments.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use glam::Quat;

use crate::material::Material;
use crate::settings::{
    rotation_from_euler_degrees, DisplayListSettings, F3DEX2_VERTEX_CACHE_SIZE,
    F3D_VERTEX_CACHE_SIZE,
};

#[derive(Parser, Debug)]
#[command(
    name = "dlgen64",
    about = "Converts glTF models into N64 display lists",
    long_about = "Converts glTF models into C source for the N64 RCP: vertex buffers,\n\
        material resources and static Gfx display lists.\n\
        \n\
        EXAMPLES:\n\
          # Export a level with its materials\n\
          dlgen64 --materials level.json --prefix level -o level.c level.glb\n\
        \n\
          # Export a rigged character and its rest pose for the old microcode\n\
          dlgen64 --f3d --animation --header -o hero.c hero.gltf",
    version
)]
pub struct Args {
    /// glTF (.gltf or .glb) files to export. Each becomes its own top-level
    /// display list.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// File to write the C source to.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Material definition file. May be given more than once.
    #[arg(long = "materials")]
    pub materials: Vec<PathBuf>,

    /// Factor applied to positions before they are stored as 16-bit integers.
    #[arg(long, default_value = "256")]
    pub scale: f32,

    /// Rotation applied to the model, as x,y,z Euler angles in degrees.
    #[arg(long, value_parser = parse_rotation, allow_hyphen_values = true)]
    pub rotate: Option<[f32; 3]>,

    /// Prepended to every generated identifier.
    #[arg(long, default_value = "output")]
    pub prefix: String,

    /// Target the F3D microcode: 16 vertex cache slots and no gsSP2Triangles.
    #[arg(long)]
    pub f3d: bool,

    /// Override the number of vertex cache slots.
    #[arg(long, value_parser = clap::value_parser!(u32).range(3..))]
    pub cache_size: Option<u32>,

    /// Deepest bone chain the matrix stack can hold.
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub matrix_depth: u32,

    /// Pop matrices one at a time instead of using gsSPPopMatrixN.
    #[arg(long)]
    pub no_multi_pop: bool,

    /// Also write the bone parent table and rest pose.
    #[arg(long)]
    pub animation: bool,

    /// Skip meshes and materials, only useful together with --animation.
    #[arg(long)]
    pub no_geometry: bool,

    /// Start each model with a culling volume around all of its meshes.
    #[arg(long)]
    pub bounding_box: bool,

    /// Also write a header with extern declarations next to the output.
    #[arg(long)]
    pub header: bool,
}

impl Args {
    pub fn settings(&self, materials: HashMap<String, Material>) -> DisplayListSettings {
        let default_cache_size = if self.f3d {
            F3D_VERTEX_CACHE_SIZE
        } else {
            F3DEX2_VERTEX_CACHE_SIZE
        };
        if self.no_geometry && !self.animation {
            log::warn!("--no-geometry without --animation produces an empty file");
        }
        DisplayListSettings {
            prefix: self.prefix.clone(),
            scale: self.scale,
            rotate_model: self
                .rotate
                .map_or(Quat::IDENTITY, |[x, y, z]| rotation_from_euler_degrees(x, y, z)),
            has_tri2: !self.f3d,
            vertex_cache_size: self
                .cache_size
                .map_or(default_cache_size, |size| size as usize),
            max_matrix_depth: self.matrix_depth as usize,
            can_pop_multiple_matrices: !self.no_multi_pop,
            export_animation: self.animation,
            export_geometry: !self.no_geometry,
            emit_culling_box: self.bounding_box,
            materials,
        }
    }

    /// The header goes next to the source file, with an `.h` extension.
    pub fn header_path(&self) -> Option<PathBuf> {
        self.header.then(|| self.output.with_extension("h"))
    }
}

fn parse_rotation(value: &str) -> Result<[f32; 3], String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("rotation must be three comma separated numbers: {err}"))?;
    match parts[..] {
        [x, y, z] => Ok([x, y, z]),
        _ => Err(format!(
            "rotation must have exactly three components, got {}",
            parts.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("dlgen64").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_f3dex2() {
        let args = parse(&["-o", "out.c", "model.glb"]).unwrap();
        let settings = args.settings(HashMap::new());
        assert_eq!("output", settings.prefix);
        assert_eq!(256.0, settings.scale);
        assert_eq!(32, settings.vertex_cache_size);
        assert_eq!(10, settings.max_matrix_depth);
        assert!(settings.has_tri2);
        assert!(settings.can_pop_multiple_matrices);
        assert!(settings.export_geometry);
        assert!(!settings.export_animation);
        assert_eq!(None, args.header_path());
    }

    #[test]
    fn f3d_shrinks_cache_and_disables_tri2() {
        let args = parse(&["--f3d", "-o", "out.c", "model.glb"]).unwrap();
        let settings = args.settings(HashMap::new());
        assert_eq!(16, settings.vertex_cache_size);
        assert!(!settings.has_tri2);

        let args = parse(&["--f3d", "--cache-size", "8", "-o", "out.c", "a.glb"]).unwrap();
        assert_eq!(8, args.settings(HashMap::new()).vertex_cache_size);
    }

    #[test]
    fn invalid_limits_are_rejected() {
        assert!(parse(&["--cache-size", "0", "-o", "out.c", "a.glb"]).is_err());
        assert!(parse(&["--cache-size", "-4", "-o", "out.c", "a.glb"]).is_err());
        assert!(parse(&["--matrix-depth", "0", "-o", "out.c", "a.glb"]).is_err());
        assert!(parse(&["-o", "out.c"]).is_err());
    }

    #[test]
    fn rotation_and_flags_reach_settings() {
        let args = parse(&[
            "--rotate=-90,0,0",
            "--no-multi-pop",
            "--animation",
            "--no-geometry",
            "--bounding-box",
            "--header",
            "--materials",
            "a.json",
            "--materials",
            "b.json",
            "-o",
            "build/hero.c",
            "hero.glb",
        ])
        .unwrap();
        let settings = args.settings(HashMap::new());
        assert!(settings
            .rotate_model
            .abs_diff_eq(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2), 1e-6));
        assert!(!settings.can_pop_multiple_matrices);
        assert!(settings.export_animation);
        assert!(!settings.export_geometry);
        assert!(settings.emit_culling_box);
        assert_eq!(2, args.materials.len());
        assert_eq!(Some(PathBuf::from("build/hero.h")), args.header_path());
    }

    #[test]
    fn rotation_needs_three_numbers() {
        assert_eq!(Ok([1.0, 2.5, -3.0]), parse_rotation("1, 2.5, -3"));
        assert!(parse_rotation("1,2").is_err());
        assert!(parse_rotation("x,y,z").is_err());
    }
}
