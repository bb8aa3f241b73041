use std::fmt::Write;

use glam::Quat;

use crate::error::Result;
use crate::export::ExportSession;
use crate::scene::BoneHierarchy;

/// Parent index written for bones attached to the model root.
const NO_PARENT: u16 = 0xFFFF;

/// Writes the rig's bone count, parent table and rest pose. Bone `i` in the
/// tables is the matrix `i` that display lists push, so the runtime can fill
/// the matrix segment straight from these.
pub fn generate_skeleton(
    bones: &BoneHierarchy,
    session: &mut ExportSession,
    scale: f32,
    rotate: Quat,
    output: &mut impl Write,
) -> Result<()> {
    if bones.is_empty() {
        log::info!("scene has no bones, skipping skeleton tables");
        return Ok(());
    }

    let count_define = session.unique_name("bone_count").to_uppercase();
    writeln!(output, "#define {count_define} {}", bones.len())?;
    writeln!(output)?;
    session.declare(format!("#define {count_define} {}", bones.len()));

    let parents = session.unique_name("bone_parent");
    writeln!(output, "unsigned short {parents}[] = {{")?;
    for bone in bones.bones() {
        let parent = bone.parent.map_or(NO_PARENT, |parent| parent.index() as u16);
        writeln!(output, "    0x{parent:04X},")?;
    }
    writeln!(output, "}};")?;
    writeln!(output)?;
    session.declare(format!("extern unsigned short {parents}[];"));

    let pose = session.unique_name("default_bones");
    writeln!(output, "struct Transform {pose}[] = {{")?;
    for bone in bones.bones() {
        let (translation, rotation) = match bone.parent {
            Some(_) => (bone.translation, bone.rotation),
            None => (rotate * bone.translation, rotate * bone.rotation),
        };
        let translation = translation * scale;
        writeln!(
            output,
            "    {{{{{}, {}, {}}}, {{{}, {}, {}, {}}}, {{{}, {}, {}}}}},",
            translation.x,
            translation.y,
            translation.z,
            rotation.x,
            rotation.y,
            rotation.z,
            rotation.w,
            bone.scale.x,
            bone.scale.y,
            bone.scale.z
        )?;
    }
    writeln!(output, "}};")?;
    writeln!(output)?;
    session.declare(format!("extern struct Transform {pose}[];"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn tables_list_bones_in_matrix_order() {
        let mut bones = BoneHierarchy::new();
        let hip = bones.add_bone("hip", None, None);
        bones.add_bone("leg", Some(hip), None);

        let mut session = ExportSession::new("hero");
        let mut output = String::new();
        generate_skeleton(&bones, &mut session, 2.0, Quat::IDENTITY, &mut output).unwrap();

        assert!(output.starts_with("#define HERO_BONE_COUNT 2\n"));
        assert!(output
            .contains("unsigned short hero_bone_parent[] = {\n    0xFFFF,\n    0x0000,\n};"));
        assert!(output.contains(
            "struct Transform hero_default_bones[] = {\n    {{0, 0, 0}, {0, 0, 0, 1}, {1, 1, 1}},"
        ));
        assert_eq!(
            vec![
                "#define HERO_BONE_COUNT 2".to_string(),
                "extern unsigned short hero_bone_parent[];".to_string(),
                "extern struct Transform hero_default_bones[];".to_string(),
            ],
            session.declarations()
        );
    }

    #[test]
    fn only_root_bones_take_the_model_rotation() {
        let mut bones = BoneHierarchy::new();
        let hip = bones.add_bone("hip", None, None);
        bones.add_bone("leg", Some(hip), None);

        let mut session = ExportSession::new("m");
        let mut output = String::new();
        let half_turn = Quat::from_rotation_y(std::f32::consts::PI);
        generate_skeleton(&bones, &mut session, 1.0, half_turn, &mut output).unwrap();

        let rows: Vec<&str> = output
            .lines()
            .skip_while(|line| !line.starts_with("struct Transform"))
            .skip(1)
            .take(2)
            .collect();
        assert!(!rows[0].contains("{0, 0, 0, 1}"), "{}", rows[0]);
        assert_eq!("    {{0, 0, 0}, {0, 0, 0, 1}, {1, 1, 1}},", rows[1]);
        assert_eq!(Vec3::ONE, bones.bone(hip).scale);
    }

    #[test]
    fn empty_rig_writes_nothing() {
        let mut session = ExportSession::new("m");
        let mut output = String::new();
        generate_skeleton(&BoneHierarchy::new(), &mut session, 1.0, Quat::IDENTITY, &mut output)
            .unwrap();
        assert!(output.is_empty());
        assert!(session.declarations().is_empty());
    }
}
