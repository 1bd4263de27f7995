//! The three programs the frame pipeline uses: uniform blocks, texture units
//! and where their WGSL comes from.

use std::path::Path;

use crate::gpu::{SlotKind, TextureSlot, UniformDecl, UniformKind};
use crate::shader::{ShaderError, ShaderProgram};

/// Geometry pass texture units.
pub const DIFFUSE_TEXTURE_UNIT: u32 = 0;
pub const NORMAL_MAP_UNIT: u32 = 1;
pub const SHADOW_MAP_UNIT: u32 = 2;

/// Post-process pass texture units.
pub const POST_SCENE_UNIT: u32 = 0;
pub const POST_SHADOW_MAP_UNIT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Geometry,
    ShadowMap,
    PostProcess,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 3] = [
        ProgramKind::Geometry,
        ProgramKind::ShadowMap,
        ProgramKind::PostProcess,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::Geometry => "geometry",
            ProgramKind::ShadowMap => "shadow_map",
            ProgramKind::PostProcess => "post_process",
        }
    }

    fn builtin_sources(self) -> (&'static str, &'static str) {
        match self {
            ProgramKind::Geometry => (
                include_str!("../shaders/geometry.vert.wgsl"),
                include_str!("../shaders/geometry.frag.wgsl"),
            ),
            ProgramKind::ShadowMap => (
                include_str!("../shaders/shadow_map.vert.wgsl"),
                include_str!("../shaders/shadow_map.frag.wgsl"),
            ),
            ProgramKind::PostProcess => (
                include_str!("../shaders/post_process.vert.wgsl"),
                include_str!("../shaders/post_process.frag.wgsl"),
            ),
        }
    }

    /// Members of the uniform block, in WGSL struct order.
    pub fn uniforms(self) -> Vec<UniformDecl> {
        use UniformKind::*;
        let decls: &[(&str, UniformKind)] = match self {
            ProgramKind::Geometry => &[
                ("uniform_projection_matrix", Mat4),
                ("uniform_normal_matrix", Mat4),
                ("uniform_world_matrix", Mat4),
                ("uniform_light_projection_matrix", Mat4),
                ("uniform_light_color", Vec3),
                ("uniform_light_umbra", Float),
                ("uniform_light_dir", Vec3),
                ("uniform_light_penumbra", Float),
                ("uniform_light_pos", Vec3),
                ("uniform_light_exponent", Float),
                ("uniform_camera_pos", Vec3),
                ("uniform_cast_shadows", Int),
                ("uniform_camera_dir", Vec3),
                ("uniform_shininess", Float),
                ("uniform_diffuse", Vec3),
                ("uniform_has_texture", Int),
                ("uniform_ambient", Vec3),
                ("uniform_has_normal_map", Int),
                ("uniform_specular", Vec3),
                ("uniform_normal_is_bump", Int),
            ],
            ProgramKind::ShadowMap => &[("uniform_projection_matrix", Mat4)],
            ProgramKind::PostProcess => &[
                ("uniform_exposure", Float),
                ("uniform_show_shadow_map", Int),
            ],
        };
        decls.iter().map(|(name, kind)| UniformDecl::new(name, *kind)).collect()
    }

    pub fn texture_slots(self) -> Vec<TextureSlot> {
        match self {
            ProgramKind::Geometry => vec![
                TextureSlot::new("uniform_texture", DIFFUSE_TEXTURE_UNIT, SlotKind::Color),
                TextureSlot::new("uniform_normal_map", NORMAL_MAP_UNIT, SlotKind::Color),
                TextureSlot::new("uniform_shadow_map", SHADOW_MAP_UNIT, SlotKind::Depth),
            ],
            ProgramKind::ShadowMap => Vec::new(),
            ProgramKind::PostProcess => vec![
                TextureSlot::new("uniform_texture", POST_SCENE_UNIT, SlotKind::Color),
                TextureSlot::new("uniform_shadow_map", POST_SHADOW_MAP_UNIT, SlotKind::Depth),
            ],
        }
    }

    /// A program with its sources loaded but not yet created. With a shader
    /// directory the stages are read from `<label>.vert.wgsl` and
    /// `<label>.frag.wgsl` there (and reloads re-read them); otherwise the
    /// sources compiled into the crate are used.
    pub fn program(self, shader_dir: Option<&Path>) -> Result<ShaderProgram, ShaderError> {
        let mut program = ShaderProgram::new(self.label(), self.uniforms(), self.texture_slots());
        match shader_dir {
            Some(dir) => {
                program.load_vertex_shader_from_file(dir.join(format!("{}.vert.wgsl", self.label())))?;
                program.load_fragment_shader_from_file(dir.join(format!("{}.frag.wgsl", self.label())))?;
            }
            None => {
                let (vertex, fragment) = self.builtin_sources();
                program.set_vertex_source(vertex);
                program.set_fragment_source(fragment);
            }
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::UniformLayout;

    #[test]
    fn geometry_block_matches_wgsl_layout() {
        let layout = UniformLayout::new(&ProgramKind::Geometry.uniforms());
        assert_eq!(layout.offset_of("uniform_light_color"), Some(256));
        assert_eq!(layout.offset_of("uniform_light_umbra"), Some(268));
        assert_eq!(layout.offset_of("uniform_normal_is_bump"), Some(380));
        assert_eq!(layout.size(), 384);
    }

    #[test]
    fn builtin_sources_declare_every_uniform() {
        for kind in ProgramKind::ALL {
            let (vertex, fragment) = kind.builtin_sources();
            for decl in kind.uniforms() {
                assert!(
                    vertex.contains(&decl.name) || fragment.contains(&decl.name),
                    "{} missing {}",
                    kind.label(),
                    decl.name
                );
            }
            for slot in kind.texture_slots() {
                assert!(fragment.contains(&format!("@binding({}) var {}:", slot.unit * 2, slot.name)));
            }
        }
    }

    #[test]
    fn shader_dir_reads_files() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
        let program = ProgramKind::PostProcess.program(Some(&dir)).unwrap();
        assert_eq!(program.label(), "post_process");
        assert!(ProgramKind::PostProcess.program(Some(Path::new("/nonexistent"))).is_err());
    }
}
