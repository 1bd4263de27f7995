//! Game configuration (window, input, scene). Loaded from config.ron at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use engine_core::{Mat4, MeshSource, ProceduralMesh, Vec3};
use renderer::{
    default_assets, AssetEntry, CameraMode, CameraSettings, ChaseCamera, CraftSettings,
    LightSettings, NodeAnimation, NodeRole, RendererSettings, ShadowFrustum, VisibilityTest,
};

/// Persistent game settings. Loaded from `config.ron` in the current directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Window width in logical pixels.
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    /// Window height in logical pixels.
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_true")]
    pub vsync: bool,
    #[serde(default)]
    pub fullscreen: bool,
    /// Mouse sensitivity multiplier (1.0 = default).
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    /// Directory of `.wgsl` files to use instead of the built-in shaders.
    #[serde(default)]
    pub shader_dir: Option<PathBuf>,
    #[serde(default)]
    pub scene: SceneConfig,
}

fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    720
}
fn default_true() -> bool {
    true
}
fn default_sensitivity() -> f32 {
    1.0
}
fn default_scale() -> f32 {
    1.0
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            vsync: default_true(),
            fullscreen: false,
            sensitivity: default_sensitivity(),
            shader_dir: None,
            scene: SceneConfig::default(),
        }
    }
}

/// What is in the scene and how it behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub world_scale: f32,
    /// Empty means the built-in procedural scene.
    pub assets: Vec<AssetConfig>,
    pub camera: CameraConfig,
    pub craft: CraftConfig,
    pub light: LightConfig,
    /// Skip collidable nodes the view ray passes through.
    pub occlusion_culling: bool,
    pub sky_color: [f32; 4],
    pub exposure: f32,
    pub show_shadow_map: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        let defaults = RendererSettings::default();
        Self {
            world_scale: defaults.world_scale,
            assets: Vec::new(),
            camera: CameraConfig::default(),
            craft: CraftConfig::default(),
            light: LightConfig::default(),
            occlusion_culling: defaults.visibility == VisibilityTest::Occluded,
            sky_color: defaults.sky_color,
            exposure: defaults.exposure,
            show_shadow_map: defaults.show_shadow_map,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleConfig {
    Terrain,
    Craft,
    Hull,
}

impl From<RoleConfig> for NodeRole {
    fn from(role: RoleConfig) -> Self {
        match role {
            RoleConfig::Terrain => NodeRole::Terrain,
            RoleConfig::Craft => NodeRole::Craft,
            RoleConfig::Hull => NodeRole::Hull,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceConfig {
    /// A `.gltf` or `.glb` file.
    File(PathBuf),
    Terrain {
        size: f32,
        resolution: u32,
        height_scale: f32,
        seed: u64,
    },
    Craft {
        length: f32,
    },
    Hull {
        half_extents: [f32; 3],
    },
}

impl From<&SourceConfig> for MeshSource {
    fn from(source: &SourceConfig) -> Self {
        match source {
            SourceConfig::File(path) => MeshSource::File(path.clone()),
            SourceConfig::Terrain {
                size,
                resolution,
                height_scale,
                seed,
            } => MeshSource::Procedural(ProceduralMesh::Terrain {
                size: *size,
                resolution: *resolution,
                height_scale: *height_scale,
                seed: *seed,
            }),
            SourceConfig::Craft { length } => {
                MeshSource::Procedural(ProceduralMesh::Craft { length: *length })
            }
            SourceConfig::Hull { half_extents } => MeshSource::Procedural(ProceduralMesh::Hull {
                half_extents: Vec3::from_array(*half_extents),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpinConfig {
    pub axis: [f32; 3],
    pub degrees_per_second: f32,
}

/// One mesh in the scene. Placement is in model units, before the world scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub role: RoleConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub collidable: bool,
    /// Collidable assets are culled by `occlusion_culling` unless this is false.
    #[serde(default = "default_true")]
    pub occlusion_tested: bool,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub translation: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub spin: Option<SpinConfig>,
}

impl AssetConfig {
    pub fn to_entry(&self) -> AssetEntry {
        let mut entry = AssetEntry::new(self.role.into(), (&self.source).into()).with_transform(
            Mat4::from_translation(Vec3::from_array(self.translation))
                * Mat4::from_scale(Vec3::splat(self.scale)),
        );
        entry.collidable = self.collidable;
        entry.occlusion_tested = self.collidable && self.occlusion_tested;
        entry.required = self.required;
        if let Some(spin) = self.spin {
            entry = entry.with_animation(NodeAnimation::Spin {
                axis: Vec3::from_array(spin.axis),
                rate: spin.degrees_per_second.to_radians(),
            });
        }
        entry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraModeConfig {
    Free,
    Chase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub mode: CameraModeConfig,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
    pub look_rate: f32,
    pub chase_distance: f32,
    pub chase_height: f32,
    pub chase_look_ahead: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let defaults = CameraSettings::default();
        Self {
            mode: match defaults.mode {
                CameraMode::Free => CameraModeConfig::Free,
                CameraMode::Chase => CameraModeConfig::Chase,
            },
            fov_degrees: defaults.fov_degrees,
            near: defaults.near,
            far: defaults.far,
            speed: defaults.speed,
            look_rate: defaults.look_rate,
            chase_distance: defaults.chase.distance,
            chase_height: defaults.chase.height,
            chase_look_ahead: defaults.chase.look_ahead,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CraftConfig {
    pub start_position: [f32; 3],
    pub speed: f32,
    /// Degrees per second per look unit.
    pub turn_rate: f32,
    pub boost_factor: f32,
    pub mesh_offset: [f32; 3],
    pub collisions: bool,
}

impl Default for CraftConfig {
    fn default() -> Self {
        let defaults = CraftSettings::default();
        Self {
            start_position: defaults.start_position.to_array(),
            speed: defaults.speed,
            turn_rate: defaults.turn_rate,
            boost_factor: defaults.boost_factor,
            mesh_offset: defaults.mesh_offset.to_array(),
            collisions: defaults.collisions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub color: [f32; 3],
    pub umbra: f32,
    pub penumbra: f32,
    pub exponent: f32,
    pub cast_shadows: bool,
    pub shadow_resolution: u32,
    pub shadow_fov: f32,
    pub shadow_near: f32,
    pub shadow_far: f32,
    pub follows_camera: bool,
}

impl Default for LightConfig {
    fn default() -> Self {
        let defaults = LightSettings::default();
        Self {
            position: defaults.position.to_array(),
            target: defaults.target.to_array(),
            color: defaults.color.to_array(),
            umbra: defaults.umbra,
            penumbra: defaults.penumbra,
            exponent: defaults.exponent,
            cast_shadows: defaults.cast_shadows,
            shadow_resolution: defaults.shadow_resolution,
            shadow_fov: defaults.shadow_frustum.fov_degrees,
            shadow_near: defaults.shadow_frustum.near,
            shadow_far: defaults.shadow_frustum.far,
            follows_camera: defaults.follows_camera,
        }
    }
}

impl GameConfig {
    /// Load config from `config.ron`. If the file is missing or invalid, returns default config.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if let Ok(data) = std::fs::read_to_string(path) {
            match ron::from_str(&data) {
                Ok(c) => return c,
                Err(e) => log::warn!("Invalid config at {:?}: {}, using defaults", path, e),
            }
        }
        Self::default()
    }

    /// Save current config to `config.ron`. Logs on error.
    pub fn save(&self) {
        let path = config_path();
        if let Ok(s) = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()) {
            if let Err(e) = std::fs::write(&path, s) {
                log::warn!("Could not write config to {:?}: {}", path, e);
            }
        }
    }

    /// Everything the renderer reads at init.
    pub fn renderer_settings(&self) -> RendererSettings {
        let scene = &self.scene;
        let camera = &scene.camera;
        let craft = &scene.craft;
        let light = &scene.light;
        RendererSettings {
            shader_dir: self.shader_dir.clone(),
            assets: if scene.assets.is_empty() {
                default_assets()
            } else {
                scene.assets.iter().map(AssetConfig::to_entry).collect()
            },
            world_scale: scene.world_scale,
            camera: CameraSettings {
                mode: match camera.mode {
                    CameraModeConfig::Free => CameraMode::Free,
                    CameraModeConfig::Chase => CameraMode::Chase,
                },
                fov_degrees: camera.fov_degrees,
                near: camera.near,
                far: camera.far,
                speed: camera.speed,
                look_rate: camera.look_rate * self.sensitivity,
                chase: ChaseCamera {
                    distance: camera.chase_distance,
                    height: camera.chase_height,
                    look_ahead: camera.chase_look_ahead,
                },
            },
            craft: CraftSettings {
                start_position: Vec3::from_array(craft.start_position),
                speed: craft.speed,
                turn_rate: craft.turn_rate,
                boost_factor: craft.boost_factor,
                mesh_offset: Vec3::from_array(craft.mesh_offset),
                collisions: craft.collisions,
            },
            light: LightSettings {
                position: Vec3::from_array(light.position),
                target: Vec3::from_array(light.target),
                color: Vec3::from_array(light.color),
                umbra: light.umbra,
                penumbra: light.penumbra,
                exponent: light.exponent,
                cast_shadows: light.cast_shadows,
                shadow_resolution: light.shadow_resolution,
                shadow_frustum: ShadowFrustum {
                    fov_degrees: light.shadow_fov,
                    near: light.shadow_near,
                    far: light.shadow_far,
                },
                follows_camera: light.follows_camera,
            },
            visibility: if scene.occlusion_culling {
                VisibilityTest::Occluded
            } else {
                VisibilityTest::Visible
            },
            ray_precision: RendererSettings::default().ray_precision,
            sky_color: scene.sky_color,
            exposure: scene.exposure,
            show_shadow_map: scene.show_shadow_map,
        }
    }
}

pub fn config_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("config.ron")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_renderer_defaults() {
        assert_eq!(GameConfig::default().renderer_settings(), RendererSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: GameConfig = ron::from_str(
            r#"(
                window_width: 800,
                scene: (
                    occlusion_culling: false,
                    light: (cast_shadows: true),
                    assets: [
                        (
                            role: Terrain,
                            source: Terrain(size: 64.0, resolution: 8, height_scale: 4.0, seed: 1),
                            collidable: true,
                            occlusion_tested: false,
                        ),
                        (role: Craft, source: Craft(length: 50.0)),
                        (
                            role: Hull,
                            source: File("ship.glb"),
                            collidable: true,
                            required: false,
                            translation: (0.0, 100.0, 0.0),
                            scale: 2.0,
                            spin: Some((axis: (0.0, 1.0, 0.0), degrees_per_second: 90.0)),
                        ),
                    ],
                ),
            )"#,
        )
        .unwrap();
        assert_eq!(config.window_width, 800);
        assert_eq!(config.window_height, 720);

        let settings = config.renderer_settings();
        assert_eq!(settings.visibility, VisibilityTest::Visible);
        assert!(settings.light.cast_shadows);
        assert_eq!(settings.light.umbra, LightSettings::default().umbra);
        assert_eq!(settings.assets.len(), 3);

        let hull = &settings.assets[2];
        assert_eq!(hull.role, NodeRole::Hull);
        assert_eq!(hull.source, MeshSource::File("ship.glb".into()));
        assert!(hull.collidable && hull.occlusion_tested && !hull.required);
        let terrain = &settings.assets[0];
        assert!(terrain.collidable && !terrain.occlusion_tested);
        let craft = &settings.assets[1];
        assert!(!craft.collidable && !craft.occlusion_tested);
        assert!(hull
            .transform
            .transform_point3(Vec3::X)
            .abs_diff_eq(Vec3::new(2.0, 100.0, 0.0), 1e-5));
        match hull.animation {
            NodeAnimation::Spin { axis, rate } => {
                assert_eq!(axis, Vec3::Y);
                assert!((rate - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
            }
            NodeAnimation::Identity => panic!("spin expected"),
        }
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("skyward-config-{}.ron", std::process::id()));
        std::fs::write(&path, "(window_width: \"wide\")").unwrap();
        let config = GameConfig::load_from(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(config.window_width, 1280);

        let missing = GameConfig::load_from(Path::new("/nonexistent/config.ron"));
        assert!(missing.scene.assets.is_empty());
    }

    #[test]
    fn sensitivity_scales_free_look() {
        let config = GameConfig {
            sensitivity: 2.0,
            ..Default::default()
        };
        let settings = config.renderer_settings();
        assert!((settings.camera.look_rate - CameraSettings::default().look_rate * 2.0).abs() < 1e-6);
    }
}
