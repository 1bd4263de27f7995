//! Everything the renderer reads at init.

use std::path::PathBuf;

use engine_core::{Mat4, MeshSource, ProceduralMesh, Vec3};
use physics::RayPrecision;

use crate::camera::{CameraMode, ChaseCamera};
use crate::light::{ShadowFrustum, SHADOW_MAP_RESOLUTION};
use crate::node::{NodeAnimation, NodeRole};
use crate::visibility::VisibilityTest;

/// One mesh to load at init.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetEntry {
    pub role: NodeRole,
    pub source: MeshSource,
    /// Collidable nodes answer ray queries and block the craft.
    pub collidable: bool,
    /// A collidable node that also goes through the visibility policy.
    pub occlusion_tested: bool,
    /// A required asset that fails to load fails init; an optional one is skipped.
    pub required: bool,
    /// Initial `model_matrix`.
    pub transform: Mat4,
    pub animation: NodeAnimation,
}

impl AssetEntry {
    pub fn new(role: NodeRole, source: MeshSource) -> Self {
        Self {
            role,
            source,
            collidable: false,
            occlusion_tested: false,
            required: true,
            transform: Mat4::IDENTITY,
            animation: NodeAnimation::Identity,
        }
    }

    pub fn collidable(mut self) -> Self {
        self.collidable = true;
        self.occlusion_tested = true;
        self
    }

    /// Keep the node solid for the craft but always draw it.
    pub fn without_occlusion_test(mut self) -> Self {
        self.occlusion_tested = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_animation(mut self, animation: NodeAnimation) -> Self {
        self.animation = animation;
        self
    }
}

/// The spotlight's initial setup.
#[derive(Debug, Clone, PartialEq)]
pub struct LightSettings {
    pub position: Vec3,
    pub target: Vec3,
    pub color: Vec3,
    /// Inner cone, degrees.
    pub umbra: f32,
    /// Outer cone, degrees.
    pub penumbra: f32,
    pub exponent: f32,
    pub cast_shadows: bool,
    pub shadow_resolution: u32,
    pub shadow_frustum: ShadowFrustum,
    /// Move the light with the camera every update.
    pub follows_camera: bool,
}

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 30.0, 0.0),
            target: Vec3::ZERO,
            color: Vec3::splat(1000.0),
            umbra: 30.0,
            penumbra: 40.0,
            exponent: 2.0,
            cast_shadows: false,
            shadow_resolution: SHADOW_MAP_RESOLUTION,
            shadow_frustum: ShadowFrustum::default(),
            follows_camera: false,
        }
    }
}

/// Craft kinematics and placement.
#[derive(Debug, Clone, PartialEq)]
pub struct CraftSettings {
    pub start_position: Vec3,
    /// World units per second.
    pub speed: f32,
    /// Degrees per second per look unit.
    pub turn_rate: f32,
    pub boost_factor: f32,
    /// Applied to the craft mesh before the craft transform, in model units.
    pub mesh_offset: Vec3,
    /// Hold the craft in place when its next step would hit a collidable node.
    pub collisions: bool,
}

impl Default for CraftSettings {
    fn default() -> Self {
        Self {
            start_position: Vec3::new(10.0, 20.0, 0.0),
            speed: 5.0,
            turn_rate: std::f32::consts::PI * 20.0,
            boost_factor: 2.0,
            mesh_offset: Vec3::ZERO,
            collisions: true,
        }
    }
}

/// Camera rigs and projection.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub mode: CameraMode,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Free camera, world units per second.
    pub speed: f32,
    /// Free camera, radians per look unit.
    pub look_rate: f32,
    pub chase: ChaseCamera,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            mode: CameraMode::Chase,
            fov_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
            speed: 5.0,
            look_rate: 0.02,
            chase: ChaseCamera::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    /// Directory holding the `.wgsl` stages. `None` uses the built-in sources.
    pub shader_dir: Option<PathBuf>,
    pub assets: Vec<AssetEntry>,
    /// Uniform scale applied to every node.
    pub world_scale: f32,
    pub camera: CameraSettings,
    pub craft: CraftSettings,
    pub light: LightSettings,
    pub visibility: VisibilityTest,
    pub ray_precision: RayPrecision,
    /// Clear color of the default framebuffer.
    pub sky_color: [f32; 4],
    pub exposure: f32,
    /// Composite the shadow depth texture as an inset.
    pub show_shadow_map: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            shader_dir: None,
            assets: default_assets(),
            world_scale: 0.02,
            camera: CameraSettings::default(),
            craft: CraftSettings::default(),
            light: LightSettings::default(),
            visibility: VisibilityTest::Occluded,
            ray_precision: RayPrecision::Triangles,
            sky_color: [0.0, 0.8, 1.0, 1.0],
            exposure: 1.0,
            show_shadow_map: false,
        }
    }
}

impl RendererSettings {
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_scale(Vec3::splat(self.world_scale))
    }
}

/// Procedural terrain (solid, never culled), craft and one hull straight ahead
/// of the craft.
/// Transforms are in model units (before the 0.02 world scale).
pub fn default_assets() -> Vec<AssetEntry> {
    vec![
        AssetEntry::new(
            NodeRole::Terrain,
            MeshSource::Procedural(ProceduralMesh::Terrain {
                size: 256.0,
                resolution: 128,
                height_scale: 30.0,
                seed: 7,
            }),
        )
        .collidable()
        .without_occlusion_test()
        .with_transform(
            Mat4::from_translation(Vec3::new(0.0, -750.0, 0.0)) * Mat4::from_scale(Vec3::splat(50.0)),
        ),
        AssetEntry::new(
            NodeRole::Craft,
            MeshSource::Procedural(ProceduralMesh::Craft { length: 100.0 }),
        ),
        AssetEntry::new(
            NodeRole::Hull,
            MeshSource::Procedural(ProceduralMesh::Hull {
                half_extents: Vec3::new(150.0, 100.0, 150.0),
            }),
        )
        .collidable()
        .with_transform(Mat4::from_translation(Vec3::new(500.0, 1000.0, 2000.0))),
    ]
}
