//! The frame orchestrator: owns the scene and drives init, update and the
//! three-pass render against a [`GpuDevice`].

use std::collections::HashMap;

use engine_core::{normal_matrix, Mat4, MeshLoader, MoveDirection, Vec2, Vec3};

use crate::camera::{CameraController, CameraMode, CameraState, ChaseCamera, FreeCamera};
use crate::collidable::CollidableNode;
use crate::craft::CraftState;
use crate::error::{RenderError, RenderResult};
use crate::gpu::{drain_errors, CullMode, DepthFunc, GpuDevice, Topology};
use crate::light::{LightNode, ShadowState};
use crate::node::{GeometryNode, NodeRole};
use crate::postprocess::{OffscreenTarget, ScreenQuad};
use crate::programs::{
    ProgramKind, DIFFUSE_TEXTURE_UNIT, NORMAL_MAP_UNIT, POST_SCENE_UNIT, POST_SHADOW_MAP_UNIT,
    SHADOW_MAP_UNIT,
};
use crate::settings::RendererSettings;
use crate::shader::ShaderProgram;
use crate::visibility::ViewRay;

/// Roles every scene must provide.
const REQUIRED_ROLES: [NodeRole; 2] = [NodeRole::Terrain, NodeRole::Craft];

/// Clear color of the offscreen target where no geometry lands.
const SCENE_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// A node in draw order. Collidable nodes also answer ray queries; those with
/// `occlusion_tested` set go through the visibility policy.
#[derive(Debug)]
pub enum SceneNode {
    Plain(GeometryNode),
    Collidable {
        node: CollidableNode,
        occlusion_tested: bool,
    },
}

impl SceneNode {
    pub fn geometry(&self) -> &GeometryNode {
        match self {
            SceneNode::Plain(node) => node,
            SceneNode::Collidable { node, .. } => node.node(),
        }
    }

    pub fn geometry_mut(&mut self) -> &mut GeometryNode {
        match self {
            SceneNode::Plain(node) => node,
            SceneNode::Collidable { node, .. } => node.node_mut(),
        }
    }

    pub fn as_collidable(&self) -> Option<&CollidableNode> {
        match self {
            SceneNode::Plain(_) => None,
            SceneNode::Collidable { node, .. } => Some(node),
        }
    }

    /// The collidable node, when the visibility policy applies to it.
    pub fn occluder(&self) -> Option<&CollidableNode> {
        match self {
            SceneNode::Collidable {
                node,
                occlusion_tested: true,
            } => Some(node),
            _ => None,
        }
    }

    fn release(&mut self, device: &mut dyn GpuDevice) {
        self.geometry_mut().release(device);
    }
}

/// What the last `render` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub passes: u32,
    pub shadow_draws: u32,
    pub geometry_draws: u32,
    pub post_draws: u32,
    /// Collidable nodes skipped by the visibility policy.
    pub culled_nodes: u32,
    /// GPU errors detected after the frame was recorded.
    pub gpu_errors: u32,
}

struct Programs {
    geometry: ShaderProgram,
    shadow: ShaderProgram,
    post: ShaderProgram,
}

impl Programs {
    fn get_mut(&mut self, kind: ProgramKind) -> &mut ShaderProgram {
        match kind {
            ProgramKind::Geometry => &mut self.geometry,
            ProgramKind::ShadowMap => &mut self.shadow,
            ProgramKind::PostProcess => &mut self.post,
        }
    }

    fn release(&mut self, device: &mut dyn GpuDevice) {
        self.geometry.release(device);
        self.shadow.release(device);
        self.post.release(device);
    }
}

pub struct Renderer<D: GpuDevice> {
    device: D,
    settings: RendererSettings,
    loader: Box<dyn MeshLoader>,

    programs: Option<Programs>,
    nodes: Vec<SceneNode>,
    roles: HashMap<NodeRole, usize>,
    light: LightNode,
    quad: Option<ScreenQuad>,
    offscreen: Option<OffscreenTarget>,

    world_matrix: Mat4,
    craft: CraftState,
    camera: CameraState,
    camera_mode: CameraMode,
    free_camera: FreeCamera,
    chase_camera: ChaseCamera,
    show_shadow_map: bool,

    time: f32,
    last_frame: FrameStats,
    initialized: bool,
}

impl<D: GpuDevice> Renderer<D> {
    pub fn new(device: D, settings: RendererSettings, loader: Box<dyn MeshLoader>) -> Self {
        Self {
            device,
            loader,
            programs: None,
            nodes: Vec::new(),
            roles: HashMap::new(),
            light: LightNode::new("spotlight"),
            quad: None,
            offscreen: None,
            world_matrix: settings.world_matrix(),
            craft: CraftState::new(settings.craft.start_position),
            camera: CameraState::default(),
            camera_mode: settings.camera.mode,
            free_camera: FreeCamera::default(),
            chase_camera: settings.camera.chase,
            show_shadow_map: settings.show_shadow_map,
            time: 0.0,
            last_frame: FrameStats::default(),
            initialized: false,
            settings,
        }
    }

    /// Build everything for a `width` x `height` screen: shaders, meshes, light,
    /// screen quad, offscreen target, then the world and camera.
    ///
    /// A failed step fails the whole init. Whatever was created before it stays
    /// owned by the renderer until [`release`](Self::release), drop or the next `init`.
    pub fn init(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if self.initialized {
            log::warn!("Renderer re-initialized, releasing the previous scene");
        }
        // Also clears what a failed init left behind.
        self.release();
        log::info!("Initializing renderer at {}x{}", width, height);

        self.load_programs()?;
        self.load_nodes()?;
        self.setup_light()?;
        self.quad = Some(ScreenQuad::init(&mut self.device)?);
        self.offscreen = Some(OffscreenTarget::create(&mut self.device, width, height)?);
        self.check_gpu("init")?;
        self.build_world();
        self.setup_camera(width, height);

        self.initialized = true;
        log::info!(
            "Renderer ready: {} nodes, shadows {:?}",
            self.nodes.len(),
            self.light.shadow_state()
        );
        Ok(())
    }

    fn load_programs(&mut self) -> RenderResult<()> {
        let shader_dir = self.settings.shader_dir.clone();
        let mut build = |kind: ProgramKind| -> RenderResult<ShaderProgram> {
            let mut program = kind.program(shader_dir.as_deref())?;
            program.create_program(&mut self.device)?;
            for decl in kind.uniforms() {
                program.load_uniform(&self.device, &decl.name);
            }
            Ok(program)
        };
        let programs = Programs {
            geometry: build(ProgramKind::Geometry)?,
            shadow: build(ProgramKind::ShadowMap)?,
            post: build(ProgramKind::PostProcess)?,
        };
        self.programs = Some(programs);
        log::info!("Shader programs created");
        Ok(())
    }

    /// Load every asset. Optional failures are skipped; required failures are
    /// all logged and the first is returned.
    fn load_nodes(&mut self) -> RenderResult<()> {
        let mut failure = None;
        for (index, entry) in self.settings.assets.iter().enumerate() {
            let label = format!("{:?}#{}", entry.role, index);
            let mesh = match self.loader.load(&entry.source) {
                Ok(mesh) => mesh,
                Err(source) if entry.required => {
                    log::error!("Required asset {} ({}) failed: {}", label, entry.source, source);
                    failure.get_or_insert(RenderError::Asset { name: label, source });
                    continue;
                }
                Err(source) => {
                    log::warn!("Skipping optional asset {} ({}): {}", label, entry.source, source);
                    continue;
                }
            };

            let mut node = if entry.collidable {
                SceneNode::Collidable {
                    node: CollidableNode::init(&mut self.device, &label, &mesh, self.settings.ray_precision)?,
                    occlusion_tested: entry.occlusion_tested,
                }
            } else {
                SceneNode::Plain(GeometryNode::init(&mut self.device, &label, &mesh)?)
            };

            let geometry = node.geometry_mut();
            geometry.model_matrix = entry.transform;
            geometry.animation = entry.animation;
            // Pivot in the parent frame.
            let center = entry.transform.transform_point3(geometry.aabb.center);
            geometry.aabb.recenter(center);

            let slot = self.nodes.len();
            if let Some(existing) = self.roles.get(&entry.role) {
                log::debug!("{} shares role {:?} with node {}", label, entry.role, existing);
            } else {
                self.roles.insert(entry.role, slot);
            }
            self.nodes.push(node);
        }
        if let Some(error) = failure {
            return Err(error);
        }
        for role in REQUIRED_ROLES {
            if !self.roles.contains_key(&role) {
                return Err(RenderError::MissingRole(role));
            }
        }
        log::info!("Loaded {} nodes", self.nodes.len());
        Ok(())
    }

    fn setup_light(&mut self) -> RenderResult<()> {
        let settings = &self.settings.light;
        self.light.set_position(settings.position);
        self.light.set_target(settings.target);
        self.light.set_color(settings.color);
        self.light.set_cone_size(settings.umbra, settings.penumbra);
        self.light.set_exponent(settings.exponent);
        self.light.set_shadow_map_resolution(settings.shadow_resolution);
        self.light.frustum = settings.shadow_frustum;
        self.light.cast_shadow(&mut self.device, settings.cast_shadows)
    }

    fn check_gpu(&mut self, stage: &str) -> RenderResult<()> {
        let errors = drain_errors(&mut self.device);
        if errors.is_empty() {
            return Ok(());
        }
        for error in &errors {
            log::error!("GPU error during {}: {}", stage, error);
        }
        Err(RenderError::GpuState {
            stage: stage.to_string(),
            errors,
        })
    }

    fn build_world(&mut self) {
        let settings = &self.settings.craft;
        self.world_matrix = self.settings.world_matrix();
        self.craft = CraftState::new(settings.start_position);
        self.craft.speed = settings.speed;
        self.craft.turn_rate = settings.turn_rate;
        self.craft.boost_factor = settings.boost_factor;
        self.time = 0.0;
        self.place_craft_node();
        for node in &mut self.nodes {
            node.geometry_mut().derive(self.time);
        }
    }

    fn setup_camera(&mut self, width: u32, height: u32) {
        let settings = &self.settings.camera;
        self.camera = CameraState {
            fov_degrees: settings.fov_degrees,
            near: settings.near,
            far: settings.far,
            ..Default::default()
        };
        self.camera.set_aspect(width, height);
        self.free_camera = FreeCamera::new(settings.speed, settings.look_rate);
        self.chase_camera = settings.chase;
        self.camera_mode = settings.mode;
        // Both rigs start from behind the craft.
        self.chase_camera.place(&mut self.camera, &self.craft);
    }

    fn place_craft_node(&mut self) {
        let Some(&index) = self.roles.get(&NodeRole::Craft) else {
            return;
        };
        let offset = Mat4::from_translation(self.settings.craft.mesh_offset);
        let model = self.craft.node_matrix(self.world_matrix, offset);
        let center = self.world_matrix.inverse().transform_point3(self.craft.position());
        let node = self.nodes[index].geometry_mut();
        node.model_matrix = model;
        node.aabb.recenter(center);
    }

    /// True when `displacement` from the craft's position hits a collidable node.
    fn craft_blocked(&self, displacement: Vec3) -> bool {
        if !self.settings.craft.collisions {
            return false;
        }
        let distance = displacement.length();
        if distance <= f32::EPSILON {
            return false;
        }
        let craft_index = self.roles.get(&NodeRole::Craft).copied();
        let origin = self.craft.position();
        let direction = displacement / distance;
        self.nodes
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != craft_index)
            .filter_map(|(_, node)| node.as_collidable())
            .any(|node| {
                node.intersect_ray(origin, direction, self.world_matrix, Some(distance))
                    .is_some()
            })
    }

    /// Advance the scene by `dt` seconds: craft, node transforms, camera, light.
    pub fn update(&mut self, dt: f32) {
        if !self.initialized {
            log::warn!("update before init ignored");
            return;
        }
        let dt = dt.max(0.0);

        self.craft.turn(dt);
        let displacement = self.craft.step(dt);
        if self.craft_blocked(displacement) {
            log::info!("Craft collision ahead at {:?}, holding position", self.craft.position());
        } else {
            self.craft.advance(displacement);
        }
        self.place_craft_node();

        self.time += dt;
        for node in &mut self.nodes {
            node.geometry_mut().derive(self.time);
        }

        let controller: &mut dyn CameraController = match self.camera_mode {
            CameraMode::Free => &mut self.free_camera,
            CameraMode::Chase => {
                // Look input is per update; the idle rig must not bank it.
                self.free_camera.discard_look();
                &mut self.chase_camera
            }
        };
        controller.update(&mut self.camera, &self.craft, dt);

        if self.settings.light.follows_camera {
            self.light.set_position(self.camera.position);
            self.light.set_target(self.camera.target);
        }
    }

    /// Draw one frame: shadow map (when enabled), scene into the offscreen
    /// target, then the post-processed quad onto the screen.
    ///
    /// GPU errors raised while recording are logged and counted in the
    /// returned stats; only a failure to present is an error.
    pub fn render(&mut self) -> RenderResult<FrameStats> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        let Self {
            device,
            settings,
            programs,
            nodes,
            light,
            quad,
            offscreen,
            world_matrix,
            camera,
            show_shadow_map,
            ..
        } = self;
        let (Some(programs), Some(quad), Some(offscreen)) = (programs, quad, offscreen) else {
            return Err(RenderError::NotInitialized);
        };
        let device: &mut dyn GpuDevice = device;
        let world = *world_matrix;

        let view_ray = ViewRay {
            origin: camera.position,
            direction: camera.direction(),
            world_matrix: world,
        };
        let drawn: Vec<bool> = nodes
            .iter()
            .map(|node| match node.occluder() {
                Some(collidable) => settings.visibility.is_drawn(collidable, &view_ray),
                None => true,
            })
            .collect();

        let mut stats = FrameStats {
            culled_nodes: drawn.iter().filter(|d| !**d).count() as u32,
            ..Default::default()
        };

        if light.shadow_state() == ShadowState::Enabled {
            stats.shadow_draws = shadow_pass(device, &mut programs.shadow, light, nodes, &drawn, world);
            stats.passes += 1;
        }

        stats.geometry_draws = geometry_pass(
            device,
            &mut programs.geometry,
            offscreen,
            light,
            camera,
            nodes,
            &drawn,
            world,
        );
        stats.passes += 1;

        let program = &mut programs.post;
        device.bind_framebuffer(None);
        let (width, height) = device.surface_size();
        device.viewport(width, height);
        device.set_depth_test(false);
        device.clear(Some(settings.sky_color), None);
        program.bind(device);
        let shadow_texture = light.shadow_depth_texture();
        program.set_float(device, "uniform_exposure", settings.exposure);
        program.set_int(
            device,
            "uniform_show_shadow_map",
            (*show_shadow_map && shadow_texture.is_some()) as i32,
        );
        device.bind_texture(POST_SCENE_UNIT, Some(offscreen.color_texture()));
        device.bind_texture(POST_SHADOW_MAP_UNIT, shadow_texture);
        quad.draw(device);
        stats.post_draws = 1;
        stats.passes += 1;
        device.bind_texture(POST_SCENE_UNIT, None);
        device.bind_texture(POST_SHADOW_MAP_UNIT, None);
        program.unbind(device);

        let errors = drain_errors(device);
        for error in &errors {
            log::error!("GPU error during render: {}", error);
        }
        stats.gpu_errors = errors.len() as u32;

        device.finish_frame()?;
        self.last_frame = stats;
        Ok(stats)
    }

    /// Resize the offscreen target and the projection. On failure the previous
    /// size stays in effect.
    pub fn resize_buffers(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let offscreen = self.offscreen.as_mut().ok_or(RenderError::NotInitialized)?;
        offscreen.resize(&mut self.device, width, height)?;
        self.device.resize_surface(width, height);
        self.camera.set_aspect(width, height);
        Ok(())
    }

    /// Rebuild every program from its sources. A program that fails keeps its
    /// previous version; the first failure is returned after all were tried.
    pub fn reload_shaders(&mut self) -> RenderResult<()> {
        let programs = self.programs.as_mut().ok_or(RenderError::NotInitialized)?;
        let mut failure = None;
        for kind in ProgramKind::ALL {
            if let Err(error) = programs.get_mut(kind).reload_program(&mut self.device) {
                log::error!("Reloading '{}' failed: {}", kind.label(), error);
                failure.get_or_insert(error);
            }
        }
        match failure {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    pub fn camera_move(&mut self, direction: MoveDirection, enabled: bool) {
        self.free_camera.set_move(direction, enabled);
    }

    pub fn camera_look(&mut self, delta: Vec2) {
        self.free_camera.look(delta);
    }

    pub fn craft_move(&mut self, direction: MoveDirection, enabled: bool) {
        self.craft.set_move(direction, enabled);
    }

    pub fn craft_look(&mut self, delta: Vec2) {
        self.craft.look(delta);
    }

    pub fn set_boost(&mut self, boost: bool) {
        self.craft.set_boost(boost);
    }

    pub fn set_camera_mode(&mut self, mode: CameraMode) {
        if mode != self.camera_mode {
            log::info!("Camera mode {:?}", mode);
        }
        self.camera_mode = mode;
    }

    pub fn toggle_camera_mode(&mut self) -> CameraMode {
        self.set_camera_mode(self.camera_mode.toggled());
        self.camera_mode
    }

    pub fn set_cast_shadows(&mut self, enable: bool) -> RenderResult<()> {
        self.light.cast_shadow(&mut self.device, enable)
    }

    pub fn toggle_shadow_map_inset(&mut self) -> bool {
        self.show_shadow_map = !self.show_shadow_map;
        self.show_shadow_map
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn node(&self, role: NodeRole) -> Option<&GeometryNode> {
        self.roles.get(&role).map(|&index| self.nodes[index].geometry())
    }

    pub fn light(&self) -> &LightNode {
        &self.light
    }

    pub fn craft(&self) -> &CraftState {
        &self.craft
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn camera_mode(&self) -> CameraMode {
        self.camera_mode
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    /// Scene time accumulated across updates, in seconds.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn offscreen_size(&self) -> Option<(u32, u32)> {
        self.offscreen.as_ref().map(|target| target.size())
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    /// Free every GPU resource. Safe to call more than once.
    pub fn release(&mut self) {
        let device: &mut dyn GpuDevice = &mut self.device;
        if let Some(mut programs) = self.programs.take() {
            programs.release(device);
        }
        for mut node in self.nodes.drain(..) {
            node.release(device);
        }
        self.roles.clear();
        self.light.release(device);
        if let Some(mut quad) = self.quad.take() {
            quad.release(device);
        }
        if let Some(mut offscreen) = self.offscreen.take() {
            offscreen.release(device);
        }
        self.initialized = false;
    }
}

impl<D: GpuDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        self.release();
    }
}

fn shadow_pass(
    device: &mut dyn GpuDevice,
    program: &mut ShaderProgram,
    light: &LightNode,
    nodes: &[SceneNode],
    drawn: &[bool],
    world: Mat4,
) -> u32 {
    let Some(framebuffer) = light.shadow_framebuffer() else {
        return 0;
    };
    device.bind_framebuffer(Some(framebuffer));
    let resolution = light.shadow_map_resolution();
    device.viewport(resolution, resolution);
    device.set_depth_test(true);
    device.depth_func(DepthFunc::LessEqual);
    device.cull_face(CullMode::None);
    device.clear(None, Some(1.0));
    program.bind(device);

    let light_world = light.projection_matrix() * light.view_matrix() * world;
    let mut draws = 0;
    for (node, _) in nodes.iter().zip(drawn).filter(|(_, drawn)| **drawn) {
        let geometry = node.geometry();
        program.set_mat4(device, "uniform_projection_matrix", light_world * geometry.app_model_matrix);
        device.bind_vertex_array(geometry.vertex_array());
        device.draw_arrays(Topology::Triangles, 0, geometry.vertex_count());
        draws += 1;
    }

    device.bind_vertex_array(None);
    program.unbind(device);
    device.bind_framebuffer(None);
    draws
}

#[allow(clippy::too_many_arguments)]
fn geometry_pass(
    device: &mut dyn GpuDevice,
    program: &mut ShaderProgram,
    offscreen: &OffscreenTarget,
    light: &LightNode,
    camera: &CameraState,
    nodes: &[SceneNode],
    drawn: &[bool],
    world: Mat4,
) -> u32 {
    let (width, height) = offscreen.size();
    device.bind_framebuffer(Some(offscreen.framebuffer()));
    device.viewport(width, height);
    device.set_depth_test(true);
    device.depth_func(DepthFunc::LessEqual);
    device.cull_face(CullMode::None);
    device.clear(Some(SCENE_CLEAR), Some(1.0));
    program.bind(device);

    let shadows = light.shadow_state() == ShadowState::Enabled;
    program.set_vec3(device, "uniform_light_color", light.color());
    program.set_vec3(device, "uniform_light_dir", light.direction());
    program.set_vec3(device, "uniform_light_pos", light.position());
    program.set_float(device, "uniform_light_umbra", light.umbra());
    program.set_float(device, "uniform_light_penumbra", light.penumbra());
    program.set_float(device, "uniform_light_exponent", light.exponent());
    program.set_mat4(
        device,
        "uniform_light_projection_matrix",
        light.projection_matrix() * light.view_matrix(),
    );
    program.set_int(device, "uniform_cast_shadows", shadows as i32);
    program.set_vec3(device, "uniform_camera_pos", camera.position);
    program.set_vec3(device, "uniform_camera_dir", camera.direction());
    device.bind_texture(
        SHADOW_MAP_UNIT,
        light.shadow_depth_texture().filter(|_| shadows),
    );

    let clip = camera.view_projection_matrix() * world;
    let mut draws = 0;
    for (node, _) in nodes.iter().zip(drawn).filter(|(_, drawn)| **drawn) {
        let geometry = node.geometry();
        let model = geometry.app_model_matrix;
        let world_model = world * model;
        program.set_mat4(device, "uniform_projection_matrix", clip * model);
        program.set_mat4(device, "uniform_world_matrix", world_model);
        program.set_mat4(device, "uniform_normal_matrix", normal_matrix(world_model));
        device.bind_vertex_array(geometry.vertex_array());

        for part in geometry.parts().iter().filter(|part| part.count > 0) {
            let material = &part.material;
            program.set_vec3(device, "uniform_diffuse", material.diffuse);
            program.set_vec3(device, "uniform_ambient", material.ambient);
            program.set_vec3(device, "uniform_specular", material.specular);
            program.set_float(device, "uniform_shininess", material.shininess);

            program.set_int(device, "uniform_has_texture", part.diffuse_texture.is_some() as i32);
            device.bind_texture(DIFFUSE_TEXTURE_UNIT, part.diffuse_texture);

            let detail = part.detail_texture();
            program.set_int(device, "uniform_has_normal_map", detail.is_some() as i32);
            program.set_int(
                device,
                "uniform_normal_is_bump",
                detail.is_some_and(|(_, bump)| bump) as i32,
            );
            device.bind_texture(NORMAL_MAP_UNIT, detail.map(|(texture, _)| texture));

            device.draw_arrays(Topology::Triangles, part.start_offset, part.count);
            draws += 1;
        }
    }

    for unit in [DIFFUSE_TEXTURE_UNIT, NORMAL_MAP_UNIT, SHADOW_MAP_UNIT] {
        device.bind_texture(unit, None);
    }
    device.bind_vertex_array(None);
    program.unbind(device);
    draws
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DrawRecord, HeadlessDevice, UniformValue};
    use crate::settings::AssetEntry;
    use engine_core::{MeshSource, ProceduralMesh};
    use procgen::ProceduralLoader;

    /// Default scene with a coarse terrain.
    fn settings() -> RendererSettings {
        let mut settings = RendererSettings::default();
        settings.assets[0].source = MeshSource::Procedural(ProceduralMesh::Terrain {
            size: 64.0,
            resolution: 8,
            height_scale: 5.0,
            seed: 3,
        });
        settings
    }

    fn renderer(settings: RendererSettings) -> Renderer<HeadlessDevice> {
        Renderer::new(HeadlessDevice::new(1280, 720), settings, Box::new(ProceduralLoader))
    }

    fn ready() -> Renderer<HeadlessDevice> {
        let mut renderer = renderer(settings());
        renderer.init(1280, 720).unwrap();
        renderer
    }

    fn draws_of<'a>(draws: &'a [DrawRecord], label: &str) -> Vec<&'a DrawRecord> {
        draws.iter().filter(|d| d.program_label == label).collect()
    }

    #[test]
    fn init_update_render_runs_three_passes() {
        let mut settings = settings();
        settings.light.cast_shadows = true;
        let mut renderer = renderer(settings);
        renderer.init(1280, 720).unwrap();

        renderer.craft_move(MoveDirection::Forward, true);
        renderer.update(0.016);
        let stats = renderer.render().unwrap();

        assert_eq!(stats.passes, 3);
        assert_eq!(stats.gpu_errors, 0);
        assert!(stats.shadow_draws > 0);
        assert!(stats.geometry_draws > 0);
        assert_eq!(stats.post_draws, 1);

        let device = renderer.device_mut();
        assert!(device.take_error().is_none());
        assert_eq!(device.bound_framebuffer(), None);
        assert!(!device.depth_test_enabled());

        let frame = device.last_frame();
        let shadow = draws_of(frame, "shadow_map");
        let geometry = draws_of(frame, "geometry");
        let post = draws_of(frame, "post_process");
        assert_eq!(shadow.len() as u32, stats.shadow_draws);
        assert_eq!(geometry.len() as u32, stats.geometry_draws);
        assert_eq!(post.len(), 1);
        assert_eq!(shadow[0].viewport, (1024, 1024));
        assert_eq!(geometry[0].viewport, (1280, 720));
        assert_eq!(geometry[0].depth_func, DepthFunc::LessEqual);
        assert_eq!(post[0].framebuffer, None);
        assert!(!post[0].depth_test);
        assert_eq!(post[0].topology, Topology::TriangleStrip);
        assert_eq!(post[0].count, 4);
    }

    #[test]
    fn craft_moves_forward_on_update() {
        let mut renderer = ready();
        let start = renderer.craft().position();
        renderer.craft_move(MoveDirection::Forward, true);
        renderer.update(0.5);
        let moved = renderer.craft().position() - start;
        assert!(moved.abs_diff_eq(Vec3::Z * 2.5, 1e-4));
        assert!((renderer.time() - 0.5).abs() < 1e-6);

        let world = renderer.world_matrix();
        let craft = renderer.node(NodeRole::Craft).unwrap();
        let placed = (world * craft.model_matrix).transform_point3(Vec3::ZERO);
        assert!(placed.abs_diff_eq(renderer.craft().position(), 1e-3));
        assert!((world.transform_point3(craft.aabb.center)).abs_diff_eq(renderer.craft().position(), 1e-3));
    }

    #[test]
    fn hull_ahead_holds_the_craft() {
        let mut settings = settings();
        settings.visibility = crate::visibility::VisibilityTest::Visible;
        settings.craft.start_position = Vec3::new(10.0, 20.0, 36.0);
        let mut renderer = renderer(settings);
        renderer.init(64, 64).unwrap();
        renderer.craft_move(MoveDirection::Forward, true);
        renderer.set_boost(true);

        // Hull face sits at z = 37 in world space; one second would cross it.
        renderer.update(1.0);
        assert!(renderer.craft().position().abs_diff_eq(Vec3::new(10.0, 20.0, 36.0), 1e-4));

        renderer.craft_move(MoveDirection::Forward, false);
        renderer.craft_move(MoveDirection::Back, true);
        renderer.update(1.0);
        assert!(renderer.craft().position().z < 36.0);
    }

    fn diving_craft(collisions: bool) -> Renderer<HeadlessDevice> {
        let mut settings = settings();
        // Terrain surface lies between y = -15 and y = -10 in world space.
        settings.craft.start_position = Vec3::new(10.0, -8.0, 0.0);
        settings.craft.collisions = collisions;
        let mut renderer = renderer(settings);
        renderer.init(64, 64).unwrap();
        let quarter_turn = 90.0 / renderer.craft().turn_rate;
        renderer.craft_look(Vec2::new(0.0, -quarter_turn));
        renderer.craft_move(MoveDirection::Forward, true);
        renderer.set_boost(true);
        // Nose down, ten units: the step would end below the lowest terrain point.
        renderer.update(1.0);
        assert!(renderer.craft().forward().abs_diff_eq(Vec3::NEG_Y, 1e-4));
        renderer
    }

    #[test]
    fn terrain_holds_a_diving_craft() {
        let renderer = diving_craft(true);
        assert!(renderer.craft().position().abs_diff_eq(Vec3::new(10.0, -8.0, 0.0), 1e-4));

        let unchecked = diving_craft(false);
        assert!(unchecked.craft().position().abs_diff_eq(Vec3::new(10.0, -18.0, 0.0), 1e-3));
    }

    #[test]
    fn terrain_is_solid_but_never_culled() {
        let mut renderer = ready();
        let terrain = &renderer.nodes()[0];
        assert!(terrain.as_collidable().is_some());
        assert!(terrain.occluder().is_none());

        // Looking straight down at the terrain still draws it.
        renderer.set_camera_mode(CameraMode::Free);
        renderer.camera_look(Vec2::new(0.0, 50.0));
        renderer.update(0.0);
        assert!(renderer.camera().direction().y < -0.5);
        let stats = renderer.render().unwrap();
        assert_eq!(stats.culled_nodes, 0);
        let terrain_vao = renderer.node(NodeRole::Terrain).unwrap().vertex_array();
        assert!(draws_of(renderer.device().last_frame(), "geometry")
            .iter()
            .any(|d| Some(d.vertex_array) == terrain_vao));
    }

    #[test]
    fn part_without_texture_binds_nothing() {
        let mut renderer = ready();
        renderer.update(0.016);
        renderer.render().unwrap();
        let craft_vao = renderer.node(NodeRole::Craft).unwrap().vertex_array();
        let frame = renderer.device().last_frame();
        let craft_draws: Vec<_> = draws_of(frame, "geometry")
            .into_iter()
            .filter(|d| Some(d.vertex_array) == craft_vao)
            .collect();
        assert!(!craft_draws.is_empty());
        for draw in craft_draws {
            assert_eq!(draw.uniform("uniform_has_texture"), Some(UniformValue::Int(0)));
            assert_eq!(draw.texture("uniform_texture"), None);
            assert_eq!(draw.texture("uniform_shadow_map"), None);
        }
        let textured = draws_of(frame, "geometry")
            .into_iter()
            .find(|d| d.uniform("uniform_has_texture") == Some(UniformValue::Int(1)))
            .unwrap();
        assert!(textured.texture("uniform_texture").is_some());
    }

    #[test]
    fn occluded_policy_skips_the_hull_in_view() {
        let mut settings = settings();
        settings.light.cast_shadows = true;
        settings.camera.chase = ChaseCamera {
            height: 0.0,
            ..Default::default()
        };
        let mut renderer = renderer(settings);
        renderer.init(320, 240).unwrap();
        // Level behind the craft, the view ray runs down +Z through the hull.
        let stats = renderer.render().unwrap();
        assert_eq!(stats.culled_nodes, 1);
        assert_eq!(stats.shadow_draws, 2);

        renderer.set_camera_mode(CameraMode::Free);
        renderer.camera_look(Vec2::new(40.0, 0.0));
        renderer.update(0.0);
        let stats = renderer.render().unwrap();
        assert_eq!(stats.culled_nodes, 0);
        assert_eq!(stats.shadow_draws, 3);
    }

    #[test]
    fn resize_reuses_offscreen_handles() {
        let mut renderer = ready();
        let created = renderer.device().stats().textures_created;
        renderer.resize_buffers(800, 600).unwrap();
        renderer.resize_buffers(800, 600).unwrap();
        assert_eq!(renderer.offscreen_size(), Some((800, 600)));
        assert_eq!(renderer.device().stats().textures_created, created);
        assert!((renderer.camera().aspect - 800.0 / 600.0).abs() < 1e-6);

        assert!(renderer.resize_buffers(0, 600).is_err());
        assert_eq!(renderer.offscreen_size(), Some((800, 600)));

        renderer.render().unwrap();
        let geometry = draws_of(renderer.device().last_frame(), "geometry")[0].viewport;
        assert_eq!(geometry, (800, 600));
    }

    #[test]
    fn shadow_toggle_allocates_once() {
        let mut renderer = ready();
        assert_eq!(renderer.light().shadow_state(), ShadowState::Disabled);
        let framebuffers = renderer.device().stats().framebuffers_created;

        renderer.set_cast_shadows(true).unwrap();
        renderer.set_cast_shadows(false).unwrap();
        renderer.set_cast_shadows(true).unwrap();
        assert_eq!(renderer.device().stats().framebuffers_created, framebuffers + 1);
        assert!(renderer.light().shadow_framebuffer().is_some());

        assert!(renderer.toggle_shadow_map_inset());
        renderer.render().unwrap();
        let post = draws_of(renderer.device().last_frame(), "post_process")[0];
        assert_eq!(post.uniform("uniform_show_shadow_map"), Some(UniformValue::Int(1)));
        assert!(post.texture("uniform_shadow_map").is_some());
    }

    #[test]
    fn reload_replaces_programs() {
        let mut renderer = ready();
        let programs = renderer.device().stats().programs_created;
        renderer.reload_shaders().unwrap();
        assert_eq!(renderer.device().stats().programs_created, programs + 3);
        assert_eq!(renderer.device().stats().live_programs(), 3);
        let stats = renderer.render().unwrap();
        assert_eq!(stats.gpu_errors, 0);
    }

    #[test]
    fn missing_required_asset_fails_init() {
        let mut settings = settings();
        settings.assets.push(AssetEntry::new(NodeRole::Hull, MeshSource::File("missing.glb".into())));
        let mut renderer = renderer(settings);
        assert!(matches!(renderer.init(64, 64), Err(RenderError::Asset { .. })));

        let mut settings = self::settings();
        settings.assets.retain(|entry| entry.role != NodeRole::Craft);
        settings
            .assets
            .push(AssetEntry::new(NodeRole::Craft, MeshSource::File("craft.glb".into())).optional());
        let mut renderer = self::renderer(settings);
        assert!(matches!(
            renderer.init(64, 64),
            Err(RenderError::MissingRole(NodeRole::Craft))
        ));
    }

    #[test]
    fn init_retry_after_failure_starts_clean() {
        let mut settings = settings();
        settings.assets.push(AssetEntry::new(NodeRole::Hull, MeshSource::File("missing.glb".into())));
        let mut renderer = renderer(settings);
        assert!(renderer.init(64, 64).is_err());
        let nodes = renderer.nodes().len();
        let programs = renderer.device().stats().live_programs();
        let vertex_arrays = renderer.device().stats().live_vertex_arrays();
        assert_eq!(programs, 3);

        assert!(renderer.init(64, 64).is_err());
        assert_eq!(renderer.nodes().len(), nodes);
        assert_eq!(renderer.device().stats().live_programs(), programs);
        assert_eq!(renderer.device().stats().live_vertex_arrays(), vertex_arrays);

        renderer.release();
        let stats = renderer.device().stats();
        assert_eq!(stats.live_programs(), 0);
        assert_eq!(stats.live_vertex_arrays(), 0);
        assert_eq!(stats.live_textures(), 0);
    }

    #[test]
    fn render_before_init_is_an_error() {
        let mut renderer = renderer(settings());
        assert!(matches!(renderer.render(), Err(RenderError::NotInitialized)));
    }

    #[test]
    fn release_frees_every_handle() {
        let mut settings = settings();
        settings.light.cast_shadows = true;
        let mut renderer = renderer(settings);
        renderer.init(64, 64).unwrap();
        renderer.release();
        renderer.release();
        let stats = renderer.device().stats();
        assert_eq!(stats.live_vertex_arrays(), 0);
        assert_eq!(stats.live_textures(), 0);
        assert_eq!(stats.live_framebuffers(), 0);
        assert_eq!(stats.live_programs(), 0);
    }

    #[test]
    fn chase_and_free_modes_toggle() {
        let mut renderer = ready();
        assert_eq!(renderer.camera_mode(), CameraMode::Chase);
        assert_eq!(renderer.toggle_camera_mode(), CameraMode::Free);

        let before = renderer.camera().position;
        renderer.camera_move(MoveDirection::Forward, true);
        renderer.craft_move(MoveDirection::Forward, true);
        renderer.update(1.0);
        let moved = renderer.camera().position - before;
        assert!(moved.abs_diff_eq(renderer.camera().direction() * 5.0, 1e-3));

        renderer.toggle_camera_mode();
        renderer.update(0.0);
        let craft = renderer.craft();
        assert!(renderer.camera().target.abs_diff_eq(craft.position() + craft.forward() * 10.0, 1e-3));
    }

    #[test]
    fn chase_mode_drops_free_look_input() {
        let mut renderer = ready();
        assert_eq!(renderer.camera_mode(), CameraMode::Chase);
        renderer.camera_look(Vec2::new(40.0, 0.0));
        renderer.update(0.016);
        renderer.update(0.016);

        renderer.set_camera_mode(CameraMode::Free);
        let before = renderer.camera().direction();
        renderer.update(0.0);
        assert!(renderer.camera().direction().abs_diff_eq(before, 1e-5));
    }
}
