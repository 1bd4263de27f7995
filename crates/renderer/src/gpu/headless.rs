//! A device with no GPU behind it.
//!
//! Tracks every object and piece of bound state, applies the same validation a GL
//! driver would (queuing errors for `take_error`), and records draws so tests and
//! `--headless` runs can observe the pipeline.

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::{
    check_entry_point, check_texture_units, framebuffer_status, validate_streams, Attachment,
    CullMode, DepthFunc, FramebufferHandle, FramebufferStatus, GpuDevice, GpuError, NameAllocator,
    ProgramDesc, ProgramHandle, ShaderStage, SlotKind, TextureDesc, TextureHandle, TextureSlot,
    Topology, UniformLayout, UniformLocation, UniformValue, VertexArrayHandle, VertexStream,
    MAX_TEXTURE_UNITS,
};

/// Object and call counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub vertex_arrays_created: usize,
    pub vertex_arrays_deleted: usize,
    pub textures_created: usize,
    pub textures_deleted: usize,
    pub texture_definitions: usize,
    pub framebuffers_created: usize,
    pub framebuffers_deleted: usize,
    pub programs_created: usize,
    pub programs_deleted: usize,
    pub clears: usize,
    pub draw_calls: usize,
    pub frames: usize,
}

impl DeviceStats {
    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays_created - self.vertex_arrays_deleted
    }

    pub fn live_textures(&self) -> usize {
        self.textures_created - self.textures_deleted
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers_created - self.framebuffers_deleted
    }

    pub fn live_programs(&self) -> usize {
        self.programs_created - self.programs_deleted
    }
}

/// One accepted draw call, with the state it saw.
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub framebuffer: Option<FramebufferHandle>,
    pub program: ProgramHandle,
    pub program_label: String,
    pub vertex_array: VertexArrayHandle,
    pub topology: Topology,
    pub first: u32,
    pub count: u32,
    pub viewport: (u32, u32),
    pub depth_test: bool,
    pub depth_func: DepthFunc,
    /// Program texture slots and what was bound to each.
    pub textures: Vec<(String, Option<TextureHandle>)>,
    /// Program uniform values at draw time.
    pub uniforms: HashMap<String, UniformValue>,
}

impl DrawRecord {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    pub fn texture(&self, slot: &str) -> Option<TextureHandle> {
        self.textures
            .iter()
            .find(|(name, _)| name == slot)
            .and_then(|(_, texture)| *texture)
    }
}

#[derive(Debug)]
struct VertexArrayObject {
    label: String,
    vertex_count: u32,
}

#[derive(Debug)]
struct TextureObject {
    label: String,
    desc: Option<TextureDesc>,
}

#[derive(Debug, Default)]
struct FramebufferObject {
    label: String,
    color: Option<TextureHandle>,
    depth: Option<TextureHandle>,
}

#[derive(Debug)]
struct ProgramObject {
    label: String,
    layout: UniformLayout,
    textures: Vec<TextureSlot>,
    values: HashMap<String, UniformValue>,
}

/// GPU-less [`GpuDevice`].
#[derive(Debug)]
pub struct HeadlessDevice {
    names: NameAllocator,
    vertex_arrays: HashMap<VertexArrayHandle, VertexArrayObject>,
    textures: HashMap<TextureHandle, TextureObject>,
    framebuffers: HashMap<FramebufferHandle, FramebufferObject>,
    programs: HashMap<ProgramHandle, ProgramObject>,

    surface: (u32, u32),
    framebuffer: Option<FramebufferHandle>,
    viewport: (u32, u32),
    depth_test: bool,
    depth_func: DepthFunc,
    cull: CullMode,
    program: Option<ProgramHandle>,
    vertex_array: Option<VertexArrayHandle>,
    units: BTreeMap<u32, TextureHandle>,

    errors: VecDeque<GpuError>,
    stats: DeviceStats,
    frame_draws: Vec<DrawRecord>,
    last_frame: Vec<DrawRecord>,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            names: NameAllocator::default(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            surface: (width.max(1), height.max(1)),
            framebuffer: None,
            viewport: (width.max(1), height.max(1)),
            depth_test: false,
            depth_func: DepthFunc::Less,
            cull: CullMode::None,
            program: None,
            vertex_array: None,
            units: BTreeMap::new(),
            errors: VecDeque::new(),
            stats: DeviceStats::default(),
            frame_draws: Vec::new(),
            last_frame: Vec::new(),
        }
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Draws recorded since the last `finish_frame`.
    pub fn pending_draws(&self) -> &[DrawRecord] {
        &self.frame_draws
    }

    /// Draws of the most recently finished frame.
    pub fn last_frame(&self) -> &[DrawRecord] {
        &self.last_frame
    }

    pub fn cull_mode(&self) -> CullMode {
        self.cull
    }

    pub fn current_viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn texture_label(&self, texture: TextureHandle) -> Option<&str> {
        self.textures.get(&texture).map(|t| t.label.as_str())
    }

    pub fn framebuffer_label(&self, framebuffer: FramebufferHandle) -> Option<&str> {
        self.framebuffers.get(&framebuffer).map(|f| f.label.as_str())
    }

    pub fn vertex_array_label(&self, vertex_array: VertexArrayHandle) -> Option<&str> {
        self.vertex_arrays.get(&vertex_array).map(|v| v.label.as_str())
    }

    fn raise(&mut self, error: GpuError) {
        log::trace!("headless device error: {}", error);
        self.errors.push_back(error);
    }

    /// Everything a draw must satisfy before it is recorded.
    fn validate_draw(&self, first: u32, count: u32) -> Result<(ProgramHandle, VertexArrayHandle), GpuError> {
        let program = self
            .program
            .ok_or_else(|| GpuError::InvalidOperation("draw with no program bound".into()))?;
        let vertex_array = self
            .vertex_array
            .ok_or_else(|| GpuError::InvalidOperation("draw with no vertex array bound".into()))?;
        let vao = self
            .vertex_arrays
            .get(&vertex_array)
            .ok_or_else(|| GpuError::InvalidOperation("bound vertex array was deleted".into()))?;
        if first.checked_add(count).map_or(true, |end| end > vao.vertex_count) {
            return Err(GpuError::InvalidValue(format!(
                "draw {}..{} exceeds {} vertices of '{}'",
                first,
                first.saturating_add(count),
                vao.vertex_count,
                vao.label
            )));
        }
        if let Some(fb) = self.framebuffer {
            if let FramebufferStatus::Incomplete(reason) = self.framebuffer_status(fb) {
                return Err(GpuError::IncompleteFramebuffer(reason));
            }
        }
        let attached: Vec<TextureHandle> = self
            .framebuffer
            .and_then(|fb| self.framebuffers.get(&fb))
            .map(|fb| fb.color.into_iter().chain(fb.depth).collect())
            .unwrap_or_default();
        let slots = self
            .programs
            .get(&program)
            .map(|p| p.textures.as_slice())
            .unwrap_or_default();
        for slot in slots {
            let Some(texture) = self.units.get(&slot.unit) else {
                continue;
            };
            if attached.contains(texture) {
                return Err(GpuError::InvalidOperation(format!(
                    "texture bound to '{}' is attached to the target framebuffer",
                    slot.name
                )));
            }
            let desc = self
                .textures
                .get(texture)
                .and_then(|t| t.desc)
                .ok_or_else(|| GpuError::InvalidOperation(format!("texture bound to '{}' has no storage", slot.name)))?;
            let expects_depth = slot.kind == SlotKind::Depth;
            if desc.format.is_depth() != expects_depth {
                return Err(GpuError::InvalidOperation(format!(
                    "'{}' expects a {:?} texture, got {:?}",
                    slot.name, slot.kind, desc.format
                )));
            }
        }
        Ok((program, vertex_array))
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_vertex_array(
        &mut self,
        label: &str,
        streams: &[VertexStream],
    ) -> Result<VertexArrayHandle, GpuError> {
        let vertex_count = validate_streams(streams)?;
        let handle = VertexArrayHandle(self.names.next());
        self.vertex_arrays.insert(
            handle,
            VertexArrayObject {
                label: label.to_string(),
                vertex_count,
            },
        );
        self.stats.vertex_arrays_created += 1;
        Ok(handle)
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        if self.vertex_arrays.remove(&vertex_array).is_none() {
            self.raise(GpuError::InvalidValue(format!(
                "delete of unknown vertex array {}",
                vertex_array.raw()
            )));
            return;
        }
        if self.vertex_array == Some(vertex_array) {
            self.vertex_array = None;
        }
        self.stats.vertex_arrays_deleted += 1;
    }

    fn create_texture(&mut self, label: &str) -> TextureHandle {
        let handle = TextureHandle(self.names.next());
        self.textures.insert(
            handle,
            TextureObject {
                label: label.to_string(),
                desc: None,
            },
        );
        self.stats.textures_created += 1;
        handle
    }

    fn define_texture(
        &mut self,
        texture: TextureHandle,
        desc: TextureDesc,
        pixels: Option<&[u8]>,
    ) -> Result<(), GpuError> {
        desc.validate(pixels)?;
        let object = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| GpuError::InvalidValue(format!("unknown texture {}", texture.raw())))?;
        object.desc = Some(desc);
        self.stats.texture_definitions += 1;
        Ok(())
    }

    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(&texture).and_then(|t| t.desc)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_none() {
            self.raise(GpuError::InvalidValue(format!("delete of unknown texture {}", texture.raw())));
            return;
        }
        for fb in self.framebuffers.values_mut() {
            if fb.color == Some(texture) {
                fb.color = None;
            }
            if fb.depth == Some(texture) {
                fb.depth = None;
            }
        }
        self.units.retain(|_, bound| *bound != texture);
        self.stats.textures_deleted += 1;
    }

    fn create_framebuffer(&mut self, label: &str) -> FramebufferHandle {
        let handle = FramebufferHandle(self.names.next());
        self.framebuffers.insert(
            handle,
            FramebufferObject {
                label: label.to_string(),
                ..Default::default()
            },
        );
        self.stats.framebuffers_created += 1;
        handle
    }

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        texture: TextureHandle,
    ) -> Result<(), GpuError> {
        if !self.textures.contains_key(&texture) {
            return Err(GpuError::InvalidValue(format!("unknown texture {}", texture.raw())));
        }
        let fb = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or_else(|| GpuError::InvalidOperation(format!("unknown framebuffer {}", framebuffer.raw())))?;
        match attachment {
            Attachment::Color => fb.color = Some(texture),
            Attachment::Depth => fb.depth = Some(texture),
        }
        Ok(())
    }

    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::Incomplete("unknown framebuffer".into());
        };
        let desc = |texture: Option<TextureHandle>| texture.and_then(|t| self.texture_desc(t));
        if fb.color.is_some() && desc(fb.color).is_none() || fb.depth.is_some() && desc(fb.depth).is_none() {
            return FramebufferStatus::Incomplete("attachment has no storage".into());
        }
        framebuffer_status(desc(fb.color), desc(fb.depth))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer).is_none() {
            self.raise(GpuError::InvalidValue(format!(
                "delete of unknown framebuffer {}",
                framebuffer.raw()
            )));
            return;
        }
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
        self.stats.framebuffers_deleted += 1;
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramHandle, GpuError> {
        check_entry_point(desc.vertex_source, ShaderStage::Vertex)?;
        check_entry_point(desc.fragment_source, ShaderStage::Fragment)?;
        check_texture_units(desc)?;

        let handle = ProgramHandle(self.names.next());
        self.programs.insert(
            handle,
            ProgramObject {
                label: desc.label.to_string(),
                layout: UniformLayout::new(desc.uniforms),
                textures: desc.textures.to_vec(),
                values: HashMap::new(),
            },
        );
        self.stats.programs_created += 1;
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_none() {
            self.raise(GpuError::InvalidValue(format!("delete of unknown program {}", program.raw())));
            return;
        }
        // Like GL, a program in use stays bound until replaced; draws then fail.
        self.stats.programs_deleted += 1;
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let index = self.programs.get(&program)?.layout.index_of(name)?;
        Some(UniformLocation { program, index })
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        if let Some(fb) = framebuffer {
            if !self.framebuffers.contains_key(&fb) {
                self.raise(GpuError::InvalidOperation(format!("bind of unknown framebuffer {}", fb.raw())));
                return;
            }
        }
        self.framebuffer = framebuffer;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    fn viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.raise(GpuError::InvalidValue(format!("viewport {}x{}", width, height)));
            return;
        }
        self.viewport = (width, height);
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn depth_test_enabled(&self) -> bool {
        self.depth_test
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.depth_func = func;
    }

    fn cull_face(&mut self, mode: CullMode) {
        self.cull = mode;
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        if let Some(fb) = self.framebuffer {
            if let FramebufferStatus::Incomplete(reason) = self.framebuffer_status(fb) {
                self.raise(GpuError::IncompleteFramebuffer(reason));
                return;
            }
        }
        if color.is_some() || depth.is_some() {
            self.stats.clears += 1;
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        if let Some(p) = program {
            if !self.programs.contains_key(&p) {
                self.raise(GpuError::InvalidValue(format!("use of unknown program {}", p.raw())));
                return;
            }
        }
        self.program = program;
    }

    fn bound_program(&self) -> Option<ProgramHandle> {
        self.program
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if self.program != Some(location.program) {
            self.raise(GpuError::InvalidOperation(
                "uniform location does not belong to the bound program".into(),
            ));
            return;
        }
        let Some(program) = self.programs.get_mut(&location.program) else {
            self.raise(GpuError::InvalidOperation("bound program was deleted".into()));
            return;
        };
        let result = match program.layout.decl(location.index) {
            Some(decl) if decl.kind == value.kind() => {
                program.values.insert(decl.name.clone(), value);
                Ok(())
            }
            Some(decl) => Err(GpuError::InvalidOperation(format!(
                "uniform '{}' is {:?}, got {:?}",
                decl.name,
                decl.kind,
                value.kind()
            ))),
            None => Err(GpuError::InvalidOperation(format!("uniform index {} out of range", location.index))),
        };
        if let Err(error) = result {
            self.raise(error);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        if unit >= MAX_TEXTURE_UNITS {
            self.raise(GpuError::InvalidEnum(format!("texture unit {}", unit)));
            return;
        }
        match texture {
            Some(t) if !self.textures.contains_key(&t) => {
                self.raise(GpuError::InvalidValue(format!("bind of unknown texture {}", t.raw())));
            }
            Some(t) => {
                self.units.insert(unit, t);
            }
            None => {
                self.units.remove(&unit);
            }
        }
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>) {
        if let Some(v) = vertex_array {
            if !self.vertex_arrays.contains_key(&v) {
                self.raise(GpuError::InvalidOperation(format!("bind of unknown vertex array {}", v.raw())));
                return;
            }
        }
        self.vertex_array = vertex_array;
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) {
        let (program, vertex_array) = match self.validate_draw(first, count) {
            Ok(bound) => bound,
            Err(error) => {
                self.raise(error);
                return;
            }
        };
        if count == 0 {
            return;
        }
        let Some(object) = self.programs.get(&program) else {
            return;
        };
        let textures = object
            .textures
            .iter()
            .map(|slot| (slot.name.clone(), self.units.get(&slot.unit).copied()))
            .collect();
        self.frame_draws.push(DrawRecord {
            framebuffer: self.framebuffer,
            program,
            program_label: object.label.clone(),
            vertex_array,
            topology,
            first,
            count,
            viewport: self.viewport,
            depth_test: self.depth_test,
            depth_func: self.depth_func,
            textures,
            uniforms: object.values.clone(),
        });
        self.stats.draw_calls += 1;
    }

    fn take_error(&mut self) -> Option<GpuError> {
        self.errors.pop_front()
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = (width.max(1), height.max(1));
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn finish_frame(&mut self) -> Result<(), GpuError> {
        self.last_frame = std::mem::take(&mut self.frame_draws);
        self.stats.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{TextureFormat, UniformDecl, UniformKind};

    const VS: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }";
    const FS: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";

    fn triangle(device: &mut HeadlessDevice) -> VertexArrayHandle {
        let positions = [0.0f32; 9];
        device
            .create_vertex_array("tri", &[VertexStream { location: 0, components: 3, data: &positions }])
            .unwrap()
    }

    fn program(device: &mut HeadlessDevice, textures: &[TextureSlot]) -> ProgramHandle {
        let uniforms = [UniformDecl::new("flag", UniformKind::Int)];
        device
            .create_program(&ProgramDesc {
                label: "test",
                vertex_source: VS,
                fragment_source: FS,
                uniforms: &uniforms,
                textures,
            })
            .unwrap()
    }

    #[test]
    fn draw_without_program_is_an_error() {
        let mut device = HeadlessDevice::new(8, 8);
        let vao = triangle(&mut device);
        device.bind_vertex_array(Some(vao));
        device.draw_arrays(Topology::Triangles, 0, 3);
        assert!(matches!(device.take_error(), Some(GpuError::InvalidOperation(_))));
        assert_eq!(device.stats().draw_calls, 0);
    }

    #[test]
    fn out_of_range_draw_is_rejected() {
        let mut device = HeadlessDevice::new(8, 8);
        let vao = triangle(&mut device);
        let p = program(&mut device, &[]);
        device.use_program(Some(p));
        device.bind_vertex_array(Some(vao));
        device.draw_arrays(Topology::Triangles, 1, 3);
        assert!(matches!(device.take_error(), Some(GpuError::InvalidValue(_))));
        device.draw_arrays(Topology::Triangles, 0, 3);
        assert!(device.take_error().is_none());
        assert_eq!(device.pending_draws().len(), 1);
    }

    #[test]
    fn missing_entry_point_fails_to_compile() {
        let mut device = HeadlessDevice::new(8, 8);
        let result = device.create_program(&ProgramDesc {
            label: "broken",
            vertex_source: "fn main() {}",
            fragment_source: FS,
            uniforms: &[],
            textures: &[],
        });
        assert!(matches!(
            result,
            Err(GpuError::ShaderCompile { stage: ShaderStage::Vertex, .. })
        ));
    }

    #[test]
    fn uniforms_are_per_program_and_typed() {
        let mut device = HeadlessDevice::new(8, 8);
        let a = program(&mut device, &[]);
        let b = program(&mut device, &[]);
        let loc = device.uniform_location(a, "flag").unwrap();
        assert!(device.uniform_location(a, "missing").is_none());

        device.use_program(Some(b));
        device.set_uniform(loc, UniformValue::Int(1));
        assert!(matches!(device.take_error(), Some(GpuError::InvalidOperation(_))));

        device.use_program(Some(a));
        device.set_uniform(loc, UniformValue::Float(1.0));
        assert!(device.take_error().is_some());
        device.set_uniform(loc, UniformValue::Int(1));
        assert!(device.take_error().is_none());
    }

    #[test]
    fn double_delete_is_reported() {
        let mut device = HeadlessDevice::new(8, 8);
        let tex = device.create_texture("t");
        device.delete_texture(tex);
        assert!(device.take_error().is_none());
        device.delete_texture(tex);
        assert!(matches!(device.take_error(), Some(GpuError::InvalidValue(_))));
        assert_eq!(device.stats().live_textures(), 0);
    }

    #[test]
    fn sampling_an_attached_texture_is_a_feedback_loop() {
        let mut device = HeadlessDevice::new(8, 8);
        let depth = device.create_texture("depth");
        device
            .define_texture(depth, TextureDesc::new(8, 8, TextureFormat::Depth32), None)
            .unwrap();
        let fb = device.create_framebuffer("shadow");
        device.attach_texture(fb, Attachment::Depth, depth).unwrap();
        assert!(device.framebuffer_status(fb).is_complete());

        let vao = triangle(&mut device);
        let p = program(&mut device, &[TextureSlot::new("shadow_map", 2, SlotKind::Depth)]);
        device.use_program(Some(p));
        device.bind_vertex_array(Some(vao));
        device.bind_texture(2, Some(depth));
        device.bind_framebuffer(Some(fb));
        device.draw_arrays(Topology::Triangles, 0, 3);
        assert!(matches!(device.take_error(), Some(GpuError::InvalidOperation(_))));

        device.bind_framebuffer(None);
        device.draw_arrays(Topology::Triangles, 0, 3);
        assert!(device.take_error().is_none());
        assert_eq!(device.pending_draws()[0].texture("shadow_map"), Some(depth));
    }

    #[test]
    fn incomplete_framebuffer_blocks_clear_and_draw() {
        let mut device = HeadlessDevice::new(8, 8);
        let fb = device.create_framebuffer("empty");
        device.bind_framebuffer(Some(fb));
        device.clear(Some([0.0; 4]), Some(1.0));
        assert!(matches!(device.take_error(), Some(GpuError::IncompleteFramebuffer(_))));
    }

    #[test]
    fn redefining_keeps_the_handle() {
        let mut device = HeadlessDevice::new(8, 8);
        let tex = device.create_texture("color");
        device
            .define_texture(tex, TextureDesc::new(4, 4, TextureFormat::Rgba16Float), None)
            .unwrap();
        device
            .define_texture(tex, TextureDesc::new(16, 8, TextureFormat::Rgba16Float), None)
            .unwrap();
        assert_eq!(device.texture_desc(tex).map(|d| (d.width, d.height)), Some((16, 8)));
        assert_eq!(device.stats().textures_created, 1);
        assert!(device
            .define_texture(tex, TextureDesc::new(0, 8, TextureFormat::Rgba16Float), None)
            .is_err());
    }

    #[test]
    fn finish_frame_rotates_draw_log() {
        let mut device = HeadlessDevice::new(8, 8);
        let vao = triangle(&mut device);
        let p = program(&mut device, &[]);
        device.use_program(Some(p));
        device.bind_vertex_array(Some(vao));
        device.draw_arrays(Topology::Triangles, 0, 3);
        device.finish_frame().unwrap();
        assert_eq!(device.last_frame().len(), 1);
        assert!(device.pending_draws().is_empty());
        assert_eq!(device.stats().frames, 1);
    }
}
