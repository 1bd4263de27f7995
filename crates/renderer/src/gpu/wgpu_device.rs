//! [`GpuDevice`] on top of wgpu.
//!
//! State calls only update the bound state. Clears and draws are recorded into
//! passes: a new pass starts whenever the target framebuffer changes, or when a
//! clear follows draws on the same target. Uniform snapshots go into one staging
//! block per frame. `finish_frame` uploads the block, builds bind groups, encodes
//! every pass against the acquired surface texture, submits and presents.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    check_entry_point, check_texture_units, framebuffer_status, validate_streams, Attachment,
    CullMode, DepthFunc, FramebufferHandle, FramebufferStatus, GpuDevice, GpuError, NameAllocator,
    ProgramDesc, ProgramHandle, ShaderStage, SlotKind, TextureDesc, TextureFormat, TextureHandle,
    TextureSlot, Topology, UniformLayout, UniformLocation, UniformValue,
    VertexArrayHandle, VertexStream, FRAGMENT_ENTRY, MAX_TEXTURE_UNITS, VERTEX_ENTRY,
};

const SURFACE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

struct GpuVertexArray {
    buffers: Arc<Vec<wgpu::Buffer>>,
    /// (location, components) per buffer, in buffer order.
    layout: Vec<(u32, u32)>,
    vertex_count: u32,
}

struct GpuTexture {
    label: String,
    desc: Option<TextureDesc>,
    view: Option<Arc<wgpu::TextureView>>,
}

#[derive(Default)]
struct GpuFramebuffer {
    color: Option<TextureHandle>,
    depth: Option<TextureHandle>,
}

/// Layout objects shared by a program and the draws recorded with it.
struct ProgramBindings {
    uniforms: wgpu::BindGroupLayout,
    textures: Option<wgpu::BindGroupLayout>,
    uniform_size: u32,
}

struct GpuProgram {
    label: String,
    layout: UniformLayout,
    block: Vec<u8>,
    slots: Vec<TextureSlot>,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    bindings: Arc<ProgramBindings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    color: Option<wgpu::TextureFormat>,
    depth: Option<wgpu::TextureFormat>,
    depth_test: bool,
    depth_func: DepthFunc,
    cull: CullMode,
    topology: Topology,
    vertex_layout: Vec<(u32, u32)>,
}

enum ColorTarget {
    None,
    Surface,
    View(Arc<wgpu::TextureView>),
}

struct RecordedDraw {
    pipeline: Arc<wgpu::RenderPipeline>,
    program: ProgramHandle,
    bindings: Arc<ProgramBindings>,
    uniform_offset: u32,
    textures: Vec<(u32, SlotKind, Arc<wgpu::TextureView>)>,
    buffers: Arc<Vec<wgpu::Buffer>>,
    viewport: (u32, u32),
    first: u32,
    count: u32,
}

struct RecordedPass {
    framebuffer: Option<FramebufferHandle>,
    color: ColorTarget,
    depth: Option<Arc<wgpu::TextureView>>,
    size: (u32, u32),
    clear_color: Option<[f32; 4]>,
    clear_depth: Option<f32>,
    draws: Vec<RecordedDraw>,
}

/// Bound state, as GL would hold it.
struct BoundState {
    framebuffer: Option<FramebufferHandle>,
    viewport: (u32, u32),
    depth_test: bool,
    depth_func: DepthFunc,
    cull: CullMode,
    program: Option<ProgramHandle>,
    vertex_array: Option<VertexArrayHandle>,
    units: BTreeMap<u32, TextureHandle>,
}

/// The windowed backend.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    uniform_alignment: u32,

    names: NameAllocator,
    vertex_arrays: HashMap<VertexArrayHandle, GpuVertexArray>,
    textures: HashMap<TextureHandle, GpuTexture>,
    framebuffers: HashMap<FramebufferHandle, GpuFramebuffer>,
    programs: HashMap<ProgramHandle, GpuProgram>,
    pipelines: HashMap<PipelineKey, Arc<wgpu::RenderPipeline>>,

    color_sampler: wgpu::Sampler,
    depth_sampler: wgpu::Sampler,
    fallback_color: Arc<wgpu::TextureView>,
    fallback_depth: Arc<wgpu::TextureView>,
    surface_depth: Arc<wgpu::TextureView>,

    state: BoundState,
    passes: Vec<RecordedPass>,
    /// Index of the pass later draws append to, if still valid.
    open_pass: Option<usize>,
    staging: Vec<u8>,
    uniform_buffer: Option<wgpu::Buffer>,

    errors: VecDeque<GpuError>,
    uncaptured: Arc<Mutex<Vec<String>>>,
}

impl WgpuDevice {
    /// Create a device rendering into `window`.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("Failed to find suitable GPU adapter"))?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Scene Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let uncaptured = Arc::new(Mutex::new(Vec::new()));
        let sink = uncaptured.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("wgpu: {}", error);
            if let Ok(mut errors) = sink.lock() {
                errors.push(error.to_string());
            }
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("Surface reports no formats"))?;
        let present_mode = surface_caps
            .present_modes
            .iter()
            .find(|m| matches!(m, wgpu::PresentMode::Mailbox))
            .copied()
            .unwrap_or(wgpu::PresentMode::AutoVsync);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let color_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Color Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let depth_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Depth Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("Fallback White"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let fallback_color = Arc::new(white.create_view(&wgpu::TextureViewDescriptor::default()));
        let fallback_depth = Arc::new(Self::depth_view(&device, "Fallback Depth", 1, 1));
        let surface_depth = Arc::new(Self::depth_view(
            &device,
            "Surface Depth",
            config.width,
            config.height,
        ));
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment;

        Ok(Self {
            surface,
            device,
            queue,
            state: BoundState {
                framebuffer: None,
                viewport: (config.width, config.height),
                depth_test: false,
                depth_func: DepthFunc::Less,
                cull: CullMode::None,
                program: None,
                vertex_array: None,
                units: BTreeMap::new(),
            },
            config,
            uniform_alignment,
            names: NameAllocator::default(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            color_sampler,
            depth_sampler,
            fallback_color,
            fallback_depth,
            surface_depth,
            passes: Vec::new(),
            open_pass: None,
            staging: Vec::new(),
            uniform_buffer: None,
            errors: VecDeque::new(),
            uncaptured,
        })
    }

    fn depth_view(device: &wgpu::Device, label: &str, width: u32, height: u32) -> wgpu::TextureView {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: SURFACE_DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Switch between vsync'd and the lowest-latency present mode.
    pub fn set_vsync(&mut self, vsync: bool) {
        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        if self.config.present_mode != present_mode {
            self.config.present_mode = present_mode;
            self.surface.configure(&self.device, &self.config);
        }
    }

    fn raise(&mut self, error: GpuError) {
        log::debug!("gpu error: {}", error);
        self.errors.push_back(error);
    }

    /// Run `f` inside a validation error scope and report what it raised.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<String>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let error = pollster::block_on(self.device.pop_error_scope()).map(|e| e.to_string());
        (value, error)
    }

    fn texture_view(&self, texture: TextureHandle) -> Option<(TextureDesc, Arc<wgpu::TextureView>)> {
        let t = self.textures.get(&texture)?;
        Some((t.desc?, t.view.clone()?))
    }

    fn status_of(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::Incomplete("unknown framebuffer".into());
        };
        let desc = |texture: Option<TextureHandle>| texture.and_then(|t| self.textures.get(&t)?.desc);
        if fb.color.is_some() && desc(fb.color).is_none() || fb.depth.is_some() && desc(fb.depth).is_none() {
            return FramebufferStatus::Incomplete("attachment has no storage".into());
        }
        framebuffer_status(desc(fb.color), desc(fb.depth))
    }

    /// Start a pass on the bound framebuffer, with the given load ops.
    fn begin_pass(&mut self, clear_color: Option<[f32; 4]>, clear_depth: Option<f32>) -> Result<usize, GpuError> {
        let pass = match self.state.framebuffer {
            None => RecordedPass {
                framebuffer: None,
                color: ColorTarget::Surface,
                depth: Some(self.surface_depth.clone()),
                size: (self.config.width, self.config.height),
                clear_color,
                clear_depth,
                draws: Vec::new(),
            },
            Some(handle) => {
                if let FramebufferStatus::Incomplete(reason) = self.status_of(handle) {
                    return Err(GpuError::IncompleteFramebuffer(reason));
                }
                let fb = self
                    .framebuffers
                    .get(&handle)
                    .ok_or_else(|| GpuError::InvalidOperation("bound framebuffer was deleted".into()))?;
                let color = fb.color.and_then(|t| self.texture_view(t));
                let depth = fb.depth.and_then(|t| self.texture_view(t));
                let size = color
                    .as_ref()
                    .or(depth.as_ref())
                    .map(|(desc, _)| (desc.width, desc.height))
                    .unwrap_or((1, 1));
                RecordedPass {
                    framebuffer: Some(handle),
                    color: color.map_or(ColorTarget::None, |(_, view)| ColorTarget::View(view)),
                    depth: depth.map(|(_, view)| view),
                    size,
                    clear_color,
                    clear_depth,
                    draws: Vec::new(),
                }
            }
        };
        self.passes.push(pass);
        let index = self.passes.len() - 1;
        self.open_pass = Some(index);
        Ok(index)
    }

    fn pass_formats(&self, pass: &RecordedPass) -> (Option<wgpu::TextureFormat>, Option<wgpu::TextureFormat>) {
        let color = match pass.color {
            ColorTarget::None => None,
            ColorTarget::Surface => Some(self.config.format),
            ColorTarget::View(_) => pass
                .framebuffer
                .and_then(|fb| self.framebuffers.get(&fb)?.color)
                .and_then(|t| self.textures.get(&t)?.desc)
                .map(|d| d.format.to_wgpu()),
        };
        let depth = pass.depth.as_ref().map(|_| match pass.framebuffer {
            None => SURFACE_DEPTH_FORMAT,
            Some(_) => TextureFormat::Depth32.to_wgpu(),
        });
        (color, depth)
    }

    fn pipeline(&mut self, key: PipelineKey) -> Result<Arc<wgpu::RenderPipeline>, GpuError> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline.clone());
        }
        let program = self
            .programs
            .get(&key.program)
            .ok_or_else(|| GpuError::InvalidOperation("bound program was deleted".into()))?;

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
            .vertex_layout
            .iter()
            .map(|(location, components)| {
                let format = match components {
                    2 => wgpu::VertexFormat::Float32x2,
                    3 => wgpu::VertexFormat::Float32x3,
                    _ => wgpu::VertexFormat::Float32x4,
                };
                [wgpu::VertexAttribute {
                    format,
                    offset: 0,
                    shader_location: *location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = key
            .vertex_layout
            .iter()
            .zip(&attributes)
            .map(|((_, components), attribute)| wgpu::VertexBufferLayout {
                array_stride: (*components as u64) * 4,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attribute,
            })
            .collect();
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color
            .map(|format| wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
            .into_iter()
            .map(Some)
            .collect();
        let topology = match key.topology {
            Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
            Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        };
        let cull_mode = match key.cull {
            CullMode::None => None,
            CullMode::Back => Some(wgpu::Face::Back),
            CullMode::Front => Some(wgpu::Face::Front),
        };

        let (pipeline, error) = self.scoped(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&program.label),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some(VERTEX_ENTRY),
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: Some(FRAGMENT_ENTRY),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: key.depth.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: key.depth_test,
                    depth_compare: if key.depth_test {
                        key.depth_func.to_wgpu()
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });
        if let Some(message) = error {
            return Err(GpuError::Link(format!("{}: {}", program.label, message)));
        }
        let pipeline = Arc::new(pipeline);
        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    fn record_draw(&mut self, topology: Topology, first: u32, count: u32) -> Result<(), GpuError> {
        let program_handle = self
            .state
            .program
            .ok_or_else(|| GpuError::InvalidOperation("draw with no program bound".into()))?;
        let vao_handle = self
            .state
            .vertex_array
            .ok_or_else(|| GpuError::InvalidOperation("draw with no vertex array bound".into()))?;
        let vao = self
            .vertex_arrays
            .get(&vao_handle)
            .ok_or_else(|| GpuError::InvalidOperation("bound vertex array was deleted".into()))?;
        if first.checked_add(count).map_or(true, |end| end > vao.vertex_count) {
            return Err(GpuError::InvalidValue(format!(
                "draw {}..{} exceeds {} vertices",
                first,
                first.saturating_add(count),
                vao.vertex_count
            )));
        }
        let (buffers, vertex_layout) = (vao.buffers.clone(), vao.layout.clone());
        if count == 0 {
            return Ok(());
        }

        let attached: Vec<TextureHandle> = self
            .state
            .framebuffer
            .and_then(|fb| self.framebuffers.get(&fb))
            .map(|fb| fb.color.into_iter().chain(fb.depth).collect())
            .unwrap_or_default();
        let program = self
            .programs
            .get(&program_handle)
            .ok_or_else(|| GpuError::InvalidOperation("bound program was deleted".into()))?;
        let mut textures = Vec::with_capacity(program.slots.len());
        for slot in &program.slots {
            let view = match self.state.units.get(&slot.unit) {
                None => match slot.kind {
                    SlotKind::Color => self.fallback_color.clone(),
                    SlotKind::Depth => self.fallback_depth.clone(),
                },
                Some(texture) => {
                    if attached.contains(texture) {
                        return Err(GpuError::InvalidOperation(format!(
                            "texture bound to '{}' is attached to the target framebuffer",
                            slot.name
                        )));
                    }
                    let (desc, view) = self.texture_view(*texture).ok_or_else(|| {
                        GpuError::InvalidOperation(format!("texture bound to '{}' has no storage", slot.name))
                    })?;
                    if desc.format.is_depth() != (slot.kind == SlotKind::Depth) {
                        return Err(GpuError::InvalidOperation(format!(
                            "'{}' expects a {:?} texture, got {:?}",
                            slot.name, slot.kind, desc.format
                        )));
                    }
                    view
                }
            };
            textures.push((slot.unit, slot.kind, view));
        }

        let offset = self.staging.len().div_ceil(self.uniform_alignment as usize) * self.uniform_alignment as usize;
        self.staging.resize(offset, 0);
        self.staging.extend_from_slice(&program.block);
        let bindings = program.bindings.clone();

        let index = match self.open_pass {
            Some(index) => index,
            None => self.begin_pass(None, None)?,
        };
        let (color, depth) = self.pass_formats(&self.passes[index]);
        let pipeline = self.pipeline(PipelineKey {
            program: program_handle,
            color,
            depth,
            depth_test: self.state.depth_test,
            depth_func: self.state.depth_func,
            cull: self.state.cull,
            topology,
            vertex_layout,
        })?;

        let pass = &mut self.passes[index];
        let viewport = (
            self.state.viewport.0.min(pass.size.0),
            self.state.viewport.1.min(pass.size.1),
        );
        pass.draws.push(RecordedDraw {
            pipeline,
            program: program_handle,
            bindings,
            uniform_offset: offset as u32,
            textures,
            buffers,
            viewport,
            first,
            count,
        });
        Ok(())
    }

    /// Upload the frame's uniform snapshots, growing the buffer when needed.
    fn upload_uniforms(&mut self) -> bool {
        if self.staging.is_empty() {
            return false;
        }
        // Room for the last binding window past the final offset.
        let needed = (self.staging.len() as u64 + 256).next_power_of_two();
        if self.uniform_buffer.as_ref().map_or(true, |b| b.size() < needed) {
            self.uniform_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Uniform Snapshots"),
                size: needed,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        match &self.uniform_buffer {
            Some(buffer) => {
                self.queue.write_buffer(buffer, 0, &self.staging);
                true
            }
            None => false,
        }
    }

    fn encode(&mut self, surface_view: &wgpu::TextureView) -> wgpu::CommandBuffer {
        let passes = std::mem::take(&mut self.passes);
        let uniform_buffer = if self.upload_uniforms() {
            self.uniform_buffer.as_ref()
        } else {
            None
        };
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        let mut uniform_groups: HashMap<ProgramHandle, wgpu::BindGroup> = HashMap::new();
        for pass in &passes {
            let mut texture_groups = Vec::with_capacity(pass.draws.len());
            for draw in &pass.draws {
                if let Some(buffer) = uniform_buffer {
                    uniform_groups.entry(draw.program).or_insert_with(|| {
                        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some("Uniform Bind Group"),
                            layout: &draw.bindings.uniforms,
                            entries: &[wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                    buffer,
                                    offset: 0,
                                    size: NonZeroU64::new(draw.bindings.uniform_size as u64),
                                }),
                            }],
                        })
                    });
                }
                let group = draw.bindings.textures.as_ref().map(|layout| {
                    let entries: Vec<wgpu::BindGroupEntry> = draw
                        .textures
                        .iter()
                        .flat_map(|(unit, kind, view)| {
                            let sampler = match kind {
                                SlotKind::Color => &self.color_sampler,
                                SlotKind::Depth => &self.depth_sampler,
                            };
                            [
                                wgpu::BindGroupEntry {
                                    binding: unit * 2,
                                    resource: wgpu::BindingResource::TextureView(view),
                                },
                                wgpu::BindGroupEntry {
                                    binding: unit * 2 + 1,
                                    resource: wgpu::BindingResource::Sampler(sampler),
                                },
                            ]
                        })
                        .collect();
                    self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("Texture Bind Group"),
                        layout,
                        entries: &entries,
                    })
                });
                texture_groups.push(group);
            }

            let color_view = match &pass.color {
                ColorTarget::None => None,
                ColorTarget::Surface => Some(surface_view),
                ColorTarget::View(view) => Some(view.as_ref()),
            };
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_view
                .map(|view| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match pass.clear_color {
                        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
                })
                .into_iter()
                .map(Some)
                .collect();
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Recorded Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: pass.depth.as_ref().map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view: view.as_ref(),
                    depth_ops: Some(wgpu::Operations {
                        load: match pass.clear_depth {
                            Some(depth) => wgpu::LoadOp::Clear(depth),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (draw, texture_group) in pass.draws.iter().zip(&texture_groups) {
                let Some(uniform_group) = uniform_groups.get(&draw.program) else {
                    continue;
                };
                render_pass.set_pipeline(&draw.pipeline);
                render_pass.set_viewport(0.0, 0.0, draw.viewport.0 as f32, draw.viewport.1 as f32, 0.0, 1.0);
                render_pass.set_bind_group(0, uniform_group, &[draw.uniform_offset]);
                if let Some(group) = texture_group {
                    render_pass.set_bind_group(1, group, &[]);
                }
                for (slot, buffer) in draw.buffers.iter().enumerate() {
                    render_pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                render_pass.draw(draw.first..draw.first + draw.count, 0..1);
            }
        }
        self.staging.clear();
        encoder.finish()
    }
}

impl GpuDevice for WgpuDevice {
    fn create_vertex_array(
        &mut self,
        label: &str,
        streams: &[VertexStream],
    ) -> Result<VertexArrayHandle, GpuError> {
        let vertex_count = validate_streams(streams)?;
        let buffers = streams
            .iter()
            .map(|stream| {
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(stream.data),
                    usage: wgpu::BufferUsages::VERTEX,
                })
            })
            .collect();
        let handle = VertexArrayHandle(self.names.next());
        self.vertex_arrays.insert(
            handle,
            GpuVertexArray {
                buffers: Arc::new(buffers),
                layout: streams.iter().map(|s| (s.location, s.components)).collect(),
                vertex_count,
            },
        );
        Ok(handle)
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        if self.vertex_arrays.remove(&vertex_array).is_none() {
            self.raise(GpuError::InvalidValue(format!(
                "delete of unknown vertex array {}",
                vertex_array.raw()
            )));
        } else if self.state.vertex_array == Some(vertex_array) {
            self.state.vertex_array = None;
        }
    }

    fn create_texture(&mut self, label: &str) -> TextureHandle {
        let handle = TextureHandle(self.names.next());
        self.textures.insert(
            handle,
            GpuTexture {
                label: label.to_string(),
                desc: None,
                view: None,
            },
        );
        handle
    }

    fn define_texture(
        &mut self,
        texture: TextureHandle,
        desc: TextureDesc,
        pixels: Option<&[u8]>,
    ) -> Result<(), GpuError> {
        desc.validate(pixels)?;
        let label = self
            .textures
            .get(&texture)
            .map(|t| t.label.clone())
            .ok_or_else(|| GpuError::InvalidValue(format!("unknown texture {}", texture.raw())))?;

        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let gpu_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        if let Some(pixels) = pixels {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &gpu_texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(desc.format.bytes_per_texel() * desc.width),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }
        let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        if let Some(entry) = self.textures.get_mut(&texture) {
            entry.desc = Some(desc);
            entry.view = Some(Arc::new(view));
        }
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
        self.state.units.retain(|_, bound| *bound != texture);
    }

    fn create_framebuffer(&mut self, _label: &str) -> FramebufferHandle {
        let handle = FramebufferHandle(self.names.next());
        self.framebuffers.insert(handle, GpuFramebuffer::default());
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
        if self.state.framebuffer == Some(framebuffer) {
            self.open_pass = None;
        }
        Ok(())
    }

    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        self.status_of(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer).is_none() {
            self.raise(GpuError::InvalidValue(format!(
                "delete of unknown framebuffer {}",
                framebuffer.raw()
            )));
            return;
        }
        if self.state.framebuffer == Some(framebuffer) {
            self.state.framebuffer = None;
            self.open_pass = None;
        }
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramHandle, GpuError> {
        check_entry_point(desc.vertex_source, ShaderStage::Vertex)?;
        check_entry_point(desc.fragment_source, ShaderStage::Fragment)?;
        check_texture_units(desc)?;

        let compile = |stage: ShaderStage, source: &str| {
            let (module, error) = self.scoped(|device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(desc.label),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
            });
            match error {
                Some(message) => Err(GpuError::ShaderCompile { stage, message }),
                None => Ok(module),
            }
        };
        let vertex = compile(ShaderStage::Vertex, desc.vertex_source)?;
        let fragment = compile(ShaderStage::Fragment, desc.fragment_source)?;

        let layout = UniformLayout::new(desc.uniforms);
        let uniforms = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(layout.size() as u64),
                },
                count: None,
            }],
        });
        let textures = (!desc.textures.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
                .textures
                .iter()
                .flat_map(|slot| {
                    let (sample_type, sampler) = match slot.kind {
                        SlotKind::Color => (
                            wgpu::TextureSampleType::Float { filterable: true },
                            wgpu::SamplerBindingType::Filtering,
                        ),
                        SlotKind::Depth => (
                            wgpu::TextureSampleType::Depth,
                            wgpu::SamplerBindingType::NonFiltering,
                        ),
                    };
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: slot.unit * 2,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type,
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: slot.unit * 2 + 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(sampler),
                            count: None,
                        },
                    ]
                })
                .collect();
            self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Texture Layout"),
                entries: &entries,
            })
        });
        let group_layouts: Vec<&wgpu::BindGroupLayout> =
            std::iter::once(&uniforms).chain(textures.as_ref()).collect();
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &group_layouts,
            push_constant_ranges: &[],
        });

        let handle = ProgramHandle(self.names.next());
        self.programs.insert(
            handle,
            GpuProgram {
                label: desc.label.to_string(),
                block: vec![0; layout.size() as usize],
                bindings: Arc::new(ProgramBindings {
                    uniforms,
                    textures,
                    uniform_size: layout.size(),
                }),
                layout,
                slots: desc.textures.to_vec(),
                vertex,
                fragment,
                pipeline_layout,
            },
        );
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_none() {
            self.raise(GpuError::InvalidValue(format!("delete of unknown program {}", program.raw())));
            return;
        }
        self.pipelines.retain(|key, _| key.program != program);
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
        if self.state.framebuffer != framebuffer {
            self.open_pass = None;
        }
        self.state.framebuffer = framebuffer;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.state.framebuffer
    }

    fn viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.raise(GpuError::InvalidValue(format!("viewport {}x{}", width, height)));
            return;
        }
        self.state.viewport = (width, height);
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
    }

    fn depth_test_enabled(&self) -> bool {
        self.state.depth_test
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.state.depth_func = func;
    }

    fn cull_face(&mut self, mode: CullMode) {
        self.state.cull = mode;
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        if color.is_none() && depth.is_none() {
            return;
        }
        match self.open_pass.and_then(|i| self.passes.get_mut(i)) {
            Some(pass) if pass.draws.is_empty() => {
                pass.clear_color = color.or(pass.clear_color);
                pass.clear_depth = depth.or(pass.clear_depth);
            }
            _ => {
                if let Err(error) = self.begin_pass(color, depth) {
                    self.raise(error);
                }
            }
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        if let Some(p) = program {
            if !self.programs.contains_key(&p) {
                self.raise(GpuError::InvalidValue(format!("use of unknown program {}", p.raw())));
                return;
            }
        }
        self.state.program = program;
    }

    fn bound_program(&self) -> Option<ProgramHandle> {
        self.state.program
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if self.state.program != Some(location.program) {
            self.raise(GpuError::InvalidOperation(
                "uniform location does not belong to the bound program".into(),
            ));
            return;
        }
        let result = match self.programs.get_mut(&location.program) {
            Some(program) => program.layout.write(&mut program.block, location.index, value),
            None => Err(GpuError::InvalidOperation("bound program was deleted".into())),
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
                self.state.units.insert(unit, t);
            }
            None => {
                self.state.units.remove(&unit);
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
        self.state.vertex_array = vertex_array;
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) {
        if let Err(error) = self.record_draw(topology, first, count) {
            self.raise(error);
        }
    }

    fn take_error(&mut self) -> Option<GpuError> {
        if let Ok(mut uncaptured) = self.uncaptured.lock() {
            self.errors
                .extend(uncaptured.drain(..).map(GpuError::Device));
        }
        self.errors.pop_front()
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.surface_depth = Arc::new(Self::depth_view(&self.device, "Surface Depth", width, height));
        if self.state.framebuffer.is_none() {
            self.open_pass = None;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn finish_frame(&mut self) -> Result<(), GpuError> {
        self.open_pass = None;
        if self.passes.is_empty() {
            return Ok(());
        }
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::warn!("Surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.passes.clear();
                self.staging.clear();
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.passes.clear();
                self.staging.clear();
                return Err(GpuError::OutOfMemory("surface acquire".into()));
            }
            Err(error) => {
                log::warn!("Skipping frame: {}", error);
                self.passes.clear();
                self.staging.clear();
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let commands = self.encode(&view);
        self.queue.submit(std::iter::once(commands));
        output.present();
        Ok(())
    }
}
