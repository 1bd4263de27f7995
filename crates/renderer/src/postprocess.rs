//! Offscreen scene target and the full-screen quad that composites it.

use crate::error::{RenderError, RenderResult};
use crate::gpu::{
    Attachment, FramebufferHandle, FramebufferStatus, GpuDevice, TextureDesc, TextureFormat,
    TextureHandle, Topology, VertexArrayHandle, VertexStream,
};

/// Corners of clip space, drawn as a 4-vertex triangle strip.
const QUAD_CORNERS: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

/// Full-screen quad uploaded once at init.
#[derive(Debug, Default)]
pub struct ScreenQuad {
    vertex_array: Option<VertexArrayHandle>,
}

impl ScreenQuad {
    pub const TOPOLOGY: Topology = Topology::TriangleStrip;
    pub const VERTEX_COUNT: u32 = 4;

    pub fn init(device: &mut dyn GpuDevice) -> RenderResult<Self> {
        let vertex_array = device.create_vertex_array(
            "screen quad",
            &[VertexStream {
                location: 0,
                components: 2,
                data: &QUAD_CORNERS,
            }],
        )?;
        Ok(Self {
            vertex_array: Some(vertex_array),
        })
    }

    pub fn vertex_array(&self) -> Option<VertexArrayHandle> {
        self.vertex_array
    }

    pub fn draw(&self, device: &mut dyn GpuDevice) {
        device.bind_vertex_array(self.vertex_array);
        device.draw_arrays(Self::TOPOLOGY, 0, Self::VERTEX_COUNT);
        device.bind_vertex_array(None);
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(vertex_array) = self.vertex_array.take() {
            device.delete_vertex_array(vertex_array);
        }
    }
}

/// Half-float color plus depth at the screen size. The geometry pass renders
/// here; the post-process pass samples the color.
#[derive(Debug)]
pub struct OffscreenTarget {
    framebuffer: FramebufferHandle,
    color: TextureHandle,
    depth: TextureHandle,
    width: u32,
    height: u32,
    released: bool,
}

impl OffscreenTarget {
    pub const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
    pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32;

    /// Allocate the handles and size them to `width` x `height`.
    pub fn create(device: &mut dyn GpuDevice, width: u32, height: u32) -> RenderResult<Self> {
        let mut target = Self {
            color: device.create_texture("offscreen color"),
            depth: device.create_texture("offscreen depth"),
            framebuffer: device.create_framebuffer("offscreen"),
            width: 0,
            height: 0,
            released: false,
        };
        target.resize(device, width, height)?;
        Ok(target)
    }

    /// Redefine storage at the new size. Handles never change.
    pub fn resize(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> RenderResult<()> {
        if self.released {
            return Err(RenderError::NotInitialized);
        }
        if (width, height) == (self.width, self.height) {
            log::debug!("Offscreen target already {}x{}", width, height);
            return Ok(());
        }
        let color = TextureDesc::new(width, height, Self::COLOR_FORMAT);
        let depth = TextureDesc::new(width, height, Self::DEPTH_FORMAT);
        color.validate(None)?;
        depth.validate(None)?;

        device.define_texture(self.color, color, None)?;
        if let Err(error) = device.define_texture(self.depth, depth, None) {
            // Color and depth must stay the same size.
            let previous = TextureDesc::new(self.width, self.height, Self::COLOR_FORMAT);
            if let Err(restore) = device.define_texture(self.color, previous, None) {
                log::error!("Offscreen color could not be restored to {}x{}: {}", self.width, self.height, restore);
            }
            return Err(error.into());
        }
        device.attach_texture(self.framebuffer, Attachment::Color, self.color)?;
        device.attach_texture(self.framebuffer, Attachment::Depth, self.depth)?;

        if let FramebufferStatus::Incomplete(reason) = device.framebuffer_status(self.framebuffer) {
            return Err(RenderError::IncompleteFramebuffer {
                label: "offscreen".to_string(),
                reason,
            });
        }
        self.width = width;
        self.height = height;
        log::info!("Offscreen target sized to {}x{}", width, height);
        Ok(())
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn color_texture(&self) -> TextureHandle {
        self.color
    }

    pub fn depth_texture(&self) -> TextureHandle {
        self.depth
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        device.delete_framebuffer(self.framebuffer);
        device.delete_texture(self.color);
        device.delete_texture(self.depth);
    }
}
