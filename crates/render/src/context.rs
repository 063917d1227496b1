//! Boundary between the state cache and a concrete graphics device.
//!
//! The renderer never talks to a graphics API directly. Everything it needs
//! from the device goes through [`GraphicsContext`]; everything it needs from
//! a presentation surface goes through [`RenderTarget`].

use std::rc::Rc;

use forge_common::{Color, Rect};
use glam::Mat4;

use crate::buffer::{AttributeType, BufferId, BufferKind, IndexType};
use crate::error::RenderError;
use crate::states::RenderStates;
use crate::texture::{TextureId, TextureKind, TextureSampler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

/// Opaque device vertex-array object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayHandle(pub u32);

/// Shader-specific binding slot for a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub i32);

/// Uniforms the renderer feeds automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderUniform {
    ProjMatrix,
    ViewMatrix,
    WorldMatrix,
    ViewProjMatrix,
    WorldViewMatrix,
    WorldViewProjMatrix,
}

/// A linked shader program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shader {
    pub id: ShaderId,
    pub compiled: bool,
}

impl Shader {
    pub fn new(id: ShaderId) -> Rc<Self> {
        Rc::new(Self { id, compiled: true })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    LineList,
    LineStrip,
    PointList,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearFlags {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl ClearFlags {
    pub const ALL: Self = Self {
        color: true,
        depth: true,
        stencil: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.color || self.depth || self.stencil)
    }
}

/// Format of one enabled vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub components: u32,
    pub ty: AttributeType,
    pub normalized: bool,
    pub stride: u32,
    pub offset: u32,
    /// Per-instance advance rate; `0` advances per vertex.
    pub divisor: u32,
}

/// Extensions and limits reported by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceInfo {
    pub anisotropic_filter: bool,
    pub fp64: bool,
    pub draw_instanced: bool,
    pub instanced_arrays: bool,
    pub frag_data_location: bool,
    pub pixel_buffer_object: bool,
    pub framebuffer_object: bool,
    pub sampler_objects: bool,
    pub vertex_array_objects: bool,
    pub max_anisotropy: f32,
    pub max_draw_buffers: u32,
    pub max_combined_texture_units: u32,
    pub max_vertex_attribs: u32,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            anisotropic_filter: true,
            fp64: false,
            draw_instanced: true,
            instanced_arrays: true,
            frag_data_location: true,
            pixel_buffer_object: true,
            framebuffer_object: true,
            sampler_objects: true,
            vertex_array_objects: true,
            max_anisotropy: 16.0,
            max_draw_buffers: 8,
            max_combined_texture_units: 32,
            max_vertex_attribs: 16,
        }
    }
}

/// A stateful graphics device context.
///
/// Calls are fire-and-forget except buffer management, which can fail.
pub trait GraphicsContext {
    fn id(&self) -> ContextId;
    fn device_info(&self) -> DeviceInfo;

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> Result<BufferId, RenderError>;
    fn fill_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), RenderError>;
    fn delete_buffer(&mut self, buffer: BufferId);
    fn bind_buffer(&mut self, kind: BufferKind, buffer: Option<BufferId>);

    fn bind_shader(&mut self, shader: ShaderId);
    fn uniform_location(&self, shader: ShaderId, uniform: ShaderUniform) -> Option<UniformLocation>;
    fn send_matrix(&mut self, location: UniformLocation, matrix: &Mat4);
    /// Bind textures the shader owns itself (material uniforms).
    fn bind_shader_textures(&mut self, shader: ShaderId);

    fn bind_texture(&mut self, unit: u32, texture: TextureId, kind: TextureKind);
    /// Bind a sampler object to a unit, independent of the texture.
    fn bind_sampler(&mut self, unit: u32, sampler: &TextureSampler);
    /// Write sampling parameters into the texture object itself.
    fn apply_sampler(&mut self, unit: u32, texture: TextureId, sampler: &TextureSampler);

    fn create_vertex_array(&mut self) -> VertexArrayHandle;
    fn delete_vertex_array(&mut self, handle: VertexArrayHandle);
    fn bind_vertex_array(&mut self, handle: Option<VertexArrayHandle>);
    fn enable_vertex_attribute(&mut self, index: u32, attribute: &VertexAttribute);
    fn disable_vertex_attribute(&mut self, index: u32);

    fn apply_states(&mut self, states: &RenderStates);

    fn clear(&mut self, flags: ClearFlags);
    fn set_clear_color(&mut self, color: Color);
    fn set_clear_depth(&mut self, depth: f64);
    fn set_clear_stencil(&mut self, value: u32);
    /// `rect` uses a bottom-left origin.
    fn set_scissor(&mut self, rect: Rect);
    /// `rect` uses a bottom-left origin.
    fn set_viewport(&mut self, rect: Rect);

    fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: Option<u32>);
    fn draw_elements(
        &mut self,
        mode: PrimitiveMode,
        count: u32,
        index_type: IndexType,
        offset: usize,
        instances: Option<u32>,
    );
    fn flush(&mut self);
}

/// A surface draws can be directed to (window, render texture).
pub trait RenderTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn is_renderable(&self) -> bool;
    /// Whether the target carries its own context and stays active.
    fn has_context(&self) -> bool;
    fn activate(&self) -> bool;
    fn deactivate(&self);
}
