//! Command-recording graphics context.
//!
//! Stands in for a real device: every call is appended to a shared
//! [`CommandLog`] so callers can inspect exactly what the state cache issued.
//! Used by the test suite, the benchmarks and the CLI demo.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use forge_common::{Color, Rect};
use glam::Mat4;

use crate::buffer::{BufferId, BufferKind, IndexType};
use crate::context::{
    ClearFlags, ContextId, DeviceInfo, GraphicsContext, PrimitiveMode, RenderTarget, ShaderId,
    ShaderUniform, UniformLocation, VertexArrayHandle, VertexAttribute,
};
use crate::error::RenderError;
use crate::states::RenderStates;
use crate::texture::{TextureId, TextureKind, TextureSampler};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateBuffer { kind: BufferKind, size: usize, buffer: BufferId },
    FillBuffer { buffer: BufferId, offset: usize, len: usize },
    DeleteBuffer(BufferId),
    BindBuffer { kind: BufferKind, buffer: Option<BufferId> },
    BindShader(ShaderId),
    SendMatrix { location: UniformLocation, matrix: Mat4 },
    BindShaderTextures(ShaderId),
    BindTexture { unit: u32, texture: TextureId },
    BindSampler { unit: u32, sampler: TextureSampler },
    ApplySampler { unit: u32, texture: TextureId, sampler: TextureSampler },
    CreateVertexArray(VertexArrayHandle),
    DeleteVertexArray(VertexArrayHandle),
    BindVertexArray(Option<VertexArrayHandle>),
    EnableAttribute { index: u32, attribute: VertexAttribute },
    DisableAttribute(u32),
    ApplyStates(Box<RenderStates>),
    Clear(ClearFlags),
    SetClearColor(Color),
    SetClearDepth(f64),
    SetClearStencil(u32),
    SetScissor(Rect),
    SetViewport(Rect),
    DrawArrays {
        mode: PrimitiveMode,
        first: u32,
        count: u32,
        instances: Option<u32>,
    },
    DrawElements {
        mode: PrimitiveMode,
        count: u32,
        index_type: IndexType,
        offset: usize,
        instances: Option<u32>,
    },
    Flush,
}

/// Shared, clonable view of the commands a [`RecordingContext`] received.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Rc<RefCell<Vec<GpuCommand>>>);

impl CommandLog {
    pub fn commands(&self) -> Vec<GpuCommand> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn count(&self, predicate: impl Fn(&GpuCommand) -> bool) -> usize {
        self.0.borrow().iter().filter(|c| predicate(c)).count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    fn push(&self, command: GpuCommand) {
        tracing::trace!(?command, "gpu command");
        self.0.borrow_mut().push(command);
    }
}

#[derive(Debug)]
pub struct RecordingContext {
    id: ContextId,
    info: DeviceInfo,
    log: CommandLog,
    uniforms: HashMap<(ShaderId, ShaderUniform), UniformLocation>,
    max_buffer_size: Option<usize>,
    next_buffer: u32,
    next_vertex_array: u32,
}

impl RecordingContext {
    pub fn new(id: u64) -> Self {
        Self::with_device(id, DeviceInfo::default())
    }

    pub fn with_device(id: u64, info: DeviceInfo) -> Self {
        Self {
            id: ContextId(id),
            info,
            log: CommandLog::default(),
            uniforms: HashMap::new(),
            max_buffer_size: None,
            next_buffer: 1,
            next_vertex_array: 1,
        }
    }

    /// Declare the uniforms a shader exposes, with their locations.
    pub fn with_uniforms(mut self, shader: ShaderId, uniforms: &[(ShaderUniform, i32)]) -> Self {
        for &(uniform, location) in uniforms {
            self.uniforms.insert((shader, uniform), UniformLocation(location));
        }
        self
    }

    /// Refuse buffer allocations larger than `bytes`.
    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = Some(bytes);
        self
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }
}

impl GraphicsContext for RecordingContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn device_info(&self) -> DeviceInfo {
        self.info
    }

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> Result<BufferId, RenderError> {
        if self.max_buffer_size.is_some_and(|max| size > max) {
            return Err(RenderError::BufferCreation(format!(
                "out of device memory ({size} bytes)"
            )));
        }
        let buffer = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.log.push(GpuCommand::CreateBuffer { kind, size, buffer });
        Ok(buffer)
    }

    fn fill_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), RenderError> {
        self.log.push(GpuCommand::FillBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.log.push(GpuCommand::DeleteBuffer(buffer));
    }

    fn bind_buffer(&mut self, kind: BufferKind, buffer: Option<BufferId>) {
        self.log.push(GpuCommand::BindBuffer { kind, buffer });
    }

    fn bind_shader(&mut self, shader: ShaderId) {
        self.log.push(GpuCommand::BindShader(shader));
    }

    fn uniform_location(&self, shader: ShaderId, uniform: ShaderUniform) -> Option<UniformLocation> {
        self.uniforms.get(&(shader, uniform)).copied()
    }

    fn send_matrix(&mut self, location: UniformLocation, matrix: &Mat4) {
        self.log.push(GpuCommand::SendMatrix {
            location,
            matrix: *matrix,
        });
    }

    fn bind_shader_textures(&mut self, shader: ShaderId) {
        self.log.push(GpuCommand::BindShaderTextures(shader));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId, _kind: TextureKind) {
        self.log.push(GpuCommand::BindTexture { unit, texture });
    }

    fn bind_sampler(&mut self, unit: u32, sampler: &TextureSampler) {
        self.log.push(GpuCommand::BindSampler {
            unit,
            sampler: *sampler,
        });
    }

    fn apply_sampler(&mut self, unit: u32, texture: TextureId, sampler: &TextureSampler) {
        self.log.push(GpuCommand::ApplySampler {
            unit,
            texture,
            sampler: *sampler,
        });
    }

    fn create_vertex_array(&mut self) -> VertexArrayHandle {
        let handle = VertexArrayHandle(self.next_vertex_array);
        self.next_vertex_array += 1;
        self.log.push(GpuCommand::CreateVertexArray(handle));
        handle
    }

    fn delete_vertex_array(&mut self, handle: VertexArrayHandle) {
        self.log.push(GpuCommand::DeleteVertexArray(handle));
    }

    fn bind_vertex_array(&mut self, handle: Option<VertexArrayHandle>) {
        self.log.push(GpuCommand::BindVertexArray(handle));
    }

    fn enable_vertex_attribute(&mut self, index: u32, attribute: &VertexAttribute) {
        self.log.push(GpuCommand::EnableAttribute {
            index,
            attribute: *attribute,
        });
    }

    fn disable_vertex_attribute(&mut self, index: u32) {
        self.log.push(GpuCommand::DisableAttribute(index));
    }

    fn apply_states(&mut self, states: &RenderStates) {
        self.log.push(GpuCommand::ApplyStates(Box::new(states.clone())));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.log.push(GpuCommand::Clear(flags));
    }

    fn set_clear_color(&mut self, color: Color) {
        self.log.push(GpuCommand::SetClearColor(color));
    }

    fn set_clear_depth(&mut self, depth: f64) {
        self.log.push(GpuCommand::SetClearDepth(depth));
    }

    fn set_clear_stencil(&mut self, value: u32) {
        self.log.push(GpuCommand::SetClearStencil(value));
    }

    fn set_scissor(&mut self, rect: Rect) {
        self.log.push(GpuCommand::SetScissor(rect));
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.log.push(GpuCommand::SetViewport(rect));
    }

    fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: Option<u32>) {
        self.log.push(GpuCommand::DrawArrays {
            mode,
            first,
            count,
            instances,
        });
    }

    fn draw_elements(
        &mut self,
        mode: PrimitiveMode,
        count: u32,
        index_type: IndexType,
        offset: usize,
        instances: Option<u32>,
    ) {
        self.log.push(GpuCommand::DrawElements {
            mode,
            count,
            index_type,
            offset,
            instances,
        });
    }

    fn flush(&mut self) {
        self.log.push(GpuCommand::Flush);
    }
}

/// Offscreen target with a fixed size that counts its activations.
#[derive(Debug)]
pub struct OffscreenTarget {
    width: u32,
    height: u32,
    renderable: bool,
    activations: std::cell::Cell<u32>,
}

impl OffscreenTarget {
    pub fn new(width: u32, height: u32) -> Rc<Self> {
        Rc::new(Self {
            width,
            height,
            renderable: true,
            activations: std::cell::Cell::new(0),
        })
    }

    pub fn unrenderable(width: u32, height: u32) -> Rc<Self> {
        Rc::new(Self {
            width,
            height,
            renderable: false,
            activations: std::cell::Cell::new(0),
        })
    }

    pub fn activations(&self) -> u32 {
        self.activations.get()
    }
}

impl RenderTarget for OffscreenTarget {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn is_renderable(&self) -> bool {
        self.renderable
    }

    fn has_context(&self) -> bool {
        false
    }

    fn activate(&self) -> bool {
        self.activations.set(self.activations.get() + 1);
        true
    }

    fn deactivate(&self) {}
}
