use std::collections::BTreeSet;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use forge_common::{Color, Rect};
use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::buffer::{
    AttributeType, BufferId, BufferKind, ElementType, ElementUsage, INSTANCE_MATRIX_ATTRIBUTE,
    IndexBuffer, Storage, VertexBuffer, VertexDeclaration,
};
use crate::context::{
    ClearFlags, GraphicsContext, PrimitiveMode, RenderTarget, Shader, VertexArrayHandle,
    VertexAttribute,
};
use crate::error::RenderError;
use crate::matrix::{MatrixSet, MatrixType};
use crate::states::{
    BlendFunc, Comparison, FaceFilling, FaceSide, RenderStates, RendererParameter, StencilOperation,
};
use crate::texture::{Texture, TextureSampler, TextureUnit};
use crate::vao::{VaoCache, VaoKey};

/// Renderer tuning. Device limits always win over these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Capacity of the per-instance data buffer.
    pub max_instances: u32,
    /// Upper bound on usable texture units.
    pub max_texture_units: Option<u32>,
    /// Use sampler objects when the device has them.
    pub use_sampler_objects: bool,
    /// Use vertex-array objects when the device has them.
    pub use_vertex_array_objects: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_instances: 8192,
            max_texture_units: None,
            use_sampler_objects: true,
            use_vertex_array_objects: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererCap {
    AnisotropicFilter,
    FP64,
    HardwareBuffer,
    Instancing,
    MultipleRenderTargets,
    OcclusionQuery,
    PixelBufferObject,
    RenderTexture,
    Texture3D,
    TextureCubemap,
    TextureMulti,
    TextureNPOT,
}

impl RendererCap {
    pub const COUNT: usize = 12;

    fn index(self) -> usize {
        self as usize
    }
}

/// Per-instance data uploaded to the instancing buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct InstancingData {
    pub world_matrix: [[f32; 4]; 4],
}

impl InstancingData {
    pub fn new(world: Mat4) -> Self {
        Self {
            world_matrix: world.to_cols_array_2d(),
        }
    }
}

/// Categories of cached state that are out of sync with the device.
#[derive(Debug, Clone, Copy, Default)]
struct UpdateFlags {
    matrices: bool,
    shader: bool,
    textures: bool,
    vao: bool,
}

/// Counters for instrumentation, reset on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub draw_calls: u64,
    pub vao_cache_hits: u64,
    pub vao_cache_misses: u64,
    pub attribute_specifications: u64,
    pub matrices_sent: u64,
    pub texture_binds: u64,
    pub sampler_binds: u64,
}

impl std::fmt::Display for RenderStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "draws={} vao_hits={} vao_misses={} attributes={} matrices={} textures={} samplers={}",
            self.draw_calls,
            self.vao_cache_hits,
            self.vao_cache_misses,
            self.attribute_specifications,
            self.matrices_sent,
            self.texture_binds,
            self.sampler_binds
        )
    }
}

/// Stateful GPU command cache.
///
/// Setters only record the requested state and mark what changed. The
/// minimal set of device calls is issued by [`Renderer::ensure_state_update`],
/// which every draw entry point runs immediately before submitting.
pub struct Renderer {
    context: Option<Box<dyn GraphicsContext>>,
    config: RendererConfig,
    capabilities: [bool; RendererCap::COUNT],
    max_anisotropy: u8,
    max_render_targets: u32,
    use_sampler_objects: bool,
    use_vertex_array_objects: bool,
    states: RenderStates,
    matrices: MatrixSet,
    texture_units: Vec<TextureUnit>,
    dirty_texture_units: BTreeSet<u32>,
    vaos: VaoCache,
    current_vao: Option<VertexArrayHandle>,
    instancing: bool,
    instancing_buffer: Option<BufferId>,
    fullscreen_quad: Rc<VertexBuffer>,
    index_buffer: Option<Rc<IndexBuffer>>,
    vertex_buffer: Option<Rc<VertexBuffer>>,
    shader: Option<Rc<Shader>>,
    target: Option<Rc<dyn RenderTarget>>,
    target_size: (u32, u32),
    scissor_rect: Option<Rect>,
    viewport: Option<Rect>,
    update: UpdateFlags,
    stats: RenderStats,
}

impl Renderer {
    /// Query the device, build the capability table and allocate the
    /// renderer-owned buffers.
    ///
    /// A failed instancing buffer only disables instancing; a failed
    /// fullscreen-quad buffer fails initialization.
    pub fn initialize(
        mut context: Box<dyn GraphicsContext>,
        config: RendererConfig,
    ) -> Result<Self, RenderError> {
        let _span = tracing::info_span!("renderer_initialize").entered();
        let info = context.device_info();

        let mut capabilities = [false; RendererCap::COUNT];
        let mut set = |cap: RendererCap, supported: bool| capabilities[cap.index()] = supported;
        set(RendererCap::AnisotropicFilter, info.anisotropic_filter);
        set(RendererCap::FP64, info.fp64);
        set(RendererCap::HardwareBuffer, true);
        set(RendererCap::Instancing, info.draw_instanced && info.instanced_arrays);
        set(RendererCap::MultipleRenderTargets, info.frag_data_location);
        set(RendererCap::OcclusionQuery, true);
        set(RendererCap::PixelBufferObject, info.pixel_buffer_object);
        set(RendererCap::RenderTexture, info.framebuffer_object);
        set(RendererCap::Texture3D, true);
        set(RendererCap::TextureCubemap, true);
        set(RendererCap::TextureMulti, true);
        set(RendererCap::TextureNPOT, true);

        let max_anisotropy = if capabilities[RendererCap::AnisotropicFilter.index()] {
            info.max_anisotropy.clamp(1.0, f32::from(u8::MAX)) as u8
        } else {
            1
        };

        let mut instancing_buffer = None;
        if capabilities[RendererCap::Instancing.index()] {
            let size = config.max_instances as usize * std::mem::size_of::<InstancingData>();
            match context.create_buffer(BufferKind::Vertex, size) {
                Ok(buffer) => instancing_buffer = Some(buffer),
                Err(err) => {
                    tracing::warn!(%err, "failed to create instancing buffer, disabled instancing");
                    capabilities[RendererCap::Instancing.index()] = false;
                }
            }
        }

        let max_render_targets = if capabilities[RendererCap::MultipleRenderTargets.index()] {
            info.max_draw_buffers.max(1)
        } else {
            1
        };

        // Every texture unit may need its own texcoord attribute.
        let texcoord_slots = info
            .max_vertex_attribs
            .saturating_sub(ElementUsage::TexCoord.attribute_index());
        let mut max_texture_units = info.max_combined_texture_units.min(texcoord_slots);
        if let Some(limit) = config.max_texture_units {
            max_texture_units = max_texture_units.min(limit);
        }
        let max_texture_units = max_texture_units.max(1);

        let fullscreen_quad = match create_fullscreen_quad(context.as_mut()) {
            Ok(quad) => quad,
            Err(err) => {
                tracing::error!(%err, "failed to create fullscreen quad buffer");
                if let Some(buffer) = instancing_buffer {
                    context.delete_buffer(buffer);
                }
                return Err(err);
            }
        };

        let renderer = Self {
            use_sampler_objects: config.use_sampler_objects && info.sampler_objects,
            use_vertex_array_objects: config.use_vertex_array_objects && info.vertex_array_objects,
            context: Some(context),
            config,
            capabilities,
            max_anisotropy,
            max_render_targets,
            states: RenderStates::default(),
            matrices: MatrixSet::new(),
            texture_units: vec![TextureUnit::default(); max_texture_units as usize],
            dirty_texture_units: BTreeSet::new(),
            vaos: VaoCache::new(),
            current_vao: None,
            instancing: false,
            instancing_buffer,
            fullscreen_quad,
            index_buffer: None,
            vertex_buffer: None,
            shader: None,
            target: None,
            target_size: (0, 0),
            scissor_rect: None,
            viewport: None,
            update: UpdateFlags {
                matrices: true,
                shader: true,
                textures: false,
                vao: true,
            },
            stats: RenderStats::default(),
        };

        tracing::info!(
            texture_units = max_texture_units,
            render_targets = max_render_targets,
            instancing = renderer.has_capability(RendererCap::Instancing),
            sampler_objects = renderer.use_sampler_objects,
            vertex_arrays = renderer.use_vertex_array_objects,
            "initialized renderer"
        );
        Ok(renderer)
    }

    /// Release every cached vertex array and the renderer-owned buffers,
    /// then hand the context back.
    pub fn uninitialize(mut self) -> Option<Box<dyn GraphicsContext>> {
        let mut owned = vec![];
        owned.extend(self.fullscreen_quad.device_buffer());
        owned.extend(self.instancing_buffer.take());
        for &buffer in &owned {
            self.release_buffer(buffer);
        }

        let mut context = self.context.take();
        for (owner, handle) in self.vaos.drain() {
            match context.as_deref_mut() {
                Some(ctx) if ctx.id() == owner => ctx.delete_vertex_array(handle),
                _ => tracing::warn!(?handle, ?owner, "vertex array owned by an inactive context leaked"),
            }
        }
        match context.as_deref_mut() {
            Some(ctx) => owned.into_iter().for_each(|buffer| ctx.delete_buffer(buffer)),
            None => tracing::warn!(?owned, "renderer buffers leaked without an active context"),
        }
        if let Some(target) = self.target.take() {
            if !target.has_context() {
                target.deactivate();
            }
        }
        tracing::info!("uninitialized renderer");
        context
    }

    // --- Context ---

    /// Make `context` the active one, returning the previous context.
    ///
    /// Nothing bound on the previous context carries over, so every binding
    /// category is marked dirty.
    pub fn make_current(&mut self, context: Box<dyn GraphicsContext>) -> Option<Box<dyn GraphicsContext>> {
        self.update = UpdateFlags {
            matrices: true,
            shader: true,
            textures: true,
            vao: true,
        };
        for (index, unit) in self.texture_units.iter_mut().enumerate() {
            unit.texture_updated = false;
            unit.sampler_updated = false;
            self.dirty_texture_units.insert(index as u32);
        }
        self.current_vao = None;
        self.context.replace(context)
    }

    pub fn release_context(&mut self) -> Option<Box<dyn GraphicsContext>> {
        self.context.take()
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    fn with_context<R>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut dyn GraphicsContext) -> Result<R, RenderError>,
    ) -> Result<R, RenderError> {
        let Some(mut context) = self.context.take() else {
            tracing::error!("no active context");
            return Err(RenderError::NoActiveContext);
        };
        let result = f(self, context.as_mut());
        self.context = Some(context);
        result
    }

    // --- Capabilities ---

    pub fn has_capability(&self, capability: RendererCap) -> bool {
        self.capabilities[capability.index()]
    }

    pub fn max_anisotropy_level(&self) -> u8 {
        self.max_anisotropy
    }

    pub fn max_render_targets(&self) -> u32 {
        self.max_render_targets
    }

    pub fn max_texture_units(&self) -> u32 {
        self.texture_units.len() as u32
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RenderStats::default();
    }

    pub fn vao_cache_len(&self) -> usize {
        self.vaos.len()
    }

    // --- Draw entry points ---

    pub fn clear(&mut self, flags: ClearFlags) -> Result<(), RenderError> {
        self.with_context(|this, ctx| {
            if !flags.is_empty() {
                // Masks and tests influence what a clear touches.
                ctx.apply_states(&this.states);
                ctx.clear(flags);
            }
            Ok(())
        })
    }

    pub fn draw_fullscreen_quad(&mut self) -> Result<(), RenderError> {
        self.check_draw_preconditions(false)?;
        self.set_index_buffer(None)?;
        self.set_vertex_buffer(self.fullscreen_quad.clone())?;
        self.prepare_draw(false)?;
        self.submit(|ctx| ctx.draw_arrays(PrimitiveMode::TriangleStrip, 0, 4, None))
    }

    pub fn draw_primitives(
        &mut self,
        mode: PrimitiveMode,
        first_vertex: u32,
        vertex_count: u32,
    ) -> Result<(), RenderError> {
        self.prepare_draw(false)?;
        self.submit(|ctx| ctx.draw_arrays(mode, first_vertex, vertex_count, None))
    }

    pub fn draw_indexed_primitives(
        &mut self,
        mode: PrimitiveMode,
        first_index: u32,
        index_count: u32,
    ) -> Result<(), RenderError> {
        let index_buffer = self.require_index_buffer()?;
        self.prepare_draw(false)?;
        self.submit(|ctx| issue_indexed(ctx, &index_buffer, mode, first_index, index_count, None))
    }

    pub fn draw_primitives_instanced(
        &mut self,
        instance_count: u32,
        mode: PrimitiveMode,
        first_vertex: u32,
        vertex_count: u32,
    ) -> Result<(), RenderError> {
        self.check_instancing(instance_count)?;
        self.prepare_draw(true)?;
        self.submit(|ctx| ctx.draw_arrays(mode, first_vertex, vertex_count, Some(instance_count)))
    }

    pub fn draw_indexed_primitives_instanced(
        &mut self,
        instance_count: u32,
        mode: PrimitiveMode,
        first_index: u32,
        index_count: u32,
    ) -> Result<(), RenderError> {
        self.check_instancing(instance_count)?;
        let index_buffer = self.require_index_buffer()?;
        self.prepare_draw(true)?;
        self.submit(|ctx| {
            issue_indexed(
                ctx,
                &index_buffer,
                mode,
                first_index,
                index_count,
                Some(instance_count),
            )
        })
    }

    pub fn flush(&mut self) -> Result<(), RenderError> {
        self.with_context(|_, ctx| {
            ctx.flush();
            Ok(())
        })
    }

    fn require_index_buffer(&self) -> Result<Rc<IndexBuffer>, RenderError> {
        self.index_buffer.clone().ok_or_else(|| {
            tracing::error!("no index buffer");
            RenderError::NoIndexBuffer
        })
    }

    fn check_instancing(&self, instance_count: u32) -> Result<(), RenderError> {
        if !self.has_capability(RendererCap::Instancing) {
            tracing::error!("instancing not supported");
            return Err(RenderError::InstancingUnsupported);
        }
        let max = self.config.max_instances;
        if instance_count == 0 || instance_count > max {
            tracing::error!(instance_count, max, "instance count out of range");
            return Err(RenderError::InstanceCount {
                count: instance_count,
                max,
            });
        }
        Ok(())
    }

    /// Everything a draw needs before any cached state may change.
    fn check_draw_preconditions(&self, need_vertex_buffer: bool) -> Result<(), RenderError> {
        let failure = if self.context.is_none() {
            Some(RenderError::NoActiveContext)
        } else if self.shader.is_none() {
            Some(RenderError::NoShader)
        } else if need_vertex_buffer && self.vertex_buffer.is_none() {
            Some(RenderError::NoVertexBuffer)
        } else {
            None
        };
        match failure {
            Some(err) => {
                tracing::error!(%err, "draw cancelled");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn prepare_draw(&mut self, instancing: bool) -> Result<(), RenderError> {
        self.check_draw_preconditions(true)?;
        if self.instancing != instancing {
            self.instancing = instancing;
            self.update.vao = true;
        }
        self.ensure_state_update().inspect_err(|err| {
            tracing::error!(%err, "failed to update states");
        })
    }

    fn submit(&mut self, draw: impl FnOnce(&mut dyn GraphicsContext)) -> Result<(), RenderError> {
        self.with_context(|this, ctx| {
            draw(ctx);
            if this.use_vertex_array_objects {
                ctx.bind_vertex_array(None);
            }
            this.stats.draw_calls += 1;
            Ok(())
        })
    }

    // --- Deferred state application ---

    /// Push every pending state change to the device.
    ///
    /// Preconditions (active context, bound shader, a vertex buffer when
    /// the vertex binding is dirty) are checked before anything is applied,
    /// so a failure leaves the cache untouched.
    pub fn ensure_state_update(&mut self) -> Result<(), RenderError> {
        if self.context.is_none() {
            tracing::error!("no active context");
            return Err(RenderError::NoActiveContext);
        }
        let Some(shader) = self.shader.clone() else {
            tracing::error!("no shader");
            return Err(RenderError::NoShader);
        };
        let vertex_buffer = if self.update.vao {
            match &self.vertex_buffer {
                Some(buffer) => Some(buffer.clone()),
                None => {
                    tracing::error!("no vertex buffer");
                    return Err(RenderError::NoVertexBuffer);
                }
            }
        } else {
            None
        };

        self.with_context(|this, ctx| {
            ctx.bind_shader(shader.id);

            if this.update.shader {
                // A different program means different uniform locations.
                this.matrices
                    .rebind(|uniform| ctx.uniform_location(shader.id, uniform));
                this.update.matrices = true;
                this.update.shader = false;
            }

            ctx.bind_shader_textures(shader.id);

            if this.update.textures {
                this.apply_texture_units(ctx);
                this.update.textures = false;
            }

            if this.update.matrices {
                let sent = this
                    .matrices
                    .send_pending(|location, matrix| ctx.send_matrix(location, matrix));
                this.stats.matrices_sent += sent as u64;
                this.update.matrices = false;
            }

            if let Some(vertex_buffer) = vertex_buffer {
                this.apply_vertex_binding(ctx, &vertex_buffer)?;
            }

            if this.use_vertex_array_objects {
                ctx.bind_vertex_array(this.current_vao);
            }

            // The shader may have bound its own textures over ours.
            for (unit, slot) in this.texture_units.iter().enumerate() {
                if let Some(texture) = slot.texture() {
                    ctx.bind_texture(unit as u32, texture.id, texture.kind);
                }
            }

            ctx.apply_states(&this.states);
            Ok(())
        })
    }

    fn apply_texture_units(&mut self, ctx: &mut dyn GraphicsContext) {
        for index in std::mem::take(&mut self.dirty_texture_units) {
            let unit = &mut self.texture_units[index as usize];
            let texture = unit.texture();

            if self.use_sampler_objects {
                if !unit.texture_updated {
                    if let Some(texture) = &texture {
                        ctx.bind_texture(index, texture.id, texture.kind);
                        self.stats.texture_binds += 1;
                    }
                    unit.texture_updated = true;
                }
                if !unit.sampler_updated {
                    ctx.bind_sampler(index, &unit.sampler);
                    self.stats.sampler_binds += 1;
                    unit.sampler_updated = true;
                }
            } else {
                // Without sampler objects the parameters live in the texture,
                // so a new texture needs them written again.
                if let Some(texture) = &texture {
                    ctx.bind_texture(index, texture.id, texture.kind);
                    ctx.apply_sampler(index, texture.id, &unit.sampler);
                    self.stats.texture_binds += 1;
                    self.stats.sampler_binds += 1;
                }
                unit.texture_updated = true;
                unit.sampler_updated = true;
            }
        }
    }

    fn apply_vertex_binding(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        vertex_buffer: &VertexBuffer,
    ) -> Result<(), RenderError> {
        let vertex_id = vertex_buffer
            .device_buffer()
            .ok_or(RenderError::BufferNotResident)?;

        let specify = if self.use_vertex_array_objects {
            let key = VaoKey {
                context: ctx.id(),
                index_buffer: self.index_buffer.as_ref().and_then(|ib| ib.device_buffer()),
                vertex_buffer: vertex_buffer.id(),
                vertex_storage: vertex_id,
                instancing: self.instancing,
            };
            match self.vaos.get(&key) {
                Some(handle) => {
                    self.current_vao = Some(handle);
                    self.stats.vao_cache_hits += 1;
                    false
                }
                None => {
                    let handle = ctx.create_vertex_array();
                    ctx.bind_vertex_array(Some(handle));
                    self.vaos.insert(key, handle);
                    self.current_vao = Some(handle);
                    self.stats.vao_cache_misses += 1;
                    tracing::debug!(?key, ?handle, "created vertex array");
                    true
                }
            }
        } else {
            true
        };

        if specify {
            self.specify_attributes(ctx, vertex_buffer, vertex_id);
        }

        // Without vertex arrays the attributes must be specified before
        // every draw, so the flag stays raised.
        if self.use_vertex_array_objects {
            if specify {
                ctx.bind_vertex_array(None);
            }
            self.update.vao = false;
        }
        Ok(())
    }

    fn specify_attributes(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        vertex_buffer: &VertexBuffer,
        vertex_id: BufferId,
    ) {
        ctx.bind_buffer(BufferKind::Vertex, Some(vertex_id));

        let declaration = vertex_buffer.declaration();
        let stride = declaration.stride();
        for usage in ElementUsage::ALL {
            let index = usage.attribute_index();
            match declaration.element(usage) {
                Some(element) => {
                    ctx.enable_vertex_attribute(
                        index,
                        &VertexAttribute {
                            components: element.ty.component_count(),
                            ty: element.ty.attribute_type(),
                            normalized: element.ty.is_normalized(),
                            stride,
                            offset: element.offset,
                            divisor: 0,
                        },
                    );
                    self.stats.attribute_specifications += 1;
                }
                None => ctx.disable_vertex_attribute(index),
            }
        }

        match (self.instancing, self.instancing_buffer) {
            (true, Some(instancing_buffer)) => {
                ctx.bind_buffer(BufferKind::Vertex, Some(instancing_buffer));
                let stride = std::mem::size_of::<InstancingData>() as u32;
                for row in 0..4 {
                    ctx.enable_vertex_attribute(
                        INSTANCE_MATRIX_ATTRIBUTE + row,
                        &VertexAttribute {
                            components: 4,
                            ty: AttributeType::Float,
                            normalized: false,
                            stride,
                            offset: row * 16,
                            divisor: 1,
                        },
                    );
                    self.stats.attribute_specifications += 1;
                }
            }
            _ => {
                for row in 0..4 {
                    ctx.disable_vertex_attribute(INSTANCE_MATRIX_ATTRIBUTE + row);
                }
            }
        }

        let index_id = self.index_buffer.as_ref().and_then(|ib| ib.device_buffer());
        ctx.bind_buffer(BufferKind::Index, index_id);
    }

    /// Drop every cached vertex array built on `buffer`. Call before the
    /// buffer is destroyed.
    pub fn release_buffer(&mut self, buffer: BufferId) {
        let released = self.vaos.invalidate_buffer(buffer);
        if released.is_empty() {
            return;
        }

        for (owner, handle) in released {
            if self.current_vao == Some(handle) {
                self.current_vao = None;
                self.update.vao = true;
            }
            match self.context.as_deref_mut() {
                Some(ctx) if ctx.id() == owner => ctx.delete_vertex_array(handle),
                _ => tracing::warn!(?handle, ?owner, "cannot delete vertex array outside its context"),
            }
        }
        tracing::debug!(?buffer, "released vertex arrays for buffer");
    }

    // --- Bindings ---

    pub fn set_index_buffer(&mut self, index_buffer: Option<Rc<IndexBuffer>>) -> Result<(), RenderError> {
        if let Some(buffer) = &index_buffer {
            if !buffer.is_bindable() {
                tracing::error!("index buffer must be sequential or device-resident");
                return Err(RenderError::BufferNotResident);
            }
        }
        if !same_rc(&self.index_buffer, &index_buffer) {
            self.index_buffer = index_buffer;
            self.update.vao = true;
        }
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, vertex_buffer: Rc<VertexBuffer>) -> Result<(), RenderError> {
        if !vertex_buffer.is_device_resident() {
            tracing::error!("vertex buffer must be device-resident");
            return Err(RenderError::BufferNotResident);
        }
        let unchanged = self
            .vertex_buffer
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, &vertex_buffer));
        if !unchanged {
            self.vertex_buffer = Some(vertex_buffer);
            self.update.vao = true;
        }
        Ok(())
    }

    pub fn set_shader(&mut self, shader: Option<Rc<Shader>>) -> Result<(), RenderError> {
        if let Some(shader) = &shader {
            if !shader.compiled {
                tracing::error!(shader = ?shader.id, "shader is not compiled");
                return Err(RenderError::ShaderNotCompiled);
            }
        }
        if !same_rc(&self.shader, &shader) {
            self.shader = shader;
            self.update.shader = true;
        }
        Ok(())
    }

    pub fn shader(&self) -> Option<&Rc<Shader>> {
        self.shader.as_ref()
    }

    /// Direct draws at `target`. Re-setting the current target does nothing.
    pub fn set_target(&mut self, target: Option<Rc<dyn RenderTarget>>) -> Result<(), RenderError> {
        let unchanged = match (&self.target, &target) {
            (Some(current), Some(new)) => std::ptr::addr_eq(Rc::as_ptr(current), Rc::as_ptr(new)),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        if let Some(new) = &target {
            if !new.is_renderable() {
                tracing::error!("target not renderable");
                return Err(RenderError::TargetNotRenderable);
            }
        }

        let old = self.target.as_ref().filter(|old| !old.has_context());
        if let Some(old) = old {
            old.deactivate();
        }

        if let Some(new) = &target {
            if !new.activate() {
                tracing::error!("failed to activate target");
                if let Some(old) = old {
                    if !old.activate() {
                        tracing::warn!("failed to reactivate previous target");
                    }
                }
                return Err(RenderError::TargetActivationFailed);
            }
            self.target_size = (new.width(), new.height());
        }
        self.target = target;
        Ok(())
    }

    pub fn target(&self) -> Option<&Rc<dyn RenderTarget>> {
        self.target.as_ref()
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    fn texture_unit_mut(&mut self, unit: u32) -> Result<&mut TextureUnit, RenderError> {
        let max = self.texture_units.len() as u32;
        self.texture_units.get_mut(unit as usize).ok_or_else(|| {
            tracing::error!(unit, max, "texture unit out of range");
            RenderError::TextureUnitOutOfRange { unit, max }
        })
    }

    /// Bind `texture` to `unit`. The renderer keeps only a weak reference.
    pub fn set_texture(&mut self, unit: u32, texture: Option<&Rc<Texture>>) -> Result<(), RenderError> {
        let slot = self.texture_unit_mut(unit)?;
        if slot.holds(texture) {
            return Ok(());
        }

        slot.texture = texture.map(Rc::downgrade).unwrap_or_default();
        slot.texture_updated = false;
        if let Some(texture) = texture {
            if slot.sampler.use_mipmaps(texture.has_mipmaps) {
                slot.sampler_updated = false;
            }
        }

        self.dirty_texture_units.insert(unit);
        self.update.textures = true;
        Ok(())
    }

    pub fn set_texture_sampler(&mut self, unit: u32, sampler: TextureSampler) -> Result<(), RenderError> {
        let slot = self.texture_unit_mut(unit)?;
        slot.sampler = sampler;
        slot.sampler_updated = false;
        if let Some(texture) = slot.texture() {
            slot.sampler.use_mipmaps(texture.has_mipmaps);
        }

        self.dirty_texture_units.insert(unit);
        self.update.textures = true;
        Ok(())
    }

    pub fn texture_sampler(&self, unit: u32) -> Option<&TextureSampler> {
        self.texture_units.get(unit as usize).map(|slot| &slot.sampler)
    }

    /// Upload per-instance data for the next instanced draw.
    pub fn set_instancing_data(&mut self, instances: &[InstancingData]) -> Result<(), RenderError> {
        self.check_instancing(instances.len().try_into().unwrap_or(u32::MAX))?;
        let Some(buffer) = self.instancing_buffer else {
            return Err(RenderError::InstancingUnsupported);
        };
        self.with_context(|_, ctx| {
            ctx.fill_buffer(buffer, 0, bytemuck::cast_slice(instances))
                .map_err(|err| {
                    tracing::error!(%err, "failed to fill instancing buffer");
                    RenderError::BufferFill(err.to_string())
                })
        })
    }

    // --- Matrices ---

    pub fn set_matrix(&mut self, ty: MatrixType, matrix: Mat4) {
        self.matrices.set(ty, matrix);
        self.update.matrices = true;
    }

    /// Current value of `ty`, recomputed first if stale.
    pub fn matrix(&mut self, ty: MatrixType) -> Mat4 {
        self.matrices.get(ty)
    }

    pub fn matrices(&self) -> &MatrixSet {
        &self.matrices
    }

    // --- Render states ---

    pub fn render_states(&self) -> &RenderStates {
        &self.states
    }

    pub fn set_render_states(&mut self, states: RenderStates) {
        self.states = states;
    }

    pub fn enable(&mut self, parameter: RendererParameter, enable: bool) {
        self.states.set_enabled(parameter, enable);
    }

    pub fn is_enabled(&self, parameter: RendererParameter) -> bool {
        self.states.is_enabled(parameter)
    }

    pub fn set_blend_func(&mut self, src: BlendFunc, dst: BlendFunc) {
        self.states.src_blend = src;
        self.states.dst_blend = dst;
    }

    pub fn set_depth_func(&mut self, compare: Comparison) {
        self.states.depth_func = compare;
    }

    pub fn set_face_culling(&mut self, side: FaceSide) {
        self.states.face_culling = side;
    }

    pub fn set_face_filling(&mut self, filling: FaceFilling) {
        self.states.face_filling = filling;
    }

    pub fn set_stencil_compare_function(&mut self, compare: Comparison) {
        self.states.stencil_compare = compare;
    }

    pub fn set_stencil_fail_operation(&mut self, operation: StencilOperation) {
        self.states.stencil_fail = operation;
    }

    pub fn set_stencil_pass_operation(&mut self, operation: StencilOperation) {
        self.states.stencil_pass = operation;
    }

    pub fn set_stencil_zfail_operation(&mut self, operation: StencilOperation) {
        self.states.stencil_zfail = operation;
    }

    pub fn set_stencil_mask(&mut self, mask: u32) {
        self.states.stencil_mask = mask;
    }

    pub fn set_stencil_reference_value(&mut self, value: u32) {
        self.states.stencil_reference = value;
    }

    pub fn line_width(&self) -> f32 {
        self.states.line_width
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<(), RenderError> {
        self.states.line_width = positive("line width", width)?;
        Ok(())
    }

    pub fn point_size(&self) -> f32 {
        self.states.point_size
    }

    pub fn set_point_size(&mut self, size: f32) -> Result<(), RenderError> {
        self.states.point_size = positive("point size", size)?;
        Ok(())
    }

    // --- Immediate state ---

    pub fn set_clear_color(&mut self, color: Color) -> Result<(), RenderError> {
        self.with_context(|_, ctx| {
            ctx.set_clear_color(color);
            Ok(())
        })
    }

    pub fn set_clear_depth(&mut self, depth: f64) -> Result<(), RenderError> {
        self.with_context(|_, ctx| {
            ctx.set_clear_depth(depth);
            Ok(())
        })
    }

    pub fn set_clear_stencil(&mut self, value: u32) -> Result<(), RenderError> {
        self.with_context(|_, ctx| {
            ctx.set_clear_stencil(value);
            Ok(())
        })
    }

    pub fn scissor_rect(&self) -> Option<Rect> {
        self.scissor_rect
    }

    pub fn set_scissor_rect(&mut self, rect: Rect) -> Result<(), RenderError> {
        let flipped = self.to_device_rect(rect)?;
        self.with_context(|this, ctx| {
            ctx.set_scissor(flipped);
            this.scissor_rect = Some(rect);
            Ok(())
        })
    }

    pub fn viewport(&self) -> Option<Rect> {
        self.viewport
    }

    pub fn set_viewport(&mut self, rect: Rect) -> Result<(), RenderError> {
        let flipped = self.to_device_rect(rect)?;
        self.with_context(|this, ctx| {
            ctx.set_viewport(flipped);
            this.viewport = Some(rect);
            Ok(())
        })
    }

    /// Bounds-check a top-left-origin rectangle against the target and
    /// convert it to the device's bottom-left origin.
    fn to_device_rect(&self, rect: Rect) -> Result<Rect, RenderError> {
        if self.target.is_none() {
            tracing::error!("renderer has no target");
            return Err(RenderError::NoTarget);
        }
        let (width, height) = self.target_size;
        if !rect.fits_within(width, height) {
            tracing::error!(?rect, width, height, "rectangle dimensions are out of bounds");
            return Err(RenderError::RectOutOfBounds);
        }
        Ok(Rect::new(
            rect.x,
            height - rect.height - rect.y,
            rect.width,
            rect.height,
        ))
    }
}

fn positive(what: &'static str, value: f32) -> Result<f32, RenderError> {
    if value > 0.0 {
        Ok(value)
    } else {
        tracing::error!(what, value, "size must be over zero");
        Err(RenderError::InvalidSize { what, value })
    }
}

fn same_rc<T>(a: &Option<Rc<T>>, b: &Option<Rc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn issue_indexed(
    ctx: &mut dyn GraphicsContext,
    index_buffer: &IndexBuffer,
    mode: PrimitiveMode,
    first_index: u32,
    index_count: u32,
    instances: Option<u32>,
) {
    match *index_buffer {
        IndexBuffer::Sequential { start, count } => ctx.draw_arrays(mode, start, count, instances),
        IndexBuffer::Indexed { index_type, .. } => ctx.draw_elements(
            mode,
            index_count,
            index_type,
            first_index as usize * index_type.size(),
            instances,
        ),
    }
}

fn create_fullscreen_quad(ctx: &mut dyn GraphicsContext) -> Result<Rc<VertexBuffer>, RenderError> {
    #[rustfmt::skip]
    let vertices: [f32; 8] = [
        -1.0, -1.0,
         1.0, -1.0,
        -1.0,  1.0,
         1.0,  1.0,
    ];
    let data: &[u8] = bytemuck::cast_slice(&vertices);
    let buffer = ctx.create_buffer(BufferKind::Vertex, data.len())?;
    if let Err(err) = ctx.fill_buffer(buffer, 0, data) {
        ctx.delete_buffer(buffer);
        return Err(err);
    }

    let declaration = VertexDeclaration::packed(&[(ElementUsage::Position, ElementType::Float2)]);
    Ok(VertexBuffer::new(Storage::Device(buffer), Rc::new(declaration), 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::IndexType;
    use crate::context::{DeviceInfo, ShaderId, ShaderUniform};
    use crate::recording::{CommandLog, GpuCommand, OffscreenTarget, RecordingContext};
    use crate::texture::{TextureId, TextureKind};
    use glam::Vec3;

    fn context() -> RecordingContext {
        RecordingContext::new(1)
            .with_uniforms(
                ShaderId(1),
                &[
                    (ShaderUniform::WorldViewProjMatrix, 0),
                    (ShaderUniform::WorldMatrix, 1),
                ],
            )
            .with_uniforms(
                ShaderId(2),
                &[
                    (ShaderUniform::WorldViewProjMatrix, 4),
                    (ShaderUniform::ViewMatrix, 5),
                ],
            )
    }

    fn setup_with(ctx: RecordingContext, config: RendererConfig) -> (Renderer, CommandLog) {
        let log = ctx.log();
        let renderer = Renderer::initialize(Box::new(ctx), config).expect("initialize");
        log.clear();
        (renderer, log)
    }

    fn setup() -> (Renderer, CommandLog) {
        setup_with(context(), RendererConfig::default())
    }

    fn mesh(id: u32) -> Rc<VertexBuffer> {
        let declaration = VertexDeclaration::packed(&[
            (ElementUsage::Position, ElementType::Float3),
            (ElementUsage::TexCoord, ElementType::Float2),
        ]);
        VertexBuffer::new(Storage::Device(BufferId(id)), Rc::new(declaration), 3)
    }

    fn ready(renderer: &mut Renderer, shader: u32, vertex_buffer: u32) {
        renderer.set_shader(Some(Shader::new(ShaderId(shader)))).unwrap();
        renderer.set_vertex_buffer(mesh(vertex_buffer)).unwrap();
    }

    fn draw(renderer: &mut Renderer) {
        renderer
            .draw_primitives(PrimitiveMode::TriangleList, 0, 3)
            .expect("draw");
    }

    fn is_attribute_spec(c: &GpuCommand) -> bool {
        matches!(c, GpuCommand::EnableAttribute { .. })
    }

    fn is_matrix_send(c: &GpuCommand) -> bool {
        matches!(c, GpuCommand::SendMatrix { .. })
    }

    #[test]
    fn initialize_reports_capabilities() {
        let (renderer, _) = setup();
        assert!(renderer.has_capability(RendererCap::Instancing));
        assert!(!renderer.has_capability(RendererCap::FP64));
        assert_eq!(renderer.max_anisotropy_level(), 16);
        assert_eq!(renderer.max_render_targets(), 8);
        // 16 attributes minus the 5 below the texcoord slot.
        assert_eq!(renderer.max_texture_units(), 11);
    }

    #[test]
    fn instancing_buffer_failure_disables_instancing() {
        let ctx = context().with_max_buffer_size(1024);
        let (mut renderer, _) = setup_with(ctx, RendererConfig::default());
        assert!(!renderer.has_capability(RendererCap::Instancing));

        ready(&mut renderer, 1, 100);
        assert_eq!(
            renderer.draw_primitives_instanced(4, PrimitiveMode::TriangleList, 0, 3),
            Err(RenderError::InstancingUnsupported)
        );
    }

    #[test]
    fn draw_without_shader_issues_nothing() {
        let (mut renderer, log) = setup();
        renderer.set_vertex_buffer(mesh(100)).unwrap();
        assert_eq!(
            renderer.draw_primitives(PrimitiveMode::TriangleList, 0, 3),
            Err(RenderError::NoShader)
        );
        assert!(log.is_empty());
    }

    #[test]
    fn draw_without_context_fails() {
        let (mut renderer, _) = setup();
        ready(&mut renderer, 1, 100);
        let ctx = renderer.release_context();
        assert!(ctx.is_some());
        assert_eq!(
            renderer.draw_primitives(PrimitiveMode::TriangleList, 0, 3),
            Err(RenderError::NoActiveContext)
        );
        assert_eq!(renderer.stats().draw_calls, 0);
    }

    #[test]
    fn draw_without_vertex_buffer_issues_nothing() {
        let (mut renderer, log) = setup();
        renderer.set_shader(Some(Shader::new(ShaderId(1)))).unwrap();
        assert_eq!(
            renderer.draw_primitives(PrimitiveMode::TriangleList, 0, 3),
            Err(RenderError::NoVertexBuffer)
        );
        assert!(log.is_empty());
    }

    #[test]
    fn vao_cache_reuses_handle_without_respecifying() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        draw(&mut renderer);
        let first = renderer.current_vao;

        let a = renderer.vertex_buffer.clone().unwrap();
        renderer.set_vertex_buffer(mesh(101)).unwrap();
        draw(&mut renderer);
        assert_ne!(renderer.current_vao, first);

        renderer.set_vertex_buffer(a).unwrap();
        log.clear();
        draw(&mut renderer);

        assert_eq!(renderer.current_vao, first);
        assert_eq!(log.count(is_attribute_spec), 0);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::CreateVertexArray(_))), 0);
        assert!(log.commands().contains(&GpuCommand::BindVertexArray(first)));

        let stats = renderer.stats();
        assert_eq!(stats.vao_cache_misses, 2);
        assert_eq!(stats.vao_cache_hits, 1);
        assert_eq!(renderer.vao_cache_len(), 2);
    }

    #[test]
    fn unchanged_bindings_skip_vertex_work() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        draw(&mut renderer);
        log.clear();
        draw(&mut renderer);
        assert_eq!(log.count(is_attribute_spec), 0);
        assert_eq!(log.count(is_matrix_send), 0);
        assert_eq!(renderer.stats().vao_cache_hits, 0);
    }

    #[test]
    fn instancing_gets_its_own_vertex_array() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        draw(&mut renderer);
        log.clear();

        renderer
            .set_instancing_data(&[InstancingData::new(Mat4::IDENTITY); 4])
            .unwrap();
        renderer
            .draw_primitives_instanced(4, PrimitiveMode::TriangleList, 0, 3)
            .unwrap();

        assert_eq!(log.count(|c| matches!(c, GpuCommand::CreateVertexArray(_))), 1);
        let instance_rows: Vec<u32> = log
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::EnableAttribute { index, attribute } if attribute.divisor == 1 => {
                    Some(*index)
                }
                _ => None,
            })
            .collect();
        assert_eq!(instance_rows, vec![13, 14, 15, 16]);
        assert!(log.commands().contains(&GpuCommand::DrawArrays {
            mode: PrimitiveMode::TriangleList,
            first: 0,
            count: 3,
            instances: Some(4),
        }));
    }

    #[test]
    fn instance_count_is_bounded() {
        let (mut renderer, _) = setup();
        ready(&mut renderer, 1, 100);
        assert!(matches!(
            renderer.draw_primitives_instanced(0, PrimitiveMode::TriangleList, 0, 3),
            Err(RenderError::InstanceCount { count: 0, .. })
        ));
        assert!(matches!(
            renderer.draw_primitives_instanced(9000, PrimitiveMode::TriangleList, 0, 3),
            Err(RenderError::InstanceCount { count: 9000, max: 8192 })
        ));
    }

    #[test]
    fn shader_switch_resends_every_located_matrix_once() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        draw(&mut renderer);
        assert_eq!(log.count(is_matrix_send), 2);

        log.clear();
        draw(&mut renderer);
        assert_eq!(log.count(is_matrix_send), 0);

        renderer.set_shader(Some(Shader::new(ShaderId(2)))).unwrap();
        log.clear();
        draw(&mut renderer);
        let locations: Vec<i32> = log
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::SendMatrix { location, .. } => Some(location.0),
                _ => None,
            })
            .collect();
        assert_eq!(locations, vec![5, 4]);

        renderer.set_shader(Some(Shader::new(ShaderId(1)))).unwrap();
        log.clear();
        draw(&mut renderer);
        assert_eq!(log.count(is_matrix_send), 2);
    }

    #[test]
    fn leaf_change_sends_only_affected_matrices() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        draw(&mut renderer);
        log.clear();

        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 10.0);
        renderer.set_matrix(MatrixType::Projection, projection);
        draw(&mut renderer);

        assert_eq!(
            log.commands()
                .into_iter()
                .filter(is_matrix_send)
                .collect::<Vec<_>>(),
            vec![GpuCommand::SendMatrix {
                location: crate::context::UniformLocation(0),
                matrix: projection,
            }]
        );
    }

    #[test]
    fn composite_matrix_tracks_leaves() {
        let (mut renderer, _) = setup();
        let world = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        renderer.set_matrix(MatrixType::World, world);
        renderer.set_matrix(MatrixType::View, view);
        assert_eq!(renderer.matrix(MatrixType::WorldView), view * world);
        assert_eq!(
            renderer.matrices().recompute_count(MatrixType::WorldView),
            1
        );
    }

    #[test]
    fn dirty_texture_units_bind_once() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        let texture = Texture::new(TextureId(9), TextureKind::Texture2D, false);
        renderer.set_texture(0, Some(&texture)).unwrap();
        draw(&mut renderer);

        let binds = |log: &CommandLog| {
            log.count(|c| matches!(c, GpuCommand::BindTexture { unit: 0, .. }))
        };
        // Once for the pending unit, once in the resource check.
        assert_eq!(binds(&log), 2);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::BindSampler { unit: 0, .. })), 1);

        log.clear();
        draw(&mut renderer);
        assert_eq!(binds(&log), 1);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::BindSampler { .. })), 0);
    }

    #[test]
    fn sampler_change_alone_rebinds_only_sampler() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        let texture = Texture::new(TextureId(9), TextureKind::Texture2D, true);
        renderer.set_texture(2, Some(&texture)).unwrap();
        draw(&mut renderer);
        log.clear();

        let sampler = TextureSampler {
            anisotropy: 8,
            ..TextureSampler::default()
        };
        renderer.set_texture_sampler(2, sampler).unwrap();
        draw(&mut renderer);
        assert_eq!(renderer.stats().texture_binds, 1);
        assert!(log.commands().contains(&GpuCommand::BindSampler { unit: 2, sampler }));
    }

    #[test]
    fn sampler_fallback_applies_to_texture() {
        let config = RendererConfig {
            use_sampler_objects: false,
            ..RendererConfig::default()
        };
        let (mut renderer, log) = setup_with(context(), config);
        ready(&mut renderer, 1, 100);
        let texture = Texture::new(TextureId(3), TextureKind::Texture2D, true);
        renderer.set_texture(1, Some(&texture)).unwrap();
        draw(&mut renderer);

        assert_eq!(log.count(|c| matches!(c, GpuCommand::BindSampler { .. })), 0);
        assert_eq!(
            log.count(|c| matches!(
                c,
                GpuCommand::ApplySampler {
                    unit: 1,
                    texture: TextureId(3),
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn dropped_texture_is_not_bound() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        let texture = Texture::new(TextureId(9), TextureKind::Texture2D, false);
        renderer.set_texture(0, Some(&texture)).unwrap();
        drop(texture);
        draw(&mut renderer);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::BindTexture { .. })), 0);
    }

    #[test]
    fn out_of_range_texture_unit_is_rejected() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        let max = renderer.max_texture_units();
        let texture = Texture::new(TextureId(9), TextureKind::Texture2D, false);
        assert_eq!(
            renderer.set_texture(max, Some(&texture)),
            Err(RenderError::TextureUnitOutOfRange { unit: max, max })
        );
        draw(&mut renderer);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::BindTexture { .. })), 0);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::BindSampler { .. })), 0);
    }

    #[test]
    fn without_vertex_arrays_attributes_are_respecified() {
        let info = DeviceInfo {
            vertex_array_objects: false,
            ..DeviceInfo::default()
        };
        let (mut renderer, log) = setup_with(
            RecordingContext::with_device(1, info).with_uniforms(ShaderId(1), &[]),
            RendererConfig::default(),
        );
        ready(&mut renderer, 1, 100);
        draw(&mut renderer);
        let first = log.count(is_attribute_spec);
        assert_eq!(first, 2);

        log.clear();
        draw(&mut renderer);
        assert_eq!(log.count(is_attribute_spec), first);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::CreateVertexArray(_))), 0);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::BindVertexArray(_))), 0);
    }

    #[test]
    fn indexed_draw_offsets_by_index_size() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        renderer
            .set_index_buffer(Some(IndexBuffer::indexed(
                Storage::Device(BufferId(200)),
                IndexType::U32,
                36,
            )))
            .unwrap();
        renderer
            .draw_indexed_primitives(PrimitiveMode::TriangleList, 6, 12)
            .unwrap();

        assert!(log.commands().contains(&GpuCommand::BindBuffer {
            kind: BufferKind::Index,
            buffer: Some(BufferId(200)),
        }));
        assert!(log.commands().contains(&GpuCommand::DrawElements {
            mode: PrimitiveMode::TriangleList,
            count: 12,
            index_type: IndexType::U32,
            offset: 24,
            instances: None,
        }));
    }

    #[test]
    fn sequential_index_buffer_draws_arrays() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        renderer
            .set_index_buffer(Some(IndexBuffer::sequential(3, 9)))
            .unwrap();
        renderer
            .draw_indexed_primitives(PrimitiveMode::TriangleStrip, 0, 0)
            .unwrap();
        assert!(log.commands().contains(&GpuCommand::DrawArrays {
            mode: PrimitiveMode::TriangleStrip,
            first: 3,
            count: 9,
            instances: None,
        }));
    }

    #[test]
    fn indexed_draw_requires_index_buffer() {
        let (mut renderer, _) = setup();
        ready(&mut renderer, 1, 100);
        assert_eq!(
            renderer.draw_indexed_primitives(PrimitiveMode::TriangleList, 0, 3),
            Err(RenderError::NoIndexBuffer)
        );
    }

    #[test]
    fn host_buffers_are_rejected() {
        let (mut renderer, _) = setup();
        let kept = mesh(100);
        renderer.set_vertex_buffer(kept.clone()).unwrap();

        let host = VertexBuffer::new(Storage::Host, kept.declaration().clone(), 3);
        assert_eq!(
            renderer.set_vertex_buffer(host),
            Err(RenderError::BufferNotResident)
        );
        assert!(Rc::ptr_eq(renderer.vertex_buffer.as_ref().unwrap(), &kept));

        let host_indices = IndexBuffer::indexed(Storage::Host, IndexType::U16, 3);
        assert_eq!(
            renderer.set_index_buffer(Some(host_indices)),
            Err(RenderError::BufferNotResident)
        );
    }

    #[test]
    fn released_buffer_drops_its_vertex_arrays() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        draw(&mut renderer);
        let handle = renderer.current_vao.unwrap();

        renderer.release_buffer(BufferId(100));
        assert_eq!(renderer.vao_cache_len(), 0);
        assert!(log.commands().contains(&GpuCommand::DeleteVertexArray(handle)));

        renderer.set_vertex_buffer(mesh(100)).unwrap();
        log.clear();
        draw(&mut renderer);
        assert_eq!(log.count(|c| matches!(c, GpuCommand::CreateVertexArray(_))), 1);
    }

    #[test]
    fn same_target_is_idempotent() {
        let (mut renderer, _) = setup();
        let target = OffscreenTarget::new(800, 600);
        renderer.set_target(Some(target.clone())).unwrap();
        renderer.set_target(Some(target.clone())).unwrap();
        assert_eq!(target.activations(), 1);
        assert_eq!(renderer.target_size(), (800, 600));

        let broken = OffscreenTarget::unrenderable(10, 10);
        assert_eq!(
            renderer.set_target(Some(broken)),
            Err(RenderError::TargetNotRenderable)
        );
        assert_eq!(renderer.target_size(), (800, 600));
        assert!(renderer.target().is_some());
    }

    #[test]
    fn viewport_uses_bottom_left_origin() {
        let (mut renderer, log) = setup();
        assert_eq!(
            renderer.set_viewport(Rect::new(0, 0, 10, 10)),
            Err(RenderError::NoTarget)
        );

        renderer
            .set_target(Some(OffscreenTarget::new(800, 600)))
            .unwrap();
        renderer.set_viewport(Rect::new(10, 20, 100, 50)).unwrap();
        assert!(log
            .commands()
            .contains(&GpuCommand::SetViewport(Rect::new(10, 530, 100, 50))));
        assert_eq!(renderer.viewport(), Some(Rect::new(10, 20, 100, 50)));

        assert_eq!(
            renderer.set_scissor_rect(Rect::new(700, 0, 200, 10)),
            Err(RenderError::RectOutOfBounds)
        );
        assert_eq!(renderer.scissor_rect(), None);
    }

    #[test]
    fn non_positive_sizes_are_rejected() {
        let (mut renderer, _) = setup();
        assert!(renderer.set_line_width(0.0).is_err());
        assert!(renderer.set_point_size(-1.0).is_err());
        assert_eq!(renderer.line_width(), 1.0);
        renderer.set_line_width(2.5).unwrap();
        assert_eq!(renderer.line_width(), 2.5);
    }

    #[test]
    fn states_are_applied_before_each_draw() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        renderer.enable(RendererParameter::Blend, true);
        renderer.set_blend_func(BlendFunc::SrcAlpha, BlendFunc::InvSrcAlpha);
        draw(&mut renderer);

        let applied = log.commands().into_iter().find_map(|c| match c {
            GpuCommand::ApplyStates(states) => Some(states),
            _ => None,
        });
        let applied = applied.expect("states applied");
        assert!(applied.is_enabled(RendererParameter::Blend));
        assert_eq!(applied.src_blend, BlendFunc::SrcAlpha);
    }

    #[test]
    fn fullscreen_quad_rebinds_vertex_state() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        renderer.draw_fullscreen_quad().unwrap();
        assert!(log.commands().contains(&GpuCommand::DrawArrays {
            mode: PrimitiveMode::TriangleStrip,
            first: 0,
            count: 4,
            instances: None,
        }));
        assert!(renderer.index_buffer.is_none());
    }

    #[test]
    fn clear_requires_context_and_applies_states() {
        let (mut renderer, log) = setup();
        renderer.clear(ClearFlags::ALL).unwrap();
        assert_eq!(log.count(|c| matches!(c, GpuCommand::ApplyStates(_))), 1);
        assert!(log.commands().contains(&GpuCommand::Clear(ClearFlags::ALL)));

        renderer.release_context();
        assert_eq!(
            renderer.clear(ClearFlags::ALL),
            Err(RenderError::NoActiveContext)
        );
    }

    #[test]
    fn switching_context_rebuilds_vertex_arrays() {
        let (mut renderer, _) = setup();
        ready(&mut renderer, 1, 100);
        draw(&mut renderer);

        let second = RecordingContext::new(2).with_uniforms(
            ShaderId(1),
            &[(ShaderUniform::WorldViewProjMatrix, 0)],
        );
        let second_log = second.log();
        let previous = renderer.make_current(Box::new(second));
        assert!(previous.is_some());

        draw(&mut renderer);
        assert_eq!(
            second_log.count(|c| matches!(c, GpuCommand::CreateVertexArray(_))),
            1
        );
        assert_eq!(second_log.count(is_matrix_send), 1);
        assert_eq!(renderer.vao_cache_len(), 2);
    }

    #[test]
    fn uninitialize_deletes_cached_vertex_arrays() {
        let (mut renderer, log) = setup();
        ready(&mut renderer, 1, 100);
        draw(&mut renderer);
        renderer.draw_fullscreen_quad().unwrap();
        let quad = renderer.fullscreen_quad.device_buffer().unwrap();
        let instancing = renderer.instancing_buffer.unwrap();

        let context = renderer.uninitialize();
        assert!(context.is_some());
        assert_eq!(log.count(|c| matches!(c, GpuCommand::DeleteVertexArray(_))), 2);
        let commands = log.commands();
        assert!(commands.contains(&GpuCommand::DeleteBuffer(quad)));
        assert!(commands.contains(&GpuCommand::DeleteBuffer(instancing)));
        assert_eq!(log.count(|c| matches!(c, GpuCommand::DeleteBuffer(_))), 2);
    }

    #[test]
    fn failed_fullscreen_quad_frees_instancing_buffer() {
        let ctx = context().with_max_buffer_size(16);
        let log = ctx.log();
        // Instancing buffer fails too, so nothing is left to free.
        assert!(Renderer::initialize(Box::new(ctx), RendererConfig::default()).is_err());
        assert_eq!(log.count(|c| matches!(c, GpuCommand::DeleteBuffer(_))), 0);

        let ctx = context().with_max_buffer_size(16);
        let log = ctx.log();
        let config = RendererConfig {
            max_instances: 0,
            ..RendererConfig::default()
        };
        assert!(Renderer::initialize(Box::new(ctx), config).is_err());
        let created: Vec<_> = log
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                GpuCommand::CreateBuffer { buffer, .. } => Some(buffer),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), 1);
        assert!(log.commands().contains(&GpuCommand::DeleteBuffer(created[0])));
    }

    #[test]
    fn shared_storage_with_new_layout_gets_its_own_vertex_array() {
        let (mut renderer, log) = setup();
        let storage = Storage::Device(BufferId(100));
        let positions = Rc::new(VertexDeclaration::packed(&[(
            ElementUsage::Position,
            ElementType::Float3,
        )]));
        let colored = Rc::new(VertexDeclaration::packed(&[
            (ElementUsage::Position, ElementType::Float3),
            (ElementUsage::Color, ElementType::Color),
        ]));

        renderer.set_shader(Some(Shader::new(ShaderId(1)))).unwrap();
        renderer
            .set_vertex_buffer(VertexBuffer::new(storage, positions, 3))
            .unwrap();
        draw(&mut renderer);
        let first = renderer.current_vao;

        renderer
            .set_vertex_buffer(VertexBuffer::new(storage, colored, 3))
            .unwrap();
        log.clear();
        draw(&mut renderer);

        assert_ne!(renderer.current_vao, first);
        let color = ElementUsage::Color.attribute_index();
        assert_eq!(
            log.count(|c| matches!(c, GpuCommand::EnableAttribute { index, .. } if *index == color)),
            1
        );
        let stats = renderer.stats();
        assert_eq!(stats.vao_cache_hits, 0);
        assert_eq!(stats.vao_cache_misses, 2);

        renderer.release_buffer(BufferId(100));
        assert_eq!(renderer.vao_cache_len(), 0);
    }

    #[test]
    fn failed_activation_keeps_current_target() {
        struct Refusing;

        impl RenderTarget for Refusing {
            fn width(&self) -> u32 {
                320
            }
            fn height(&self) -> u32 {
                200
            }
            fn is_renderable(&self) -> bool {
                true
            }
            fn has_context(&self) -> bool {
                false
            }
            fn activate(&self) -> bool {
                false
            }
            fn deactivate(&self) {}
        }

        let (mut renderer, _) = setup();
        let current = OffscreenTarget::new(800, 600);
        renderer.set_target(Some(current.clone())).unwrap();

        assert_eq!(
            renderer.set_target(Some(Rc::new(Refusing))),
            Err(RenderError::TargetActivationFailed)
        );
        assert_eq!(renderer.target_size(), (800, 600));
        let kept = renderer.target().unwrap();
        assert!(std::ptr::addr_eq(Rc::as_ptr(kept), Rc::as_ptr(&current)));
        // Deactivated for the attempt, then activated again.
        assert_eq!(current.activations(), 2);
    }

    #[test]
    fn state_update_checks_context_first() {
        let (mut renderer, _) = setup();
        let ctx = renderer.release_context();
        assert!(ctx.is_some());
        assert_eq!(
            renderer.ensure_state_update(),
            Err(RenderError::NoActiveContext)
        );
    }
}
