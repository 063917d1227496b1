//! GPU state cache.
//!
//! Callers set shaders, buffers, textures, matrices and render states freely;
//! the [`Renderer`] records them and issues the minimal set of device calls
//! right before each draw.
//!
//! # Invariants
//! - A draw either runs with every requested state applied or issues nothing.
//! - Composite matrices are never sent stale.
//! - A vertex-array object is reused only for the exact context, buffers and
//!   instancing mode it was built for.
//! - The renderer never keeps a texture alive.
//!
//! The device is abstracted behind [`GraphicsContext`]; [`RecordingContext`]
//! records calls instead of issuing them.

mod buffer;
mod context;
mod error;
mod matrix;
mod recording;
mod renderer;
mod states;
mod texture;
mod vao;

pub use buffer::{
    AttributeType, BufferId, BufferKind, ElementType, ElementUsage, INSTANCE_MATRIX_ATTRIBUTE,
    IndexBuffer, IndexType, Storage, VertexBuffer, VertexBufferId, VertexDeclaration, VertexElement,
};
pub use context::{
    ClearFlags, ContextId, DeviceInfo, GraphicsContext, PrimitiveMode, RenderTarget, Shader,
    ShaderId, ShaderUniform, UniformLocation, VertexArrayHandle, VertexAttribute,
};
pub use error::RenderError;
pub use matrix::{MatrixSet, MatrixSlot, MatrixType};
pub use recording::{CommandLog, GpuCommand, OffscreenTarget, RecordingContext};
pub use renderer::{InstancingData, RenderStats, Renderer, RendererCap, RendererConfig};
pub use states::{
    BlendFunc, Comparison, FaceFilling, FaceSide, RenderStates, RendererParameter,
    StencilOperation,
};
pub use texture::{
    SamplerFilter, SamplerWrap, Texture, TextureId, TextureKind, TextureSampler, TextureUnit,
};
pub use vao::{VaoCache, VaoKey};

pub fn crate_info() -> &'static str {
    "forge-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
