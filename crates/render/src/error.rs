/// Errors reported by the renderer.
///
/// Every variant is a precondition or resource failure: the call that
/// produced it left the cached state exactly as it was.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("no active context")]
    NoActiveContext,
    #[error("no shader")]
    NoShader,
    #[error("shader is not compiled")]
    ShaderNotCompiled,
    #[error("no vertex buffer")]
    NoVertexBuffer,
    #[error("no index buffer")]
    NoIndexBuffer,
    #[error("buffer must be device-resident")]
    BufferNotResident,
    #[error("texture unit out of range ({unit} >= {max})")]
    TextureUnitOutOfRange { unit: u32, max: u32 },
    #[error("{what} must be over zero (got {value})")]
    InvalidSize { what: &'static str, value: f32 },
    #[error("instancing not supported")]
    InstancingUnsupported,
    #[error("instance count {count} is out of range (1..={max})")]
    InstanceCount { count: u32, max: u32 },
    #[error("renderer has no target")]
    NoTarget,
    #[error("target not renderable")]
    TargetNotRenderable,
    #[error("failed to activate target")]
    TargetActivationFailed,
    #[error("rectangle dimensions are out of bounds")]
    RectOutOfBounds,
    #[error("buffer creation failed: {0}")]
    BufferCreation(String),
    #[error("buffer fill failed: {0}")]
    BufferFill(String),
}
