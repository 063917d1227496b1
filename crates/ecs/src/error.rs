use forge_common::EntityId;

/// Errors reported by the entity/system runtime.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("invalid elapsed time: {0}")]
    InvalidElapsedTime(f32),
    #[error("invalid update rate: {0}")]
    InvalidUpdateRate(f32),
    #[error("no system of type {0}")]
    UnknownSystem(&'static str),
    #[error("system `{name}` failed: {source}")]
    System {
        name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}
