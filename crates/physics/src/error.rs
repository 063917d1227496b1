use forge_common::EntityId;
use forge_ecs::EcsError;

use crate::world::BodyHandle;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    #[error("elapsed time must be positive and finite, got {0}")]
    InvalidElapsedTime(f32),
    #[error("unknown body {0:?}")]
    UnknownBody(BodyHandle),
    #[error("entity {0} has no node")]
    MissingNode(EntityId),
}

impl From<PhysicsError> for EcsError {
    fn from(err: PhysicsError) -> Self {
        EcsError::System {
            name: "physics",
            source: Box::new(err),
        }
    }
}
