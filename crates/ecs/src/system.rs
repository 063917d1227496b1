use std::any::Any;

use forge_common::EntityId;

use crate::entity::EntityStore;
use crate::error::EcsError;
use crate::signature::SystemFilter;

/// Logic run over the entities whose signature matches [`System::filter`].
///
/// Membership is decided by the owning [`World`](crate::World) whenever an
/// entity's set of component kinds changes, never on every tick.
pub trait System: Any {
    fn name(&self) -> &'static str;

    fn filter(&self) -> &SystemFilter;

    /// `entity` matches the filter. `just_added` is false when it was
    /// already a member and its components changed.
    fn on_entity_validation(
        &mut self,
        entity: EntityId,
        entities: &EntityStore,
        just_added: bool,
    ) -> Result<(), EcsError>;

    /// `entity` stopped matching or was destroyed.
    fn on_entity_removed(&mut self, entity: EntityId);

    fn on_update(&mut self, entities: &mut EntityStore, elapsed: f32) -> Result<(), EcsError>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
