//! Per-entity component storage.

use std::collections::{BTreeMap, BTreeSet};

use forge_common::EntityId;

use crate::component::{Component, ComponentData, ComponentKind};
use crate::error::EcsError;
use crate::signature::Signature;

/// Component slots of one entity, addressed by [`ComponentKind::index`].
#[derive(Debug, Clone, Default)]
pub struct Entity {
    components: Vec<Option<Component>>,
    signature: Signature,
}

impl Entity {
    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.get(kind.index()).and_then(Option::as_ref)
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().flatten()
    }

    fn insert(&mut self, component: Component) -> Option<Component> {
        let kind = component.kind();
        if self.components.len() <= kind.index() {
            self.components.resize(kind.index() + 1, None);
        }
        self.signature.insert(kind);
        self.components[kind.index()].replace(component)
    }

    fn remove(&mut self, kind: ComponentKind) -> Option<Component> {
        let removed = self.components.get_mut(kind.index()).and_then(Option::take);
        self.signature.remove(kind);
        removed
    }
}

/// Every entity of a world with its components.
///
/// Structural changes (a component kind added or removed) are recorded so the
/// owning world can re-evaluate system membership. Systems may mutate the
/// store during their update; their changes are picked up on the next refresh.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    changed: BTreeSet<EntityId>,
}

impl EntityStore {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn entity(&self, entity: EntityId) -> Option<&Entity> {
        self.entities.get(&entity)
    }

    pub fn signature(&self, entity: EntityId) -> Option<Signature> {
        self.entities.get(&entity).map(Entity::signature)
    }

    pub fn has(&self, entity: EntityId, kind: ComponentKind) -> bool {
        self.signature(entity).is_some_and(|s| s.contains(kind))
    }

    pub fn get<T: ComponentData>(&self, entity: EntityId) -> Option<&T> {
        self.entities
            .get(&entity)?
            .component(T::KIND)
            .and_then(T::from_component)
    }

    /// Mutable access to a component. Not a structural change.
    pub fn get_mut<T: ComponentData>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.entities
            .get_mut(&entity)?
            .components
            .get_mut(T::KIND.index())?
            .as_mut()
            .and_then(T::from_component_mut)
    }

    /// Attach `component`, returning the one of the same kind it replaced.
    pub fn insert(
        &mut self,
        entity: EntityId,
        component: impl Into<Component>,
    ) -> Result<Option<Component>, EcsError> {
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or(EcsError::UnknownEntity(entity))?;
        let previous = record.insert(component.into());
        if previous.is_none() {
            self.changed.insert(entity);
        }
        Ok(previous)
    }

    pub fn remove(
        &mut self,
        entity: EntityId,
        kind: ComponentKind,
    ) -> Result<Option<Component>, EcsError> {
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or(EcsError::UnknownEntity(entity))?;
        let removed = record.remove(kind);
        if removed.is_some() {
            self.changed.insert(entity);
        }
        Ok(removed)
    }

    pub(crate) fn spawn(&mut self, entity: EntityId) {
        self.entities.insert(entity, Entity::default());
    }

    pub(crate) fn despawn(&mut self, entity: EntityId) -> Option<Entity> {
        self.changed.remove(&entity);
        self.entities.remove(&entity)
    }

    pub(crate) fn mark_clean(&mut self, entity: EntityId) {
        self.changed.remove(&entity);
    }

    /// Entities whose structure changed since they were last validated.
    pub(crate) fn changed(&self) -> Vec<EntityId> {
        self.changed.iter().copied().collect()
    }
}
