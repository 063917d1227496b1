use std::collections::BTreeSet;

use forge_common::EntityId;
use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentData, ComponentKind};
use crate::entity::EntityStore;
use crate::error::EcsError;
use crate::system::System;

/// Record of a structural change or a change in system membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    EntityCreated { entity: EntityId },
    EntityDestroyed { entity: EntityId },
    ComponentAdded { entity: EntityId, kind: ComponentKind },
    ComponentReplaced { entity: EntityId, kind: ComponentKind },
    ComponentRemoved { entity: EntityId, kind: ComponentKind },
    SystemJoined { entity: EntityId, system: String },
    SystemLeft { entity: EntityId, system: String },
}

struct SystemSlot {
    system: Box<dyn System>,
    members: BTreeSet<EntityId>,
    /// Ticks per second; `None` ticks once per world update.
    update_rate: Option<f32>,
    accumulator: f32,
}

impl SystemSlot {
    /// Ticks due for `elapsed` and the step each one advances by.
    fn due_ticks(&mut self, elapsed: f32) -> (u32, f32) {
        match self.update_rate {
            None => (1, elapsed),
            Some(rate) => {
                let step = 1.0 / rate;
                self.accumulator += elapsed;
                let ticks = (self.accumulator / step).floor();
                self.accumulator -= ticks * step;
                (ticks as u32, step)
            }
        }
    }
}

/// Entities, their components and the systems driven over them.
///
/// # Invariants
/// - A system's member set is exactly the entities matching its filter, as
///   of the last validation of each entity.
/// - Destroying an entity removes it from every system first.
#[derive(Default)]
pub struct World {
    entities: EntityStore,
    systems: Vec<SystemSlot>,
    events: Vec<WorldEvent>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[WorldEvent] {
        &self.events
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Entities ---

    pub fn create_entity(&mut self) -> EntityId {
        let entity = EntityId::new();
        self.entities.spawn(entity);
        self.events.push(WorldEvent::EntityCreated { entity });
        tracing::debug!(%entity, "created entity");
        entity
    }

    pub fn destroy_entity(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.entities.contains(entity) {
            return Err(EcsError::UnknownEntity(entity));
        }

        for slot in &mut self.systems {
            if slot.members.remove(&entity) {
                slot.system.on_entity_removed(entity);
                self.events.push(WorldEvent::SystemLeft {
                    entity,
                    system: slot.system.name().to_owned(),
                });
            }
        }
        self.entities.despawn(entity);
        self.events.push(WorldEvent::EntityDestroyed { entity });
        tracing::debug!(%entity, "destroyed entity");
        Ok(())
    }

    // --- Components ---

    /// Attach `component` to `entity`. Replacing a component of the same
    /// kind is not a structural change and triggers no validation.
    pub fn add_component(
        &mut self,
        entity: EntityId,
        component: impl Into<Component>,
    ) -> Result<Option<Component>, EcsError> {
        let component = component.into();
        let kind = component.kind();
        let previous = self.entities.insert(entity, component)?;

        if previous.is_some() {
            self.events.push(WorldEvent::ComponentReplaced { entity, kind });
        } else {
            self.events.push(WorldEvent::ComponentAdded { entity, kind });
            self.validate(entity)?;
        }
        Ok(previous)
    }

    pub fn remove_component(
        &mut self,
        entity: EntityId,
        kind: ComponentKind,
    ) -> Result<Option<Component>, EcsError> {
        let removed = self.entities.remove(entity, kind)?;
        if removed.is_some() {
            self.events.push(WorldEvent::ComponentRemoved { entity, kind });
            self.validate(entity)?;
        }
        Ok(removed)
    }

    pub fn component<T: ComponentData>(&self, entity: EntityId) -> Option<&T> {
        self.entities.get(entity)
    }

    pub fn component_mut<T: ComponentData>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.entities.get_mut(entity)
    }

    pub fn has_component(&self, entity: EntityId, kind: ComponentKind) -> bool {
        self.entities.has(entity, kind)
    }

    // --- Systems ---

    /// Register `system` and classify every existing entity against it.
    pub fn add_system<S: System>(&mut self, system: S) -> Result<(), EcsError> {
        let mut slot = SystemSlot {
            system: Box::new(system),
            members: BTreeSet::new(),
            update_rate: None,
            accumulator: 0.0,
        };

        let matching: Vec<EntityId> = self
            .entities
            .ids()
            .filter(|&id| {
                self.entities
                    .signature(id)
                    .is_some_and(|s| slot.system.filter().matches(s))
            })
            .collect();

        for entity in matching {
            slot.system
                .on_entity_validation(entity, &self.entities, true)?;
            slot.members.insert(entity);
            self.events.push(WorldEvent::SystemJoined {
                entity,
                system: slot.system.name().to_owned(),
            });
        }

        tracing::info!(
            system = slot.system.name(),
            members = slot.members.len(),
            "registered system"
        );
        self.systems.push(slot);
        Ok(())
    }

    pub fn system<S: System>(&self) -> Option<&S> {
        self.systems
            .iter()
            .find_map(|slot| slot.system.as_any().downcast_ref::<S>())
    }

    pub fn system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems
            .iter_mut()
            .find_map(|slot| slot.system.as_any_mut().downcast_mut::<S>())
    }

    /// Entities currently classified into the system of type `S`.
    pub fn system_members<S: System>(&self) -> Option<&BTreeSet<EntityId>> {
        self.slot::<S>().map(|slot| &slot.members)
    }

    /// Run the system of type `S` at a fixed `rate` ticks per second, or
    /// once per update with `None`.
    pub fn set_system_update_rate<S: System>(&mut self, rate: Option<f32>) -> Result<(), EcsError> {
        if let Some(rate) = rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(EcsError::InvalidUpdateRate(rate));
            }
        }
        let slot = self
            .systems
            .iter_mut()
            .find(|slot| slot.system.as_any().is::<S>())
            .ok_or(EcsError::UnknownSystem(std::any::type_name::<S>()))?;
        slot.update_rate = rate;
        slot.accumulator = 0.0;
        Ok(())
    }

    fn slot<S: System>(&self) -> Option<&SystemSlot> {
        self.systems
            .iter()
            .find(|slot| slot.system.as_any().is::<S>())
    }

    // --- Scheduling ---

    /// Re-validate every entity whose component kinds changed outside
    /// [`World::add_component`]/[`World::remove_component`], typically from
    /// inside a system update.
    pub fn refresh(&mut self) -> Result<(), EcsError> {
        for entity in self.entities.changed() {
            self.validate(entity)?;
        }
        Ok(())
    }

    /// Advance every system by `elapsed` seconds, in registration order.
    pub fn update(&mut self, elapsed: f32) -> Result<(), EcsError> {
        if !elapsed.is_finite() || elapsed <= 0.0 {
            tracing::error!(elapsed, "elapsed time must be positive");
            return Err(EcsError::InvalidElapsedTime(elapsed));
        }

        self.refresh()?;
        for index in 0..self.systems.len() {
            let (ticks, step) = self.systems[index].due_ticks(elapsed);
            for _ in 0..ticks {
                let slot = &mut self.systems[index];
                if let Err(err) = slot.system.on_update(&mut self.entities, step) {
                    tracing::error!(system = slot.system.name(), %err, "system update failed");
                    return Err(err);
                }
                self.refresh()?;
            }
        }
        Ok(())
    }

    /// Re-evaluate `entity` against every system. The entity stays queued
    /// for [`World::refresh`] until every system has accepted it.
    fn validate(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let signature = self
            .entities
            .signature(entity)
            .ok_or(EcsError::UnknownEntity(entity))?;

        for slot in &mut self.systems {
            let name = slot.system.name();
            let member = slot.members.contains(&entity);

            if slot.system.filter().matches(signature) {
                slot.system
                    .on_entity_validation(entity, &self.entities, !member)
                    .inspect_err(|err| {
                        tracing::error!(system = name, %entity, %err, "entity validation failed");
                    })?;
                if !member {
                    slot.members.insert(entity);
                    self.events.push(WorldEvent::SystemJoined {
                        entity,
                        system: name.to_owned(),
                    });
                    tracing::trace!(system = name, %entity, "entity joined system");
                }
            } else if member {
                slot.members.remove(&entity);
                slot.system.on_entity_removed(entity);
                self.events.push(WorldEvent::SystemLeft {
                    entity,
                    system: name.to_owned(),
                });
                tracing::trace!(system = name, %entity, "entity left system");
            }
        }
        self.entities.mark_clean(entity);
        Ok(())
    }
}
