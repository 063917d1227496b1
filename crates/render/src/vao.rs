//! Cache of vertex-array objects keyed by the binding configuration that
//! produced them.

use std::collections::BTreeMap;

use crate::buffer::{BufferId, VertexBufferId};
use crate::context::{ContextId, VertexArrayHandle};

/// Vertex arrays are not shared between contexts, so the context is part of
/// the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VaoKey {
    pub context: ContextId,
    pub index_buffer: Option<BufferId>,
    pub vertex_buffer: VertexBufferId,
    /// Storage behind `vertex_buffer`, for invalidation.
    pub vertex_storage: BufferId,
    pub instancing: bool,
}

impl VaoKey {
    pub fn references(&self, buffer: BufferId) -> bool {
        self.vertex_storage == buffer || self.index_buffer == Some(buffer)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VaoCache {
    entries: BTreeMap<VaoKey, VertexArrayHandle>,
}

impl VaoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &VaoKey) -> Option<VertexArrayHandle> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: VaoKey, handle: VertexArrayHandle) {
        self.entries.insert(key, handle);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry built on `buffer`, returning the orphaned handles
    /// together with the context that owns them.
    pub fn invalidate_buffer(&mut self, buffer: BufferId) -> Vec<(ContextId, VertexArrayHandle)> {
        let stale: Vec<VaoKey> = self
            .entries
            .keys()
            .filter(|key| key.references(buffer))
            .copied()
            .collect();

        stale
            .into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|handle| (key.context, handle)))
            .collect()
    }

    /// Empty the cache, returning every handle.
    pub fn drain(&mut self) -> Vec<(ContextId, VertexArrayHandle)> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(key, handle)| (key.context, handle))
            .collect()
    }
}
