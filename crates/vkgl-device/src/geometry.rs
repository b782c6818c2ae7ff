//! Geometry-buffers (VAO) cache.
//!
//! The backend binds vertex/index buffers through a single binding object
//! per exact buffer combination. Entries are created lazily: a cache lookup
//! at record time needs no live context, the backend object is built at
//! first submission.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use vkgl_core::format::IndexType;
use vkgl_core::handle::Handle;

use crate::backend::BackendGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub slot: u32,
    pub buffer: Handle,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBinding {
    pub buffer: Handle,
    pub offset: u64,
    pub index_type: IndexType,
}

/// The exact combination of bound buffers a backend binding object covers.
/// Vertex bindings are kept sorted by slot so equal combinations compare
/// equal regardless of bind order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GeometryKey {
    pub vertex_buffers: Vec<VertexBufferBinding>,
    pub index: Option<IndexBinding>,
}

impl GeometryKey {
    pub fn new(mut vertex_buffers: Vec<VertexBufferBinding>, index: Option<IndexBinding>) -> Self {
        vertex_buffers.sort_by_key(|b| b.slot);
        Self {
            vertex_buffers,
            index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_buffers.is_empty() && self.index.is_none()
    }
}

/// One cache entry. The backend object id is written exactly once, under a
/// live context at submission.
pub struct GeometryBuffers {
    key: GeometryKey,
    backend: OnceLock<BackendGeometry>,
}

impl std::fmt::Debug for GeometryBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryBuffers")
            .field("key", &self.key)
            .field("backend", &self.backend.get())
            .finish()
    }
}

impl GeometryBuffers {
    fn new(key: GeometryKey) -> Self {
        Self {
            key,
            backend: OnceLock::new(),
        }
    }

    pub fn key(&self) -> &GeometryKey {
        &self.key
    }

    pub fn backend(&self) -> Option<BackendGeometry> {
        self.backend.get().copied()
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.get().is_some()
    }

    /// Record the backend object for this entry. A second initialization of
    /// the same entry is ignored; the first one wins.
    pub fn initialize(&self, backend: BackendGeometry) {
        let _ = self.backend.set(backend);
    }
}

/// Device-wide cache: identical combinations always resolve to the same
/// entry, distinct combinations never collide.
pub struct GeometryCache {
    entries: DashMap<GeometryKey, Arc<GeometryBuffers>>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Pure and idempotent for a given key.
    pub fn resolve(&self, key: GeometryKey) -> Arc<GeometryBuffers> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(GeometryBuffers::new(key)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for GeometryCache {
    fn default() -> Self {
        Self::new()
    }
}
