//! Descriptor set layouts and sets.
//!
//! A layout declares typed binding slots; a set holds concrete writes
//! against those slots. Sets are interior-mutable: they are allocated once
//! and updated any number of times before being bound.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use vkgl_core::error::CoreError;
use vkgl_core::handle::Handle;

use crate::pipeline::ShaderStages;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    UniformBuffer,
    DynamicUniformBuffer,
    StorageBuffer,
    DynamicStorageBuffer,
    CombinedImageSampler,
    StorageImage,
}

impl DescriptorKind {
    /// Dynamic kinds consume one caller-supplied byte offset at bind time.
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            DescriptorKind::DynamicUniformBuffer | DescriptorKind::DynamicStorageBuffer
        )
    }

    /// Write-capable kinds require a download/invalidate after GPU work so
    /// mapped CPU reads observe the writes.
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            DescriptorKind::StorageBuffer
                | DescriptorKind::DynamicStorageBuffer
                | DescriptorKind::StorageImage
        )
    }

    pub fn binds_buffer(self) -> bool {
        matches!(
            self,
            DescriptorKind::UniformBuffer
                | DescriptorKind::DynamicUniformBuffer
                | DescriptorKind::StorageBuffer
                | DescriptorKind::DynamicStorageBuffer
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub count: u32,
    pub stages: ShaderStages,
}

/// Immutable after creation; safely shared by concurrent recordings.
pub struct DescriptorSetLayout {
    pub handle: Handle,
    /// Sorted by binding number
    bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn new(handle: Handle, mut bindings: Vec<LayoutBinding>) -> Result<Self, CoreError> {
        bindings.sort_by_key(|b| b.binding);
        for pair in bindings.windows(2) {
            if pair[0].binding == pair[1].binding {
                return Err(CoreError::ValidationError(format!(
                    "duplicate descriptor binding {}",
                    pair[0].binding
                )));
            }
        }
        Ok(Self { handle, bindings })
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }

    /// Number of dynamic-offset slots this layout consumes at bind time.
    pub fn dynamic_binding_count(&self) -> usize {
        self.bindings.iter().filter(|b| b.kind.is_dynamic()).count()
    }

    pub fn has_writable(&self) -> bool {
        self.bindings.iter().any(|b| b.kind.is_writable())
    }
}

/// A concrete resource written into a binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    Buffer {
        buffer: Handle,
        offset: u64,
        range: u64,
    },
    ImageSampler {
        view: Handle,
        sampler: Handle,
    },
    StorageImage {
        view: Handle,
    },
}

impl DescriptorResource {
    fn matches(&self, kind: DescriptorKind) -> bool {
        match self {
            DescriptorResource::Buffer { .. } => kind.binds_buffer(),
            DescriptorResource::ImageSampler { .. } => kind == DescriptorKind::CombinedImageSampler,
            DescriptorResource::StorageImage { .. } => kind == DescriptorKind::StorageImage,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub resource: DescriptorResource,
}

pub struct DescriptorSet {
    pub handle: Handle,
    layout: Arc<DescriptorSetLayout>,
    writes: RwLock<HashMap<u32, DescriptorResource>>,
}

impl DescriptorSet {
    pub fn new(handle: Handle, layout: Arc<DescriptorSetLayout>) -> Self {
        Self {
            handle,
            layout,
            writes: RwLock::new(HashMap::new()),
        }
    }

    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    /// Apply writes. Each write must target a declared binding of a
    /// matching kind.
    pub fn update(&self, writes: &[DescriptorWrite]) -> Result<(), CoreError> {
        for write in writes {
            let binding = self.layout.binding(write.binding).ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "write to undeclared binding {}",
                    write.binding
                ))
            })?;
            if !write.resource.matches(binding.kind) {
                return Err(CoreError::ValidationError(format!(
                    "resource kind mismatch at binding {}",
                    write.binding
                )));
            }
        }
        let mut table = self.writes.write();
        for write in writes {
            table.insert(write.binding, write.resource);
        }
        Ok(())
    }

    pub fn resource(&self, binding: u32) -> Option<DescriptorResource> {
        self.writes.read().get(&binding).copied()
    }

    /// Every buffer currently written into this set, with its binding.
    pub fn bound_buffers(&self) -> Vec<(u32, Handle)> {
        let table = self.writes.read();
        let mut out: Vec<(u32, Handle)> = table
            .iter()
            .filter_map(|(binding, res)| match res {
                DescriptorResource::Buffer { buffer, .. } => Some((*binding, *buffer)),
                _ => None,
            })
            .collect();
        out.sort_by_key(|(binding, _)| *binding);
        out
    }

    /// Buffers written into write-capable bindings.
    pub fn writable_buffers(&self) -> Vec<Handle> {
        let table = self.writes.read();
        let mut out: Vec<Handle> = self
            .layout
            .bindings()
            .iter()
            .filter(|b| b.kind.is_writable() && b.kind.binds_buffer())
            .filter_map(|b| match table.get(&b.binding) {
                Some(DescriptorResource::Buffer { buffer, .. }) => Some(*buffer),
                _ => None,
            })
            .collect();
        out.dedup();
        out
    }
}
