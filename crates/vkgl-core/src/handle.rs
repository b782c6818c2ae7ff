use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque handle that uniquely identifies an engine resource.
/// Opaque to the caller -- the device assigns these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Unique resource identifier within the device
    pub resource_id: u64,
    /// Type tag for debugging and validation
    pub resource_type: ResourceType,
}

impl Handle {
    /// Create a null/invalid handle.
    pub fn null() -> Self {
        Self {
            resource_id: 0,
            resource_type: ResourceType::None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.resource_type == ResourceType::None && self.resource_id == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    None,

    Buffer,
    Image,
    ImageView,
    Sampler,
    ShaderProgram,
    RenderPass,
    Framebuffer,
    PipelineLayout,
    Pipeline,
    DescriptorSetLayout,
    DescriptorSet,
    QueryPool,
    Fence,
    Semaphore,
}

/// Per-device handle allocator. Generates unique handles for one device.
pub struct HandleAllocator {
    next_id: AtomicU64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self {
            // Start from 1 to avoid confusion with NULL/0 handles
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a new handle with the given resource type.
    pub fn alloc(&self, resource_type: ResourceType) -> Handle {
        Handle {
            resource_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            resource_type,
        }
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
