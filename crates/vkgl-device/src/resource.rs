//! Buffer, image, sampler, and shader-program records.
//!
//! These are identity records: the actual storage lives backend-side and is
//! addressed by handle. Buffers additionally carry the mapped/alive state
//! the coherency machinery reads at record time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use vkgl_core::format::Format;
use vkgl_core::handle::Handle;

use crate::pipeline::ShaderStages;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const INDIRECT = 1 << 4;
        const TRANSFER_SRC = 1 << 5;
        const TRANSFER_DST = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    /// Host-visible buffers may be mapped for CPU access
    pub host_visible: bool,
}

/// A buffer identity. `mapped` tracks whether the host currently holds a
/// pointer into it; `alive` is shared with every mapped-buffer registry
/// entry referencing this buffer so destruction can retract sync opcodes.
pub struct Buffer {
    pub handle: Handle,
    pub desc: BufferDesc,
    mapped: AtomicBool,
    alive: Arc<AtomicBool>,
}

impl Buffer {
    pub fn new(handle: Handle, desc: BufferDesc) -> Self {
        Self {
            handle,
            desc,
            mapped: AtomicBool::new(false),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    pub fn set_mapped(&self, mapped: bool) {
        self.mapped.store(mapped, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_destroyed(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Shared liveness flag, cloned into mapped-buffer registry entries.
    pub fn liveness(&self) -> Arc<AtomicBool> {
        self.alive.clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: u32,
    pub usage: ImageUsage,
}

pub struct Image {
    pub handle: Handle,
    pub desc: ImageDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageViewDesc {
    pub image: Handle,
    pub format: Format,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

pub struct ImageView {
    pub handle: Handle,
    pub desc: ImageViewDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            address_w: AddressMode::Repeat,
        }
    }
}

pub struct Sampler {
    pub handle: Handle,
    pub desc: SamplerDesc,
}

/// A compiled-and-linked shader program, produced by the (external) shader
/// translation layer. The engine only needs its identity and stage set.
pub struct ShaderProgram {
    pub handle: Handle,
    pub stages: ShaderStages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Occlusion,
    Timestamp,
}

pub struct QueryPool {
    pub handle: Handle,
    pub kind: QueryKind,
    pub count: u32,
}
