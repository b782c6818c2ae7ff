//! The deferred command list.
//!
//! Recording appends one tagged opcode per backend-visible step; replay
//! walks the list in order. Opcodes are backend-shaped, not API-shaped:
//! render-pass structure is already synthesized into target binds and
//! clears by the time it lands here.

use std::sync::Arc;

use vkgl_core::format::IndexType;
use vkgl_core::handle::Handle;
use vkgl_core::sync::{AccessFlags, PipelineStages};

use vkgl_device::geometry::GeometryBuffers;
use vkgl_device::pipeline::ShaderStages;
use vkgl_device::transfer::{BufferCopy, BufferImageCopy, ClearValue, ImageBlit, ImageCopy};

/// A clear resolved against the active subpass: color clears address the
/// draw-target position, not the render-pass attachment index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetClear {
    pub target: ClearTarget,
    pub value: ClearValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearTarget {
    /// Position within the subpass's color attachment list
    Color(u32),
    DepthStencil,
}

#[derive(Debug, Clone)]
pub enum Opcode {
    // ── Render-pass synthesis ───────────────────────────────
    /// Bind one subpass's attachment set as the active draw targets and
    /// apply its load-op clears.
    BeginSubpass {
        render_pass: Handle,
        framebuffer: Handle,
        subpass: u32,
        clears: Vec<TargetClear>,
    },
    /// Marker closing the active subpass's attachment bindings.
    EndSubpass {
        subpass: u32,
    },
    /// Restore the default render target.
    EndRenderPass,

    // ── Pipeline & resources ────────────────────────────────
    BindPipeline {
        pipeline: Handle,
    },
    PushConstants {
        stages: ShaderStages,
        offset: u32,
        data: Vec<u8>,
    },
    BindDescriptorSet {
        layout: Handle,
        set_index: u32,
        set: Handle,
        dynamic_offsets: Vec<u32>,
    },
    /// Make host writes to a mapped buffer visible before GPU reads.
    FlushMappedBuffer {
        buffer: Handle,
    },
    /// Make GPU writes visible to subsequent host reads of a mapped buffer.
    InvalidateMappedBuffer {
        buffer: Handle,
    },

    // ── Geometry ────────────────────────────────────────────
    BindGeometry {
        geometry: Arc<GeometryBuffers>,
    },
    UnbindGeometry,
    SetPrimitiveRestart {
        index: u32,
    },

    // ── Draw / dispatch ─────────────────────────────────────
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
        index_type: IndexType,
    },
    DrawIndirect {
        buffer: Handle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: Handle,
        offset: u64,
        draw_count: u32,
        stride: u32,
        index_type: IndexType,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchIndirect {
        buffer: Handle,
        offset: u64,
    },

    // ── Clears & transfer ───────────────────────────────────
    ClearColorImage {
        image: Handle,
        color: [f32; 4],
    },
    ClearDepthStencilImage {
        image: Handle,
        value: ClearValue,
    },
    /// Clear regions of the active subpass's targets.
    ClearTargets {
        clears: Vec<TargetClear>,
    },
    CopyBuffer {
        src: Handle,
        dst: Handle,
        regions: Vec<BufferCopy>,
    },
    CopyImage {
        src: Handle,
        dst: Handle,
        regions: Vec<ImageCopy>,
    },
    CopyBufferToImage {
        src: Handle,
        dst: Handle,
        regions: Vec<BufferImageCopy>,
    },
    CopyImageToBuffer {
        src: Handle,
        dst: Handle,
        regions: Vec<BufferImageCopy>,
    },
    BlitImage {
        src: Handle,
        dst: Handle,
        region: ImageBlit,
        linear_filter: bool,
    },
    FillBuffer {
        buffer: Handle,
        offset: u64,
        size: u64,
        data: u32,
    },
    UpdateBuffer {
        buffer: Handle,
        offset: u64,
        data: Vec<u8>,
    },

    // ── Barriers & queries ──────────────────────────────────
    Barrier {
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        src_access: AccessFlags,
        dst_access: AccessFlags,
    },
    BeginQuery {
        pool: Handle,
        query: u32,
    },
    EndQuery {
        pool: Handle,
        query: u32,
    },
    WriteTimestamp {
        pool: Handle,
        query: u32,
    },
    CopyQueryResults {
        pool: Handle,
        first_query: u32,
        query_count: u32,
        dst: Handle,
        offset: u64,
        stride: u64,
        wait: bool,
    },

    // ── After-submit restoration ────────────────────────────
    UnbindProgram,
}
