//! The backend dispatch surface.
//!
//! This trait is the only boundary where native calls occur, and only
//! during replay. It is deliberately primitive: bind targets, apply state,
//! bind slots, draw, dispatch, move memory. One implementation exists per
//! backend generation, selected once at device creation; replay pays a
//! single indirection per opcode instead of per-opcode virtual hierarchies.
//!
//! Exactly one thread may hold the context current at a time; `&mut self`
//! on every method makes that the borrow checker's problem instead of a
//! runtime convention.

use vkgl_core::format::IndexType;
use vkgl_core::handle::Handle;
use vkgl_core::sync::AccessFlags;

use crate::geometry::GeometryKey;
use crate::pipeline::{BlendState, DepthStencilState, RasterState, ShaderStages};
use crate::transfer::{BufferCopy, BufferImageCopy, ClearValue, ImageBlit, ImageCopy};

/// Backend identity of one geometry (VAO) binding object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendGeometry(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend context lost")]
    ContextLost,

    #[error("backend out of memory")]
    OutOfMemory,

    #[error("backend call failed: {0}")]
    Native(String),
}

pub type BackendResult<T = ()> = Result<T, BackendError>;

pub trait BackendContext {
    // ── Render targets ──────────────────────────────────────

    /// Bind the given views as the active draw targets.
    fn bind_draw_targets(
        &mut self,
        colors: &[Handle],
        depth_stencil: Option<Handle>,
        extent: (u32, u32),
    ) -> BackendResult;

    /// Restore the default (or previously bound) render target.
    fn restore_default_targets(&mut self) -> BackendResult;

    fn clear_color_target(&mut self, target_index: u32, color: [f32; 4]) -> BackendResult;

    fn clear_depth_stencil_target(
        &mut self,
        depth: Option<f32>,
        stencil: Option<u32>,
    ) -> BackendResult;

    // ── Pipeline state ──────────────────────────────────────

    fn bind_program(&mut self, program: Handle) -> BackendResult;

    fn unbind_program(&mut self) -> BackendResult;

    fn apply_raster_state(&mut self, state: &RasterState) -> BackendResult;

    fn apply_depth_stencil_state(&mut self, state: &DepthStencilState) -> BackendResult;

    fn apply_blend_state(&mut self, state: &BlendState) -> BackendResult;

    /// Write a push-constant range into the currently bound program.
    fn apply_push_constants(
        &mut self,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) -> BackendResult;

    // ── Slot bindings ───────────────────────────────────────

    fn bind_uniform_buffer(
        &mut self,
        slot: u32,
        buffer: Handle,
        offset: u64,
        size: u64,
    ) -> BackendResult;

    fn bind_storage_buffer(
        &mut self,
        slot: u32,
        buffer: Handle,
        offset: u64,
        size: u64,
    ) -> BackendResult;

    fn bind_texture(&mut self, slot: u32, view: Handle, sampler: Handle) -> BackendResult;

    fn bind_storage_image(&mut self, slot: u32, view: Handle) -> BackendResult;

    // ── Geometry ────────────────────────────────────────────

    /// Create the binding object for one exact buffer combination.
    /// Requires a live, current context.
    fn create_geometry(&mut self, key: &GeometryKey) -> BackendResult<BackendGeometry>;

    fn bind_geometry(&mut self, geometry: BackendGeometry) -> BackendResult;

    fn unbind_geometry(&mut self) -> BackendResult;

    fn set_primitive_restart_index(&mut self, index: u32) -> BackendResult;

    // ── Draw / dispatch ─────────────────────────────────────

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> BackendResult;

    #[allow(clippy::too_many_arguments)]
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
        index_type: IndexType,
    ) -> BackendResult;

    fn draw_indirect(
        &mut self,
        buffer: Handle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) -> BackendResult;

    fn draw_indexed_indirect(
        &mut self,
        buffer: Handle,
        offset: u64,
        draw_count: u32,
        stride: u32,
        index_type: IndexType,
    ) -> BackendResult;

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> BackendResult;

    fn dispatch_indirect(&mut self, buffer: Handle, offset: u64) -> BackendResult;

    // ── Transfer ────────────────────────────────────────────

    fn copy_buffer(&mut self, src: Handle, dst: Handle, regions: &[BufferCopy]) -> BackendResult;

    fn copy_image(&mut self, src: Handle, dst: Handle, regions: &[ImageCopy]) -> BackendResult;

    fn copy_buffer_to_image(
        &mut self,
        src: Handle,
        dst: Handle,
        regions: &[BufferImageCopy],
    ) -> BackendResult;

    fn copy_image_to_buffer(
        &mut self,
        src: Handle,
        dst: Handle,
        regions: &[BufferImageCopy],
    ) -> BackendResult;

    fn blit_image(
        &mut self,
        src: Handle,
        dst: Handle,
        region: &ImageBlit,
        linear_filter: bool,
    ) -> BackendResult;

    fn fill_buffer(&mut self, buffer: Handle, offset: u64, size: u64, data: u32) -> BackendResult;

    fn update_buffer(&mut self, buffer: Handle, offset: u64, data: &[u8]) -> BackendResult;

    fn clear_color_image(&mut self, image: Handle, color: [f32; 4]) -> BackendResult;

    fn clear_depth_stencil_image(&mut self, image: Handle, value: ClearValue) -> BackendResult;

    // ── Coherency & barriers ────────────────────────────────

    /// Make host writes to a mapped buffer visible to the GPU.
    fn flush_mapped_buffer(&mut self, buffer: Handle) -> BackendResult;

    /// Make GPU writes to a mapped buffer visible to host reads.
    fn invalidate_mapped_buffer(&mut self, buffer: Handle) -> BackendResult;

    fn memory_barrier(&mut self, access: AccessFlags) -> BackendResult;

    // ── Queries ─────────────────────────────────────────────

    fn begin_query(&mut self, pool: Handle, query: u32) -> BackendResult;

    fn end_query(&mut self, pool: Handle, query: u32) -> BackendResult;

    fn write_timestamp(&mut self, pool: Handle, query: u32) -> BackendResult;

    /// Copy query results into a buffer. With `wait` set this blocks the
    /// submitting thread until results are available.
    #[allow(clippy::too_many_arguments)]
    fn copy_query_results(
        &mut self,
        pool: Handle,
        first_query: u32,
        query_count: u32,
        dst: Handle,
        offset: u64,
        stride: u64,
        wait: bool,
    ) -> BackendResult;

    // ── Queue synchronization ───────────────────────────────

    /// Blocks until the semaphore is signaled.
    fn wait_semaphore(&mut self, semaphore: Handle) -> BackendResult;

    fn signal_semaphore(&mut self, semaphore: Handle) -> BackendResult;

    fn signal_fence(&mut self, fence: Handle) -> BackendResult;
}
