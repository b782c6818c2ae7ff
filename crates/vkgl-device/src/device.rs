//! The device: arena ownership of every engine object behind opaque
//! handles, plus the capability table, configuration, diagnostics channel,
//! and the geometry cache. There is no process-global state; everything is
//! per-device.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use dashmap::DashMap;
use tracing::debug;

use vkgl_core::caps::DeviceCaps;
use vkgl_core::config::EngineConfig;
use vkgl_core::diag::{Diagnostic, DiagnosticSink};
use vkgl_core::error::CoreError;
use vkgl_core::format::IndexType;
use vkgl_core::handle::{Handle, HandleAllocator, ResourceType};

use crate::descriptor::{DescriptorSet, DescriptorSetLayout, DescriptorWrite, LayoutBinding};
use crate::framebuffer::{Framebuffer, FramebufferAttachment, FramebufferDesc};
use crate::geometry::{GeometryBuffers, GeometryCache, GeometryKey, IndexBinding};
use crate::pipeline::{
    ComputePipelineDesc, GraphicsPipelineDesc, Pipeline, PipelineLayout, PushConstantRange,
    ShaderStages,
};
use crate::render_pass::{RenderPass, RenderPassDesc};
use crate::resource::{
    Buffer, BufferDesc, BufferUsage, Image, ImageDesc, ImageView, ImageViewDesc, QueryKind,
    QueryPool, Sampler, SamplerDesc, ShaderProgram,
};

/// Size of the device-owned dummy index buffer the reserved no-attribute
/// geometry routes through.
const DUMMY_INDEX_BUFFER_SIZE: u64 = 4096;

pub struct Device {
    caps: DeviceCaps,
    config: EngineConfig,
    allocator: HandleAllocator,
    diag: DiagnosticSink,
    diag_rx: Receiver<Diagnostic>,

    buffers: DashMap<Handle, Arc<Buffer>>,
    images: DashMap<Handle, Arc<Image>>,
    image_views: DashMap<Handle, Arc<ImageView>>,
    samplers: DashMap<Handle, Arc<Sampler>>,
    programs: DashMap<Handle, Arc<ShaderProgram>>,
    set_layouts: DashMap<Handle, Arc<DescriptorSetLayout>>,
    descriptor_sets: DashMap<Handle, Arc<DescriptorSet>>,
    pipeline_layouts: DashMap<Handle, Arc<PipelineLayout>>,
    pipelines: DashMap<Handle, Arc<Pipeline>>,
    render_passes: DashMap<Handle, Arc<RenderPass>>,
    framebuffers: DashMap<Handle, Arc<Framebuffer>>,
    query_pools: DashMap<Handle, Arc<QueryPool>>,

    geometry_cache: GeometryCache,
    dummy_index_buffer: Handle,
    empty_geometry: Arc<GeometryBuffers>,
}

impl Device {
    pub fn new(caps: DeviceCaps, config: EngineConfig) -> Self {
        let caps = config.caps.apply(caps);
        let (diag, diag_rx) = DiagnosticSink::new(config.diagnostics.log_dropped_commands);
        let allocator = HandleAllocator::new();

        let buffers = DashMap::new();
        let dummy_index_buffer = allocator.alloc(ResourceType::Buffer);
        buffers.insert(
            dummy_index_buffer,
            Arc::new(Buffer::new(
                dummy_index_buffer,
                BufferDesc {
                    size: DUMMY_INDEX_BUFFER_SIZE,
                    usage: BufferUsage::INDEX,
                    host_visible: false,
                },
            )),
        );

        let geometry_cache = GeometryCache::new();
        // Reserved entry for pipelines with no vertex attributes: no vertex
        // buffers, indices from the device-owned dummy buffer, so every
        // draw takes the indexed path.
        let empty_geometry = geometry_cache.resolve(GeometryKey::new(
            Vec::new(),
            Some(IndexBinding {
                buffer: dummy_index_buffer,
                offset: 0,
                index_type: IndexType::U32,
            }),
        ));

        debug!(?caps, "device created");

        Self {
            caps,
            config,
            allocator,
            diag,
            diag_rx,
            buffers,
            images: DashMap::new(),
            image_views: DashMap::new(),
            samplers: DashMap::new(),
            programs: DashMap::new(),
            set_layouts: DashMap::new(),
            descriptor_sets: DashMap::new(),
            pipeline_layouts: DashMap::new(),
            pipelines: DashMap::new(),
            render_passes: DashMap::new(),
            framebuffers: DashMap::new(),
            query_pools: DashMap::new(),
            geometry_cache,
            dummy_index_buffer,
            empty_geometry,
        }
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diag
    }

    /// Receiver side of the diagnostics channel.
    pub fn diagnostic_events(&self) -> &Receiver<Diagnostic> {
        &self.diag_rx
    }

    pub fn geometry_cache(&self) -> &GeometryCache {
        &self.geometry_cache
    }

    /// The reserved no-attribute geometry entry.
    pub fn empty_geometry(&self) -> &Arc<GeometryBuffers> {
        &self.empty_geometry
    }

    pub fn dummy_index_buffer(&self) -> Handle {
        self.dummy_index_buffer
    }

    // ── Buffers ─────────────────────────────────────────────

    pub fn create_buffer(&self, desc: BufferDesc) -> Handle {
        let handle = self.allocator.alloc(ResourceType::Buffer);
        self.buffers.insert(handle, Arc::new(Buffer::new(handle, desc)));
        debug!(?handle, size = desc.size, "created buffer");
        handle
    }

    /// Marks the buffer destroyed and drops it from the registry. Mapped
    /// sync opcodes referencing it are retracted by their command buffers
    /// through the shared liveness flag.
    pub fn destroy_buffer(&self, handle: Handle) {
        if let Some((_, buffer)) = self.buffers.remove(&handle) {
            buffer.mark_destroyed();
            debug!(?handle, "destroyed buffer");
        }
    }

    pub fn map_buffer(&self, handle: Handle) -> Result<(), CoreError> {
        let buffer = self
            .buffers
            .get(&handle)
            .ok_or(CoreError::HandleNotFound(handle))?;
        if !buffer.desc.host_visible {
            return Err(CoreError::ValidationError(format!(
                "buffer {:?} is not host visible",
                handle
            )));
        }
        buffer.set_mapped(true);
        Ok(())
    }

    pub fn unmap_buffer(&self, handle: Handle) -> Result<(), CoreError> {
        let buffer = self
            .buffers
            .get(&handle)
            .ok_or(CoreError::HandleNotFound(handle))?;
        buffer.set_mapped(false);
        Ok(())
    }

    pub fn buffer(&self, handle: Handle) -> Option<Arc<Buffer>> {
        self.buffers.get(&handle).map(|v| v.clone())
    }

    // ── Images, views, samplers ─────────────────────────────

    pub fn create_image(&self, desc: ImageDesc) -> Handle {
        let handle = self.allocator.alloc(ResourceType::Image);
        self.images.insert(handle, Arc::new(Image { handle, desc }));
        handle
    }

    pub fn destroy_image(&self, handle: Handle) {
        self.images.remove(&handle);
    }

    pub fn image(&self, handle: Handle) -> Option<Arc<Image>> {
        self.images.get(&handle).map(|v| v.clone())
    }

    pub fn create_image_view(&self, desc: ImageViewDesc) -> Result<Handle, CoreError> {
        if !self.images.contains_key(&desc.image) {
            return Err(CoreError::HandleNotFound(desc.image));
        }
        let handle = self.allocator.alloc(ResourceType::ImageView);
        self.image_views
            .insert(handle, Arc::new(ImageView { handle, desc }));
        Ok(handle)
    }

    pub fn image_view(&self, handle: Handle) -> Option<Arc<ImageView>> {
        self.image_views.get(&handle).map(|v| v.clone())
    }

    pub fn create_sampler(&self, desc: SamplerDesc) -> Handle {
        let handle = self.allocator.alloc(ResourceType::Sampler);
        self.samplers
            .insert(handle, Arc::new(Sampler { handle, desc }));
        handle
    }

    pub fn sampler(&self, handle: Handle) -> Option<Arc<Sampler>> {
        self.samplers.get(&handle).map(|v| v.clone())
    }

    // ── Shader programs ─────────────────────────────────────

    /// Register an externally compiled-and-linked program.
    pub fn create_shader_program(&self, stages: ShaderStages) -> Handle {
        let handle = self.allocator.alloc(ResourceType::ShaderProgram);
        self.programs
            .insert(handle, Arc::new(ShaderProgram { handle, stages }));
        handle
    }

    pub fn shader_program(&self, handle: Handle) -> Option<Arc<ShaderProgram>> {
        self.programs.get(&handle).map(|v| v.clone())
    }

    // ── Descriptors ─────────────────────────────────────────

    pub fn create_descriptor_set_layout(
        &self,
        bindings: Vec<LayoutBinding>,
    ) -> Result<Handle, CoreError> {
        let handle = self.allocator.alloc(ResourceType::DescriptorSetLayout);
        let layout = DescriptorSetLayout::new(handle, bindings)?;
        self.set_layouts.insert(handle, Arc::new(layout));
        Ok(handle)
    }

    pub fn descriptor_set_layout(&self, handle: Handle) -> Option<Arc<DescriptorSetLayout>> {
        self.set_layouts.get(&handle).map(|v| v.clone())
    }

    pub fn allocate_descriptor_set(&self, layout: Handle) -> Result<Handle, CoreError> {
        let layout = self
            .descriptor_set_layout(layout)
            .ok_or(CoreError::HandleNotFound(layout))?;
        let handle = self.allocator.alloc(ResourceType::DescriptorSet);
        self.descriptor_sets
            .insert(handle, Arc::new(DescriptorSet::new(handle, layout)));
        Ok(handle)
    }

    pub fn update_descriptor_set(
        &self,
        set: Handle,
        writes: &[DescriptorWrite],
    ) -> Result<(), CoreError> {
        let set = self
            .descriptor_set(set)
            .ok_or(CoreError::HandleNotFound(set))?;
        set.update(writes)
    }

    pub fn descriptor_set(&self, handle: Handle) -> Option<Arc<DescriptorSet>> {
        self.descriptor_sets.get(&handle).map(|v| v.clone())
    }

    // ── Pipelines ───────────────────────────────────────────

    pub fn create_pipeline_layout(
        &self,
        set_layouts: &[Handle],
        push_constant_ranges: Vec<PushConstantRange>,
    ) -> Result<Handle, CoreError> {
        let mut layouts = Vec::with_capacity(set_layouts.len());
        for &h in set_layouts {
            layouts.push(
                self.descriptor_set_layout(h)
                    .ok_or(CoreError::HandleNotFound(h))?,
            );
        }
        let handle = self.allocator.alloc(ResourceType::PipelineLayout);
        self.pipeline_layouts.insert(
            handle,
            Arc::new(PipelineLayout::new(handle, layouts, push_constant_ranges)),
        );
        Ok(handle)
    }

    pub fn pipeline_layout(&self, handle: Handle) -> Option<Arc<PipelineLayout>> {
        self.pipeline_layouts.get(&handle).map(|v| v.clone())
    }

    pub fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
    ) -> Result<Handle, CoreError> {
        if !self.programs.contains_key(&desc.program) {
            return Err(CoreError::HandleNotFound(desc.program));
        }
        if !self.render_passes.contains_key(&desc.render_pass) {
            return Err(CoreError::HandleNotFound(desc.render_pass));
        }
        let layout = self
            .pipeline_layout(desc.layout)
            .ok_or(CoreError::HandleNotFound(desc.layout))?;
        let handle = self.allocator.alloc(ResourceType::Pipeline);
        self.pipelines
            .insert(handle, Arc::new(Pipeline::graphics(handle, desc, layout)));
        Ok(handle)
    }

    pub fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<Handle, CoreError> {
        if !self.programs.contains_key(&desc.program) {
            return Err(CoreError::HandleNotFound(desc.program));
        }
        let layout = self
            .pipeline_layout(desc.layout)
            .ok_or(CoreError::HandleNotFound(desc.layout))?;
        let handle = self.allocator.alloc(ResourceType::Pipeline);
        self.pipelines
            .insert(handle, Arc::new(Pipeline::compute(handle, desc, layout)));
        Ok(handle)
    }

    pub fn pipeline(&self, handle: Handle) -> Option<Arc<Pipeline>> {
        self.pipelines.get(&handle).map(|v| v.clone())
    }

    // ── Render passes & framebuffers ────────────────────────

    pub fn create_render_pass(&self, desc: RenderPassDesc) -> Result<Handle, CoreError> {
        let handle = self.allocator.alloc(ResourceType::RenderPass);
        let pass = RenderPass::new(handle, desc)?;
        self.render_passes.insert(handle, Arc::new(pass));
        Ok(handle)
    }

    pub fn render_pass(&self, handle: Handle) -> Option<Arc<RenderPass>> {
        self.render_passes.get(&handle).map(|v| v.clone())
    }

    pub fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<Handle, CoreError> {
        let pass = self
            .render_pass(desc.render_pass)
            .ok_or(CoreError::HandleNotFound(desc.render_pass))?;
        let mut attachments = Vec::with_capacity(desc.attachments.len());
        for &view_handle in &desc.attachments {
            let view = self
                .image_view(view_handle)
                .ok_or(CoreError::HandleNotFound(view_handle))?;
            let image = self
                .image(view.desc.image)
                .ok_or(CoreError::HandleNotFound(view.desc.image))?;
            attachments.push(FramebufferAttachment {
                view: view_handle,
                format: view.desc.format,
                samples: image.desc.samples,
            });
        }
        let handle = self.allocator.alloc(ResourceType::Framebuffer);
        let framebuffer = Framebuffer::new(
            handle,
            pass,
            attachments,
            desc.width,
            desc.height,
            desc.layers,
        )?;
        self.framebuffers.insert(handle, Arc::new(framebuffer));
        Ok(handle)
    }

    pub fn framebuffer(&self, handle: Handle) -> Option<Arc<Framebuffer>> {
        self.framebuffers.get(&handle).map(|v| v.clone())
    }

    // ── Queries & queue sync objects ────────────────────────

    pub fn create_query_pool(&self, kind: QueryKind, count: u32) -> Handle {
        let handle = self.allocator.alloc(ResourceType::QueryPool);
        self.query_pools
            .insert(handle, Arc::new(QueryPool { handle, kind, count }));
        handle
    }

    pub fn query_pool(&self, handle: Handle) -> Option<Arc<QueryPool>> {
        self.query_pools.get(&handle).map(|v| v.clone())
    }

    pub fn create_fence(&self) -> Handle {
        self.allocator.alloc(ResourceType::Fence)
    }

    pub fn create_semaphore(&self) -> Handle {
        self.allocator.alloc(ResourceType::Semaphore)
    }
}
