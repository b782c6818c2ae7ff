//! Integration test: queue submission and replay
//!
//! Replays recorded command buffers against a tracing backend context and
//! verifies call order, lazy geometry initialization, descriptor slot
//! expansion, after-submit restoration, and failure propagation.
//!
//! Run with: cargo test -p vkgl-cmd --test replay_test

use std::sync::Arc;

use vkgl_core::caps::DeviceCaps;
use vkgl_core::config::EngineConfig;
use vkgl_core::format::{Format, IndexType};
use vkgl_core::handle::Handle;
use vkgl_core::sync::{AccessFlags, PipelineStages};

use vkgl_device::backend::{BackendContext, BackendError, BackendGeometry, BackendResult};
use vkgl_device::descriptor::{
    DescriptorKind, DescriptorResource, DescriptorWrite, LayoutBinding,
};
use vkgl_device::device::Device;
use vkgl_device::framebuffer::FramebufferDesc;
use vkgl_device::geometry::GeometryKey;
use vkgl_device::pipeline::{
    BlendState, DepthStencilState, GraphicsPipelineDesc, InputAssemblyState, PipelineBindPoint,
    PrimitiveTopology, RasterState, ShaderStages, VertexAttributeDesc, VertexBindingDesc,
    VertexInputRate, VertexInputState,
};
use vkgl_device::render_pass::{
    AttachmentDescription, AttachmentReference, LoadOp, RenderPassDesc, StoreOp, SubpassDesc,
};
use vkgl_device::resource::{BufferDesc, BufferUsage, ImageDesc, ImageUsage, ImageViewDesc};
use vkgl_device::transfer::{BufferCopy, BufferImageCopy, ClearValue, ImageBlit, ImageCopy};

use vkgl_cmd::{CommandBuffer, CommandBufferLevel, CommandBufferUsage, Queue, SubmitError, SubmitInfo};

/// Backend context that records every dispatch call as a line of text.
#[derive(Default)]
struct TraceContext {
    calls: Vec<String>,
    geometry_created: u64,
    fail_on_draw: bool,
}

impl TraceContext {
    fn position(&self, needle: &str) -> usize {
        self.calls
            .iter()
            .position(|c| c.starts_with(needle))
            .unwrap_or_else(|| panic!("call {:?} not found in {:?}", needle, self.calls))
    }

    fn count(&self, needle: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(needle)).count()
    }
}

impl BackendContext for TraceContext {
    fn bind_draw_targets(
        &mut self,
        colors: &[Handle],
        depth_stencil: Option<Handle>,
        _extent: (u32, u32),
    ) -> BackendResult {
        self.calls.push(format!(
            "bind_draw_targets colors={} depth={}",
            colors.len(),
            depth_stencil.is_some()
        ));
        Ok(())
    }

    fn restore_default_targets(&mut self) -> BackendResult {
        self.calls.push("restore_default_targets".into());
        Ok(())
    }

    fn clear_color_target(&mut self, target_index: u32, _color: [f32; 4]) -> BackendResult {
        self.calls.push(format!("clear_color_target {}", target_index));
        Ok(())
    }

    fn clear_depth_stencil_target(
        &mut self,
        _depth: Option<f32>,
        _stencil: Option<u32>,
    ) -> BackendResult {
        self.calls.push("clear_depth_stencil_target".into());
        Ok(())
    }

    fn bind_program(&mut self, program: Handle) -> BackendResult {
        self.calls.push(format!("bind_program {}", program.resource_id));
        Ok(())
    }

    fn unbind_program(&mut self) -> BackendResult {
        self.calls.push("unbind_program".into());
        Ok(())
    }

    fn apply_raster_state(&mut self, _state: &RasterState) -> BackendResult {
        self.calls.push("apply_raster_state".into());
        Ok(())
    }

    fn apply_depth_stencil_state(&mut self, _state: &DepthStencilState) -> BackendResult {
        self.calls.push("apply_depth_stencil_state".into());
        Ok(())
    }

    fn apply_blend_state(&mut self, _state: &BlendState) -> BackendResult {
        self.calls.push("apply_blend_state".into());
        Ok(())
    }

    fn apply_push_constants(
        &mut self,
        _stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) -> BackendResult {
        self.calls
            .push(format!("apply_push_constants offset={} len={}", offset, data.len()));
        Ok(())
    }

    fn bind_uniform_buffer(
        &mut self,
        slot: u32,
        _buffer: Handle,
        offset: u64,
        _size: u64,
    ) -> BackendResult {
        self.calls
            .push(format!("bind_uniform_buffer slot={} offset={}", slot, offset));
        Ok(())
    }

    fn bind_storage_buffer(
        &mut self,
        slot: u32,
        _buffer: Handle,
        offset: u64,
        _size: u64,
    ) -> BackendResult {
        self.calls
            .push(format!("bind_storage_buffer slot={} offset={}", slot, offset));
        Ok(())
    }

    fn bind_texture(&mut self, slot: u32, _view: Handle, _sampler: Handle) -> BackendResult {
        self.calls.push(format!("bind_texture slot={}", slot));
        Ok(())
    }

    fn bind_storage_image(&mut self, slot: u32, _view: Handle) -> BackendResult {
        self.calls.push(format!("bind_storage_image slot={}", slot));
        Ok(())
    }

    fn create_geometry(&mut self, key: &GeometryKey) -> BackendResult<BackendGeometry> {
        self.geometry_created += 1;
        self.calls.push(format!(
            "create_geometry buffers={} indexed={}",
            key.vertex_buffers.len(),
            key.index.is_some()
        ));
        Ok(BackendGeometry(self.geometry_created))
    }

    fn bind_geometry(&mut self, geometry: BackendGeometry) -> BackendResult {
        self.calls.push(format!("bind_geometry {}", geometry.0));
        Ok(())
    }

    fn unbind_geometry(&mut self) -> BackendResult {
        self.calls.push("unbind_geometry".into());
        Ok(())
    }

    fn set_primitive_restart_index(&mut self, index: u32) -> BackendResult {
        self.calls.push(format!("set_primitive_restart_index {:#x}", index));
        Ok(())
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) -> BackendResult {
        if self.fail_on_draw {
            return Err(BackendError::ContextLost);
        }
        self.calls
            .push(format!("draw vertices={} instances={}", vertex_count, instance_count));
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
        _index_type: IndexType,
    ) -> BackendResult {
        if self.fail_on_draw {
            return Err(BackendError::ContextLost);
        }
        self.calls.push(format!(
            "draw_indexed indices={} instances={}",
            index_count, instance_count
        ));
        Ok(())
    }

    fn draw_indirect(
        &mut self,
        _buffer: Handle,
        _offset: u64,
        draw_count: u32,
        _stride: u32,
    ) -> BackendResult {
        self.calls.push(format!("draw_indirect count={}", draw_count));
        Ok(())
    }

    fn draw_indexed_indirect(
        &mut self,
        _buffer: Handle,
        _offset: u64,
        draw_count: u32,
        _stride: u32,
        _index_type: IndexType,
    ) -> BackendResult {
        self.calls
            .push(format!("draw_indexed_indirect count={}", draw_count));
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> BackendResult {
        self.calls.push(format!("dispatch {}x{}x{}", x, y, z));
        Ok(())
    }

    fn dispatch_indirect(&mut self, _buffer: Handle, _offset: u64) -> BackendResult {
        self.calls.push("dispatch_indirect".into());
        Ok(())
    }

    fn copy_buffer(&mut self, _src: Handle, _dst: Handle, regions: &[BufferCopy]) -> BackendResult {
        self.calls.push(format!("copy_buffer regions={}", regions.len()));
        Ok(())
    }

    fn copy_image(&mut self, _src: Handle, _dst: Handle, regions: &[ImageCopy]) -> BackendResult {
        self.calls.push(format!("copy_image regions={}", regions.len()));
        Ok(())
    }

    fn copy_buffer_to_image(
        &mut self,
        _src: Handle,
        _dst: Handle,
        regions: &[BufferImageCopy],
    ) -> BackendResult {
        self.calls
            .push(format!("copy_buffer_to_image regions={}", regions.len()));
        Ok(())
    }

    fn copy_image_to_buffer(
        &mut self,
        _src: Handle,
        _dst: Handle,
        regions: &[BufferImageCopy],
    ) -> BackendResult {
        self.calls
            .push(format!("copy_image_to_buffer regions={}", regions.len()));
        Ok(())
    }

    fn blit_image(
        &mut self,
        _src: Handle,
        _dst: Handle,
        _region: &ImageBlit,
        linear_filter: bool,
    ) -> BackendResult {
        self.calls.push(format!("blit_image linear={}", linear_filter));
        Ok(())
    }

    fn fill_buffer(&mut self, _buffer: Handle, _offset: u64, size: u64, data: u32) -> BackendResult {
        self.calls.push(format!("fill_buffer size={} data={}", size, data));
        Ok(())
    }

    fn update_buffer(&mut self, _buffer: Handle, offset: u64, data: &[u8]) -> BackendResult {
        self.calls
            .push(format!("update_buffer offset={} len={}", offset, data.len()));
        Ok(())
    }

    fn clear_color_image(&mut self, _image: Handle, _color: [f32; 4]) -> BackendResult {
        self.calls.push("clear_color_image".into());
        Ok(())
    }

    fn clear_depth_stencil_image(&mut self, _image: Handle, _value: ClearValue) -> BackendResult {
        self.calls.push("clear_depth_stencil_image".into());
        Ok(())
    }

    fn flush_mapped_buffer(&mut self, buffer: Handle) -> BackendResult {
        self.calls
            .push(format!("flush_mapped_buffer {}", buffer.resource_id));
        Ok(())
    }

    fn invalidate_mapped_buffer(&mut self, buffer: Handle) -> BackendResult {
        self.calls
            .push(format!("invalidate_mapped_buffer {}", buffer.resource_id));
        Ok(())
    }

    fn memory_barrier(&mut self, access: AccessFlags) -> BackendResult {
        self.calls.push(format!("memory_barrier {:?}", access));
        Ok(())
    }

    fn begin_query(&mut self, _pool: Handle, query: u32) -> BackendResult {
        self.calls.push(format!("begin_query {}", query));
        Ok(())
    }

    fn end_query(&mut self, _pool: Handle, query: u32) -> BackendResult {
        self.calls.push(format!("end_query {}", query));
        Ok(())
    }

    fn write_timestamp(&mut self, _pool: Handle, query: u32) -> BackendResult {
        self.calls.push(format!("write_timestamp {}", query));
        Ok(())
    }

    fn copy_query_results(
        &mut self,
        _pool: Handle,
        _first_query: u32,
        query_count: u32,
        _dst: Handle,
        _offset: u64,
        _stride: u64,
        wait: bool,
    ) -> BackendResult {
        self.calls
            .push(format!("copy_query_results count={} wait={}", query_count, wait));
        Ok(())
    }

    fn wait_semaphore(&mut self, semaphore: Handle) -> BackendResult {
        self.calls
            .push(format!("wait_semaphore {}", semaphore.resource_id));
        Ok(())
    }

    fn signal_semaphore(&mut self, semaphore: Handle) -> BackendResult {
        self.calls
            .push(format!("signal_semaphore {}", semaphore.resource_id));
        Ok(())
    }

    fn signal_fence(&mut self, fence: Handle) -> BackendResult {
        self.calls.push(format!("signal_fence {}", fence.resource_id));
        Ok(())
    }
}

// ── Fixtures ────────────────────────────────────────────────

fn make_device() -> Arc<Device> {
    Arc::new(Device::new(DeviceCaps::full(), EngineConfig::default()))
}

fn make_view(device: &Device, format: Format) -> Handle {
    let usage = if format.is_depth_stencil() {
        ImageUsage::DEPTH_STENCIL_ATTACHMENT
    } else {
        ImageUsage::COLOR_ATTACHMENT
    };
    let image = device.create_image(ImageDesc {
        format,
        width: 64,
        height: 64,
        depth: 1,
        mip_levels: 1,
        array_layers: 1,
        samples: 1,
        usage,
    });
    device
        .create_image_view(ImageViewDesc {
            image,
            format,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .expect("image view creation failed")
}

fn make_pass(device: &Device) -> (Handle, Handle) {
    let pass = device
        .create_render_pass(RenderPassDesc {
            attachments: vec![
                AttachmentDescription {
                    format: Format::Rgba8Unorm,
                    samples: 1,
                    load_op: LoadOp::Clear,
                    store_op: StoreOp::Store,
                    stencil_load_op: LoadOp::DontCare,
                    stencil_store_op: StoreOp::DontCare,
                },
                AttachmentDescription {
                    format: Format::Depth24Stencil8,
                    samples: 1,
                    load_op: LoadOp::Clear,
                    store_op: StoreOp::DontCare,
                    stencil_load_op: LoadOp::Clear,
                    stencil_store_op: StoreOp::DontCare,
                },
            ],
            subpasses: vec![SubpassDesc {
                color_attachments: vec![AttachmentReference { attachment: 0 }],
                depth_stencil_attachment: Some(AttachmentReference { attachment: 1 }),
                ..Default::default()
            }],
            dependencies: Vec::new(),
        })
        .expect("render pass creation failed");

    let color = make_view(device, Format::Rgba8Unorm);
    let depth = make_view(device, Format::Depth24Stencil8);
    let framebuffer = device
        .create_framebuffer(&FramebufferDesc {
            render_pass: pass,
            attachments: vec![color, depth],
            width: 64,
            height: 64,
            layers: 1,
        })
        .expect("framebuffer creation failed");
    (pass, framebuffer)
}

fn make_pipeline(device: &Device, pass: Handle, set_layouts: &[Handle]) -> Handle {
    let program = device.create_shader_program(ShaderStages::VERTEX | ShaderStages::FRAGMENT);
    let layout = device
        .create_pipeline_layout(set_layouts, Vec::new())
        .expect("pipeline layout creation failed");
    device
        .create_graphics_pipeline(&GraphicsPipelineDesc {
            program,
            layout,
            vertex_input: VertexInputState {
                bindings: vec![VertexBindingDesc {
                    binding: 0,
                    stride: 16,
                    input_rate: VertexInputRate::Vertex,
                }],
                attributes: vec![VertexAttributeDesc {
                    location: 0,
                    binding: 0,
                    format: Format::Rgba32Float,
                    offset: 0,
                }],
            },
            input_assembly: InputAssemblyState {
                topology: PrimitiveTopology::TriangleList,
                primitive_restart: false,
            },
            raster: Default::default(),
            depth_stencil: Default::default(),
            blend: Default::default(),
            render_pass: pass,
            subpass: 0,
        })
        .expect("pipeline creation failed")
}

/// Record one full frame: clear pass, pipeline, mapped uniform set, one
/// indexed draw.
fn record_frame(device: &Arc<Device>) -> (CommandBuffer, Handle) {
    let (pass, framebuffer) = make_pass(device);
    let set_layout = device
        .create_descriptor_set_layout(vec![LayoutBinding {
            binding: 0,
            kind: DescriptorKind::UniformBuffer,
            count: 1,
            stages: ShaderStages::VERTEX,
        }])
        .expect("layout creation failed");
    let pipeline = make_pipeline(device, pass, &[set_layout]);
    let pipeline_layout = device
        .pipeline(pipeline)
        .expect("pipeline lookup failed")
        .layout()
        .handle;

    let ubo = device.create_buffer(BufferDesc {
        size: 256,
        usage: BufferUsage::UNIFORM,
        host_visible: true,
    });
    device.map_buffer(ubo).expect("map failed");
    let set = device
        .allocate_descriptor_set(set_layout)
        .expect("set allocation failed");
    device
        .update_descriptor_set(
            set,
            &[DescriptorWrite {
                binding: 0,
                resource: DescriptorResource::Buffer {
                    buffer: ubo,
                    offset: 0,
                    range: 256,
                },
            }],
        )
        .expect("set update failed");

    let vbo = device.create_buffer(BufferDesc {
        size: 4096,
        usage: BufferUsage::VERTEX,
        host_visible: false,
    });
    let ibo = device.create_buffer(BufferDesc {
        size: 4096,
        usage: BufferUsage::INDEX,
        host_visible: false,
    });

    let mut cmd = CommandBuffer::new(device.clone(), CommandBufferLevel::Primary);
    cmd.begin(CommandBufferUsage::empty(), None);
    cmd.begin_render_pass(pass, framebuffer, &[]);
    cmd.bind_pipeline(pipeline);
    cmd.bind_descriptor_sets(PipelineBindPoint::Graphics, pipeline_layout, 0, &[set], &[]);
    cmd.bind_vertex_buffers(0, &[(vbo, 0)]);
    cmd.bind_index_buffer(ibo, 0, IndexType::U16);
    cmd.draw_indexed(36, 1, 0, 0, 0);
    cmd.end_render_pass();
    cmd.end();
    (cmd, ubo)
}

#[test]
fn test_replay_preserves_recorded_order() {
    let device = make_device();
    let (mut cmd, _ubo) = record_frame(&device);
    let queue = Queue::new(device.clone());

    let wait = device.create_semaphore();
    let signal = device.create_semaphore();
    let fence = device.create_fence();

    let mut ctx = TraceContext::default();
    queue
        .submit(
            &mut ctx,
            &mut cmd,
            &SubmitInfo {
                wait_semaphores: vec![(wait, PipelineStages::COLOR_ATTACHMENT_OUTPUT)],
                signal_semaphores: vec![signal],
                fence: Some(fence),
            },
        )
        .expect("submit failed");

    // Waits come first, then lazy geometry initialization, then the opcode
    // stream in recorded order, then after-submit restoration, then
    // signals.
    assert_eq!(ctx.position("wait_semaphore"), 0);
    let create = ctx.position("create_geometry");
    let targets = ctx.position("bind_draw_targets");
    assert!(create < targets, "geometry init must precede replay");

    let clear_color = ctx.position("clear_color_target");
    let clear_depth = ctx.position("clear_depth_stencil_target");
    let program = ctx.position("bind_program");
    let flush = ctx.position("flush_mapped_buffer");
    let uniform = ctx.position("bind_uniform_buffer");
    let geometry = ctx.position("bind_geometry");
    let draw = ctx.position("draw_indexed");
    let restore = ctx.position("restore_default_targets");
    let unbind_geometry = ctx.position("unbind_geometry");
    let unbind_program = ctx.position("unbind_program");
    let signal_sem = ctx.position("signal_semaphore");
    let signal_fence = ctx.position("signal_fence");

    assert!(targets < clear_color && clear_color < clear_depth);
    assert!(clear_depth < program);
    assert!(program < flush && flush < uniform, "upload precedes the set bind");
    assert!(uniform < geometry && geometry < draw);
    assert!(draw < restore);
    assert!(restore < unbind_geometry && restore < unbind_program);
    assert!(unbind_geometry < signal_sem && unbind_program < signal_sem);
    assert!(signal_sem < signal_fence);
    assert_eq!(signal_fence, ctx.calls.len() - 1);
}

#[test]
fn test_geometry_initialized_once_across_submits() {
    let device = make_device();
    let (mut cmd, _ubo) = record_frame(&device);
    let queue = Queue::new(device.clone());

    let mut ctx = TraceContext::default();
    queue
        .submit(&mut ctx, &mut cmd, &SubmitInfo::default())
        .expect("first submit failed");
    queue
        .submit(&mut ctx, &mut cmd, &SubmitInfo::default())
        .expect("second submit failed");

    assert_eq!(
        ctx.count("create_geometry"),
        1,
        "a cache entry is backend-initialized exactly once"
    );
    assert_eq!(ctx.count("draw_indexed"), 2);
}

#[test]
fn test_submit_requires_executable_buffer() {
    let device = make_device();
    let queue = Queue::new(device.clone());
    let mut cmd = CommandBuffer::new(device.clone(), CommandBufferLevel::Primary);
    cmd.begin(CommandBufferUsage::empty(), None);

    let mut ctx = TraceContext::default();
    match queue.submit(&mut ctx, &mut cmd, &SubmitInfo::default()) {
        Err(SubmitError::NotExecutable) => {}
        other => panic!("expected NotExecutable, got {:?}", other.map(|_| ())),
    }
    assert!(ctx.calls.is_empty(), "nothing may replay before the freeze");
}

#[test]
fn test_backend_failure_propagates() {
    let device = make_device();
    let (mut cmd, _ubo) = record_frame(&device);
    let queue = Queue::new(device.clone());

    let mut ctx = TraceContext {
        fail_on_draw: true,
        ..Default::default()
    };
    match queue.submit(&mut ctx, &mut cmd, &SubmitInfo::default()) {
        Err(SubmitError::Backend(BackendError::ContextLost)) => {}
        other => panic!("expected backend failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_descriptor_sets_expand_to_class_slots() {
    let device = make_device();

    let set0_layout = device
        .create_descriptor_set_layout(vec![LayoutBinding {
            binding: 0,
            kind: DescriptorKind::UniformBuffer,
            count: 1,
            stages: ShaderStages::VERTEX,
        }])
        .expect("layout creation failed");
    let set1_layout = device
        .create_descriptor_set_layout(vec![
            LayoutBinding {
                binding: 0,
                kind: DescriptorKind::DynamicUniformBuffer,
                count: 1,
                stages: ShaderStages::VERTEX,
            },
            LayoutBinding {
                binding: 1,
                kind: DescriptorKind::CombinedImageSampler,
                count: 1,
                stages: ShaderStages::FRAGMENT,
            },
        ])
        .expect("layout creation failed");
    let pipeline_layout = device
        .create_pipeline_layout(&[set0_layout, set1_layout], Vec::new())
        .expect("pipeline layout creation failed");

    let ubo0 = device.create_buffer(BufferDesc {
        size: 256,
        usage: BufferUsage::UNIFORM,
        host_visible: false,
    });
    let ubo1 = device.create_buffer(BufferDesc {
        size: 4096,
        usage: BufferUsage::UNIFORM,
        host_visible: false,
    });
    let view = make_view(&device, Format::Rgba8Unorm);
    let sampler = device.create_sampler(Default::default());

    let set0 = device.allocate_descriptor_set(set0_layout).expect("set0 failed");
    device
        .update_descriptor_set(
            set0,
            &[DescriptorWrite {
                binding: 0,
                resource: DescriptorResource::Buffer {
                    buffer: ubo0,
                    offset: 0,
                    range: 256,
                },
            }],
        )
        .expect("set0 update failed");
    let set1 = device.allocate_descriptor_set(set1_layout).expect("set1 failed");
    device
        .update_descriptor_set(
            set1,
            &[
                DescriptorWrite {
                    binding: 0,
                    resource: DescriptorResource::Buffer {
                        buffer: ubo1,
                        offset: 0,
                        range: 256,
                    },
                },
                DescriptorWrite {
                    binding: 1,
                    resource: DescriptorResource::ImageSampler { view, sampler },
                },
            ],
        )
        .expect("set1 update failed");

    let mut cmd = CommandBuffer::new(device.clone(), CommandBufferLevel::Primary);
    cmd.begin(CommandBufferUsage::empty(), None);
    cmd.bind_descriptor_sets(
        PipelineBindPoint::Graphics,
        pipeline_layout,
        0,
        &[set0, set1],
        &[128],
    );
    cmd.end();

    let queue = Queue::new(device.clone());
    let mut ctx = TraceContext::default();
    queue
        .submit(&mut ctx, &mut cmd, &SubmitInfo::default())
        .expect("submit failed");

    // Uniform buffers occupy consecutive slots across sets; the dynamic
    // offset is folded into the second bind; the sampler starts its own
    // slot namespace at zero.
    ctx.position("bind_uniform_buffer slot=0 offset=0");
    ctx.position("bind_uniform_buffer slot=1 offset=128");
    ctx.position("bind_texture slot=0");
}

#[test]
fn test_barrier_translates_to_destination_access() {
    let device = make_device();
    let mut cmd = CommandBuffer::new(device.clone(), CommandBufferLevel::Primary);
    cmd.begin(CommandBufferUsage::empty(), None);
    cmd.pipeline_barrier(
        PipelineStages::COMPUTE_SHADER,
        PipelineStages::VERTEX_INPUT,
        AccessFlags::SHADER_WRITE,
        AccessFlags::VERTEX_ATTRIBUTE_READ,
    );
    cmd.end();

    let queue = Queue::new(device.clone());
    let mut ctx = TraceContext::default();
    queue
        .submit(&mut ctx, &mut cmd, &SubmitInfo::default())
        .expect("submit failed");

    let barrier = ctx.position("memory_barrier");
    assert!(
        ctx.calls[barrier].contains("VERTEX_ATTRIBUTE_READ"),
        "barrier must carry the destination access set, got {:?}",
        ctx.calls[barrier]
    );
}
