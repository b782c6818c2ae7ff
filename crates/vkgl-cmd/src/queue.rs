//! Submission: single-pass replay of a frozen command list against one
//! live backend context.
//!
//! Replay is the only place native calls happen. Opcodes execute strictly
//! in recorded order; unknown handles are skipped (a resource destroyed
//! after recording is a caller contract violation, not detected here);
//! backend failures are fatal and propagate without retry.

use std::sync::Arc;

use tracing::{debug, trace};

use vkgl_core::handle::Handle;
use vkgl_core::sync::PipelineStages;

use vkgl_device::backend::{BackendContext, BackendError};
use vkgl_device::device::Device;
use vkgl_device::transfer::ClearValue;

use crate::command_buffer::CommandBuffer;
use crate::opcode::{ClearTarget, Opcode};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("command buffer is not executable")]
    NotExecutable,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Wait/signal contract for one submission.
#[derive(Default)]
pub struct SubmitInfo {
    pub wait_semaphores: Vec<(Handle, PipelineStages)>,
    pub signal_semaphores: Vec<Handle>,
    pub fence: Option<Handle>,
}

pub struct Queue {
    device: Arc<Device>,
}

impl Queue {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Replay `cmd` against `ctx`. Geometry entries collected during
    /// recording but not yet backend-initialized are created first:
    /// creation needs a live, current context, which recording does not
    /// guarantee.
    pub fn submit(
        &self,
        ctx: &mut dyn BackendContext,
        cmd: &mut CommandBuffer,
        info: &SubmitInfo,
    ) -> Result<(), SubmitError> {
        if !cmd.is_executable() {
            return Err(SubmitError::NotExecutable);
        }
        cmd.purge_mapped();

        for &(semaphore, _stage) in &info.wait_semaphores {
            ctx.wait_semaphore(semaphore)?;
        }

        for entry in cmd.pending_geometry() {
            if !entry.is_initialized() {
                let backend = ctx.create_geometry(entry.key())?;
                entry.initialize(backend);
            }
        }

        let trace_opcodes = self.device.config().replay.trace_opcodes;
        for op in cmd.ops() {
            if trace_opcodes {
                trace!(?op, "replay");
            }
            self.replay(ctx, op)?;
        }
        for op in cmd.after_submit_ops() {
            self.replay(ctx, op)?;
        }

        for &semaphore in &info.signal_semaphores {
            ctx.signal_semaphore(semaphore)?;
        }
        if let Some(fence) = info.fence {
            ctx.signal_fence(fence)?;
        }
        Ok(())
    }

    fn replay(&self, ctx: &mut dyn BackendContext, op: &Opcode) -> Result<(), SubmitError> {
        let device = &self.device;
        match op {
            Opcode::BeginSubpass {
                render_pass,
                framebuffer,
                subpass,
                clears,
            } => {
                let (Some(pass), Some(fb)) = (
                    device.render_pass(*render_pass),
                    device.framebuffer(*framebuffer),
                ) else {
                    debug!("skipping subpass against destroyed pass/framebuffer");
                    return Ok(());
                };
                let Some(sp) = pass.subpass(*subpass) else {
                    return Ok(());
                };
                let colors: Vec<Handle> = sp
                    .color_attachments
                    .iter()
                    .filter_map(|r| fb.attachment(r.attachment).map(|a| a.view))
                    .collect();
                let depth_stencil = sp
                    .depth_stencil_attachment
                    .and_then(|r| fb.attachment(r.attachment))
                    .map(|a| a.view);
                ctx.bind_draw_targets(&colors, depth_stencil, fb.extent())?;
                for clear in clears {
                    match (clear.target, clear.value) {
                        (ClearTarget::Color(index), ClearValue::Color(color)) => {
                            ctx.clear_color_target(index, color)?;
                        }
                        (ClearTarget::DepthStencil, ClearValue::DepthStencil { depth, stencil }) => {
                            ctx.clear_depth_stencil_target(Some(depth), Some(stencil))?;
                        }
                        // Mismatched payloads clear with the target's shape.
                        (ClearTarget::Color(index), _) => {
                            ctx.clear_color_target(index, [0.0; 4])?;
                        }
                        (ClearTarget::DepthStencil, _) => {
                            ctx.clear_depth_stencil_target(Some(1.0), Some(0))?;
                        }
                    }
                }
            }

            // Subpass closure is a marker: the next BeginSubpass or
            // EndRenderPass performs the actual target transition.
            Opcode::EndSubpass { .. } => {}

            Opcode::EndRenderPass => ctx.restore_default_targets()?,

            Opcode::BindPipeline { pipeline } => {
                let Some(pipe) = device.pipeline(*pipeline) else {
                    debug!(?pipeline, "skipping bind of destroyed pipeline");
                    return Ok(());
                };
                ctx.bind_program(pipe.program)?;
                if let Some(graphics) = pipe.graphics_state() {
                    ctx.apply_raster_state(&graphics.raster)?;
                    ctx.apply_depth_stencil_state(&graphics.depth_stencil)?;
                    ctx.apply_blend_state(&graphics.blend)?;
                }
            }

            Opcode::PushConstants {
                stages,
                offset,
                data,
            } => ctx.apply_push_constants(*stages, *offset, data)?,

            Opcode::BindDescriptorSet {
                layout,
                set_index,
                set,
                dynamic_offsets,
            } => {
                let (Some(layout), Some(set)) =
                    (device.pipeline_layout(*layout), device.descriptor_set(*set))
                else {
                    debug!("skipping bind of destroyed descriptor set");
                    return Ok(());
                };
                self.bind_set(ctx, layout.as_ref(), set.as_ref(), *set_index, dynamic_offsets)?;
            }

            Opcode::FlushMappedBuffer { buffer } => {
                if device.buffer(*buffer).is_some() {
                    ctx.flush_mapped_buffer(*buffer)?;
                }
            }

            Opcode::InvalidateMappedBuffer { buffer } => {
                if device.buffer(*buffer).is_some() {
                    ctx.invalidate_mapped_buffer(*buffer)?;
                }
            }

            Opcode::BindGeometry { geometry } => match geometry.backend() {
                Some(backend) => ctx.bind_geometry(backend)?,
                None => debug!("geometry entry was never initialized"),
            },

            Opcode::UnbindGeometry => ctx.unbind_geometry()?,

            Opcode::SetPrimitiveRestart { index } => ctx.set_primitive_restart_index(*index)?,

            Opcode::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => ctx.draw(*vertex_count, *instance_count, *first_vertex, *first_instance)?,

            Opcode::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
                index_type,
            } => ctx.draw_indexed(
                *index_count,
                *instance_count,
                *first_index,
                *vertex_offset,
                *first_instance,
                *index_type,
            )?,

            Opcode::DrawIndirect {
                buffer,
                offset,
                draw_count,
                stride,
            } => {
                if device.buffer(*buffer).is_some() {
                    ctx.draw_indirect(*buffer, *offset, *draw_count, *stride)?;
                }
            }

            Opcode::DrawIndexedIndirect {
                buffer,
                offset,
                draw_count,
                stride,
                index_type,
            } => {
                if device.buffer(*buffer).is_some() {
                    ctx.draw_indexed_indirect(*buffer, *offset, *draw_count, *stride, *index_type)?;
                }
            }

            Opcode::Dispatch { x, y, z } => ctx.dispatch(*x, *y, *z)?,

            Opcode::DispatchIndirect { buffer, offset } => {
                if device.buffer(*buffer).is_some() {
                    ctx.dispatch_indirect(*buffer, *offset)?;
                }
            }

            Opcode::ClearColorImage { image, color } => {
                if device.image(*image).is_some() {
                    ctx.clear_color_image(*image, *color)?;
                }
            }

            Opcode::ClearDepthStencilImage { image, value } => {
                if device.image(*image).is_some() {
                    ctx.clear_depth_stencil_image(*image, *value)?;
                }
            }

            Opcode::ClearTargets { clears } => {
                for clear in clears {
                    match (clear.target, clear.value) {
                        (ClearTarget::Color(index), ClearValue::Color(color)) => {
                            ctx.clear_color_target(index, color)?;
                        }
                        (ClearTarget::DepthStencil, ClearValue::DepthStencil { depth, stencil }) => {
                            ctx.clear_depth_stencil_target(Some(depth), Some(stencil))?;
                        }
                        (ClearTarget::Color(index), _) => ctx.clear_color_target(index, [0.0; 4])?,
                        (ClearTarget::DepthStencil, _) => {
                            ctx.clear_depth_stencil_target(Some(1.0), Some(0))?;
                        }
                    }
                }
            }

            Opcode::CopyBuffer { src, dst, regions } => {
                if device.buffer(*src).is_some() && device.buffer(*dst).is_some() {
                    ctx.copy_buffer(*src, *dst, regions)?;
                }
            }

            Opcode::CopyImage { src, dst, regions } => {
                if device.image(*src).is_some() && device.image(*dst).is_some() {
                    ctx.copy_image(*src, *dst, regions)?;
                }
            }

            Opcode::CopyBufferToImage { src, dst, regions } => {
                if device.buffer(*src).is_some() && device.image(*dst).is_some() {
                    ctx.copy_buffer_to_image(*src, *dst, regions)?;
                }
            }

            Opcode::CopyImageToBuffer { src, dst, regions } => {
                if device.image(*src).is_some() && device.buffer(*dst).is_some() {
                    ctx.copy_image_to_buffer(*src, *dst, regions)?;
                }
            }

            Opcode::BlitImage {
                src,
                dst,
                region,
                linear_filter,
            } => {
                if device.image(*src).is_some() && device.image(*dst).is_some() {
                    ctx.blit_image(*src, *dst, region, *linear_filter)?;
                }
            }

            Opcode::FillBuffer {
                buffer,
                offset,
                size,
                data,
            } => {
                if device.buffer(*buffer).is_some() {
                    ctx.fill_buffer(*buffer, *offset, *size, *data)?;
                }
            }

            Opcode::UpdateBuffer {
                buffer,
                offset,
                data,
            } => {
                if device.buffer(*buffer).is_some() {
                    ctx.update_buffer(*buffer, *offset, data)?;
                }
            }

            // The backend's coarse barrier orders against the destination
            // access set; source stages are already ordered by the
            // in-order replay itself.
            Opcode::Barrier { dst_access, .. } => ctx.memory_barrier(*dst_access)?,

            Opcode::BeginQuery { pool, query } => {
                if device.query_pool(*pool).is_some() {
                    ctx.begin_query(*pool, *query)?;
                }
            }

            Opcode::EndQuery { pool, query } => {
                if device.query_pool(*pool).is_some() {
                    ctx.end_query(*pool, *query)?;
                }
            }

            Opcode::WriteTimestamp { pool, query } => {
                if device.query_pool(*pool).is_some() {
                    ctx.write_timestamp(*pool, *query)?;
                }
            }

            Opcode::CopyQueryResults {
                pool,
                first_query,
                query_count,
                dst,
                offset,
                stride,
                wait,
            } => {
                if device.query_pool(*pool).is_some() && device.buffer(*dst).is_some() {
                    ctx.copy_query_results(
                        *pool,
                        *first_query,
                        *query_count,
                        *dst,
                        *offset,
                        *stride,
                        *wait,
                    )?;
                }
            }

            Opcode::UnbindProgram => ctx.unbind_program()?,
        }
        Ok(())
    }

    /// Expand one set bind into slot-indexed backend binds. Slots are
    /// assigned per binding class, sets laid out consecutively within each
    /// class namespace; dynamic offsets are consumed in binding order.
    fn bind_set(
        &self,
        ctx: &mut dyn BackendContext,
        layout: &vkgl_device::pipeline::PipelineLayout,
        set: &vkgl_device::descriptor::DescriptorSet,
        set_index: u32,
        dynamic_offsets: &[u32],
    ) -> Result<(), SubmitError> {
        use vkgl_device::descriptor::{DescriptorKind, DescriptorResource};

        let bases = layout.slot_bases(set_index as usize);
        let mut uniform_slot = bases.uniform_buffers;
        let mut storage_slot = bases.storage_buffers;
        let mut texture_slot = bases.textures;
        let mut image_slot = bases.storage_images;
        let mut offsets = dynamic_offsets.iter();

        for binding in set.layout().bindings() {
            let resource = set.resource(binding.binding);
            let dynamic_offset = if binding.kind.is_dynamic() {
                *offsets.next().unwrap_or(&0) as u64
            } else {
                0
            };
            match binding.kind {
                DescriptorKind::UniformBuffer | DescriptorKind::DynamicUniformBuffer => {
                    let slot = uniform_slot;
                    uniform_slot += binding.count;
                    if let Some(DescriptorResource::Buffer {
                        buffer,
                        offset,
                        range,
                    }) = resource
                    {
                        if self.device.buffer(buffer).is_some() {
                            ctx.bind_uniform_buffer(slot, buffer, offset + dynamic_offset, range)?;
                        }
                    }
                }
                DescriptorKind::StorageBuffer | DescriptorKind::DynamicStorageBuffer => {
                    let slot = storage_slot;
                    storage_slot += binding.count;
                    if let Some(DescriptorResource::Buffer {
                        buffer,
                        offset,
                        range,
                    }) = resource
                    {
                        if self.device.buffer(buffer).is_some() {
                            ctx.bind_storage_buffer(slot, buffer, offset + dynamic_offset, range)?;
                        }
                    }
                }
                DescriptorKind::CombinedImageSampler => {
                    let slot = texture_slot;
                    texture_slot += binding.count;
                    if let Some(DescriptorResource::ImageSampler { view, sampler }) = resource {
                        if self.device.image_view(view).is_some() {
                            ctx.bind_texture(slot, view, sampler)?;
                        }
                    }
                }
                DescriptorKind::StorageImage => {
                    let slot = image_slot;
                    image_slot += binding.count;
                    if let Some(DescriptorResource::StorageImage { view }) = resource {
                        if self.device.image_view(view).is_some() {
                            ctx.bind_storage_image(slot, view)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
