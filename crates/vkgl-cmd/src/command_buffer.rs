//! Command buffer recording.
//!
//! Recording is context-free: every call appends opcodes to the deferred
//! list and updates session state, touching no backend. A call the backend
//! cannot honor is dropped whole and reported through the diagnostics
//! channel; recording itself never fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use bitflags::bitflags;
use tracing::debug;

use vkgl_core::format::{Format, IndexType};
use vkgl_core::handle::Handle;
use vkgl_core::sync::{AccessFlags, PipelineStages};

use vkgl_device::descriptor::DescriptorSet;
use vkgl_device::device::Device;
use vkgl_device::geometry::{GeometryBuffers, GeometryKey, IndexBinding, VertexBufferBinding};
use vkgl_device::pipeline::{Pipeline, PipelineBindPoint, ShaderStages};
use vkgl_device::render_pass::{LoadOp, RenderPass};
use vkgl_device::resource::QueryKind;
use vkgl_device::transfer::{
    AttachmentClear, BufferCopy, BufferImageCopy, ClearValue, ImageBlit, ImageCopy,
};

use crate::mapped::{MappedBufferEntry, MappedBufferRegistry};
use crate::opcode::{ClearTarget, Opcode, TargetClear};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferLevel {
    Primary,
    Secondary,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandBufferUsage: u32 {
        const ONE_TIME_SUBMIT = 1 << 0;
        const RENDER_PASS_CONTINUE = 1 << 1;
        const SIMULTANEOUS_USE = 1 << 2;
    }
}

/// Baseline scope for a secondary buffer recorded inside a render pass the
/// primary owns.
#[derive(Debug, Clone, Copy)]
pub struct CommandBufferInheritance {
    pub render_pass: Handle,
    pub subpass: u32,
    /// May be null when the framebuffer is not known at record time
    pub framebuffer: Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Initial,
    Recording,
    Executable,
}

struct RenderScope {
    render_pass: Arc<RenderPass>,
    render_pass_handle: Handle,
    framebuffer: Handle,
    subpass: u32,
}

pub struct CommandBuffer {
    device: Arc<Device>,
    level: CommandBufferLevel,
    state: RecordState,
    usage: CommandBufferUsage,

    ops: Vec<Opcode>,
    after_submit: Vec<Opcode>,

    scope: Option<RenderScope>,
    bound_graphics: Option<Arc<Pipeline>>,
    bound_compute: Option<Arc<Pipeline>>,
    graphics_sets: BTreeMap<u32, Arc<DescriptorSet>>,
    compute_sets: BTreeMap<u32, Arc<DescriptorSet>>,
    vertex_bindings: BTreeMap<u32, (Handle, u64)>,
    index_binding: Option<IndexBinding>,
    current_geometry: Option<Arc<GeometryBuffers>>,
    pending_push: Vec<(ShaderStages, u32, Vec<u8>)>,
    mapped: MappedBufferRegistry,
    pending_vaos: Vec<Arc<GeometryBuffers>>,
    program_unbind_scheduled: bool,
    geometry_unbind_scheduled: bool,
}

impl CommandBuffer {
    pub fn new(device: Arc<Device>, level: CommandBufferLevel) -> Self {
        Self {
            device,
            level,
            state: RecordState::Initial,
            usage: CommandBufferUsage::empty(),
            ops: Vec::new(),
            after_submit: Vec::new(),
            scope: None,
            bound_graphics: None,
            bound_compute: None,
            graphics_sets: BTreeMap::new(),
            compute_sets: BTreeMap::new(),
            vertex_bindings: BTreeMap::new(),
            index_binding: None,
            current_geometry: None,
            pending_push: Vec::new(),
            mapped: MappedBufferRegistry::new(),
            pending_vaos: Vec::new(),
            program_unbind_scheduled: false,
            geometry_unbind_scheduled: false,
        }
    }

    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    pub fn usage(&self) -> CommandBufferUsage {
        self.usage
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordState::Recording
    }

    pub fn is_executable(&self) -> bool {
        self.state == RecordState::Executable
    }

    pub fn ops(&self) -> &[Opcode] {
        &self.ops
    }

    pub fn after_submit_ops(&self) -> &[Opcode] {
        &self.after_submit
    }

    /// Cache entries selected during recording that still lack a backend
    /// object; the queue initializes them before replay.
    pub fn pending_geometry(&self) -> &[Arc<GeometryBuffers>] {
        &self.pending_vaos
    }

    pub fn mapped_entries(&self) -> &[MappedBufferEntry] {
        self.mapped.entries()
    }

    pub fn bound_vertex_buffers(&self) -> Vec<(u32, Handle, u64)> {
        self.vertex_bindings
            .iter()
            .map(|(slot, (buffer, offset))| (*slot, *buffer, *offset))
            .collect()
    }

    pub fn bound_index_buffer(&self) -> Option<(Handle, u64, IndexType)> {
        self.index_binding
            .map(|b| (b.buffer, b.offset, b.index_type))
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Clear any prior content and start a fresh recording. Secondary
    /// buffers recorded inside a render pass seed their baseline scope from
    /// `inheritance` so draws target the correct attachment set without an
    /// explicit beginRenderPass.
    pub fn begin(
        &mut self,
        usage: CommandBufferUsage,
        inheritance: Option<&CommandBufferInheritance>,
    ) {
        self.clear_recording();
        self.state = RecordState::Recording;
        self.usage = usage;

        if usage.contains(CommandBufferUsage::RENDER_PASS_CONTINUE)
            && self.level == CommandBufferLevel::Secondary
            && inheritance.is_none()
        {
            self.device.diagnostics().invalid(
                "begin",
                "render-pass-continue recording without inheritance info".into(),
            );
        }

        if let Some(inh) = inheritance {
            if self.level != CommandBufferLevel::Secondary {
                self.device
                    .diagnostics()
                    .invalid("begin", "inheritance info on a primary buffer".into());
                return;
            }
            match self.device.render_pass(inh.render_pass) {
                Some(pass) => {
                    if inh.subpass >= pass.subpass_count() {
                        self.device.diagnostics().invalid(
                            "begin",
                            format!("inherited subpass {} out of range", inh.subpass),
                        );
                        return;
                    }
                    self.scope = Some(RenderScope {
                        render_pass: pass,
                        render_pass_handle: inh.render_pass,
                        framebuffer: inh.framebuffer,
                        subpass: inh.subpass,
                    });
                }
                None => self
                    .device
                    .diagnostics()
                    .invalid("begin", "inherited render pass not found".into()),
            }
        }
    }

    /// Freeze the buffer. Push-constant writes still pending because no
    /// pipeline was bound are flushed here.
    pub fn end(&mut self) {
        if self.state != RecordState::Recording {
            self.device
                .diagnostics()
                .invalid("end", "command buffer is not recording".into());
            return;
        }
        self.mapped.purge(&mut self.ops);
        self.flush_pending_push();
        if self.scope.is_some() && self.level == CommandBufferLevel::Primary {
            self.device
                .diagnostics()
                .invalid("end", "recording ended inside a render pass".into());
        }
        self.state = RecordState::Executable;
    }

    /// Discard all recorded content and return to the initial state.
    pub fn reset(&mut self) {
        self.clear_recording();
        self.state = RecordState::Initial;
    }

    fn clear_recording(&mut self) {
        self.usage = CommandBufferUsage::empty();
        self.ops.clear();
        self.after_submit.clear();
        self.scope = None;
        self.bound_graphics = None;
        self.bound_compute = None;
        self.graphics_sets.clear();
        self.compute_sets.clear();
        self.vertex_bindings.clear();
        self.index_binding = None;
        self.current_geometry = None;
        self.pending_push.clear();
        self.mapped.clear();
        self.pending_vaos.clear();
        self.program_unbind_scheduled = false;
        self.geometry_unbind_scheduled = false;
    }

    /// Inline secondaries into this primary: command list, after-submit
    /// list, and not-yet-initialized geometry entries are concatenated in
    /// recorded order, never merged or reordered.
    pub fn execute_commands(&mut self, secondaries: &[&CommandBuffer]) {
        if !self.gate("executeCommands") {
            return;
        }
        if self.level != CommandBufferLevel::Primary {
            self.device
                .diagnostics()
                .invalid("executeCommands", "only primary buffers inline secondaries".into());
            return;
        }
        for secondary in secondaries {
            if secondary.level != CommandBufferLevel::Secondary || !secondary.is_executable() {
                self.device.diagnostics().invalid(
                    "executeCommands",
                    "secondary is not an executable secondary buffer".into(),
                );
                continue;
            }
            let offset = self.ops.len();
            self.ops.extend(secondary.ops.iter().cloned());
            self.after_submit
                .extend(secondary.after_submit.iter().cloned());
            self.mapped.append_rebased(&secondary.mapped, offset);
            for entry in &secondary.pending_vaos {
                if !entry.is_initialized()
                    && !self.pending_vaos.iter().any(|e| Arc::ptr_eq(e, entry))
                {
                    self.pending_vaos.push(entry.clone());
                }
            }
        }
    }

    // ── Pipeline & push constants ───────────────────────────

    pub fn bind_pipeline(&mut self, pipeline: Handle) {
        if !self.gate("bindPipeline") {
            return;
        }
        let Some(pipe) = self.device.pipeline(pipeline) else {
            self.device
                .diagnostics()
                .invalid("bindPipeline", format!("unknown pipeline {:?}", pipeline));
            return;
        };

        match pipe.bind_point {
            PipelineBindPoint::Compute => {
                if !self.device.caps().compute_shaders {
                    self.device
                        .diagnostics()
                        .unsupported("bindPipeline", "compute shaders");
                    return;
                }
                self.bound_compute = Some(pipe);
            }
            PipelineBindPoint::Graphics => {
                // A different vertex-input identity invalidates every
                // bound vertex/index buffer.
                if let Some(prev) = &self.bound_graphics {
                    if prev.vertex_input_hash() != pipe.vertex_input_hash() {
                        self.invalidate_vertex_bindings();
                    }
                }
                self.bound_graphics = Some(pipe);
            }
        }

        self.ops.push(Opcode::BindPipeline { pipeline });
        self.flush_pending_push();
        if !self.program_unbind_scheduled {
            self.after_submit.push(Opcode::UnbindProgram);
            self.program_unbind_scheduled = true;
        }
    }

    /// Push-constant writes recorded before any pipeline is bound are
    /// buffered: the concrete destination is a property of the linked
    /// program, known only once a pipeline is bound.
    pub fn push_constants(&mut self, stages: ShaderStages, offset: u32, data: &[u8]) {
        if !self.gate("pushConstants") {
            return;
        }
        if self.bound_graphics.is_some() || self.bound_compute.is_some() {
            self.ops.push(Opcode::PushConstants {
                stages,
                offset,
                data: data.to_vec(),
            });
        } else {
            self.pending_push.push((stages, offset, data.to_vec()));
        }
    }

    fn flush_pending_push(&mut self) {
        for (stages, offset, data) in std::mem::take(&mut self.pending_push) {
            self.ops.push(Opcode::PushConstants {
                stages,
                offset,
                data,
            });
        }
    }

    // ── Descriptor sets ─────────────────────────────────────

    pub fn bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        layout: Handle,
        first_set: u32,
        sets: &[Handle],
        dynamic_offsets: &[u32],
    ) {
        if !self.gate("bindDescriptorSets") {
            return;
        }
        self.mapped.purge(&mut self.ops);

        let Some(layout_arc) = self.device.pipeline_layout(layout) else {
            self.device.diagnostics().invalid(
                "bindDescriptorSets",
                format!("unknown pipeline layout {:?}", layout),
            );
            return;
        };
        if first_set as usize + sets.len() > layout_arc.set_layouts().len() {
            self.device.diagnostics().invalid(
                "bindDescriptorSets",
                "set range exceeds the pipeline layout".into(),
            );
            return;
        }

        let mut resolved = Vec::with_capacity(sets.len());
        for &handle in sets {
            match self.device.descriptor_set(handle) {
                Some(set) => resolved.push(set),
                None => {
                    self.device.diagnostics().invalid(
                        "bindDescriptorSets",
                        format!("unknown descriptor set {:?}", handle),
                    );
                    return;
                }
            }
        }

        let expected_dynamic: usize = resolved
            .iter()
            .map(|s| s.layout().dynamic_binding_count())
            .sum();
        if expected_dynamic != dynamic_offsets.len() {
            self.device.diagnostics().invalid(
                "bindDescriptorSets",
                format!(
                    "{} dynamic offsets supplied, layouts declare {}",
                    dynamic_offsets.len(),
                    expected_dynamic
                ),
            );
            return;
        }

        let mut offset_cursor = 0usize;
        for (i, set) in resolved.iter().enumerate() {
            let set_index = first_set + i as u32;

            // Host-mapped buffers referenced by the set get an upload
            // opcode ahead of the bind so CPU writes are visible before
            // anything reads them.
            for (_, buffer) in set.bound_buffers() {
                if self.mapped.contains(buffer) {
                    continue;
                }
                if let Some(buf) = self.device.buffer(buffer) {
                    if buf.is_mapped() {
                        let index = self.ops.len();
                        self.ops.push(Opcode::FlushMappedBuffer { buffer });
                        self.mapped.register(buffer, index, buf.liveness());
                    }
                }
            }

            let dynamic_count = set.layout().dynamic_binding_count();
            let set_offsets =
                dynamic_offsets[offset_cursor..offset_cursor + dynamic_count].to_vec();
            offset_cursor += dynamic_count;

            self.ops.push(Opcode::BindDescriptorSet {
                layout,
                set_index,
                set: set.handle,
                dynamic_offsets: set_offsets,
            });

            match bind_point {
                PipelineBindPoint::Graphics => {
                    self.graphics_sets.insert(set_index, set.clone());
                }
                PipelineBindPoint::Compute => {
                    self.compute_sets.insert(set_index, set.clone());
                }
            }
        }
    }

    // ── Vertex / index bindings ─────────────────────────────

    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[(Handle, u64)]) {
        if !self.gate("bindVertexBuffers") {
            return;
        }
        for &(buffer, _) in buffers {
            if self.device.buffer(buffer).is_none() {
                self.device.diagnostics().invalid(
                    "bindVertexBuffers",
                    format!("unknown buffer {:?}", buffer),
                );
                return;
            }
        }
        for (i, &(buffer, offset)) in buffers.iter().enumerate() {
            self.vertex_bindings
                .insert(first_binding + i as u32, (buffer, offset));
        }
        // The cached selection is stale; the next draw re-resolves.
        self.current_geometry = None;
    }

    pub fn bind_index_buffer(&mut self, buffer: Handle, offset: u64, index_type: IndexType) {
        if !self.gate("bindIndexBuffer") {
            return;
        }
        if self.device.buffer(buffer).is_none() {
            self.device
                .diagnostics()
                .invalid("bindIndexBuffer", format!("unknown buffer {:?}", buffer));
            return;
        }
        self.index_binding = Some(IndexBinding {
            buffer,
            offset,
            index_type,
        });
        self.current_geometry = None;
    }

    fn invalidate_vertex_bindings(&mut self) {
        self.vertex_bindings.clear();
        self.index_binding = None;
        self.current_geometry = None;
    }

    // ── Render pass scope ───────────────────────────────────

    pub fn begin_render_pass(
        &mut self,
        render_pass: Handle,
        framebuffer: Handle,
        clear_values: &[ClearValue],
    ) {
        if !self.gate("beginRenderPass") {
            return;
        }
        if self.scope.is_some() {
            self.device
                .diagnostics()
                .invalid("beginRenderPass", "already inside a render pass".into());
            return;
        }
        let Some(pass) = self.device.render_pass(render_pass) else {
            self.device.diagnostics().invalid(
                "beginRenderPass",
                format!("unknown render pass {:?}", render_pass),
            );
            return;
        };
        let Some(fb) = self.device.framebuffer(framebuffer) else {
            self.device.diagnostics().invalid(
                "beginRenderPass",
                format!("unknown framebuffer {:?}", framebuffer),
            );
            return;
        };
        if !fb.compatible_with(pass.as_ref()) {
            self.device.diagnostics().invalid(
                "beginRenderPass",
                "framebuffer is not compatible with the render pass".into(),
            );
            return;
        }

        let clears = Self::load_op_clears(pass.as_ref(), 0, clear_values);
        self.ops.push(Opcode::BeginSubpass {
            render_pass,
            framebuffer,
            subpass: 0,
            clears,
        });
        self.scope = Some(RenderScope {
            render_pass: pass,
            render_pass_handle: render_pass,
            framebuffer,
            subpass: 0,
        });
    }

    /// Translate declared load-op clears into target-relative clears for
    /// the given subpass.
    fn load_op_clears(
        pass: &RenderPass,
        subpass: u32,
        clear_values: &[ClearValue],
    ) -> Vec<TargetClear> {
        let Some(sp) = pass.subpass(subpass) else {
            return Vec::new();
        };
        let mut clears = Vec::new();
        for (i, att) in pass.attachments().iter().enumerate() {
            let i = i as u32;
            let is_ds = att.format.is_depth_stencil();
            let wants_clear = if is_ds {
                att.load_op == LoadOp::Clear || att.stencil_load_op == LoadOp::Clear
            } else {
                att.load_op == LoadOp::Clear
            };
            if !wants_clear {
                continue;
            }
            let target = if is_ds {
                match sp.depth_stencil_attachment {
                    Some(r) if r.attachment == i => ClearTarget::DepthStencil,
                    _ => {
                        debug!(attachment = i, "clear load-op on unreferenced attachment");
                        continue;
                    }
                }
            } else {
                match sp
                    .color_attachments
                    .iter()
                    .position(|r| r.attachment == i)
                {
                    Some(pos) => ClearTarget::Color(pos as u32),
                    None => {
                        debug!(attachment = i, "clear load-op on unreferenced attachment");
                        continue;
                    }
                }
            };
            let value = clear_values.get(i as usize).copied().unwrap_or(if is_ds {
                ClearValue::DepthStencil {
                    depth: 1.0,
                    stencil: 0,
                }
            } else {
                ClearValue::Color([0.0; 4])
            });
            clears.push(TargetClear { target, value });
        }
        clears
    }

    /// A subpass boundary is also a geometry-reset boundary: the backend
    /// has no native subpass and the attachment set may change shape, so
    /// bound vertex/index buffers are invalidated.
    pub fn next_subpass(&mut self) {
        if !self.gate("nextSubpass") {
            return;
        }
        let Some(scope) = &self.scope else {
            self.device
                .diagnostics()
                .invalid("nextSubpass", "not inside a render pass".into());
            return;
        };
        let next = scope.subpass + 1;
        if next >= scope.render_pass.subpass_count() {
            self.device
                .diagnostics()
                .invalid("nextSubpass", "already in the last subpass".into());
            return;
        }
        let (render_pass, framebuffer) = (scope.render_pass_handle, scope.framebuffer);
        self.ops.push(Opcode::EndSubpass {
            subpass: scope.subpass,
        });
        self.ops.push(Opcode::BeginSubpass {
            render_pass,
            framebuffer,
            subpass: next,
            clears: Vec::new(),
        });
        if let Some(scope) = &mut self.scope {
            scope.subpass = next;
        }
        self.invalidate_vertex_bindings();
    }

    pub fn end_render_pass(&mut self) {
        if !self.gate("endRenderPass") {
            return;
        }
        let Some(scope) = &self.scope else {
            self.device
                .diagnostics()
                .invalid("endRenderPass", "not inside a render pass".into());
            return;
        };
        if scope.subpass + 1 != scope.render_pass.subpass_count() {
            self.device.diagnostics().invalid(
                "endRenderPass",
                format!(
                    "ending in subpass {} of {}",
                    scope.subpass,
                    scope.render_pass.subpass_count()
                ),
            );
            return;
        }
        self.ops.push(Opcode::EndSubpass {
            subpass: scope.subpass,
        });
        self.ops.push(Opcode::EndRenderPass);
        self.scope = None;
        self.invalidate_vertex_bindings();
    }

    // ── Draws ───────────────────────────────────────────────

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        let Some(pipe) = self.draw_gate("draw", first_instance) else {
            return;
        };
        if pipe.has_empty_vertex_input() {
            // No attributes: route through the reserved indexed geometry so
            // every draw takes the one indexed opcode shape.
            let index_type = self.prepare_geometry(&pipe);
            self.ops.push(Opcode::DrawIndexed {
                index_count: vertex_count,
                instance_count,
                first_index: 0,
                vertex_offset: first_vertex as i32,
                first_instance,
                index_type,
            });
        } else {
            self.prepare_geometry(&pipe);
            self.ops.push(Opcode::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            });
        }
        self.emit_write_invalidates(PipelineBindPoint::Graphics);
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        let Some(pipe) = self.draw_gate("drawIndexed", first_instance) else {
            return;
        };
        if !pipe.has_empty_vertex_input() && self.index_binding.is_none() {
            self.device
                .diagnostics()
                .invalid("drawIndexed", "no index buffer bound".into());
            return;
        }
        let index_type = self.prepare_geometry(&pipe);
        self.ops.push(Opcode::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
            index_type,
        });
        self.emit_write_invalidates(PipelineBindPoint::Graphics);
    }

    pub fn draw_indirect(&mut self, buffer: Handle, offset: u64, draw_count: u32, stride: u32) {
        let Some(pipe) = self.indirect_draw_gate("drawIndirect", buffer, draw_count) else {
            return;
        };
        self.prepare_geometry(&pipe);
        self.ops.push(Opcode::DrawIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
        self.emit_write_invalidates(PipelineBindPoint::Graphics);
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: Handle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        let Some(pipe) = self.indirect_draw_gate("drawIndexedIndirect", buffer, draw_count) else {
            return;
        };
        if !pipe.has_empty_vertex_input() && self.index_binding.is_none() {
            self.device
                .diagnostics()
                .invalid("drawIndexedIndirect", "no index buffer bound".into());
            return;
        }
        let index_type = self.prepare_geometry(&pipe);
        self.ops.push(Opcode::DrawIndexedIndirect {
            buffer,
            offset,
            draw_count,
            stride,
            index_type,
        });
        self.emit_write_invalidates(PipelineBindPoint::Graphics);
    }

    fn draw_gate(&mut self, origin: &'static str, first_instance: u32) -> Option<Arc<Pipeline>> {
        if !self.gate(origin) {
            return None;
        }
        if self.scope.is_none() {
            self.device
                .diagnostics()
                .invalid(origin, "not inside a render pass".into());
            return None;
        }
        let Some(pipe) = self.bound_graphics.clone() else {
            self.device
                .diagnostics()
                .invalid(origin, "no graphics pipeline bound".into());
            return None;
        };
        if first_instance != 0 && !self.device.caps().base_instance {
            self.device.diagnostics().unsupported(origin, "base instance");
            return None;
        }
        Some(pipe)
    }

    fn indirect_draw_gate(
        &mut self,
        origin: &'static str,
        buffer: Handle,
        draw_count: u32,
    ) -> Option<Arc<Pipeline>> {
        let pipe = self.draw_gate(origin, 0)?;
        if draw_count > 1 && !self.device.caps().multi_draw_indirect {
            self.device
                .diagnostics()
                .unsupported(origin, "multi-draw indirect");
            return None;
        }
        if self.device.buffer(buffer).is_none() {
            self.device
                .diagnostics()
                .invalid(origin, format!("unknown indirect buffer {:?}", buffer));
            return None;
        }
        Some(pipe)
    }

    /// Resolve the geometry entry for the current bindings, emitting a bind
    /// opcode when the selection changed, and the primitive-restart index
    /// when the pipeline enables restart. Returns the active index type.
    fn prepare_geometry(&mut self, pipe: &Arc<Pipeline>) -> IndexType {
        let entry = if pipe.has_empty_vertex_input() {
            self.device.empty_geometry().clone()
        } else {
            let vertex_buffers = self
                .vertex_bindings
                .iter()
                .map(|(slot, (buffer, offset))| VertexBufferBinding {
                    slot: *slot,
                    buffer: *buffer,
                    offset: *offset,
                })
                .collect();
            let key = GeometryKey::new(vertex_buffers, self.index_binding);
            self.device.geometry_cache().resolve(key)
        };

        let index_type = entry
            .key()
            .index
            .map(|b| b.index_type)
            .unwrap_or(IndexType::U32);

        let rebind = match &self.current_geometry {
            Some(current) => !Arc::ptr_eq(current, &entry),
            None => true,
        };
        if rebind {
            if !entry.is_initialized()
                && !self.pending_vaos.iter().any(|e| Arc::ptr_eq(e, &entry))
            {
                self.pending_vaos.push(entry.clone());
            }
            self.ops.push(Opcode::BindGeometry {
                geometry: entry.clone(),
            });
            self.current_geometry = Some(entry);
            if !self.geometry_unbind_scheduled {
                self.after_submit.push(Opcode::UnbindGeometry);
                self.geometry_unbind_scheduled = true;
            }
        }

        if pipe.primitive_restart() {
            self.ops.push(Opcode::SetPrimitiveRestart {
                index: index_type.restart_index(),
            });
        }
        index_type
    }

    /// After a draw/dispatch whose descriptors include write-capable
    /// resources, GPU writes must become visible to mapped CPU reads.
    fn emit_write_invalidates(&mut self, bind_point: PipelineBindPoint) {
        let sets = match bind_point {
            PipelineBindPoint::Graphics => &self.graphics_sets,
            PipelineBindPoint::Compute => &self.compute_sets,
        };
        let mut emitted: Vec<Handle> = Vec::new();
        let mut invalidates = Vec::new();
        for set in sets.values() {
            for buffer in set.writable_buffers() {
                if emitted.contains(&buffer) {
                    continue;
                }
                if let Some(buf) = self.device.buffer(buffer) {
                    if buf.is_mapped() {
                        emitted.push(buffer);
                        invalidates.push(Opcode::InvalidateMappedBuffer { buffer });
                    }
                }
            }
        }
        self.ops.extend(invalidates);
    }

    // ── Dispatch ────────────────────────────────────────────

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if !self.dispatch_gate("dispatch") {
            return;
        }
        self.ops.push(Opcode::Dispatch { x, y, z });
        self.emit_write_invalidates(PipelineBindPoint::Compute);
    }

    pub fn dispatch_indirect(&mut self, buffer: Handle, offset: u64) {
        if !self.dispatch_gate("dispatchIndirect") {
            return;
        }
        if self.device.buffer(buffer).is_none() {
            self.device.diagnostics().invalid(
                "dispatchIndirect",
                format!("unknown indirect buffer {:?}", buffer),
            );
            return;
        }
        self.ops.push(Opcode::DispatchIndirect { buffer, offset });
        self.emit_write_invalidates(PipelineBindPoint::Compute);
    }

    fn dispatch_gate(&mut self, origin: &'static str) -> bool {
        if !self.gate(origin) {
            return false;
        }
        if !self.device.caps().compute_shaders {
            self.device.diagnostics().unsupported(origin, "compute shaders");
            return false;
        }
        if self.scope.is_some() {
            self.device
                .diagnostics()
                .invalid(origin, "dispatch inside a render pass".into());
            return false;
        }
        if self.bound_compute.is_none() {
            self.device
                .diagnostics()
                .invalid(origin, "no compute pipeline bound".into());
            return false;
        }
        true
    }

    // ── Clears ──────────────────────────────────────────────

    pub fn clear_color_image(&mut self, image: Handle, color: [f32; 4]) {
        if !self.transfer_gate("clearColorImage", &[]) {
            return;
        }
        if self.device.image(image).is_none() {
            self.device
                .diagnostics()
                .invalid("clearColorImage", format!("unknown image {:?}", image));
            return;
        }
        self.ops.push(Opcode::ClearColorImage { image, color });
    }

    pub fn clear_depth_stencil_image(&mut self, image: Handle, value: ClearValue) {
        if !self.transfer_gate("clearDepthStencilImage", &[]) {
            return;
        }
        if self.device.image(image).is_none() {
            self.device.diagnostics().invalid(
                "clearDepthStencilImage",
                format!("unknown image {:?}", image),
            );
            return;
        }
        self.ops
            .push(Opcode::ClearDepthStencilImage { image, value });
    }

    /// Clear attachments of the active subpass.
    pub fn clear_attachments(&mut self, clears: &[AttachmentClear]) {
        if !self.gate("clearAttachments") {
            return;
        }
        let Some(scope) = &self.scope else {
            self.device
                .diagnostics()
                .invalid("clearAttachments", "not inside a render pass".into());
            return;
        };
        let Some(sp) = scope.render_pass.subpass(scope.subpass) else {
            return;
        };
        let mut resolved = Vec::with_capacity(clears.len());
        for clear in clears {
            let target = if sp
                .depth_stencil_attachment
                .is_some_and(|r| r.attachment == clear.attachment)
            {
                ClearTarget::DepthStencil
            } else {
                match sp
                    .color_attachments
                    .iter()
                    .position(|r| r.attachment == clear.attachment)
                {
                    Some(pos) => ClearTarget::Color(pos as u32),
                    None => {
                        self.device.diagnostics().invalid(
                            "clearAttachments",
                            format!(
                                "attachment {} is not referenced by the active subpass",
                                clear.attachment
                            ),
                        );
                        return;
                    }
                }
            };
            resolved.push(TargetClear {
                target,
                value: clear.value,
            });
        }
        self.ops.push(Opcode::ClearTargets { clears: resolved });
    }

    // ── Transfer ────────────────────────────────────────────

    pub fn copy_buffer(&mut self, src: Handle, dst: Handle, regions: &[BufferCopy]) {
        if !self.transfer_gate("copyBuffer", &[src, dst]) {
            return;
        }
        self.ops.push(Opcode::CopyBuffer {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    pub fn copy_image(&mut self, src: Handle, dst: Handle, regions: &[ImageCopy]) {
        if !self.gate("copyImage") {
            return;
        }
        if self.scope.is_some() {
            self.device
                .diagnostics()
                .invalid("copyImage", "transfer inside a render pass".into());
            return;
        }
        if self.device.image(src).is_none() || self.device.image(dst).is_none() {
            self.device
                .diagnostics()
                .invalid("copyImage", "unknown image".into());
            return;
        }
        self.ops.push(Opcode::CopyImage {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    pub fn copy_buffer_to_image(&mut self, src: Handle, dst: Handle, regions: &[BufferImageCopy]) {
        if !self.gate("copyBufferToImage") {
            return;
        }
        if self.scope.is_some() {
            self.device
                .diagnostics()
                .invalid("copyBufferToImage", "transfer inside a render pass".into());
            return;
        }
        let (Some(buffer), Some(image)) = (self.device.buffer(src), self.device.image(dst)) else {
            self.device
                .diagnostics()
                .invalid("copyBufferToImage", "unknown source or destination".into());
            return;
        };
        if !self.validate_buffer_image_regions("copyBufferToImage", buffer.desc.size, image.desc.format, regions) {
            return;
        }
        self.ops.push(Opcode::CopyBufferToImage {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    pub fn copy_image_to_buffer(&mut self, src: Handle, dst: Handle, regions: &[BufferImageCopy]) {
        if !self.gate("copyImageToBuffer") {
            return;
        }
        if self.scope.is_some() {
            self.device
                .diagnostics()
                .invalid("copyImageToBuffer", "transfer inside a render pass".into());
            return;
        }
        let (Some(image), Some(buffer)) = (self.device.image(src), self.device.buffer(dst)) else {
            self.device
                .diagnostics()
                .invalid("copyImageToBuffer", "unknown source or destination".into());
            return;
        };
        if !self.validate_buffer_image_regions("copyImageToBuffer", buffer.desc.size, image.desc.format, regions) {
            return;
        }
        self.ops.push(Opcode::CopyImageToBuffer {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    /// Validate copy regions against the format table's byte/block layout.
    fn validate_buffer_image_regions(
        &self,
        origin: &'static str,
        buffer_size: u64,
        format: Format,
        regions: &[BufferImageCopy],
    ) -> bool {
        for region in regions {
            let width = if region.buffer_row_length != 0 {
                region.buffer_row_length
            } else {
                region.image_extent[0]
            };
            let height = if region.buffer_image_height != 0 {
                region.buffer_image_height
            } else {
                region.image_extent[1]
            };
            let slices = region.image_extent[2] as u64
                * region.image_subresource.layer_count.max(1) as u64;
            let required = format.region_size(width, height) * slices;
            if region.buffer_offset + required > buffer_size {
                self.device.diagnostics().invalid(
                    origin,
                    format!(
                        "region needs {} bytes at offset {}, buffer holds {}",
                        required, region.buffer_offset, buffer_size
                    ),
                );
                return false;
            }
        }
        true
    }

    pub fn blit_image(&mut self, src: Handle, dst: Handle, region: &ImageBlit, linear_filter: bool) {
        if !self.gate("blitImage") {
            return;
        }
        if self.scope.is_some() {
            self.device
                .diagnostics()
                .invalid("blitImage", "transfer inside a render pass".into());
            return;
        }
        if self.device.image(src).is_none() || self.device.image(dst).is_none() {
            self.device
                .diagnostics()
                .invalid("blitImage", "unknown image".into());
            return;
        }
        self.ops.push(Opcode::BlitImage {
            src,
            dst,
            region: *region,
            linear_filter,
        });
    }

    pub fn fill_buffer(&mut self, buffer: Handle, offset: u64, size: u64, data: u32) {
        if !self.transfer_gate("fillBuffer", &[buffer]) {
            return;
        }
        if let Some(buf) = self.device.buffer(buffer) {
            if offset + size > buf.desc.size {
                self.device.diagnostics().invalid(
                    "fillBuffer",
                    format!("range {}..{} exceeds buffer size {}", offset, offset + size, buf.desc.size),
                );
                return;
            }
        }
        self.ops.push(Opcode::FillBuffer {
            buffer,
            offset,
            size,
            data,
        });
    }

    pub fn update_buffer(&mut self, buffer: Handle, offset: u64, data: &[u8]) {
        if !self.transfer_gate("updateBuffer", &[buffer]) {
            return;
        }
        if let Some(buf) = self.device.buffer(buffer) {
            if offset + data.len() as u64 > buf.desc.size {
                self.device.diagnostics().invalid(
                    "updateBuffer",
                    format!("{} bytes at offset {} exceed buffer size {}", data.len(), offset, buf.desc.size),
                );
                return;
            }
        }
        self.ops.push(Opcode::UpdateBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn transfer_gate(&mut self, origin: &'static str, buffers: &[Handle]) -> bool {
        if !self.gate(origin) {
            return false;
        }
        if self.scope.is_some() {
            self.device
                .diagnostics()
                .invalid(origin, "transfer inside a render pass".into());
            return false;
        }
        for &buffer in buffers {
            if self.device.buffer(buffer).is_none() {
                self.device
                    .diagnostics()
                    .invalid(origin, format!("unknown buffer {:?}", buffer));
                return false;
            }
        }
        true
    }

    // ── Barriers & queries ──────────────────────────────────

    pub fn pipeline_barrier(
        &mut self,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        src_access: AccessFlags,
        dst_access: AccessFlags,
    ) {
        if !self.gate("pipelineBarrier") {
            return;
        }
        self.ops.push(Opcode::Barrier {
            src_stages,
            dst_stages,
            src_access,
            dst_access,
        });
    }

    pub fn begin_query(&mut self, pool: Handle, query: u32) {
        if !self.query_gate("beginQuery", pool, query, false) {
            return;
        }
        self.ops.push(Opcode::BeginQuery { pool, query });
    }

    pub fn end_query(&mut self, pool: Handle, query: u32) {
        if !self.query_gate("endQuery", pool, query, false) {
            return;
        }
        self.ops.push(Opcode::EndQuery { pool, query });
    }

    pub fn write_timestamp(&mut self, pool: Handle, query: u32, _stage: PipelineStages) {
        if !self.query_gate("writeTimestamp", pool, query, true) {
            return;
        }
        self.ops.push(Opcode::WriteTimestamp { pool, query });
    }

    pub fn copy_query_pool_results(
        &mut self,
        pool: Handle,
        first_query: u32,
        query_count: u32,
        dst: Handle,
        offset: u64,
        stride: u64,
        wait: bool,
    ) {
        if !self.gate("copyQueryPoolResults") {
            return;
        }
        let Some(p) = self.device.query_pool(pool) else {
            self.device
                .diagnostics()
                .invalid("copyQueryPoolResults", format!("unknown query pool {:?}", pool));
            return;
        };
        if first_query + query_count > p.count {
            self.device.diagnostics().invalid(
                "copyQueryPoolResults",
                "query range exceeds the pool".into(),
            );
            return;
        }
        if self.device.buffer(dst).is_none() {
            self.device
                .diagnostics()
                .invalid("copyQueryPoolResults", format!("unknown buffer {:?}", dst));
            return;
        }
        self.ops.push(Opcode::CopyQueryResults {
            pool,
            first_query,
            query_count,
            dst,
            offset,
            stride,
            wait,
        });
    }

    fn query_gate(
        &mut self,
        origin: &'static str,
        pool: Handle,
        query: u32,
        timestamp: bool,
    ) -> bool {
        if !self.gate(origin) {
            return false;
        }
        if timestamp && !self.device.caps().timer_queries {
            self.device.diagnostics().unsupported(origin, "timer queries");
            return false;
        }
        let Some(p) = self.device.query_pool(pool) else {
            self.device
                .diagnostics()
                .invalid(origin, format!("unknown query pool {:?}", pool));
            return false;
        };
        if timestamp && p.kind != QueryKind::Timestamp {
            self.device
                .diagnostics()
                .invalid(origin, "pool is not a timestamp pool".into());
            return false;
        }
        if query >= p.count {
            self.device
                .diagnostics()
                .invalid(origin, format!("query {} out of range", query));
            return false;
        }
        true
    }

    // ── Shared gates ────────────────────────────────────────

    fn gate(&mut self, origin: &'static str) -> bool {
        if self.state != RecordState::Recording {
            self.device
                .diagnostics()
                .invalid(origin, "command buffer is not recording".into());
            return false;
        }
        true
    }

    pub(crate) fn purge_mapped(&mut self) {
        self.mapped.purge(&mut self.ops);
    }
}
