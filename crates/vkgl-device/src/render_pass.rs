//! Render pass descriptions: attachments, subpasses, dependencies.
//!
//! The backend has no native render-pass object; this is pure declarative
//! metadata the command engine synthesizes state transitions from.

use vkgl_core::error::CoreError;
use vkgl_core::format::Format;
use vkgl_core::handle::Handle;
use vkgl_core::sync::{AccessFlags, PipelineStages};

use crate::pipeline::PipelineBindPoint;

/// Marks a dependency source/target outside the render pass.
pub const SUBPASS_EXTERNAL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Clear,
    Load,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy)]
pub struct AttachmentDescription {
    pub format: Format,
    pub samples: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentReference {
    /// Index into the render pass's attachment list
    pub attachment: u32,
}

#[derive(Debug, Clone)]
pub struct SubpassDesc {
    pub bind_point: PipelineBindPoint,
    pub input_attachments: Vec<AttachmentReference>,
    pub color_attachments: Vec<AttachmentReference>,
    pub resolve_attachments: Vec<AttachmentReference>,
    pub depth_stencil_attachment: Option<AttachmentReference>,
    pub preserve_attachments: Vec<u32>,
}

impl Default for SubpassDesc {
    fn default() -> Self {
        Self {
            bind_point: PipelineBindPoint::Graphics,
            input_attachments: Vec::new(),
            color_attachments: Vec::new(),
            resolve_attachments: Vec::new(),
            depth_stencil_attachment: None,
            preserve_attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage_mask: PipelineStages,
    pub dst_stage_mask: PipelineStages,
    pub src_access_mask: AccessFlags,
    pub dst_access_mask: AccessFlags,
}

/// Stage/access state a subpass requires before and after it executes,
/// folded from the dependency list at creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubpassSync {
    pub stages_before: PipelineStages,
    pub access_before: AccessFlags,
    pub stages_after: PipelineStages,
    pub access_after: AccessFlags,
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassDesc {
    pub attachments: Vec<AttachmentDescription>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<SubpassDependency>,
}

/// Immutable after creation; referenced, never owned, by framebuffers and
/// command buffers.
pub struct RenderPass {
    pub handle: Handle,
    attachments: Vec<AttachmentDescription>,
    subpasses: Vec<SubpassDesc>,
    dependencies: Vec<SubpassDependency>,
    subpass_sync: Vec<SubpassSync>,
}

impl RenderPass {
    pub fn new(handle: Handle, desc: RenderPassDesc) -> Result<Self, CoreError> {
        if desc.subpasses.is_empty() {
            return Err(CoreError::ValidationError(
                "render pass requires at least one subpass".into(),
            ));
        }

        let attachment_count = desc.attachments.len() as u32;
        for (i, subpass) in desc.subpasses.iter().enumerate() {
            let refs = subpass
                .input_attachments
                .iter()
                .chain(&subpass.color_attachments)
                .chain(&subpass.resolve_attachments)
                .chain(subpass.depth_stencil_attachment.as_ref());
            for r in refs {
                if r.attachment >= attachment_count {
                    return Err(CoreError::ValidationError(format!(
                        "subpass {} references attachment {} of {}",
                        i, r.attachment, attachment_count
                    )));
                }
            }
        }

        let subpass_count = desc.subpasses.len() as u32;
        for dep in &desc.dependencies {
            for subpass in [dep.src_subpass, dep.dst_subpass] {
                if subpass != SUBPASS_EXTERNAL && subpass >= subpass_count {
                    return Err(CoreError::ValidationError(format!(
                        "dependency references subpass {} of {}",
                        subpass, subpass_count
                    )));
                }
            }
        }

        let mut subpass_sync = vec![SubpassSync::default(); desc.subpasses.len()];
        for dep in &desc.dependencies {
            if dep.dst_subpass != SUBPASS_EXTERNAL {
                let sync = &mut subpass_sync[dep.dst_subpass as usize];
                sync.stages_before |= dep.dst_stage_mask;
                sync.access_before |= dep.dst_access_mask;
            }
            if dep.src_subpass != SUBPASS_EXTERNAL {
                let sync = &mut subpass_sync[dep.src_subpass as usize];
                sync.stages_after |= dep.src_stage_mask;
                sync.access_after |= dep.src_access_mask;
            }
        }

        Ok(Self {
            handle,
            attachments: desc.attachments,
            subpasses: desc.subpasses,
            dependencies: desc.dependencies,
            subpass_sync,
        })
    }

    pub fn attachments(&self) -> &[AttachmentDescription] {
        &self.attachments
    }

    pub fn subpasses(&self) -> &[SubpassDesc] {
        &self.subpasses
    }

    pub fn subpass(&self, index: u32) -> Option<&SubpassDesc> {
        self.subpasses.get(index as usize)
    }

    pub fn subpass_count(&self) -> u32 {
        self.subpasses.len() as u32
    }

    pub fn dependencies(&self) -> &[SubpassDependency] {
        &self.dependencies
    }

    pub fn subpass_sync(&self, index: u32) -> Option<&SubpassSync> {
        self.subpass_sync.get(index as usize)
    }
}
