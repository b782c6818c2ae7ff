//! Framebuffers: a sized, ordered set of attachment views compatible with
//! the render pass(es) whose attachment formats they satisfy.

use std::sync::Arc;

use vkgl_core::error::CoreError;
use vkgl_core::format::Format;
use vkgl_core::handle::Handle;

use crate::render_pass::RenderPass;

#[derive(Debug, Clone)]
pub struct FramebufferDesc {
    pub render_pass: Handle,
    /// Image view handles, one per render-pass attachment, in order
    pub attachments: Vec<Handle>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FramebufferAttachment {
    pub view: Handle,
    pub format: Format,
    pub samples: u32,
}

pub struct Framebuffer {
    pub handle: Handle,
    render_pass: Arc<RenderPass>,
    attachments: Vec<FramebufferAttachment>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

impl Framebuffer {
    pub fn new(
        handle: Handle,
        render_pass: Arc<RenderPass>,
        attachments: Vec<FramebufferAttachment>,
        width: u32,
        height: u32,
        layers: u32,
    ) -> Result<Self, CoreError> {
        if attachments.len() != render_pass.attachments().len() {
            return Err(CoreError::ValidationError(format!(
                "framebuffer supplies {} attachments, render pass declares {}",
                attachments.len(),
                render_pass.attachments().len()
            )));
        }
        for (i, (fb_att, rp_att)) in attachments
            .iter()
            .zip(render_pass.attachments())
            .enumerate()
        {
            if fb_att.format != rp_att.format || fb_att.samples != rp_att.samples {
                return Err(CoreError::ValidationError(format!(
                    "attachment {} does not match the render pass description",
                    i
                )));
            }
        }
        Ok(Self {
            handle,
            render_pass,
            attachments,
            width,
            height,
            layers,
        })
    }

    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }

    pub fn attachments(&self) -> &[FramebufferAttachment] {
        &self.attachments
    }

    pub fn attachment(&self, index: u32) -> Option<&FramebufferAttachment> {
        self.attachments.get(index as usize)
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// A framebuffer is compatible with every render pass whose attachment
    /// list it satisfies, not only the one it was created against.
    pub fn compatible_with(&self, pass: &RenderPass) -> bool {
        self.attachments.len() == pass.attachments().len()
            && self
                .attachments
                .iter()
                .zip(pass.attachments())
                .all(|(fb, rp)| fb.format == rp.format && fb.samples == rp.samples)
    }
}
