pub mod backend;
pub mod descriptor;
pub mod device;
pub mod framebuffer;
pub mod geometry;
pub mod pipeline;
pub mod render_pass;
pub mod resource;
pub mod transfer;

pub use backend::{BackendContext, BackendError, BackendGeometry, BackendResult};
pub use descriptor::{
    DescriptorKind, DescriptorResource, DescriptorSet, DescriptorSetLayout, DescriptorWrite,
    LayoutBinding,
};
pub use device::Device;
pub use framebuffer::{Framebuffer, FramebufferDesc};
pub use geometry::{GeometryBuffers, GeometryCache, GeometryKey, IndexBinding, VertexBufferBinding};
pub use pipeline::{
    ComputePipelineDesc, GraphicsPipelineDesc, Pipeline, PipelineBindPoint, PipelineLayout,
    PushConstantRange, ShaderStages, VertexInputState,
};
pub use render_pass::{
    AttachmentDescription, AttachmentReference, LoadOp, RenderPass, RenderPassDesc, StoreOp,
    SubpassDependency, SubpassDesc, SUBPASS_EXTERNAL,
};
pub use resource::{Buffer, BufferDesc, BufferUsage, Image, ImageDesc, ImageUsage, ImageView};
pub use transfer::{
    AttachmentClear, BufferCopy, BufferImageCopy, ClearValue, ImageBlit, ImageCopy,
    ImageSubresourceLayers,
};
