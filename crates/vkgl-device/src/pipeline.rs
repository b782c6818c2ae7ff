//! Pipelines, pipeline layouts, and the vertex-input identity used for
//! binding-compatibility checks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bitflags::bitflags;
use vkgl_core::format::Format;
use vkgl_core::handle::Handle;

use crate::descriptor::{DescriptorKind, DescriptorSetLayout};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const TESS_CONTROL = 1 << 1;
        const TESS_EVALUATION = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
}

// ── Vertex input state ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBindingDesc {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDesc {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

/// The vertex-input identity of a pipeline. Two pipelines with equal state
/// hash to the same fingerprint and accept the same buffer bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexInputState {
    pub bindings: Vec<VertexBindingDesc>,
    pub attributes: Vec<VertexAttributeDesc>,
}

impl VertexInputState {
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.attributes.is_empty()
    }

    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

// ── Fixed-function state ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputAssemblyState {
    pub topology: PrimitiveTopology,
    pub primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_clamp: bool,
    pub depth_bias: Option<DepthBias>,
    pub line_width: f32,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_clamp: false,
            depth_bias: None,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFaceState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: !0,
            write_mask: !0,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    pub stencil_test: bool,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            depth_compare: CompareOp::Less,
            stencil_test: false,
            front: StencilFaceState::default(),
            back: StencilFaceState::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendAttachment {
    pub blend_enable: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColorWriteMask,
}

impl Default for BlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColorWriteMask::all(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendState {
    pub attachments: Vec<BlendAttachment>,
    pub constants: [f32; 4],
}

// ── Layouts ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: ShaderStages,
    pub offset: u32,
    pub size: u32,
}

/// Flat backend binding slots for one set, per binding class. The legacy
/// backends expose separate slot namespaces for uniform buffers, storage
/// buffers, textures, and storage images; sets are laid out consecutively
/// within each namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotBases {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub textures: u32,
    pub storage_images: u32,
}

pub struct PipelineLayout {
    pub handle: Handle,
    set_layouts: Vec<Arc<DescriptorSetLayout>>,
    push_constant_ranges: Vec<PushConstantRange>,
}

impl PipelineLayout {
    pub fn new(
        handle: Handle,
        set_layouts: Vec<Arc<DescriptorSetLayout>>,
        push_constant_ranges: Vec<PushConstantRange>,
    ) -> Self {
        Self {
            handle,
            set_layouts,
            push_constant_ranges,
        }
    }

    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.set_layouts
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    /// First backend slot of each binding class for `set_index`, i.e. the
    /// sum of the slot counts all earlier sets consume in that class.
    pub fn slot_bases(&self, set_index: usize) -> SlotBases {
        let mut bases = SlotBases::default();
        for layout in self.set_layouts.iter().take(set_index) {
            for binding in layout.bindings() {
                match binding.kind {
                    DescriptorKind::UniformBuffer | DescriptorKind::DynamicUniformBuffer => {
                        bases.uniform_buffers += binding.count
                    }
                    DescriptorKind::StorageBuffer | DescriptorKind::DynamicStorageBuffer => {
                        bases.storage_buffers += binding.count
                    }
                    DescriptorKind::CombinedImageSampler => bases.textures += binding.count,
                    DescriptorKind::StorageImage => bases.storage_images += binding.count,
                }
            }
        }
        bases
    }
}

// ── Pipelines ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    pub program: Handle,
    pub layout: Handle,
    pub vertex_input: VertexInputState,
    pub input_assembly: InputAssemblyState,
    pub raster: RasterState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
    pub render_pass: Handle,
    pub subpass: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ComputePipelineDesc {
    pub program: Handle,
    pub layout: Handle,
}

/// Graphics-only state of a pipeline.
pub struct GraphicsState {
    pub vertex_input: VertexInputState,
    pub vertex_input_hash: u64,
    pub input_assembly: InputAssemblyState,
    pub raster: RasterState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
}

/// Immutable after creation; referenced, never owned, by command buffers.
pub struct Pipeline {
    pub handle: Handle,
    pub bind_point: PipelineBindPoint,
    pub program: Handle,
    layout: Arc<PipelineLayout>,
    graphics: Option<GraphicsState>,
}

impl Pipeline {
    pub fn graphics(handle: Handle, desc: &GraphicsPipelineDesc, layout: Arc<PipelineLayout>) -> Self {
        let vertex_input_hash = desc.vertex_input.fingerprint();
        Self {
            handle,
            bind_point: PipelineBindPoint::Graphics,
            program: desc.program,
            layout,
            graphics: Some(GraphicsState {
                vertex_input: desc.vertex_input.clone(),
                vertex_input_hash,
                input_assembly: desc.input_assembly,
                raster: desc.raster,
                depth_stencil: desc.depth_stencil,
                blend: desc.blend.clone(),
            }),
        }
    }

    pub fn compute(handle: Handle, desc: &ComputePipelineDesc, layout: Arc<PipelineLayout>) -> Self {
        Self {
            handle,
            bind_point: PipelineBindPoint::Compute,
            program: desc.program,
            layout,
            graphics: None,
        }
    }

    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    pub fn graphics_state(&self) -> Option<&GraphicsState> {
        self.graphics.as_ref()
    }

    /// Fingerprint of the vertex-input state; `None` for compute.
    pub fn vertex_input_hash(&self) -> Option<u64> {
        self.graphics.as_ref().map(|g| g.vertex_input_hash)
    }

    pub fn has_empty_vertex_input(&self) -> bool {
        self.graphics
            .as_ref()
            .map(|g| g.vertex_input.is_empty())
            .unwrap_or(false)
    }

    pub fn primitive_restart(&self) -> bool {
        self.graphics
            .as_ref()
            .map(|g| g.input_assembly.primitive_restart)
            .unwrap_or(false)
    }
}
