//! Pixel formats and the byte/block layout table the engine consults for
//! buffer/image copy validation. Capability enumeration proper lives with
//! the backend; only the surface the recording engine needs is here.

use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Undefined,
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    R16Float,
    Rgba16Float,
    R32Float,
    R32Uint,
    Rg32Float,
    Rgba32Float,
    Depth16Unorm,
    Depth24Stencil8,
    Depth32Float,
    Bc1RgbaUnorm,
    Bc3RgbaUnorm,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatAspects: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Byte/block layout of a format, as reported by the format table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Bytes per block (per texel for uncompressed formats)
    pub block_bytes: u32,
    /// Block width in texels
    pub block_width: u32,
    /// Block height in texels
    pub block_height: u32,
    pub aspects: FormatAspects,
}

impl Format {
    pub fn info(self) -> FormatInfo {
        use Format::*;
        let (block_bytes, block_width, block_height, aspects) = match self {
            Undefined => (0, 1, 1, FormatAspects::empty()),
            R8Unorm => (1, 1, 1, FormatAspects::COLOR),
            Rg8Unorm => (2, 1, 1, FormatAspects::COLOR),
            Rgba8Unorm | Rgba8Srgb | Bgra8Unorm => (4, 1, 1, FormatAspects::COLOR),
            R16Float => (2, 1, 1, FormatAspects::COLOR),
            Rgba16Float => (8, 1, 1, FormatAspects::COLOR),
            R32Float | R32Uint => (4, 1, 1, FormatAspects::COLOR),
            Rg32Float => (8, 1, 1, FormatAspects::COLOR),
            Rgba32Float => (16, 1, 1, FormatAspects::COLOR),
            Depth16Unorm => (2, 1, 1, FormatAspects::DEPTH),
            Depth24Stencil8 => (4, 1, 1, FormatAspects::DEPTH | FormatAspects::STENCIL),
            Depth32Float => (4, 1, 1, FormatAspects::DEPTH),
            Bc1RgbaUnorm => (8, 4, 4, FormatAspects::COLOR),
            Bc3RgbaUnorm => (16, 4, 4, FormatAspects::COLOR),
        };
        FormatInfo {
            block_bytes,
            block_width,
            block_height,
            aspects,
        }
    }

    pub fn has_depth(self) -> bool {
        self.info().aspects.contains(FormatAspects::DEPTH)
    }

    pub fn is_depth_stencil(self) -> bool {
        self.info()
            .aspects
            .intersects(FormatAspects::DEPTH | FormatAspects::STENCIL)
    }

    /// Tightly packed byte size of a `width` x `height` region.
    pub fn region_size(self, width: u32, height: u32) -> u64 {
        let info = self.info();
        let blocks_w = width.div_ceil(info.block_width) as u64;
        let blocks_h = height.div_ceil(info.block_height) as u64;
        blocks_w * blocks_h * info.block_bytes as u64
    }
}

/// Index element type for indexed draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size(self) -> u64 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }

    /// The all-ones primitive-restart sentinel for this index width.
    pub fn restart_index(self) -> u32 {
        match self {
            IndexType::U16 => 0xFFFF,
            IndexType::U32 => 0xFFFF_FFFF,
        }
    }
}
