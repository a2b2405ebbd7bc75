//! The resource model: the entities a `Context` hands out handles to.

pub mod acceleration_structure;
pub mod buffer;
pub mod cached_descriptor_set;
pub mod dependency;
pub mod descriptor_array;
pub mod image;
pub mod swap_chain;

pub use acceleration_structure::{Blas, Tlas};
pub use buffer::Buffer;
pub use cached_descriptor_set::CachedDescriptorSet;
pub use dependency::Dependency;
pub use descriptor_array::DescriptorArray;
pub use image::{Image2D, Image3D};
pub use swap_chain::SwapChain;

use bitflags::bitflags;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Format {
    R8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Rgba16Float,
    Rgba32Float,
    D32Float,
    D24UnormS8Uint,
    Bc7Unorm,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Tiling {
    Optimal,
    Linear,
}

bitflags! {
    pub struct ImageUsageFlags: u32 {
        const COLOR_RENDER_TARGET = 0b0000_0001;
        const DEPTH_STENCIL       = 0b0000_0010;
        const SHADER_RESOURCE     = 0b0000_0100;
        const UNORDERED_ACCESS    = 0b0000_1000;
        const COPY_SRC            = 0b0001_0000;
        const COPY_DST            = 0b0010_0000;
    }
}

bitflags! {
    pub struct BufferUsageFlags: u32 {
        const VERTEX_BUFFER    = 0b0000_0001;
        const INDEX_BUFFER     = 0b0000_0010;
        const CONSTANT_BUFFER  = 0b0000_0100;
        const SHADER_RESOURCE  = 0b0000_1000;
        const UNORDERED_ACCESS = 0b0001_0000;
        const COPY_SRC         = 0b0010_0000;
        const COPY_DST         = 0b0100_0000;
        const AS_BUILD_INPUT   = 0b1000_0000;
    }
}

/// Index of a sub-allocated byte range within a `Pool`'s chunk (re-exported
/// here for convenience; the type itself lives in `crate::memory`).
pub use crate::memory::PoolToken;
