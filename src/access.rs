//! Per-subresource access records.
//!
//! `ImageAccess`/`BufferAccess` are the unit the transition planner
//! (`crate::transition`) reasons about. The bitflags mirror the original
//! `lotus::gpu::synchronization_point_mask`/`image_access_mask` split: sync
//! points say *when* a subresource is touched, the access mask says *how*.

use bitflags::bitflags;

bitflags! {
    pub struct SyncPointMask: u32 {
        const ALL             = 0b0000_0000_0001;
        const GRAPHICS         = 0b0000_0000_0010;
        const VERTEX_INPUT     = 0b0000_0000_0100;
        const VERTEX_SHADER    = 0b0000_0000_1000;
        const PIXEL_SHADER     = 0b0000_0001_0000;
        const COMPUTE_SHADER   = 0b0000_0010_0000;
        const RAY_TRACING      = 0b0000_0100_0000;
        const COPY             = 0b0000_1000_0000;
        const AS_BUILD         = 0b0001_0000_0000;
        const AS_COPY          = 0b0010_0000_0000;
        const CPU_ACCESS       = 0b0100_0000_0000;
    }
}

bitflags! {
    pub struct AccessMask: u32 {
        const SHADER_READ      = 0b0000_0000_0001;
        const SHADER_WRITE     = 0b0000_0000_0010;
        const COLOR_RT         = 0b0000_0000_0100;
        const DEPTH_RO         = 0b0000_0000_1000;
        const DEPTH_RW         = 0b0000_0001_0000;
        const COPY_SRC         = 0b0000_0010_0000;
        const COPY_DST         = 0b0000_0100_0000;
        const AS_READ          = 0b0000_1000_0000;
        const AS_WRITE         = 0b0001_0000_0000;
        const VERTEX_BUFFER    = 0b0010_0000_0000;
        const INDEX_BUFFER     = 0b0100_0000_0000;
        const CONSTANT_BUFFER  = 0b1000_0000_0000;
    }
}

/// Force-sync accesses for images: a resource in one of these states is
/// never merged with a matching later access, a barrier is always emitted
/// so writers observe writers.
pub fn image_force_sync() -> AccessMask {
    AccessMask::SHADER_WRITE | AccessMask::COPY_DST
}

/// Force-sync accesses for buffers.
pub fn buffer_force_sync() -> AccessMask {
    AccessMask::SHADER_WRITE | AccessMask::AS_WRITE | AccessMask::COPY_DST
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Layout {
    Undefined,
    General,
    CopySrc,
    CopyDst,
    Present,
    ColorRenderTarget,
    DepthReadOnly,
    DepthReadWrite,
    ShaderReadOnly,
    ShaderReadWrite,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ImageAccess {
    pub sync_points: SyncPointMask,
    pub access_mask: AccessMask,
    pub layout: Layout,
}

impl ImageAccess {
    /// The access record a freshly allocated image starts in.
    pub fn initial() -> ImageAccess {
        ImageAccess {
            sync_points: SyncPointMask::ALL,
            access_mask: AccessMask::empty(),
            layout: Layout::Undefined,
        }
    }

    /// True if `self` and `next` describe the same access and the access is
    /// not in the force-sync set - i.e. they can be merged without a
    /// barrier.
    pub fn mergeable_with(&self, next: &ImageAccess) -> bool {
        self.access_mask == next.access_mask
            && self.layout == next.layout
            && !self.access_mask.intersects(image_force_sync())
    }

    pub fn merged_sync_points(&self, next: &ImageAccess) -> ImageAccess {
        ImageAccess {
            sync_points: self.sync_points | next.sync_points,
            access_mask: self.access_mask,
            layout: self.layout,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BufferAccess {
    pub sync_points: SyncPointMask,
    pub access_mask: AccessMask,
}

impl BufferAccess {
    pub fn initial() -> BufferAccess {
        BufferAccess {
            sync_points: SyncPointMask::ALL,
            access_mask: AccessMask::empty(),
        }
    }

    pub fn mergeable_with(&self, next: &BufferAccess) -> bool {
        self.access_mask == next.access_mask
            && !self.access_mask.intersects(buffer_force_sync())
    }

    pub fn merged_sync_points(&self, next: &BufferAccess) -> BufferAccess {
        BufferAccess {
            sync_points: self.sync_points | next.sync_points,
            access_mask: self.access_mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_image_access_is_undefined() {
        let a = ImageAccess::initial();
        assert_eq!(a.layout, Layout::Undefined);
        assert!(a.access_mask.is_empty());
    }

    #[test]
    fn matching_shader_read_merges() {
        let a = ImageAccess {
            sync_points: SyncPointMask::PIXEL_SHADER,
            access_mask: AccessMask::SHADER_READ,
            layout: Layout::ShaderReadOnly,
        };
        let b = ImageAccess {
            sync_points: SyncPointMask::COMPUTE_SHADER,
            access_mask: AccessMask::SHADER_READ,
            layout: Layout::ShaderReadOnly,
        };
        assert!(a.mergeable_with(&b));
        let merged = a.merged_sync_points(&b);
        assert_eq!(
            merged.sync_points,
            SyncPointMask::PIXEL_SHADER | SyncPointMask::COMPUTE_SHADER
        );
    }

    #[test]
    fn write_after_write_is_never_merged() {
        let a = ImageAccess {
            sync_points: SyncPointMask::COMPUTE_SHADER,
            access_mask: AccessMask::SHADER_WRITE,
            layout: Layout::General,
        };
        let b = a;
        assert!(!a.mergeable_with(&b));
    }
}
