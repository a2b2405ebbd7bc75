//! Image resources. Images are addressed by `(array_slice, mip)`; each
//! subresource carries its own `ImageAccess` so the transition planner can
//! insert barriers at subresource granularity.

use crate::access::ImageAccess;
use crate::graveyard::{DropNotify, PendingDrops};
use crate::ids::UniqueResourceId;
use crate::resources::{Format, ImageUsageFlags, PoolToken, Tiling};
use std::sync::Mutex;

pub struct Image2D {
    pub id: UniqueResourceId,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: Format,
    pub tiling: Tiling,
    pub usage: ImageUsageFlags,
    pub pool_token: Option<PoolToken>,
    pub(crate) native: Mutex<Option<Box<dyn crate::backend::BackendImage>>>,
    /// `previous_access[array_slice][mip]`.
    pub(crate) previous_access: Mutex<Vec<Vec<ImageAccess>>>,
    _drop_notify: DropNotify,
}

impl Image2D {
    pub fn new(
        id: UniqueResourceId,
        width: u32,
        height: u32,
        mip_levels: u32,
        array_layers: u32,
        format: Format,
        tiling: Tiling,
        usage: ImageUsageFlags,
        drop_sink: PendingDrops,
    ) -> Image2D {
        let row = vec![ImageAccess::initial(); mip_levels as usize];
        Image2D {
            id,
            width,
            height,
            mip_levels,
            array_layers,
            format,
            tiling,
            usage,
            pool_token: None,
            native: Mutex::new(None),
            previous_access: Mutex::new(vec![row; array_layers as usize]),
            _drop_notify: DropNotify::new(id, drop_sink),
        }
    }

    pub fn access(&self, array_slice: u32, mip: u32) -> ImageAccess {
        self.previous_access.lock().unwrap()[array_slice as usize][mip as usize]
    }

    pub fn set_access(&self, array_slice: u32, mip: u32, access: ImageAccess) {
        self.previous_access.lock().unwrap()[array_slice as usize][mip as usize] = access;
    }

    pub fn is_backed(&self) -> bool {
        self.native.lock().unwrap().is_some()
    }
}

impl std::fmt::Debug for Image2D {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Image2D")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mip_levels", &self.mip_levels)
            .field("format", &self.format)
            .finish()
    }
}

pub struct Image3D {
    pub id: UniqueResourceId,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub format: Format,
    pub tiling: Tiling,
    pub usage: ImageUsageFlags,
    pub pool_token: Option<PoolToken>,
    pub(crate) native: Mutex<Option<Box<dyn crate::backend::BackendImage>>>,
    /// 3D images have a single array slice; `previous_access[0][mip]`.
    pub(crate) previous_access: Mutex<Vec<ImageAccess>>,
    _drop_notify: DropNotify,
}

impl Image3D {
    pub fn new(
        id: UniqueResourceId,
        width: u32,
        height: u32,
        depth: u32,
        mip_levels: u32,
        format: Format,
        tiling: Tiling,
        usage: ImageUsageFlags,
        drop_sink: PendingDrops,
    ) -> Image3D {
        Image3D {
            id,
            width,
            height,
            depth,
            mip_levels,
            format,
            tiling,
            usage,
            pool_token: None,
            native: Mutex::new(None),
            previous_access: Mutex::new(vec![ImageAccess::initial(); mip_levels as usize]),
            _drop_notify: DropNotify::new(id, drop_sink),
        }
    }

    pub fn access(&self, mip: u32) -> ImageAccess {
        self.previous_access.lock().unwrap()[mip as usize]
    }

    pub fn set_access(&self, mip: u32, access: ImageAccess) {
        self.previous_access.lock().unwrap()[mip as usize] = access;
    }
}

impl std::fmt::Debug for Image3D {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Image3D")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_image_subresources_start_undefined() {
        let img = Image2D::new(
            UniqueResourceId::default_for_test(),
            256,
            256,
            4,
            1,
            Format::Rgba8Unorm,
            Tiling::Optimal,
            ImageUsageFlags::SHADER_RESOURCE,
            PendingDrops::new(),
        );
        for mip in 0..4 {
            assert_eq!(img.access(0, mip), ImageAccess::initial());
        }
    }
}
