//! Swap-chain manager state.
//!
//! `next_image_index` sits at the sentinel `INVALID` between batches; the
//! first queue reference to the swap-chain within a batch runs
//! `maybe_update_swap_chain` (see `crate::context`) which acquires a back
//! buffer and fills this in. At most one `present` may be recorded per
//! batch per swap-chain.

use crate::access::ImageAccess;
use crate::graveyard::{DropNotify, PendingDrops};
use crate::ids::{BatchIndex, UniqueResourceId};
use crate::resources::Format;
use std::sync::Mutex;

/// Sentinel value of `next_image_index` when no back buffer has been
/// acquired this batch.
pub const INVALID_IMAGE_INDEX: u32 = u32::max_value();

pub struct BackBuffer {
    pub native: Mutex<Option<Box<dyn crate::backend::BackendImage>>>,
    pub fence_value: Mutex<u64>,
    pub current_access: Mutex<ImageAccess>,
}

impl BackBuffer {
    fn new() -> BackBuffer {
        BackBuffer {
            native: Mutex::new(None),
            fence_value: Mutex::new(0),
            current_access: Mutex::new(ImageAccess::initial()),
        }
    }
}

pub struct SwapChain {
    pub id: UniqueResourceId,
    pub desired_size: Mutex<(u32, u32)>,
    pub current_size: Mutex<(u32, u32)>,
    pub format: Format,
    pub back_buffers: Vec<BackBuffer>,
    pub(crate) native: Mutex<Option<Box<dyn crate::backend::BackendSwapChain>>>,
    pub next_image_index: Mutex<u32>,
    pub presenting_queue: u32,
    pub last_present_batch: Mutex<Option<BatchIndex>>,
    _drop_notify: DropNotify,
}

impl SwapChain {
    pub fn new(
        id: UniqueResourceId,
        width: u32,
        height: u32,
        format: Format,
        back_buffer_count: usize,
        presenting_queue: u32,
        drop_sink: PendingDrops,
    ) -> SwapChain {
        SwapChain {
            id,
            desired_size: Mutex::new((width, height)),
            current_size: Mutex::new((width, height)),
            format,
            back_buffers: (0..back_buffer_count).map(|_| BackBuffer::new()).collect(),
            native: Mutex::new(None),
            next_image_index: Mutex::new(INVALID_IMAGE_INDEX),
            presenting_queue,
            last_present_batch: Mutex::new(None),
            _drop_notify: DropNotify::new(id, drop_sink),
        }
    }

    pub fn is_touched_this_batch(&self) -> bool {
        *self.next_image_index.lock().unwrap() != INVALID_IMAGE_INDEX
    }

    pub fn clear_touched(&self) {
        *self.next_image_index.lock().unwrap() = INVALID_IMAGE_INDEX;
    }

    pub fn needs_resize(&self) -> bool {
        *self.desired_size.lock().unwrap() != *self.current_size.lock().unwrap()
    }

    /// Requests a new surface size; picked up the next time this
    /// swap-chain is referenced in a batch.
    pub fn resize(&self, width: u32, height: u32) {
        *self.desired_size.lock().unwrap() = (width, height);
    }

    pub fn can_present_this_batch(&self, batch: BatchIndex) -> bool {
        *self.last_present_batch.lock().unwrap() != Some(batch)
    }
}

impl std::fmt::Debug for SwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SwapChain")
            .field("id", &self.id)
            .field("current_size", &*self.current_size.lock().unwrap())
            .field("back_buffers", &self.back_buffers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_swap_chain_has_no_acquired_image() {
        let sc = SwapChain::new(
            UniqueResourceId::default_for_test(),
            1920,
            1080,
            Format::Rgba8Unorm,
            2,
            0,
            PendingDrops::new(),
        );
        assert!(!sc.is_touched_this_batch());
    }

    #[test]
    fn resize_is_observed_as_pending() {
        let sc = SwapChain::new(
            UniqueResourceId::default_for_test(),
            1920,
            1080,
            Format::Rgba8Unorm,
            2,
            0,
            PendingDrops::new(),
        );
        assert!(!sc.needs_resize());
        sc.resize(1280, 720);
        assert!(sc.needs_resize());
    }
}
