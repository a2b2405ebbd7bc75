//! The transition planner.
//!
//! Buffers three queues of pending transitions per frame slice - image,
//! buffer, swap-chain - and turns them into barrier sets on `flush()`. The
//! planner is invoked before any resource-touching command, before each
//! pass, and after the last command on a queue (`crate::queue`).

use crate::access::{BufferAccess, ImageAccess};
use crate::backend::{BufferBarrier, ImageBarrier};
use crate::ids::UniqueResourceId;
use fxhash::FxHashMap;

#[derive(Copy, Clone, Debug)]
pub struct PendingImageTransition {
    pub image: UniqueResourceId,
    pub array_slice: u32,
    pub mip: u32,
    pub requested: ImageAccess,
}

#[derive(Copy, Clone, Debug)]
pub struct PendingBufferTransition {
    pub buffer: UniqueResourceId,
    pub requested: BufferAccess,
}

#[derive(Copy, Clone, Debug)]
pub struct PendingSwapChainTransition {
    pub swap_chain: UniqueResourceId,
    pub image_index: u32,
    pub requested: ImageAccess,
}

#[derive(Default)]
pub struct TransitionPlanner {
    images: Vec<PendingImageTransition>,
    buffers: Vec<PendingBufferTransition>,
    swap_chains: Vec<PendingSwapChainTransition>,
    raw_buffer: Vec<(UniqueResourceId, BufferBarrier)>,
}

/// What the planner fans out to a descriptor array holding a view over the
/// affected subresource range, so the array's staged-transition list stays
/// consistent with the access the resource is about to get.
pub trait DescriptorArraySink {
    fn stage_transition_for_image(&mut self, image: UniqueResourceId, access: ImageAccess);
    fn stage_transition_for_buffer(&mut self, buffer: UniqueResourceId, access: BufferAccess);
}

impl TransitionPlanner {
    pub fn new() -> TransitionPlanner {
        TransitionPlanner::default()
    }

    pub fn stage_image_transition(&mut self, t: PendingImageTransition) {
        self.images.push(t);
    }

    pub fn stage_buffer_transition(&mut self, t: PendingBufferTransition) {
        self.buffers.push(t);
    }

    pub fn stage_swap_chain_transition(&mut self, t: PendingSwapChainTransition) {
        self.swap_chains.push(t);
    }

    /// Emitted verbatim, no merge logic.
    pub fn stage_raw_buffer_transition(&mut self, buffer: UniqueResourceId, barrier: BufferBarrier) {
        self.raw_buffer.push((buffer, barrier));
    }

    /// Sorts and deduplicates each queue so `collect_transitions` processes
    /// each subresource's requests in a stable order.
    pub fn prepare(&mut self) {
        self.images
            .sort_by_key(|t| (t.image, t.array_slice, t.mip));
        self.buffers.sort_by_key(|t| t.buffer);
        self.swap_chains.sort_by_key(|t| t.swap_chain);
    }

    /// Walks images mip-by-mip (buffers as a single unit), merging a
    /// request into the previous access when they match and neither is in
    /// the force-sync set, otherwise emitting a barrier. Two distinct
    /// requests staged for the same subresource within one flush is a
    /// conflict: the first one wins, logged with the resource id.
    pub fn collect_transitions(
        &mut self,
        image_previous: &mut dyn FnMut(UniqueResourceId, u32, u32) -> ImageAccess,
        image_commit: &mut dyn FnMut(UniqueResourceId, u32, u32, ImageAccess),
        buffer_previous: &mut dyn FnMut(UniqueResourceId) -> BufferAccess,
        buffer_commit: &mut dyn FnMut(UniqueResourceId, BufferAccess),
    ) -> (Vec<(UniqueResourceId, ImageBarrier)>, Vec<(UniqueResourceId, BufferBarrier)>) {
        self.prepare();

        let mut image_barriers = Vec::new();
        let mut seen_images: FxHashMap<(UniqueResourceId, u32, u32), ImageAccess> =
            FxHashMap::default();
        for t in self.images.drain(..) {
            let key = (t.image, t.array_slice, t.mip);
            if let Some(already) = seen_images.get(&key) {
                log::error!(
                    "conflicting transition requested for image {:?} slice {} mip {}: \
                     keeping the first request ({:?}), ignoring {:?}",
                    t.image,
                    t.array_slice,
                    t.mip,
                    already,
                    t.requested
                );
                continue;
            }
            let before = image_previous(t.image, t.array_slice, t.mip);
            if before.mergeable_with(&t.requested) {
                let merged = before.merged_sync_points(&t.requested);
                image_commit(t.image, t.array_slice, t.mip, merged);
            } else {
                image_barriers.push((
                    t.image,
                    ImageBarrier {
                        mip: t.mip,
                        array_slice: t.array_slice,
                        before,
                        after: t.requested,
                    },
                ));
                image_commit(t.image, t.array_slice, t.mip, t.requested);
            }
            seen_images.insert(key, t.requested);
        }

        let mut buffer_barriers = Vec::new();
        let mut seen_buffers: FxHashMap<UniqueResourceId, BufferAccess> = FxHashMap::default();
        for t in self.buffers.drain(..) {
            if let Some(already) = seen_buffers.get(&t.buffer) {
                log::error!(
                    "conflicting transition requested for buffer {:?}: keeping the first \
                     request ({:?}), ignoring {:?}",
                    t.buffer,
                    already,
                    t.requested
                );
                continue;
            }
            let before = buffer_previous(t.buffer);
            if before.mergeable_with(&t.requested) {
                let merged = before.merged_sync_points(&t.requested);
                buffer_commit(t.buffer, merged);
            } else {
                buffer_barriers.push((
                    t.buffer,
                    BufferBarrier {
                        before,
                        after: t.requested,
                    },
                ));
                buffer_commit(t.buffer, t.requested);
            }
            seen_buffers.insert(t.buffer, t.requested);
        }

        for (buffer, barrier) in self.raw_buffer.drain(..) {
            buffer_barriers.push((buffer, barrier));
        }

        (image_barriers, buffer_barriers)
    }

    pub fn pending_swap_chain_transitions(&mut self) -> Vec<PendingSwapChainTransition> {
        std::mem::take(&mut self.swap_chains)
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.buffers.is_empty() && self.swap_chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessMask, Layout, SyncPointMask};
    use std::collections::HashMap;

    fn id() -> UniqueResourceId {
        UniqueResourceId::default_for_test()
    }

    #[test]
    fn same_access_merges_with_no_barrier() {
        let mut planner = TransitionPlanner::new();
        let image = id();
        let access = ImageAccess {
            sync_points: SyncPointMask::PIXEL_SHADER,
            access_mask: AccessMask::SHADER_READ,
            layout: Layout::ShaderReadOnly,
        };
        let mut previous: HashMap<(UniqueResourceId, u32, u32), ImageAccess> = HashMap::new();
        previous.insert((image, 0, 0), access);

        planner.stage_image_transition(PendingImageTransition {
            image,
            array_slice: 0,
            mip: 0,
            requested: access,
        });

        let mut committed = None;
        let (image_barriers, _) = planner.collect_transitions(
            &mut |i, s, m| previous[&(i, s, m)],
            &mut |i, s, m, a| {
                committed = Some(a);
                previous.insert((i, s, m), a);
            },
            &mut |_| BufferAccess::initial(),
            &mut |_, _| {},
        );
        assert!(image_barriers.is_empty());
        assert_eq!(committed, Some(access));
    }

    #[test]
    fn write_after_write_emits_a_barrier() {
        let mut planner = TransitionPlanner::new();
        let image = id();
        let write_access = ImageAccess {
            sync_points: SyncPointMask::COMPUTE_SHADER,
            access_mask: AccessMask::SHADER_WRITE,
            layout: Layout::General,
        };
        let mut previous: HashMap<(UniqueResourceId, u32, u32), ImageAccess> = HashMap::new();
        previous.insert((image, 0, 0), write_access);

        planner.stage_image_transition(PendingImageTransition {
            image,
            array_slice: 0,
            mip: 0,
            requested: write_access,
        });

        let (image_barriers, _) = planner.collect_transitions(
            &mut |i, s, m| previous[&(i, s, m)],
            &mut |i, s, m, a| {
                previous.insert((i, s, m), a);
            },
            &mut |_| BufferAccess::initial(),
            &mut |_, _| {},
        );
        assert_eq!(image_barriers.len(), 1);
    }

    #[test]
    fn conflicting_requests_in_one_flush_keep_the_first() {
        let mut planner = TransitionPlanner::new();
        let image = id();
        let a = ImageAccess {
            sync_points: SyncPointMask::PIXEL_SHADER,
            access_mask: AccessMask::SHADER_READ,
            layout: Layout::ShaderReadOnly,
        };
        let b = ImageAccess {
            sync_points: SyncPointMask::COMPUTE_SHADER,
            access_mask: AccessMask::SHADER_WRITE,
            layout: Layout::General,
        };
        planner.stage_image_transition(PendingImageTransition {
            image,
            array_slice: 0,
            mip: 0,
            requested: a,
        });
        planner.stage_image_transition(PendingImageTransition {
            image,
            array_slice: 0,
            mip: 0,
            requested: b,
        });

        let mut previous: HashMap<(UniqueResourceId, u32, u32), ImageAccess> = HashMap::new();
        previous.insert((image, 0, 0), ImageAccess::initial());
        let mut committed_to = Vec::new();
        planner.collect_transitions(
            &mut |i, s, m| previous[&(i, s, m)],
            &mut |i, s, m, access| {
                committed_to.push(access);
                previous.insert((i, s, m), access);
            },
            &mut |_| BufferAccess::initial(),
            &mut |_, _| {},
        );
        assert_eq!(committed_to.len(), 1);
        assert_eq!(committed_to[0], a);
    }
}
