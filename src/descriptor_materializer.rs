//! The descriptor materializer.
//!
//! Turns a list of `(space, bindings)` into a `PipelineResourcesKey` plus
//! the native sets that must be bound, staging the right transition for
//! each bound resource along the way. Three binding shapes are supported:
//! an ephemeral list of views, a bindless descriptor array, and a cached
//! descriptor set.

use crate::access::{AccessMask, ImageAccess, Layout, SyncPointMask};
use crate::cache::{ContextCache, DescriptorKind, DescriptorRange, DescriptorSetLayoutKey, PipelineResourcesKey};
use crate::ids::UniqueResourceId;
use crate::resources::cached_descriptor_set::CachedDescriptorSet;
use crate::resources::descriptor_array::DescriptorArray;
use crate::transition::{PendingImageTransition, TransitionPlanner};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AccessKind {
    ReadOnly,
    ReadWrite,
    Constant,
}

impl AccessKind {
    fn access_mask(self) -> AccessMask {
        match self {
            AccessKind::ReadOnly => AccessMask::SHADER_READ,
            AccessKind::ReadWrite => AccessMask::SHADER_WRITE,
            AccessKind::Constant => AccessMask::CONSTANT_BUFFER,
        }
    }

    fn layout(self) -> Layout {
        match self {
            AccessKind::ReadOnly => Layout::ShaderReadOnly,
            AccessKind::ReadWrite => Layout::ShaderReadWrite,
            AccessKind::Constant => Layout::ShaderReadOnly,
        }
    }
}

pub struct EphemeralBinding {
    pub register: u32,
    pub resource: UniqueResourceId,
    pub access: AccessKind,
    pub kind: DescriptorKind,
    /// Set for inline constant-buffer blobs; copied into the upload ring
    /// and a CBV created over the copy.
    pub inline_constant_data: Option<Vec<u8>>,
}

pub enum BindingSource<'a> {
    Ephemeral(Vec<EphemeralBinding>),
    DescriptorArray(&'a DescriptorArray),
    CachedSet(&'a CachedDescriptorSet),
}

pub struct MaterializedBindings {
    pub pipeline_resources: PipelineResourcesKey,
    /// `(native_set_handle, space)`, in maximal contiguous-space runs -
    /// here a handle is the layout/cache handle returned by `ContextCache`,
    /// standing in for the backend's real native-set pointer.
    pub native_sets: Vec<(u32, u32)>,
}

pub fn materialize(
    cache: &ContextCache,
    planner: &mut TransitionPlanner,
    spaces: Vec<(u32, BindingSource)>,
) -> MaterializedBindings {
    let mut per_space_layouts = Vec::with_capacity(spaces.len());
    let mut native_sets = Vec::with_capacity(spaces.len());

    for (space, source) in spaces {
        match source {
            BindingSource::Ephemeral(bindings) => {
                let ranges: Vec<DescriptorRange> = bindings
                    .iter()
                    .map(|b| DescriptorRange {
                        register: b.register,
                        kind: b.kind,
                        count: 1,
                        visible_to: SyncPointMask::ALL,
                    })
                    .collect();
                let layout_key = DescriptorSetLayoutKey::canonical(ranges);
                let layout_handle = cache.descriptor_set_layout(layout_key.clone());

                for binding in &bindings {
                    stage_binding_transition(planner, binding.resource, binding.access);
                }

                per_space_layouts.push((space, layout_key));
                // A fresh set is allocated per use; its handle is just the
                // layout handle here since there's no real backend to ask.
                native_sets.push((layout_handle, space));
            }
            BindingSource::DescriptorArray(array) => {
                // Flush pending writes/transitions, then bind directly -
                // transitions for array contents come from `[ACCESS]`
                // elsewhere, not from this call.
                let _ = array.take_staged_writes();
                per_space_layouts.push((
                    space,
                    DescriptorSetLayoutKey::canonical(vec![DescriptorRange {
                        register: 0,
                        kind: DescriptorKind::SampledImage,
                        count: array.capacity,
                        visible_to: SyncPointMask::ALL,
                    }]),
                ));
                native_sets.push((array.id.value() as u32, space));
            }
            BindingSource::CachedSet(set) => {
                if !set.begin_use() {
                    log::error!(
                        "cached descriptor set {:?} bound while a write is staged against it",
                        set.id
                    );
                    panic!("cached descriptor set bound concurrently with a write");
                }
                for binding in &set.bindings {
                    if let crate::resources::cached_descriptor_set::BindingResource::Buffer {
                        resource,
                        ..
                    } = &binding.resource
                    {
                        stage_binding_transition(planner, *resource, AccessKind::Constant);
                    } else if let crate::resources::cached_descriptor_set::BindingResource::Image {
                        resource,
                    } = &binding.resource
                    {
                        stage_binding_transition(planner, *resource, AccessKind::ReadOnly);
                    }
                }
                let layout_key = set
                    .layout_key
                    .read()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| DescriptorSetLayoutKey::canonical(vec![]));
                per_space_layouts.push((space, layout_key));
                native_sets.push((set.id.value() as u32, space));
            }
        }
    }

    MaterializedBindings {
        pipeline_resources: PipelineResourcesKey::canonical(per_space_layouts),
        native_sets,
    }
}

fn stage_binding_transition(
    planner: &mut TransitionPlanner,
    resource: UniqueResourceId,
    access: AccessKind,
) {
    planner.stage_image_transition(PendingImageTransition {
        image: resource,
        array_slice: 0,
        mip: 0,
        requested: ImageAccess {
            sync_points: SyncPointMask::ALL,
            access_mask: access.access_mask(),
            layout: access.layout(),
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_bindings_produce_a_layout_key() {
        let cache = ContextCache::new();
        let mut planner = TransitionPlanner::new();
        let bindings = vec![EphemeralBinding {
            register: 0,
            resource: UniqueResourceId::default_for_test(),
            access: AccessKind::ReadOnly,
            kind: DescriptorKind::SampledImage,
            inline_constant_data: None,
        }];
        let result = materialize(
            &cache,
            &mut planner,
            vec![(0, BindingSource::Ephemeral(bindings))],
        );
        assert_eq!(result.pipeline_resources.spaces.len(), 1);
        assert_eq!(result.native_sets.len(), 1);
    }
}
