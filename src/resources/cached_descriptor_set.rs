//! Cached descriptor sets: a declarative binding list materialized once on
//! first use and reused thereafter. Binding one concurrently with a write
//! to it is a usage error.

use crate::cache::DescriptorSetLayoutKey;
use crate::graveyard::{DropNotify, PendingDrops};
use crate::ids::UniqueResourceId;
use std::sync::{Mutex, RwLock};

#[derive(Clone, Debug)]
pub enum BindingResource {
    Image {
        resource: UniqueResourceId,
    },
    Buffer {
        resource: UniqueResourceId,
        offset: u64,
        size: u64,
    },
    Sampler(crate::cache::SamplerKey),
}

#[derive(Clone, Debug)]
pub struct Binding {
    pub register: u32,
    pub resource: BindingResource,
}

pub struct CachedDescriptorSet {
    pub id: UniqueResourceId,
    pub bindings: Vec<Binding>,
    pub(crate) layout_key: RwLock<Option<DescriptorSetLayoutKey>>,
    pub(crate) native: Mutex<Option<Box<dyn crate::backend::BackendDescriptorSet>>>,
    /// Held for the lifetime of the materialized set; released to the
    /// graveyard along with the set itself.
    pub(crate) strong_refs: Mutex<Vec<UniqueResourceId>>,
    in_use: std::sync::atomic::AtomicBool,
    _drop_notify: DropNotify,
}

impl CachedDescriptorSet {
    pub fn new(id: UniqueResourceId, bindings: Vec<Binding>, drop_sink: PendingDrops) -> CachedDescriptorSet {
        CachedDescriptorSet {
            id,
            bindings,
            layout_key: RwLock::new(None),
            native: Mutex::new(None),
            strong_refs: Mutex::new(Vec::new()),
            in_use: std::sync::atomic::AtomicBool::new(false),
            _drop_notify: DropNotify::new(id, drop_sink),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.native.lock().unwrap().is_some()
    }

    /// Called when the set is bound by a command; returns `false` (a usage
    /// error upstream) if a write is concurrently staged.
    pub fn begin_use(&self) -> bool {
        !self
            .in_use
            .compare_and_swap(false, true, std::sync::atomic::Ordering::SeqCst)
    }

    pub fn end_use(&self) {
        self.in_use.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

impl std::fmt::Debug for CachedDescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CachedDescriptorSet")
            .field("id", &self.id)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}
