//! BLAS/TLAS (ray-tracing acceleration structures).
//!
//! Both are backed by a buffer allocated lazily at build time - the
//! pseudo-execution pass's `build_blas`/`build_tlas` handling allocates
//! their backing and scratch buffers before the recording pass runs.

use crate::graveyard::{DropNotify, PendingDrops};
use crate::ids::UniqueResourceId;
use crate::resources::buffer::Buffer;
use std::sync::Mutex;

pub struct Blas {
    pub id: UniqueResourceId,
    pub pool_token: Option<crate::resources::PoolToken>,
    pub(crate) backing_buffer: Mutex<Option<Buffer>>,
    pub(crate) native: Mutex<Option<Box<dyn crate::backend::BackendAccelerationStructure>>>,
    _drop_notify: DropNotify,
}

impl Blas {
    pub fn new(id: UniqueResourceId, drop_sink: PendingDrops) -> Blas {
        Blas {
            id,
            pool_token: None,
            backing_buffer: Mutex::new(None),
            native: Mutex::new(None),
            _drop_notify: DropNotify::new(id, drop_sink),
        }
    }

    pub fn is_built(&self) -> bool {
        self.native.lock().unwrap().is_some()
    }
}

impl std::fmt::Debug for Blas {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Blas").field("id", &self.id).finish()
    }
}

pub struct Tlas {
    pub id: UniqueResourceId,
    pub pool_token: Option<crate::resources::PoolToken>,
    pub(crate) backing_buffer: Mutex<Option<Buffer>>,
    pub(crate) native: Mutex<Option<Box<dyn crate::backend::BackendAccelerationStructure>>>,
    _drop_notify: DropNotify,
}

impl Tlas {
    pub fn new(id: UniqueResourceId, drop_sink: PendingDrops) -> Tlas {
        Tlas {
            id,
            pool_token: None,
            backing_buffer: Mutex::new(None),
            native: Mutex::new(None),
            _drop_notify: DropNotify::new(id, drop_sink),
        }
    }

    pub fn is_built(&self) -> bool {
        self.native.lock().unwrap().is_some()
    }
}

impl std::fmt::Debug for Tlas {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Tlas").field("id", &self.id).finish()
    }
}
