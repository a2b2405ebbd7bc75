//! Buffer resources. Buffers have no subresources, so a single access
//! record is enough (unlike images, which are tracked per mip/array slice).

use crate::access::BufferAccess;
use crate::graveyard::{DropNotify, PendingDrops};
use crate::ids::UniqueResourceId;
use crate::resources::{BufferUsageFlags, PoolToken};
use std::sync::Mutex;

pub struct Buffer {
    pub id: UniqueResourceId,
    pub size: u64,
    pub usage: BufferUsageFlags,
    pub pool_token: Option<PoolToken>,
    pub(crate) native: Mutex<Option<Box<dyn crate::backend::BackendBuffer>>>,
    pub(crate) previous_access: Mutex<BufferAccess>,
    _drop_notify: DropNotify,
}

impl Buffer {
    pub fn new(
        id: UniqueResourceId,
        size: u64,
        usage: BufferUsageFlags,
        pool_token: Option<PoolToken>,
        drop_sink: PendingDrops,
    ) -> Buffer {
        Buffer {
            id,
            size,
            usage,
            pool_token,
            native: Mutex::new(None),
            previous_access: Mutex::new(BufferAccess::initial()),
            _drop_notify: DropNotify::new(id, drop_sink),
        }
    }

    pub fn access(&self) -> BufferAccess {
        *self.previous_access.lock().unwrap()
    }

    pub fn set_access(&self, access: BufferAccess) {
        *self.previous_access.lock().unwrap() = access;
    }

    pub fn is_backed(&self) -> bool {
        self.native.lock().unwrap().is_some()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .finish()
    }
}
