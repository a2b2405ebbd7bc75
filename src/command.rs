//! The command tagged union. Each queue holds a plain `Vec` of
//! these in submission order; `Context::execute_all` walks it twice. Every
//! variant carries static flags rather than a sort key, since this
//! context's queues execute strictly in recorded order and only
//! synchronize across queues through `Dependency`.

use crate::cache::DescriptorKind;
use crate::descriptor_materializer::AccessKind;
use crate::ids::{GlobalSubmissionIndex, UniqueResourceId};
use bitflags::bitflags;
use smallvec::SmallVec;

/// One resource bound at `register` within a space, as recorded by a queue
/// method - resolved against the resource tables and fed to
/// `descriptor_materializer::materialize` during `execute_all`.
#[derive(Clone, Debug)]
pub struct BoundResource {
    pub register: u32,
    pub resource: UniqueResourceId,
    pub access: AccessKind,
    pub kind: DescriptorKind,
}

/// What a single binding space names: an ephemeral list of views, a
/// bindless array (by id), or a cached descriptor set (by id). Owned so it
/// can live inside a `Command` without borrowing from the caller.
#[derive(Clone, Debug)]
pub enum BindingSpace {
    Ephemeral(Vec<BoundResource>),
    DescriptorArray(UniqueResourceId),
    CachedSet(UniqueResourceId),
}

pub type Bindings = Vec<(u32, BindingSpace)>;

bitflags! {
    pub struct CommandFlags: u8 {
        const PASS_COMMAND     = 0b001;
        const NON_PASS_COMMAND = 0b010;
        const ADVANCES_TIMER   = 0b100;
    }
}

#[derive(Copy, Clone, Debug)]
pub struct DrawParams {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct DrawIndexedParams {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct ThreadGroupCount {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

#[derive(Clone, Debug)]
pub enum CommandInner {
    CopyBuffer {
        src: UniqueResourceId,
        dst: UniqueResourceId,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToImage {
        src: UniqueResourceId,
        dst: UniqueResourceId,
        mip: u32,
        array_slice: u32,
    },
    UploadBuffer {
        dst: UniqueResourceId,
    },
    UploadImage {
        dst: UniqueResourceId,
        mip: u32,
        array_slice: u32,
    },
    BuildBlas {
        blas: UniqueResourceId,
    },
    BuildTlas {
        tlas: UniqueResourceId,
        instances: UniqueResourceId,
    },
    RunComputeShader {
        pipeline: u32,
        group_count: ThreadGroupCount,
        bindings: Bindings,
    },
    BeginPass {
        // Most passes bind a handful of render targets; avoid a heap
        // allocation for the common case.
        color_targets: SmallVec<[UniqueResourceId; 8]>,
        depth_target: Option<UniqueResourceId>,
    },
    DrawInstanced {
        pipeline: u32,
        params: DrawParams,
        bindings: Bindings,
    },
    DrawIndexedInstanced {
        pipeline: u32,
        params: DrawIndexedParams,
        bindings: Bindings,
    },
    EndPass,
    TraceRays {
        pipeline: u32,
        width: u32,
        height: u32,
        depth: u32,
        bindings: Bindings,
    },
    ReleaseDependency {
        dependency: UniqueResourceId,
    },
    AcquireDependency {
        dependency: UniqueResourceId,
    },
    Present {
        swap_chain: UniqueResourceId,
    },
    StartTimer {
        name: String,
    },
    EndTimer {
        name: String,
    },
    PauseForDebugging,
}

impl CommandInner {
    pub fn flags(&self) -> CommandFlags {
        use CommandInner::*;
        match self {
            BeginPass { .. } | DrawInstanced { .. } | DrawIndexedInstanced { .. } | EndPass => {
                CommandFlags::PASS_COMMAND
            }
            StartTimer { .. } | EndTimer { .. } => {
                CommandFlags::NON_PASS_COMMAND | CommandFlags::ADVANCES_TIMER
            }
            _ => CommandFlags::NON_PASS_COMMAND,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Command {
    pub global_submission_index: GlobalSubmissionIndex,
    pub inner: CommandInner,
    pub debug_description: Option<String>,
}

impl Command {
    pub fn flags(&self) -> CommandFlags {
        self.inner.flags()
    }
}
