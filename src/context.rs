//! `Context`: the external interface.
//!
//! Owns every queue, the content-addressed caches, the staging rings, the
//! graveyard, and the one `Box<dyn Backend>` it talks to. All mutation
//! happens on the thread that calls `execute_all` - resources may be
//! created or dropped from any thread (dropping just enqueues an id into
//! `PendingDrops`), but only `execute_all` ever touches queue state, the
//! transition planner, or the staging rings.

use crate::access::{AccessMask, BufferAccess, ImageAccess, Layout, SyncPointMask};
use crate::backend::{Backend, BackendImage, BufferBarrier, ImageBarrier};
use crate::cache::ContextCache;
use crate::command::{Bindings, BindingSpace, Command, CommandInner};
use crate::config::ContextConfig;
use crate::descriptor_materializer::{materialize, BindingSource, EphemeralBinding};
use crate::error::{Error, Result};
use crate::graveyard::{Graveyard, PendingDrops};
use crate::ids::{BatchIndex, Counter, GlobalSubmissionIndex, UniqueResourceId};
use crate::memory::Pool;
use crate::queue::{PassToken, Queue};
use crate::resources::cached_descriptor_set::{Binding, CachedDescriptorSet};
use crate::resources::dependency::{Dependency, ReleaseEvent};
use crate::resources::descriptor_array::{DescriptorArray, DescriptorArrayKind};
use crate::resources::swap_chain::INVALID_IMAGE_INDEX;
use crate::resources::{Blas, Buffer, Format, Image2D, Image3D, SwapChain, Tlas};
use crate::resources::{BufferUsageFlags, ImageUsageFlags, Tiling};
use crate::staging::ConstantUploader;
use crate::transition::{PendingBufferTransition, PendingImageTransition, PendingSwapChainTransition, TransitionPlanner};
use fxhash::FxHashMap;
use smallvec::SmallVec;
use std::sync::{Arc, Mutex, Weak};

/// Backing-buffer size handed to every lazily-built BLAS/TLAS; this context
/// doesn't size acceleration structures from real geometry, so one fixed
/// size stands in for the backend's own size query.
const ACCELERATION_STRUCTURE_BACKING_SIZE: u64 = 1 << 16;

/// Per-batch statistics returned early from `execute_all`, before the GPU
/// necessarily reaches the submitted work.
#[derive(Clone, Debug, Default)]
pub struct BatchStatistics {
    pub batch: Option<BatchIndex>,
    pub commands_per_queue: Vec<usize>,
    pub image_barriers: usize,
    pub buffer_barriers: usize,
    pub collected_batches: usize,
}

struct ResourceTables {
    pools: Mutex<FxHashMap<UniqueResourceId, Arc<Mutex<Pool>>>>,
    images2d: Mutex<FxHashMap<UniqueResourceId, Weak<Image2D>>>,
    images3d: Mutex<FxHashMap<UniqueResourceId, Weak<Image3D>>>,
    buffers: Mutex<FxHashMap<UniqueResourceId, Weak<Buffer>>>,
    swap_chains: Mutex<FxHashMap<UniqueResourceId, Weak<SwapChain>>>,
    descriptor_arrays: Mutex<FxHashMap<UniqueResourceId, Weak<DescriptorArray>>>,
    blas: Mutex<FxHashMap<UniqueResourceId, Weak<Blas>>>,
    tlas: Mutex<FxHashMap<UniqueResourceId, Weak<Tlas>>>,
    cached_descriptor_sets: Mutex<FxHashMap<UniqueResourceId, Weak<CachedDescriptorSet>>>,
    dependencies: Mutex<FxHashMap<UniqueResourceId, Weak<Dependency>>>,
}

impl Default for ResourceTables {
    fn default() -> ResourceTables {
        ResourceTables {
            pools: Mutex::new(FxHashMap::default()),
            images2d: Mutex::new(FxHashMap::default()),
            images3d: Mutex::new(FxHashMap::default()),
            buffers: Mutex::new(FxHashMap::default()),
            swap_chains: Mutex::new(FxHashMap::default()),
            descriptor_arrays: Mutex::new(FxHashMap::default()),
            blas: Mutex::new(FxHashMap::default()),
            tlas: Mutex::new(FxHashMap::default()),
            cached_descriptor_sets: Mutex::new(FxHashMap::default()),
            dependencies: Mutex::new(FxHashMap::default()),
        }
    }
}

/// A borrow of one queue plus the global submission counter it needs to
/// stamp every command with, so callers never have to juggle the counter
/// themselves.
pub struct QueueRef<'a> {
    queue: &'a mut Queue,
    global_counter: &'a mut Counter<GlobalSubmissionIndex>,
}

impl<'a> QueueRef<'a> {
    pub fn copy_buffer(&mut self, src: UniqueResourceId, dst: UniqueResourceId, src_offset: u64, dst_offset: u64, size: u64) {
        self.queue.copy_buffer(self.global_counter, src, dst, src_offset, dst_offset, size);
    }

    pub fn copy_buffer_to_image(&mut self, src: UniqueResourceId, dst: UniqueResourceId, mip: u32, array_slice: u32) {
        self.queue.copy_buffer_to_image(self.global_counter, src, dst, mip, array_slice);
    }

    pub fn build_blas(&mut self, blas: UniqueResourceId) {
        self.queue.build_blas(self.global_counter, blas);
    }

    pub fn build_tlas(&mut self, tlas: UniqueResourceId, instances: UniqueResourceId) {
        self.queue.build_tlas(self.global_counter, tlas, instances);
    }

    pub fn run_compute_shader(&mut self, pipeline: u32, group_count: crate::command::ThreadGroupCount, bindings: Bindings) {
        self.queue.run_compute_shader(self.global_counter, pipeline, group_count, bindings);
    }

    pub fn run_compute_shader_with_thread_dimensions(
        &mut self,
        pipeline: u32,
        threads_x: u32,
        threads_y: u32,
        threads_z: u32,
        group_size: (u32, u32, u32),
        bindings: Bindings,
    ) {
        self.queue.run_compute_shader_with_thread_dimensions(
            self.global_counter,
            pipeline,
            threads_x,
            threads_y,
            threads_z,
            group_size,
            bindings,
        );
    }

    pub fn begin_pass(
        &mut self,
        color_targets: impl Into<SmallVec<[UniqueResourceId; 8]>>,
        depth_target: Option<UniqueResourceId>,
    ) -> PassToken {
        self.queue.begin_pass(self.global_counter, color_targets, depth_target)
    }

    pub fn draw_instanced(&mut self, pass: &PassToken, pipeline: u32, params: crate::command::DrawParams, bindings: Bindings) {
        self.queue.draw_instanced(self.global_counter, pass, pipeline, params, bindings);
    }

    pub fn draw_indexed_instanced(
        &mut self,
        pass: &PassToken,
        pipeline: u32,
        params: crate::command::DrawIndexedParams,
        bindings: Bindings,
    ) {
        self.queue.draw_indexed_instanced(self.global_counter, pass, pipeline, params, bindings);
    }

    pub fn end_pass(&mut self, pass: PassToken) {
        self.queue.end_pass(self.global_counter, pass);
    }

    pub fn trace_rays(&mut self, pipeline: u32, width: u32, height: u32, depth: u32, bindings: Bindings) {
        self.queue.trace_rays(self.global_counter, pipeline, width, height, depth, bindings);
    }

    pub fn release_dependency(&mut self, dependency: UniqueResourceId) {
        self.queue.release_dependency(self.global_counter, dependency);
    }

    pub fn acquire_dependency(&mut self, dependency: UniqueResourceId) {
        self.queue.acquire_dependency(self.global_counter, dependency);
    }

    pub fn present(&mut self, swap_chain: UniqueResourceId) {
        self.queue.present(self.global_counter, swap_chain);
    }

    pub fn start_timer(&mut self, name: impl Into<String>) {
        self.queue.start_timer(self.global_counter, name);
    }

    pub fn end_timer(&mut self, name: impl Into<String>) {
        self.queue.end_timer(self.global_counter, name);
    }

    pub fn pause_for_debugging(&mut self) {
        self.queue.pause_for_debugging(self.global_counter);
    }
}

pub struct Context {
    backend: Box<dyn Backend>,
    queues: Vec<Queue>,
    cache: ContextCache,
    graveyard: Graveyard,
    pending_drops: PendingDrops,
    config: ContextConfig,
    resource_id_counter: Counter<UniqueResourceId>,
    global_submission_counter: Counter<GlobalSubmissionIndex>,
    batch_counter: Counter<BatchIndex>,
    tables: ResourceTables,
    upload_ring: Mutex<ConstantUploader>,
    planner: Mutex<TransitionPlanner>,
    current_batch: Option<BatchIndex>,
}

/// Stages the barrier(s) a command's own semantics imply, beyond whatever
/// the descriptor materializer already staged for its bindings.
fn stage_command(planner: &mut TransitionPlanner, swap_chains: &FxHashMap<UniqueResourceId, Weak<SwapChain>>, command: &Command) {
    match &command.inner {
        CommandInner::CopyBuffer { src, dst, .. } => {
            planner.stage_buffer_transition(PendingBufferTransition {
                buffer: *src,
                requested: BufferAccess {
                    sync_points: SyncPointMask::COPY,
                    access_mask: AccessMask::COPY_SRC,
                },
            });
            planner.stage_buffer_transition(PendingBufferTransition {
                buffer: *dst,
                requested: BufferAccess {
                    sync_points: SyncPointMask::COPY,
                    access_mask: AccessMask::COPY_DST,
                },
            });
        }
        CommandInner::CopyBufferToImage { src, dst, mip, array_slice } => {
            planner.stage_buffer_transition(PendingBufferTransition {
                buffer: *src,
                requested: BufferAccess {
                    sync_points: SyncPointMask::COPY,
                    access_mask: AccessMask::COPY_SRC,
                },
            });
            planner.stage_image_transition(PendingImageTransition {
                image: *dst,
                array_slice: *array_slice,
                mip: *mip,
                requested: ImageAccess {
                    sync_points: SyncPointMask::COPY,
                    access_mask: AccessMask::COPY_DST,
                    layout: Layout::CopyDst,
                },
            });
        }
        CommandInner::UploadBuffer { dst } => {
            planner.stage_buffer_transition(PendingBufferTransition {
                buffer: *dst,
                requested: BufferAccess {
                    sync_points: SyncPointMask::CPU_ACCESS,
                    access_mask: AccessMask::COPY_DST,
                },
            });
        }
        CommandInner::UploadImage { dst, mip, array_slice } => {
            planner.stage_image_transition(PendingImageTransition {
                image: *dst,
                array_slice: *array_slice,
                mip: *mip,
                requested: ImageAccess {
                    sync_points: SyncPointMask::CPU_ACCESS,
                    access_mask: AccessMask::COPY_DST,
                    layout: Layout::CopyDst,
                },
            });
        }
        CommandInner::BuildTlas { instances, .. } => {
            planner.stage_buffer_transition(PendingBufferTransition {
                buffer: *instances,
                requested: BufferAccess {
                    sync_points: SyncPointMask::AS_BUILD,
                    access_mask: AccessMask::AS_READ,
                },
            });
        }
        CommandInner::BeginPass { color_targets, depth_target } => {
            for target in color_targets {
                planner.stage_image_transition(PendingImageTransition {
                    image: *target,
                    array_slice: 0,
                    mip: 0,
                    requested: ImageAccess {
                        sync_points: SyncPointMask::GRAPHICS,
                        access_mask: AccessMask::COLOR_RT,
                        layout: Layout::ColorRenderTarget,
                    },
                });
            }
            if let Some(depth) = depth_target {
                planner.stage_image_transition(PendingImageTransition {
                    image: *depth,
                    array_slice: 0,
                    mip: 0,
                    requested: ImageAccess {
                        sync_points: SyncPointMask::GRAPHICS,
                        access_mask: AccessMask::DEPTH_RW,
                        layout: Layout::DepthReadWrite,
                    },
                });
            }
        }
        CommandInner::Present { swap_chain } => {
            if let Some(sc) = swap_chains.get(swap_chain).and_then(Weak::upgrade) {
                let index = *sc.next_image_index.lock().unwrap();
                if index != INVALID_IMAGE_INDEX {
                    planner.stage_swap_chain_transition(PendingSwapChainTransition {
                        swap_chain: *swap_chain,
                        image_index: index,
                        requested: ImageAccess {
                            sync_points: SyncPointMask::ALL,
                            access_mask: AccessMask::empty(),
                            layout: Layout::Present,
                        },
                    });
                }
            }
        }
        _ => {}
    }
}

/// Resolves a command's owned `Bindings` against the descriptor-array and
/// cached-descriptor-set tables and feeds the result to
/// `descriptor_materializer::materialize`, which stages the per-binding
/// transitions along the way.
fn materialize_bindings(
    cache: &ContextCache,
    planner: &mut TransitionPlanner,
    descriptor_arrays: &FxHashMap<UniqueResourceId, Weak<DescriptorArray>>,
    cached_descriptor_sets: &FxHashMap<UniqueResourceId, Weak<CachedDescriptorSet>>,
    bindings: &Bindings,
) {
    let mut array_owners: Vec<Option<Arc<DescriptorArray>>> = Vec::with_capacity(bindings.len());
    let mut set_owners: Vec<Option<Arc<CachedDescriptorSet>>> = Vec::with_capacity(bindings.len());
    for (_, space) in bindings {
        match space {
            BindingSpace::DescriptorArray(id) => {
                array_owners.push(descriptor_arrays.get(id).and_then(Weak::upgrade));
                set_owners.push(None);
            }
            BindingSpace::CachedSet(id) => {
                array_owners.push(None);
                set_owners.push(cached_descriptor_sets.get(id).and_then(Weak::upgrade));
            }
            BindingSpace::Ephemeral(_) => {
                array_owners.push(None);
                set_owners.push(None);
            }
        }
    }

    let mut spaces = Vec::with_capacity(bindings.len());
    for (i, (space, binding_space)) in bindings.iter().enumerate() {
        match binding_space {
            BindingSpace::Ephemeral(resources) => {
                let ephemeral = resources
                    .iter()
                    .map(|b| EphemeralBinding {
                        register: b.register,
                        resource: b.resource,
                        access: b.access,
                        kind: b.kind,
                        inline_constant_data: None,
                    })
                    .collect();
                spaces.push((*space, BindingSource::Ephemeral(ephemeral)));
            }
            BindingSpace::DescriptorArray(_) => {
                if let Some(array) = array_owners[i].as_ref() {
                    spaces.push((*space, BindingSource::DescriptorArray(array)));
                }
            }
            BindingSpace::CachedSet(_) => {
                if let Some(set) = set_owners[i].as_ref() {
                    spaces.push((*space, BindingSource::CachedSet(set)));
                }
            }
        }
    }

    let _ = materialize(cache, planner, spaces);
}

impl Context {
    /// Creates a context over an already-constructed backend. `Context`
    /// itself never touches DX12/Vulkan; it only ever calls through the
    /// `Backend` trait.
    pub fn create(backend: Box<dyn Backend>) -> Result<Context> {
        Self::create_with_config(backend, ContextConfig::default())
    }

    pub fn create_with_config(backend: Box<dyn Backend>, config: ContextConfig) -> Result<Context> {
        let queue_count = backend.queue_count();
        let queues = (0..queue_count).map(|i| Queue::new(i as u32)).collect();
        Ok(Context {
            backend,
            queues,
            cache: ContextCache::new(),
            graveyard: Graveyard::new(),
            pending_drops: PendingDrops::new(),
            upload_ring: Mutex::new(ConstantUploader::new(config.upload_ring_chunk_size)),
            config,
            resource_id_counter: Counter::default(),
            global_submission_counter: Counter::default(),
            batch_counter: Counter::default(),
            tables: ResourceTables::default(),
            planner: Mutex::new(TransitionPlanner::new()),
            current_batch: None,
        })
    }

    fn next_id(&mut self) -> UniqueResourceId {
        self.resource_id_counter.next()
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn queue(&mut self, index: usize) -> QueueRef<'_> {
        QueueRef {
            queue: &mut self.queues[index],
            global_counter: &mut self.global_submission_counter,
        }
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    // ---- resource requests: all lazy, no native object until first use ----

    pub fn request_pool(&mut self, chunk_size: u64) -> UniqueResourceId {
        let id = self.next_id();
        let pool = Pool::new(chunk_size, Box::new(|size| -> Result<()> { let _ = size; Ok(()) }));
        self.tables.pools.lock().unwrap().insert(id, Arc::new(Mutex::new(pool)));
        id
    }

    pub fn request_image2d(
        &mut self,
        width: u32,
        height: u32,
        mip_levels: u32,
        array_layers: u32,
        format: Format,
        tiling: Tiling,
        usage: ImageUsageFlags,
    ) -> Arc<Image2D> {
        let id = self.next_id();
        let image = Arc::new(Image2D::new(
            id,
            width,
            height,
            mip_levels,
            array_layers,
            format,
            tiling,
            usage,
            self.pending_drops.clone(),
        ));
        self.tables.images2d.lock().unwrap().insert(id, Arc::downgrade(&image));
        image
    }

    pub fn request_image3d(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        mip_levels: u32,
        format: Format,
        tiling: Tiling,
        usage: ImageUsageFlags,
    ) -> Arc<Image3D> {
        let id = self.next_id();
        let image = Arc::new(Image3D::new(
            id,
            width,
            height,
            depth,
            mip_levels,
            format,
            tiling,
            usage,
            self.pending_drops.clone(),
        ));
        self.tables.images3d.lock().unwrap().insert(id, Arc::downgrade(&image));
        image
    }

    pub fn request_buffer(&mut self, size: u64, usage: BufferUsageFlags) -> Arc<Buffer> {
        let id = self.next_id();
        let buffer = Arc::new(Buffer::new(id, size, usage, None, self.pending_drops.clone()));
        self.tables.buffers.lock().unwrap().insert(id, Arc::downgrade(&buffer));
        buffer
    }

    /// A host-visible staging buffer, sized and flagged for CPU writes plus
    /// use as a copy source.
    pub fn request_staging_buffer(&mut self, size: u64) -> Arc<Buffer> {
        self.request_buffer(size, BufferUsageFlags::COPY_SRC)
    }

    pub fn request_swap_chain(
        &mut self,
        width: u32,
        height: u32,
        format: Format,
        back_buffer_count: usize,
        presenting_queue: u32,
    ) -> Arc<SwapChain> {
        let id = self.next_id();
        let sc = Arc::new(SwapChain::new(
            id,
            width,
            height,
            format,
            back_buffer_count,
            presenting_queue,
            self.pending_drops.clone(),
        ));
        self.tables.swap_chains.lock().unwrap().insert(id, Arc::downgrade(&sc));
        sc
    }

    pub fn request_image_descriptor_array(&mut self, capacity: Option<u32>) -> Arc<DescriptorArray> {
        let capacity = capacity.unwrap_or(self.config.default_descriptor_array_capacity);
        let id = self.next_id();
        let array = Arc::new(DescriptorArray::new(id, DescriptorArrayKind::Image, capacity, self.pending_drops.clone()));
        self.tables.descriptor_arrays.lock().unwrap().insert(id, Arc::downgrade(&array));
        array
    }

    pub fn request_buffer_descriptor_array(&mut self, capacity: Option<u32>) -> Arc<DescriptorArray> {
        let capacity = capacity.unwrap_or(self.config.default_descriptor_array_capacity);
        let id = self.next_id();
        let array = Arc::new(DescriptorArray::new(id, DescriptorArrayKind::Buffer, capacity, self.pending_drops.clone()));
        self.tables.descriptor_arrays.lock().unwrap().insert(id, Arc::downgrade(&array));
        array
    }

    pub fn request_blas(&mut self) -> Arc<Blas> {
        let id = self.next_id();
        let blas = Arc::new(Blas::new(id, self.pending_drops.clone()));
        self.tables.blas.lock().unwrap().insert(id, Arc::downgrade(&blas));
        blas
    }

    pub fn request_tlas(&mut self) -> Arc<Tlas> {
        let id = self.next_id();
        let tlas = Arc::new(Tlas::new(id, self.pending_drops.clone()));
        self.tables.tlas.lock().unwrap().insert(id, Arc::downgrade(&tlas));
        tlas
    }

    pub fn request_cached_descriptor_set(&mut self, bindings: Vec<Binding>) -> Arc<CachedDescriptorSet> {
        let id = self.next_id();
        let set = Arc::new(CachedDescriptorSet::new(id, bindings, self.pending_drops.clone()));
        self.tables.cached_descriptor_sets.lock().unwrap().insert(id, Arc::downgrade(&set));
        set
    }

    /// `Dependency` carries no native handle and needs no deferred
    /// destruction, so it is the one resource kind tracked only by a weak
    /// table entry and never wired into the graveyard.
    pub fn request_dependency(&mut self) -> Arc<Dependency> {
        let id = self.next_id();
        let dep = Arc::new(Dependency::new());
        self.tables.dependencies.lock().unwrap().insert(id, Arc::downgrade(&dep));
        dep
    }

    // ---- data transfer ----

    pub fn map_buffer(&self, buffer: &Buffer) -> Result<*mut u8> {
        let mut native = buffer.native.lock().unwrap();
        if native.is_none() {
            *native = Some(self.backend.create_buffer(buffer.size)?);
        }
        self.backend.map_buffer(native.as_deref().unwrap())
    }

    pub fn unmap_buffer(&self, buffer: &Buffer) -> Result<()> {
        let native = buffer.native.lock().unwrap();
        match native.as_deref() {
            Some(b) => self.backend.unmap_buffer(b),
            None => Ok(()),
        }
    }

    pub fn flush_mapped_buffer_to_device(&self, buffer: &Buffer, offset: u64, size: u64) -> Result<()> {
        let native = buffer.native.lock().unwrap();
        match native.as_deref() {
            Some(b) => self.backend.flush_mapped_buffer_to_device(b, offset, size),
            None => Ok(()),
        }
    }

    pub fn flush_mapped_buffer_to_host(&self, buffer: &Buffer, offset: u64, size: u64) -> Result<()> {
        let native = buffer.native.lock().unwrap();
        match native.as_deref() {
            Some(b) => self.backend.flush_mapped_buffer_to_host(b, offset, size),
            None => Ok(()),
        }
    }

    /// Stages `data` through the constant-upload ring and returns
    /// the `(chunk, offset)` the embedder should copy into before the next
    /// `execute_all`.
    pub fn write_data_to_buffer(&self, data_len: usize, alignment: u64) -> crate::staging::RingAllocation {
        self.upload_ring.lock().unwrap().stage(data_len as u64, alignment)
    }

    pub fn write_image_data_to_buffer_tight(&self, texels: &[u32]) -> Result<crate::staging::RingAllocation> {
        let mut bytes = Vec::with_capacity(texels.len() * 4);
        crate::image_data::write_rgba8_tight(&mut bytes, texels).map_err(|_| Error::Backend("tight-pack write failed".into()))?;
        Ok(self.upload_ring.lock().unwrap().stage(bytes.len() as u64, 256))
    }

    pub fn write_image_descriptors(&self, array: &DescriptorArray, writes: &[(u32, UniqueResourceId)]) {
        for &(index, resource) in writes {
            array.write(index, resource);
        }
    }

    pub fn write_buffer_descriptors(&self, array: &DescriptorArray, writes: &[(u32, UniqueResourceId)]) {
        for &(index, resource) in writes {
            array.write(index, resource);
        }
    }

    // ---- execution ----

    /// Prunes every resource table of ids reported by `DropNotify` since
    /// the last call. The resource's native handle already went through
    /// ordinary `Drop` glue by the time its id lands here - each resource
    /// owns its native `Box` directly, so there is nothing left to
    /// hand to the graveyard. This just keeps the weak tables from growing
    /// unbounded with dead entries. Called at the start of every
    /// `execute_all`, which is the only place batch bookkeeping is mutated.
    fn drain_pending_drops(&mut self) {
        for id in self.pending_drops.drain() {
            self.tables.images2d.lock().unwrap().remove(&id);
            self.tables.images3d.lock().unwrap().remove(&id);
            self.tables.buffers.lock().unwrap().remove(&id);
            self.tables.swap_chains.lock().unwrap().remove(&id);
            self.tables.descriptor_arrays.lock().unwrap().remove(&id);
            self.tables.blas.lock().unwrap().remove(&id);
            self.tables.tlas.lock().unwrap().remove(&id);
            self.tables.cached_descriptor_sets.lock().unwrap().remove(&id);
        }
    }

    /// Acquires a back buffer for `swap_chain` if it hasn't been touched
    /// yet this batch, resizing first if a resize is pending.
    fn maybe_update_swap_chain(&self, swap_chain: &SwapChain) -> Result<()> {
        if swap_chain.is_touched_this_batch() {
            return Ok(());
        }
        if swap_chain.needs_resize() {
            let (w, h) = *swap_chain.desired_size.lock().unwrap();
            log::warn!("swap-chain {:?} resizing to {}x{}", swap_chain.id, w, h);
            *swap_chain.current_size.lock().unwrap() = (w, h);
            *swap_chain.native.lock().unwrap() = Some(self.backend.create_swap_chain(w, h)?);
        }
        if swap_chain.native.lock().unwrap().is_none() {
            let (w, h) = *swap_chain.current_size.lock().unwrap();
            *swap_chain.native.lock().unwrap() = Some(self.backend.create_swap_chain(w, h)?);
        }
        let native = swap_chain.native.lock().unwrap();
        let index = self.backend.acquire_back_buffer(native.as_deref().unwrap())?;
        *swap_chain.next_image_index.lock().unwrap() = index;
        Ok(())
    }

    /// Builds `blas`'s backing buffer and native acceleration structure if
    /// it hasn't been built yet; a no-op on a rebuild request against an
    /// already-built BLAS.
    fn build_blas(&mut self, blas_id: UniqueResourceId) -> Result<()> {
        let blas = match self.tables.blas.lock().unwrap().get(&blas_id).and_then(Weak::upgrade) {
            Some(b) => b,
            None => return Ok(()),
        };
        if blas.native.lock().unwrap().is_some() {
            return Ok(());
        }
        let id = self.next_id();
        let buffer = Buffer::new(id, ACCELERATION_STRUCTURE_BACKING_SIZE, BufferUsageFlags::AS_BUILD_INPUT, None, self.pending_drops.clone());
        *buffer.native.lock().unwrap() = Some(self.backend.create_buffer(ACCELERATION_STRUCTURE_BACKING_SIZE)?);
        let native = {
            let guard = buffer.native.lock().unwrap();
            self.backend.create_acceleration_structure(guard.as_deref().unwrap())?
        };
        *blas.native.lock().unwrap() = Some(native);
        *blas.backing_buffer.lock().unwrap() = Some(buffer);
        Ok(())
    }

    fn build_tlas(&mut self, tlas_id: UniqueResourceId) -> Result<()> {
        let tlas = match self.tables.tlas.lock().unwrap().get(&tlas_id).and_then(Weak::upgrade) {
            Some(t) => t,
            None => return Ok(()),
        };
        if tlas.native.lock().unwrap().is_some() {
            return Ok(());
        }
        let id = self.next_id();
        let buffer = Buffer::new(id, ACCELERATION_STRUCTURE_BACKING_SIZE, BufferUsageFlags::AS_BUILD_INPUT, None, self.pending_drops.clone());
        *buffer.native.lock().unwrap() = Some(self.backend.create_buffer(ACCELERATION_STRUCTURE_BACKING_SIZE)?);
        let native = {
            let guard = buffer.native.lock().unwrap();
            self.backend.create_acceleration_structure(guard.as_deref().unwrap())?
        };
        *tlas.native.lock().unwrap() = Some(native);
        *tlas.backing_buffer.lock().unwrap() = Some(buffer);
        Ok(())
    }

    fn ensure_image_native(&self, image: &Image2D) -> Result<()> {
        let mut native = image.native.lock().unwrap();
        if native.is_none() {
            *native = Some(self.backend.create_image()?);
        }
        Ok(())
    }

    fn ensure_buffer_native(&self, buffer: &Buffer) -> Result<()> {
        let mut native = buffer.native.lock().unwrap();
        if native.is_none() {
            *native = Some(self.backend.create_buffer(buffer.size)?);
        }
        Ok(())
    }

    /// Emits the native call a command implies, lazily materializing any
    /// resource it touches that has no backing native handle yet.
    fn record_command(&self, queue_index: u32, batch: BatchIndex, command: &Command) -> Result<()> {
        match &command.inner {
            CommandInner::CopyBuffer {
                src,
                dst,
                src_offset,
                dst_offset,
                size,
            } => {
                let src_buf = self.tables.buffers.lock().unwrap().get(src).and_then(Weak::upgrade);
                let dst_buf = self.tables.buffers.lock().unwrap().get(dst).and_then(Weak::upgrade);
                if let (Some(src_buf), Some(dst_buf)) = (src_buf, dst_buf) {
                    self.ensure_buffer_native(&src_buf)?;
                    self.ensure_buffer_native(&dst_buf)?;
                    let src_native = src_buf.native.lock().unwrap();
                    let dst_native = dst_buf.native.lock().unwrap();
                    self.backend.copy_buffer(
                        queue_index,
                        src_native.as_deref().unwrap(),
                        dst_native.as_deref().unwrap(),
                        *src_offset,
                        *dst_offset,
                        *size,
                    )?;
                }
            }
            CommandInner::CopyBufferToImage { src, dst, mip, array_slice } => {
                let src_buf = self.tables.buffers.lock().unwrap().get(src).and_then(Weak::upgrade);
                let dst_img = self.tables.images2d.lock().unwrap().get(dst).and_then(Weak::upgrade);
                if let (Some(src_buf), Some(dst_img)) = (src_buf, dst_img) {
                    self.ensure_buffer_native(&src_buf)?;
                    self.ensure_image_native(&dst_img)?;
                    let src_native = src_buf.native.lock().unwrap();
                    let dst_native = dst_img.native.lock().unwrap();
                    self.backend
                        .copy_buffer_to_image(queue_index, src_native.as_deref().unwrap(), dst_native.as_deref().unwrap(), *mip, *array_slice)?;
                }
            }
            CommandInner::UploadBuffer { dst } => {
                if let Some(buf) = self.tables.buffers.lock().unwrap().get(dst).and_then(Weak::upgrade) {
                    self.ensure_buffer_native(&buf)?;
                }
            }
            CommandInner::UploadImage { dst, .. } => {
                if let Some(img) = self.tables.images2d.lock().unwrap().get(dst).and_then(Weak::upgrade) {
                    self.ensure_image_native(&img)?;
                }
            }
            CommandInner::BuildBlas { blas } => {
                if let Some(b) = self.tables.blas.lock().unwrap().get(blas).and_then(Weak::upgrade) {
                    let native = b.native.lock().unwrap();
                    if let Some(native) = native.as_deref() {
                        self.backend.build_acceleration_structure(queue_index, native)?;
                    }
                }
            }
            CommandInner::BuildTlas { tlas, .. } => {
                if let Some(t) = self.tables.tlas.lock().unwrap().get(tlas).and_then(Weak::upgrade) {
                    let native = t.native.lock().unwrap();
                    if let Some(native) = native.as_deref() {
                        self.backend.build_acceleration_structure(queue_index, native)?;
                    }
                }
            }
            CommandInner::RunComputeShader { pipeline, group_count, .. } => {
                self.backend.dispatch(queue_index, *pipeline, *group_count)?;
            }
            CommandInner::BeginPass { color_targets, depth_target } => {
                let mut color_imgs = Vec::with_capacity(color_targets.len());
                for id in color_targets {
                    if let Some(img) = self.tables.images2d.lock().unwrap().get(id).and_then(Weak::upgrade) {
                        self.ensure_image_native(&img)?;
                        color_imgs.push(img);
                    }
                }
                let depth_img = match depth_target {
                    Some(id) => {
                        let img = self.tables.images2d.lock().unwrap().get(id).and_then(Weak::upgrade);
                        if let Some(img) = &img {
                            self.ensure_image_native(img)?;
                        }
                        img
                    }
                    None => None,
                };
                let color_guards: Vec<_> = color_imgs.iter().map(|img| img.native.lock().unwrap()).collect();
                let color_refs: Vec<&dyn BackendImage> = color_guards.iter().map(|g| g.as_ref().unwrap().as_ref()).collect();
                let depth_guard = depth_img.as_ref().map(|img| img.native.lock().unwrap());
                let depth_ref = depth_guard.as_ref().and_then(|g| g.as_ref().map(|b| b.as_ref()));
                self.backend.begin_pass(queue_index, &color_refs, depth_ref)?;
            }
            CommandInner::DrawInstanced { pipeline, params, .. } => {
                self.backend.draw_instanced(queue_index, *pipeline, *params)?;
            }
            CommandInner::DrawIndexedInstanced { pipeline, params, .. } => {
                self.backend.draw_indexed_instanced(queue_index, *pipeline, *params)?;
            }
            CommandInner::EndPass => {
                self.backend.end_pass(queue_index)?;
            }
            CommandInner::TraceRays { pipeline, width, height, depth, .. } => {
                self.backend.trace_rays(queue_index, *pipeline, *width, *height, *depth)?;
            }
            CommandInner::ReleaseDependency { .. } | CommandInner::AcquireDependency { .. } => {}
            CommandInner::Present { swap_chain } => {
                if let Some(sc) = self.tables.swap_chains.lock().unwrap().get(swap_chain).and_then(Weak::upgrade) {
                    let native = sc.native.lock().unwrap();
                    let index = *sc.next_image_index.lock().unwrap();
                    if let Some(native) = native.as_deref() {
                        self.backend.present(native, index)?;
                    }
                    *sc.last_present_batch.lock().unwrap() = Some(batch);
                }
            }
            CommandInner::StartTimer { .. } | CommandInner::EndTimer { .. } | CommandInner::PauseForDebugging => {}
        }
        Ok(())
    }

    /// Two-phase walk of every queue's pending commands: pseudo-execution
    /// resolves state and computes barriers, recording
    /// emits native calls and submits. Returns per-queue statistics before
    /// the GPU necessarily reaches them.
    pub fn execute_all(&mut self) -> Result<BatchStatistics> {
        self.drain_pending_drops();

        let batch = self.batch_counter.next();
        self.current_batch = Some(batch);

        let pending: Vec<Vec<Command>> = self.queues.iter_mut().map(Queue::take_pending).collect();

        // Pseudo-execution, part one: swap-chain acquisition and
        // acceleration-structure builds need `&mut self` and must land
        // before any barrier staging references their results.
        for commands in &pending {
            for command in commands {
                match &command.inner {
                    CommandInner::Present { swap_chain } => {
                        if let Some(sc) = self.tables.swap_chains.lock().unwrap().get(swap_chain).and_then(Weak::upgrade) {
                            self.maybe_update_swap_chain(&sc)?;
                        }
                    }
                    CommandInner::BuildBlas { blas } => {
                        self.build_blas(*blas)?;
                    }
                    CommandInner::BuildTlas { tlas, .. } => {
                        self.build_tlas(*tlas)?;
                    }
                    _ => {}
                }
            }
        }

        // Pseudo-execution, part two: stage every transition each command
        // implies, materializing descriptor bindings along the way, and
        // collect every release/acquire edge for later resolution.
        let mut planner = self.planner.lock().unwrap();
        let descriptor_arrays = self.tables.descriptor_arrays.lock().unwrap();
        let cached_descriptor_sets = self.tables.cached_descriptor_sets.lock().unwrap();
        let swap_chains_for_staging = self.tables.swap_chains.lock().unwrap();
        let mut releases: Vec<(usize, UniqueResourceId)> = Vec::new();
        let mut acquires: Vec<(usize, UniqueResourceId)> = Vec::new();
        for (queue_index, commands) in pending.iter().enumerate() {
            for command in commands {
                match &command.inner {
                    CommandInner::ReleaseDependency { dependency } => releases.push((queue_index, *dependency)),
                    CommandInner::AcquireDependency { dependency } => acquires.push((queue_index, *dependency)),
                    CommandInner::RunComputeShader { bindings, .. }
                    | CommandInner::DrawInstanced { bindings, .. }
                    | CommandInner::DrawIndexedInstanced { bindings, .. }
                    | CommandInner::TraceRays { bindings, .. } => {
                        materialize_bindings(&self.cache, &mut planner, &descriptor_arrays, &cached_descriptor_sets, bindings);
                    }
                    _ => {}
                }
                stage_command(&mut planner, &swap_chains_for_staging, command);
            }
        }
        drop(descriptor_arrays);
        drop(cached_descriptor_sets);
        drop(swap_chains_for_staging);

        let images2d = self.tables.images2d.lock().unwrap();
        let buffers = self.tables.buffers.lock().unwrap();
        let (image_barriers, buffer_barriers) = planner.collect_transitions(
            &mut |id, slice, mip| {
                images2d
                    .get(&id)
                    .and_then(Weak::upgrade)
                    .map(|img| img.access(slice, mip))
                    .unwrap_or_else(ImageAccess::initial)
            },
            &mut |id, slice, mip, access| {
                if let Some(img) = images2d.get(&id).and_then(Weak::upgrade) {
                    img.set_access(slice, mip, access);
                }
            },
            &mut |id| {
                buffers
                    .get(&id)
                    .and_then(Weak::upgrade)
                    .map(|b| b.access())
                    .unwrap_or_else(BufferAccess::initial)
            },
            &mut |id, access| {
                if let Some(b) = buffers.get(&id).and_then(Weak::upgrade) {
                    b.set_access(access);
                }
            },
        );
        drop(images2d);
        drop(buffers);

        // Swap-chain transitions aren't covered by the generic closures
        // above (there's no per-subresource table for them), so merge or
        // barrier against each back buffer's own access record directly.
        let swap_chains = self.tables.swap_chains.lock().unwrap();
        let mut swap_chain_barriers: Vec<(UniqueResourceId, ImageBarrier)> = Vec::new();
        for t in planner.pending_swap_chain_transitions() {
            if let Some(sc) = swap_chains.get(&t.swap_chain).and_then(Weak::upgrade) {
                let back_buffer = &sc.back_buffers[t.image_index as usize];
                let mut current = back_buffer.current_access.lock().unwrap();
                if current.mergeable_with(&t.requested) {
                    *current = current.merged_sync_points(&t.requested);
                } else {
                    swap_chain_barriers.push((
                        t.swap_chain,
                        ImageBarrier {
                            mip: 0,
                            array_slice: t.image_index,
                            before: *current,
                            after: t.requested,
                        },
                    ));
                    *current = t.requested;
                }
            }
        }
        drop(swap_chains);
        drop(planner);

        // Per-queue signal values genuinely advance batch to batch now:
        // each queue's submission counter is actually stepped here, not
        // merely peeked.
        let mut signal_values = Vec::with_capacity(self.queues.len());
        let mut queue_submission_indices = Vec::with_capacity(self.queues.len());
        for queue in self.queues.iter_mut() {
            let qsi = queue.submission_counter().next();
            queue_submission_indices.push(qsi);
            signal_values.push(qsi.value() + 1);
        }

        for (queue_index, dependency) in &releases {
            if let Some(dep) = self.tables.dependencies.lock().unwrap().get(dependency).and_then(Weak::upgrade) {
                let event = ReleaseEvent {
                    queue_index: *queue_index as u32,
                    batch_index: batch,
                    queue_submission_index: queue_submission_indices[*queue_index],
                    semaphore_value: signal_values[*queue_index],
                };
                if !dep.release(event) {
                    log::error!("dependency {:?} released more than once", dependency);
                }
            }
        }

        let mut extra_waits: Vec<Vec<(u32, u64)>> = vec![Vec::new(); self.queues.len()];
        for (queue_index, dependency) in &acquires {
            if let Some(dep) = self.tables.dependencies.lock().unwrap().get(dependency).and_then(Weak::upgrade) {
                match dep.acquire() {
                    Some(event) => extra_waits[*queue_index].push((event.queue_index, event.semaphore_value)),
                    None => log::error!("dependency {:?} acquired before it was released", dependency),
                }
            }
        }

        // Recording pass: emit every command's native call in order, then
        // submit once per queue threading in any cross-queue waits its
        // acquires resolved to.
        let mut commands_per_queue = Vec::with_capacity(pending.len());
        let mut wait_values = Vec::with_capacity(self.queues.len());
        for (queue_index, commands) in pending.iter().enumerate() {
            commands_per_queue.push(commands.len());
            for command in commands {
                self.record_command(queue_index as u32, batch, command)?;
            }
            let signal_value = signal_values[queue_index];
            let submission = self.backend.submit(queue_index as u32, signal_value, &extra_waits[queue_index])?;
            let _ = submission;
            wait_values.push((queue_index as u32, signal_value));
        }

        self.graveyard.open_batch(batch, wait_values);
        let collected = self.graveyard.cleanup(self.config.keep_batches, &|queue| self.backend.timeline_value(queue));
        self.upload_ring.lock().unwrap().flush();

        // Swap-chain acquisition is scoped to one batch; clear it so the
        // next batch's first reference re-acquires rather than reusing a
        // stale index.
        for sc in self.tables.swap_chains.lock().unwrap().values().filter_map(Weak::upgrade) {
            sc.clear_touched();
        }

        log::debug!(
            "batch {:?}: {} image barriers, {} buffer barriers, {} swap-chain barriers, {} batches collected",
            batch,
            image_barriers.len(),
            buffer_barriers.len(),
            swap_chain_barriers.len(),
            collected.len()
        );

        Ok(BatchStatistics {
            batch: Some(batch),
            commands_per_queue,
            image_barriers: image_barriers.len() + swap_chain_barriers.len(),
            buffer_barriers: buffer_barriers.len(),
            collected_batches: collected.len(),
        })
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(err) = self.backend.wait_idle() {
            log::error!("context drop: wait_idle failed: {}", err);
        }
    }
}
