//! The GPU abstraction contract.
//!
//! This crate never talks to DX12 or Vulkan directly; a concrete backend
//! (an external collaborator, analogous to `render-gl`/`backend_gl` sitting
//! behind `autograph-render`'s `RendererBackend`) implements `Backend` and
//! hands the context `Box<dyn BackendImage>`-style trait objects for each
//! resource kind. Downcasting is used only by backend-internal code that
//! knows which concrete type it put in the box.

use crate::access::{BufferAccess, ImageAccess};
use crate::command::{DrawIndexedParams, DrawParams, ThreadGroupCount};
use crate::error::Result;
use crate::ids::QueueSubmissionIndex;
use downcast_rs::{impl_downcast, Downcast};
use std::fmt::Debug;

pub trait BackendImage: Downcast + Debug {}
pub trait BackendBuffer: Downcast + Debug {}
pub trait BackendDescriptorSetLayout: Downcast + Debug {}
pub trait BackendDescriptorSet: Downcast + Debug {}
pub trait BackendGraphicsPipeline: Downcast + Debug {}
pub trait BackendRayTracingPipeline: Downcast + Debug {}
pub trait BackendFramebuffer: Downcast + Debug {}
pub trait BackendAccelerationStructure: Downcast + Debug {}
pub trait BackendSwapChain: Downcast + Debug {
    fn size(&self) -> (u32, u32);
}
pub trait BackendFence: Downcast + Debug {}
pub trait BackendCommandList: Downcast + Debug {}

impl_downcast!(BackendImage);
impl_downcast!(BackendBuffer);
impl_downcast!(BackendDescriptorSetLayout);
impl_downcast!(BackendDescriptorSet);
impl_downcast!(BackendGraphicsPipeline);
impl_downcast!(BackendRayTracingPipeline);
impl_downcast!(BackendFramebuffer);
impl_downcast!(BackendAccelerationStructure);
impl_downcast!(BackendSwapChain);
impl_downcast!(BackendFence);
impl_downcast!(BackendCommandList);

/// What the planner computed for one subresource transition; handed to the
/// backend during the recording pass so it can emit the native barrier.
#[derive(Copy, Clone, Debug)]
pub struct ImageBarrier {
    pub mip: u32,
    pub array_slice: u32,
    pub before: ImageAccess,
    pub after: ImageAccess,
}

#[derive(Copy, Clone, Debug)]
pub struct BufferBarrier {
    pub before: BufferAccess,
    pub after: BufferAccess,
}

/// One native queue as seen by the context: a command queue, a timeline
/// semaphore, and an acquire/present surface for swap-chains presented on
/// it.
pub trait Backend: Send + Sync {
    fn allocate_memory(&self, size: u64) -> Result<()>;

    fn create_image(&self) -> Result<Box<dyn BackendImage>>;
    fn create_buffer(&self, size: u64) -> Result<Box<dyn BackendBuffer>>;

    fn create_swap_chain(&self, width: u32, height: u32) -> Result<Box<dyn BackendSwapChain>>;
    fn acquire_back_buffer(&self, swap_chain: &dyn BackendSwapChain) -> Result<u32>;
    fn present(&self, swap_chain: &dyn BackendSwapChain, image_index: u32) -> Result<()>;

    fn create_descriptor_set_layout(&self) -> Result<Box<dyn BackendDescriptorSetLayout>>;
    fn create_descriptor_set(
        &self,
        layout: &dyn BackendDescriptorSetLayout,
    ) -> Result<Box<dyn BackendDescriptorSet>>;

    fn create_graphics_pipeline(&self) -> Result<Box<dyn BackendGraphicsPipeline>>;
    fn create_ray_tracing_pipeline(&self) -> Result<Box<dyn BackendRayTracingPipeline>>;

    fn create_acceleration_structure(
        &self,
        backing: &dyn BackendBuffer,
    ) -> Result<Box<dyn BackendAccelerationStructure>>;

    /// How many independent queues this backend exposes; `Context` sizes
    /// its own queue list to match at construction time.
    fn queue_count(&self) -> usize;

    /// Emits one barrier set covering every subresource transition the
    /// pseudo-execution pass computed for this batch.
    fn resource_barrier(
        &self,
        queue_index: u32,
        image_barriers: &[(&dyn BackendImage, ImageBarrier)],
        buffer_barriers: &[(&dyn BackendBuffer, BufferBarrier)],
    ) -> Result<()>;

    fn copy_buffer(
        &self,
        queue_index: u32,
        src: &dyn BackendBuffer,
        dst: &dyn BackendBuffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<()>;

    fn copy_buffer_to_image(
        &self,
        queue_index: u32,
        src: &dyn BackendBuffer,
        dst: &dyn BackendImage,
        mip: u32,
        array_slice: u32,
    ) -> Result<()>;

    fn begin_pass(
        &self,
        queue_index: u32,
        color_targets: &[&dyn BackendImage],
        depth_target: Option<&dyn BackendImage>,
    ) -> Result<()>;

    fn end_pass(&self, queue_index: u32) -> Result<()>;

    fn draw_instanced(&self, queue_index: u32, pipeline: u32, params: DrawParams) -> Result<()>;

    fn draw_indexed_instanced(&self, queue_index: u32, pipeline: u32, params: DrawIndexedParams) -> Result<()>;

    fn dispatch(&self, queue_index: u32, pipeline: u32, group_count: ThreadGroupCount) -> Result<()>;

    fn trace_rays(&self, queue_index: u32, pipeline: u32, width: u32, height: u32, depth: u32) -> Result<()>;

    fn build_acceleration_structure(&self, queue_index: u32, structure: &dyn BackendAccelerationStructure) -> Result<()>;

    /// Maps the whole buffer for host access; returns a pointer to the
    /// start of the mapped range. The context serializes mapping against
    /// `execute_all` itself (a buffer must not be mapped while in use by
    /// pending commands), so the backend need not.
    fn map_buffer(&self, buffer: &dyn BackendBuffer) -> Result<*mut u8>;
    fn unmap_buffer(&self, buffer: &dyn BackendBuffer) -> Result<()>;
    fn flush_mapped_buffer_to_device(&self, buffer: &dyn BackendBuffer, offset: u64, size: u64) -> Result<()>;
    fn flush_mapped_buffer_to_host(&self, buffer: &dyn BackendBuffer, offset: u64, size: u64) -> Result<()>;

    /// Submits a closed command list on `queue_index`, signalling the
    /// queue's timeline semaphore to `signal_value` and waiting on any
    /// `(queue_index, value)` pairs named in `waits`.
    fn submit(
        &self,
        queue_index: u32,
        signal_value: u64,
        waits: &[(u32, u64)],
    ) -> Result<QueueSubmissionIndex>;

    /// Current signalled value of `queue_index`'s timeline semaphore.
    fn timeline_value(&self, queue_index: u32) -> u64;

    fn wait_idle(&self) -> Result<()>;
}
