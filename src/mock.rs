//! An in-memory stand-in for `[BACKEND]`, used only by tests. Every native
//! handle is a plain struct with no real GPU object behind it - just enough
//! bookkeeping for `Context` to exercise its own logic against.

use crate::backend::*;
use crate::command::{DrawIndexedParams, DrawParams, ThreadGroupCount};
use crate::error::Result;
use crate::ids::{Counter, QueueSubmissionIndex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug)]
pub struct MockImage;
impl BackendImage for MockImage {}

#[derive(Debug)]
pub struct MockBuffer {
    data: Mutex<Vec<u8>>,
}
impl BackendBuffer for MockBuffer {}

#[derive(Debug)]
pub struct MockDescriptorSetLayout;
impl BackendDescriptorSetLayout for MockDescriptorSetLayout {}

#[derive(Debug)]
pub struct MockDescriptorSet;
impl BackendDescriptorSet for MockDescriptorSet {}

#[derive(Debug)]
pub struct MockGraphicsPipeline;
impl BackendGraphicsPipeline for MockGraphicsPipeline {}

#[derive(Debug)]
pub struct MockRayTracingPipeline;
impl BackendRayTracingPipeline for MockRayTracingPipeline {}

#[derive(Debug)]
pub struct MockAccelerationStructure;
impl BackendAccelerationStructure for MockAccelerationStructure {}

#[derive(Debug)]
pub struct MockSwapChain {
    size: Mutex<(u32, u32)>,
    next_index: AtomicU64,
    back_buffer_count: u32,
}
impl BackendSwapChain for MockSwapChain {
    fn size(&self) -> (u32, u32) {
        *self.size.lock().unwrap()
    }
}

/// A single-queue mock backend with one monotonically advancing timeline
/// semaphore per queue index, sized up front.
pub struct MockBackend {
    timelines: Vec<AtomicU64>,
    submission_counter: Mutex<Counter<QueueSubmissionIndex>>,
    pub fail_allocations: bool,
}

impl MockBackend {
    pub fn new(queue_count: usize) -> MockBackend {
        MockBackend {
            timelines: (0..queue_count).map(|_| AtomicU64::new(0)).collect(),
            submission_counter: Mutex::new(Counter::default()),
            fail_allocations: false,
        }
    }
}

impl Backend for MockBackend {
    fn allocate_memory(&self, _size: u64) -> Result<()> {
        if self.fail_allocations {
            return Err(crate::error::Error::OutOfDeviceMemory);
        }
        Ok(())
    }

    fn create_image(&self) -> Result<Box<dyn BackendImage>> {
        Ok(Box::new(MockImage))
    }

    fn create_buffer(&self, size: u64) -> Result<Box<dyn BackendBuffer>> {
        Ok(Box::new(MockBuffer {
            data: Mutex::new(vec![0u8; size as usize]),
        }))
    }

    fn create_swap_chain(&self, width: u32, height: u32) -> Result<Box<dyn BackendSwapChain>> {
        Ok(Box::new(MockSwapChain {
            size: Mutex::new((width, height)),
            next_index: AtomicU64::new(0),
            back_buffer_count: 2,
        }))
    }

    fn acquire_back_buffer(&self, swap_chain: &dyn BackendSwapChain) -> Result<u32> {
        let sc = swap_chain
            .downcast_ref::<MockSwapChain>()
            .expect("mock backend handed a non-mock swap-chain");
        let index = sc.next_index.fetch_add(1, Ordering::SeqCst) % sc.back_buffer_count as u64;
        Ok(index as u32)
    }

    fn present(&self, _swap_chain: &dyn BackendSwapChain, _image_index: u32) -> Result<()> {
        Ok(())
    }

    fn create_descriptor_set_layout(&self) -> Result<Box<dyn BackendDescriptorSetLayout>> {
        Ok(Box::new(MockDescriptorSetLayout))
    }

    fn create_descriptor_set(&self, _layout: &dyn BackendDescriptorSetLayout) -> Result<Box<dyn BackendDescriptorSet>> {
        Ok(Box::new(MockDescriptorSet))
    }

    fn create_graphics_pipeline(&self) -> Result<Box<dyn BackendGraphicsPipeline>> {
        Ok(Box::new(MockGraphicsPipeline))
    }

    fn create_ray_tracing_pipeline(&self) -> Result<Box<dyn BackendRayTracingPipeline>> {
        Ok(Box::new(MockRayTracingPipeline))
    }

    fn create_acceleration_structure(&self, _backing: &dyn BackendBuffer) -> Result<Box<dyn BackendAccelerationStructure>> {
        Ok(Box::new(MockAccelerationStructure))
    }

    fn queue_count(&self) -> usize {
        self.timelines.len()
    }

    fn resource_barrier(
        &self,
        queue_index: u32,
        image_barriers: &[(&dyn BackendImage, ImageBarrier)],
        buffer_barriers: &[(&dyn BackendBuffer, BufferBarrier)],
    ) -> Result<()> {
        log::trace!(
            "queue {}: {} image barriers, {} buffer barriers",
            queue_index,
            image_barriers.len(),
            buffer_barriers.len()
        );
        Ok(())
    }

    fn copy_buffer(
        &self,
        _queue_index: u32,
        src: &dyn BackendBuffer,
        dst: &dyn BackendBuffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        let src_mock = src
            .downcast_ref::<MockBuffer>()
            .expect("mock backend handed a non-mock buffer");
        let dst_mock = dst
            .downcast_ref::<MockBuffer>()
            .expect("mock backend handed a non-mock buffer");
        let bytes = {
            let src_data = src_mock.data.lock().unwrap();
            src_data[src_offset as usize..(src_offset + size) as usize].to_vec()
        };
        let mut dst_data = dst_mock.data.lock().unwrap();
        dst_data[dst_offset as usize..(dst_offset + size) as usize].copy_from_slice(&bytes);
        Ok(())
    }

    fn copy_buffer_to_image(
        &self,
        _queue_index: u32,
        _src: &dyn BackendBuffer,
        _dst: &dyn BackendImage,
        _mip: u32,
        _array_slice: u32,
    ) -> Result<()> {
        Ok(())
    }

    fn begin_pass(
        &self,
        _queue_index: u32,
        _color_targets: &[&dyn BackendImage],
        _depth_target: Option<&dyn BackendImage>,
    ) -> Result<()> {
        Ok(())
    }

    fn end_pass(&self, _queue_index: u32) -> Result<()> {
        Ok(())
    }

    fn draw_instanced(&self, _queue_index: u32, _pipeline: u32, _params: DrawParams) -> Result<()> {
        Ok(())
    }

    fn draw_indexed_instanced(&self, _queue_index: u32, _pipeline: u32, _params: DrawIndexedParams) -> Result<()> {
        Ok(())
    }

    fn dispatch(&self, _queue_index: u32, _pipeline: u32, _group_count: ThreadGroupCount) -> Result<()> {
        Ok(())
    }

    fn trace_rays(&self, _queue_index: u32, _pipeline: u32, _width: u32, _height: u32, _depth: u32) -> Result<()> {
        Ok(())
    }

    fn build_acceleration_structure(&self, _queue_index: u32, _structure: &dyn BackendAccelerationStructure) -> Result<()> {
        Ok(())
    }

    fn map_buffer(&self, buffer: &dyn BackendBuffer) -> Result<*mut u8> {
        let mock = buffer
            .downcast_ref::<MockBuffer>()
            .expect("mock backend handed a non-mock buffer");
        Ok(mock.data.lock().unwrap().as_mut_ptr())
    }

    fn unmap_buffer(&self, _buffer: &dyn BackendBuffer) -> Result<()> {
        Ok(())
    }

    fn flush_mapped_buffer_to_device(&self, _buffer: &dyn BackendBuffer, _offset: u64, _size: u64) -> Result<()> {
        Ok(())
    }

    fn flush_mapped_buffer_to_host(&self, _buffer: &dyn BackendBuffer, _offset: u64, _size: u64) -> Result<()> {
        Ok(())
    }

    fn submit(&self, queue_index: u32, signal_value: u64, waits: &[(u32, u64)]) -> Result<QueueSubmissionIndex> {
        for &(queue, value) in waits {
            let observed = self.timelines[queue as usize].load(Ordering::SeqCst);
            if observed < value {
                log::warn!("mock backend: submit on queue {} waited on queue {} value {} (observed {})", queue_index, queue, value, observed);
            }
        }
        self.timelines[queue_index as usize].store(signal_value, Ordering::SeqCst);
        Ok(self.submission_counter.lock().unwrap().next())
    }

    fn timeline_value(&self, queue_index: u32) -> u64 {
        self.timelines[queue_index as usize].load(Ordering::SeqCst)
    }

    fn wait_idle(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_advances_the_queues_timeline() {
        let backend = MockBackend::new(1);
        assert_eq!(backend.timeline_value(0), 0);
        backend.submit(0, 5, &[]).unwrap();
        assert_eq!(backend.timeline_value(0), 5);
    }

    #[test]
    fn acquire_back_buffer_cycles_through_the_chain() {
        let backend = MockBackend::new(1);
        let sc = backend.create_swap_chain(1920, 1080).unwrap();
        let a = backend.acquire_back_buffer(sc.as_ref()).unwrap();
        let b = backend.acquire_back_buffer(sc.as_ref()).unwrap();
        let c = backend.acquire_back_buffer(sc.as_ref()).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(c, 0);
    }
}
