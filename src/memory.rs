//! GPU memory pools.
//!
//! A `Pool` owns a list of chunks; each chunk is a single GPU memory
//! allocation plus a generic free-list sub-allocator keyed by size. This
//! mirrors the original `lotus::renderer::pool`, which hands out
//! `(chunk_index, offset)` tokens rather than raw pointers so that resource
//! destruction can return the range without touching the backend.

use crate::error::{Error, Result};
use std::fmt;

/// Opaque handle to a sub-allocation within a `Pool`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PoolToken {
    pub chunk_index: usize,
    pub offset: u64,
    pub size: u64,
}

struct FreeRange {
    offset: u64,
    size: u64,
}

/// A single backing allocation plus its free-list allocator.
struct Chunk {
    capacity: u64,
    free: Vec<FreeRange>,
}

impl Chunk {
    fn new(capacity: u64) -> Chunk {
        Chunk {
            capacity,
            free: vec![FreeRange {
                offset: 0,
                size: capacity,
            }],
        }
    }

    fn allocate(&mut self, size: u64, align: u64) -> Option<u64> {
        for i in 0..self.free.len() {
            let range = &self.free[i];
            let aligned = align_up(range.offset, align);
            let padding = aligned - range.offset;
            if range.size >= size + padding {
                let leftover_offset = aligned + size;
                let leftover_size = range.size - padding - size;
                let original_offset = range.offset;
                let original_size = range.size;
                if leftover_size == 0 {
                    self.free.remove(i);
                } else {
                    self.free[i] = FreeRange {
                        offset: leftover_offset,
                        size: leftover_size,
                    };
                }
                if padding > 0 {
                    self.free.push(FreeRange {
                        offset: original_offset,
                        size: padding,
                    });
                    debug_assert!(original_size >= padding);
                }
                return Some(aligned);
            }
        }
        None
    }

    fn free(&mut self, offset: u64, size: u64) {
        self.free.push(FreeRange { offset, size });
        self.coalesce();
    }

    fn coalesce(&mut self) {
        self.free.sort_by_key(|r| r.offset);
        let mut merged: Vec<FreeRange> = Vec::with_capacity(self.free.len());
        for r in self.free.drain(..) {
            if let Some(last) = merged.last_mut() {
                if last.offset + last.size == r.offset {
                    last.size += r.size;
                    continue;
                }
            }
            merged.push(r);
        }
        self.free = merged;
    }

    fn used(&self) -> u64 {
        self.capacity - self.free.iter().map(|r| r.size).sum::<u64>()
    }
}

/// Callback invoked when no existing chunk can satisfy an allocation; it
/// must produce a chunk of at least `chunk_size` bytes backing new GPU
/// memory, or fail with `Error::OutOfDeviceMemory`.
pub type AllocateMemory = dyn Fn(u64) -> Result<()> + Send + Sync;

pub struct Pool {
    chunk_size: u64,
    chunks: Vec<Chunk>,
    allocate_memory: Box<AllocateMemory>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pool")
            .field("chunk_size", &self.chunk_size)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl Pool {
    pub fn new(chunk_size: u64, allocate_memory: Box<AllocateMemory>) -> Pool {
        Pool {
            chunk_size,
            chunks: Vec::new(),
            allocate_memory,
        }
    }

    pub fn allocate(&mut self, size: u64, align: u64) -> Result<PoolToken> {
        for (chunk_index, chunk) in self.chunks.iter_mut().enumerate() {
            if let Some(offset) = chunk.allocate(size, align) {
                return Ok(PoolToken {
                    chunk_index,
                    offset,
                    size,
                });
            }
        }

        let new_chunk_capacity = self.chunk_size.max(size);
        (self.allocate_memory)(new_chunk_capacity)?;
        let mut chunk = Chunk::new(new_chunk_capacity);
        let offset = chunk
            .allocate(size, align)
            .ok_or(Error::OutOfDeviceMemory)?;
        let chunk_index = self.chunks.len();
        self.chunks.push(chunk);
        Ok(PoolToken {
            chunk_index,
            offset,
            size,
        })
    }

    pub fn free(&mut self, token: PoolToken) {
        if let Some(chunk) = self.chunks.get_mut(token.chunk_index) {
            chunk.free(token.offset, token.size);
        }
    }

    /// Sum of bytes currently handed out across all chunks. Used by tests
    /// checking that the alloc/free sum stays within chunk capacity.
    pub fn used_bytes(&self) -> u64 {
        self.chunks.iter().map(Chunk::used).sum()
    }

    pub fn chunk_capacity(&self, chunk_index: usize) -> Option<u64> {
        self.chunks.get(chunk_index).map(|c| c.capacity)
    }
}

fn align_up(v: u64, align: u64) -> u64 {
    if align == 0 {
        return v;
    }
    (v + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pool_with_chunk_size(chunk_size: u64) -> (Pool, Arc<AtomicUsize>) {
        let allocations = Arc::new(AtomicUsize::new(0));
        let counter = allocations.clone();
        let pool = Pool::new(
            chunk_size,
            Box::new(move |_size| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        (pool, allocations)
    }

    #[test]
    fn tokens_are_disjoint_within_a_chunk() {
        let (mut pool, _) = pool_with_chunk_size(1024);
        let a = pool.allocate(256, 16).unwrap();
        let b = pool.allocate(256, 16).unwrap();
        assert_eq!(a.chunk_index, b.chunk_index);
        let (lo, hi) = if a.offset < b.offset { (a, b) } else { (b, a) };
        assert!(lo.offset + lo.size <= hi.offset);
    }

    #[test]
    fn allocate_then_free_keeps_used_within_capacity() {
        let (mut pool, _) = pool_with_chunk_size(1024);
        let a = pool.allocate(700, 16).unwrap();
        pool.free(a);
        assert_eq!(pool.used_bytes(), 0);
        assert!(pool.used_bytes() <= pool.chunk_capacity(0).unwrap());
    }

    #[test]
    fn exhaustion_allocates_a_new_chunk_on_demand() {
        let (mut pool, allocations) = pool_with_chunk_size(128);
        let _a = pool.allocate(100, 1).unwrap();
        let _b = pool.allocate(100, 1).unwrap();
        assert_eq!(allocations.load(Ordering::SeqCst), 2);
    }
}
