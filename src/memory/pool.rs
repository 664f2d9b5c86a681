//! Fixed-capacity, fixed-chunk-size memory arena.
//!
//! A [`PoolAllocator`] owns one contiguous region partitioned into `capacity`
//! chunks, each a one-byte allocated flag padded to the element alignment
//! followed by the element payload. Allocation and free are O(1) amortized
//! with no internal fragmentation, and freed chunks are reused
//! lowest-index-first so allocation patterns stay deterministic and live
//! chunks stay packed toward low addresses.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::PropkitError;
use crate::log::{error, warn};

/// Chunk index within a pool.
pub type Index = u32;

/// Stack of free chunk indices, kept sorted so that the smallest free index
/// is always the next one popped.
#[derive(Debug)]
struct FreeIndexStack {
    // Sorted descending; the smallest index sits at the end, next to pop.
    stack: Vec<Index>,
}

impl FreeIndexStack {
    fn full(capacity: Index) -> Self {
        FreeIndexStack {
            stack: (0..capacity).rev().collect(),
        }
    }

    fn pop(&mut self) -> Option<Index> {
        self.stack.pop()
    }

    fn push(&mut self, index: Index) {
        let at = self.stack.partition_point(|&i| i > index);
        self.stack.insert(at, index);
    }

    fn len(&self) -> usize {
        self.stack.len()
    }

    fn reset(&mut self, capacity: Index) {
        self.stack.clear();
        self.stack.extend((0..capacity).rev());
    }
}

/// A pool allocator for elements of a single size and alignment.
///
/// Addresses returned by [`allocate`](PoolAllocator::allocate) are stable for
/// as long as the chunk stays allocated; the pool itself never moves or grows.
/// All operations are synchronous and unsynchronized (see the crate docs for
/// the single-thread ownership model).
#[derive(Debug)]
pub struct PoolAllocator {
    name: String,
    element_size: usize,
    /// Byte offset of the payload inside a chunk; also the metadata size.
    payload_offset: usize,
    chunk_size: usize,
    capacity: Index,
    number_of_allocations: Index,
    memory: NonNull<u8>,
    memory_layout: Layout,
    free_chunks: FreeIndexStack,
}

impl PoolAllocator {
    /// Creates a pool of `capacity` chunks, each holding one element of the
    /// given layout. The backing memory is allocated eagerly and zeroed.
    pub fn new(name: &str, element: Layout, capacity: Index) -> Result<Self, PropkitError> {
        if capacity == 0 {
            return Err(PropkitError::InvalidCapacity {
                pool: name.to_string(),
            });
        }

        let element_size = element.size().max(1);
        let align = element.align();
        // The one-byte allocated flag, padded so the payload keeps the
        // element's alignment.
        let payload_offset = align;
        let chunk_size = (payload_offset + element_size).next_multiple_of(align);

        let memory_layout = Layout::from_size_align(chunk_size * capacity as usize, align)
            .map_err(|e| PropkitError::PropkitError(format!("pool '{name}' layout: {e}")))?;
        // Zeroed memory marks every chunk free.
        let memory = NonNull::new(unsafe { alloc_zeroed(memory_layout) }).ok_or_else(|| {
            PropkitError::PropkitError(format!("pool '{name}' backing allocation failed"))
        })?;

        Ok(PoolAllocator {
            name: name.to_string(),
            element_size,
            payload_offset,
            chunk_size,
            capacity,
            number_of_allocations: 0,
            memory,
            memory_layout,
            free_chunks: FreeIndexStack::full(capacity),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The payload size this pool allocates, in bytes.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    #[must_use]
    pub fn capacity(&self) -> Index {
        self.capacity
    }

    /// Number of currently-live allocations. Always equals
    /// `capacity - free stack depth`.
    #[must_use]
    pub fn allocations(&self) -> Index {
        self.number_of_allocations
    }

    fn chunk_ptr(&self, index: Index) -> *mut u8 {
        debug_assert!(index < self.capacity);
        unsafe { self.memory.as_ptr().add(index as usize * self.chunk_size) }
    }

    /// The payload address of the chunk at `index`, allocated or not.
    #[must_use]
    pub fn data_at(&self, index: Index) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.chunk_ptr(index).add(self.payload_offset)) }
    }

    /// Whether the chunk at `index` is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, index: Index) -> bool {
        unsafe { *self.chunk_ptr(index) != 0 }
    }

    /// Returns the payload address of a free chunk, marking it allocated.
    /// Fails with [`PropkitError::MemoryOverflow`] when no free chunk
    /// remains; capacity is fixed at construction and the pool never grows.
    pub fn allocate(&mut self) -> Result<NonNull<u8>, PropkitError> {
        let Some(index) = self.free_chunks.pop() else {
            return Err(PropkitError::MemoryOverflow {
                pool: self.name.clone(),
            });
        };
        unsafe { *self.chunk_ptr(index) = 1 };
        self.number_of_allocations += 1;
        debug_assert_eq!(
            self.number_of_allocations as usize,
            self.capacity as usize - self.free_chunks.len()
        );
        Ok(self.data_at(index))
    }

    /// Demotes the chunk owning `data` back to free.
    ///
    /// `data` must be an address previously returned by
    /// [`allocate`](PoolAllocator::allocate) on this pool. Addresses outside
    /// the pool log an error and change nothing, and freeing an already-free
    /// chunk logs a warning and changes nothing; neither path panics, because
    /// frees commonly run from destructors.
    pub fn free(&mut self, data: NonNull<u8>) {
        let base = self.memory.as_ptr() as usize;
        let addr = data.as_ptr() as usize;

        let index = addr
            .checked_sub(base + self.payload_offset)
            .filter(|rel| rel % self.chunk_size == 0)
            .map(|rel| rel / self.chunk_size)
            .filter(|&i| i < self.capacity as usize);

        let Some(index) = index else {
            error!(
                "pointer {:p} was not allocated by pool '{}'",
                data.as_ptr(),
                self.name
            );
            return;
        };

        let index = index as Index;
        if !self.is_allocated(index) {
            warn!(
                "trying to free unallocated chunk {} in pool '{}'; ignoring",
                index, self.name
            );
            return;
        }

        unsafe { *self.chunk_ptr(index) = 0 };
        self.number_of_allocations -= 1;
        self.free_chunks.push(index);
        debug_assert_eq!(
            self.number_of_allocations as usize,
            self.capacity as usize - self.free_chunks.len()
        );
    }

    /// Resets every chunk to free and zeroes the backing memory.
    ///
    /// Only legal while no allocations are live; clearing a pool with live
    /// chunks would silently invalidate those objects, so it is refused and
    /// logged instead.
    pub fn clear(&mut self) {
        if self.number_of_allocations == 0 {
            unsafe {
                self.memory
                    .as_ptr()
                    .write_bytes(0, self.memory_layout.size());
            }
            self.free_chunks.reset(self.capacity);
        } else {
            error!(
                "clearing pool '{}' although there are still {} elements allocated",
                self.name, self.number_of_allocations
            );
        }
    }

    /// Iterates over the payload addresses of all allocated chunks, in index
    /// order, skipping free chunks.
    pub fn iter(&self) -> impl Iterator<Item = NonNull<u8>> + '_ {
        self.iter_where(|pool, index| pool.is_allocated(index))
    }

    /// Iterates with a caller-supplied chunk-validity predicate. Pools may
    /// host validity rules beyond the allocated flag (type tags, tombstones)
    /// without the allocator knowing about them.
    pub fn iter_where<'a, F>(&'a self, validator: F) -> impl Iterator<Item = NonNull<u8>> + 'a
    where
        F: Fn(&PoolAllocator, Index) -> bool + 'a,
    {
        (0..self.capacity)
            .filter(move |&index| validator(self, index))
            .map(move |index| self.data_at(index))
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        if self.number_of_allocations > 0 {
            warn!(
                "deleting pool '{}' although there are still {} elements allocated",
                self.name, self.number_of_allocations
            );
        }
        unsafe { dealloc(self.memory.as_ptr(), self.memory_layout) };
    }
}
