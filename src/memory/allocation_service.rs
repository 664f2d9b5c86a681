//! Central service for routing allocation and deallocation by type.
//!
//! For each type a [`PoolAllocator`] is registered; by default one is created
//! lazily, sized for the type, the first time the type is allocated. One
//! `AllocationService` is shared by every entity of a given kind — it is the
//! arena all properties of that kind live in — and every pool it owns is
//! exclusively owned by it.

use std::alloc::Layout;
use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::error::PropkitError;
use crate::memory::pool::PoolAllocator;
use crate::reflection::{TypeHandle, TypeMap};

/// Chunk count of lazily-created pools.
pub const DEFAULT_POOL_CAPACITY: u32 = 1024;

/// Routes per-type allocate/free requests to per-type pools and answers
/// provenance queries ("did this address come from me?").
#[derive(Default)]
pub struct AllocationService {
    allocators: TypeMap<Rc<RefCell<PoolAllocator>>>,
    /// Every address this service has vended and not yet freed.
    allocated: FxHashSet<usize>,
}

impl AllocationService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the given allocator for (de-)allocating objects of `handle`'s
    /// type, replacing any previous registration.
    pub fn register_allocator(&mut self, handle: TypeHandle, allocator: Rc<RefCell<PoolAllocator>>) {
        self.allocators.insert(handle, allocator);
    }

    /// Removes and returns the allocator registered for the given type.
    ///
    /// Beware: any objects still allocated through the removed allocator can
    /// no longer be freed through this service, because the service no longer
    /// knows which allocator owns them. Unregister an allocator only when no
    /// such objects remain.
    pub fn unregister_allocator(&mut self, handle: TypeHandle) -> Option<Rc<RefCell<PoolAllocator>>> {
        self.allocators.remove(&handle)
    }

    /// The allocator registered for the given type, if any.
    #[must_use]
    pub fn allocator(&self, handle: TypeHandle) -> Option<Rc<RefCell<PoolAllocator>>> {
        self.allocators.get(&handle).cloned()
    }

    /// True iff the given address was vended by this service and is still
    /// live. O(1).
    #[must_use]
    pub fn has_allocated(&self, data: NonNull<u8>) -> bool {
        self.allocated.contains(&(data.as_ptr() as usize))
    }

    /// Allocates memory for one `T` from the pool registered for `T`,
    /// creating a pool sized for `T` when none is registered yet.
    ///
    /// The returned memory is uninitialized; callers write a `T` into it
    /// (see [`Pooled::new`](crate::memory::Pooled::new)). An allocator whose
    /// chunk size disagrees with `size_of::<T>()` is a fatal configuration
    /// error: a type must never share an allocator sized for a different
    /// type.
    pub fn allocate<T: 'static>(&mut self) -> Result<NonNull<u8>, PropkitError> {
        let handle = TypeHandle::of::<T>();
        let layout = Layout::new::<T>();

        let allocator = match self.allocators.get(&handle) {
            Some(allocator) => {
                if allocator.borrow().element_size() != layout.size().max(1) {
                    return Err(PropkitError::AllocatorMismatch {
                        type_name: handle.name(),
                        expected: layout.size(),
                        actual: allocator.borrow().element_size(),
                    });
                }
                Rc::clone(allocator)
            }
            None => {
                let pool = PoolAllocator::new(handle.name(), layout, DEFAULT_POOL_CAPACITY)?;
                let allocator = Rc::new(RefCell::new(pool));
                self.allocators.insert(handle, Rc::clone(&allocator));
                allocator
            }
        };

        let data = allocator.borrow_mut().allocate()?;
        self.allocated.insert(data.as_ptr() as usize);
        Ok(data)
    }

    /// Frees memory previously vended by [`allocate`](Self::allocate) for the
    /// given type.
    ///
    /// Returns false — without logging or panicking, since callers are often
    /// destructors — when no allocator is registered for the type or the
    /// address is not in the provenance set.
    pub fn free(&mut self, handle: TypeHandle, data: NonNull<u8>) -> bool {
        let Some(allocator) = self.allocators.get(&handle) else {
            return false;
        };
        if !self.allocated.remove(&(data.as_ptr() as usize)) {
            return false;
        }
        allocator.borrow_mut().free(data);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_are_created_lazily_per_type() {
        let mut service = AllocationService::new();
        assert!(service.allocator(TypeHandle::of::<u64>()).is_none());

        let data = service.allocate::<u64>().unwrap();
        let pool = service.allocator(TypeHandle::of::<u64>()).unwrap();
        assert_eq!(pool.borrow().element_size(), size_of::<u64>());
        assert_eq!(pool.borrow().allocations(), 1);
        assert!(service.has_allocated(data));
    }

    #[test]
    fn distinct_types_get_distinct_pools() {
        let mut service = AllocationService::new();
        let _ = service.allocate::<u64>().unwrap();
        let _ = service.allocate::<[u8; 3]>().unwrap();

        let a = service.allocator(TypeHandle::of::<u64>()).unwrap();
        let b = service.allocator(TypeHandle::of::<[u8; 3]>()).unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(b.borrow().element_size(), 3);
    }

    #[test]
    fn size_mismatch_is_fatal() {
        let mut service = AllocationService::new();
        // Deliberately register a pool sized for u8 under u64's handle.
        let wrong = Rc::new(RefCell::new(
            PoolAllocator::new("wrong", Layout::new::<u8>(), 4).unwrap(),
        ));
        service.register_allocator(TypeHandle::of::<u64>(), wrong);

        assert!(matches!(
            service.allocate::<u64>(),
            Err(PropkitError::AllocatorMismatch { .. })
        ));
    }

    #[test]
    fn free_returns_false_for_unknown_type_or_address() {
        let mut service = AllocationService::new();
        let data = service.allocate::<u64>().unwrap();

        // Unknown type.
        assert!(!service.free(TypeHandle::of::<u32>(), data));
        // Known type, foreign address.
        let mut elsewhere = 0u64;
        let foreign = NonNull::new(std::ptr::addr_of_mut!(elsewhere).cast::<u8>()).unwrap();
        assert!(!service.free(TypeHandle::of::<u64>(), foreign));

        // The real free succeeds exactly once.
        assert!(service.free(TypeHandle::of::<u64>(), data));
        assert!(!service.free(TypeHandle::of::<u64>(), data));
        assert!(!service.has_allocated(data));
    }

    #[test]
    fn unregistering_returns_the_allocator() {
        let mut service = AllocationService::new();
        let _ = service.allocate::<u64>().unwrap();

        let removed = service.unregister_allocator(TypeHandle::of::<u64>());
        assert!(removed.is_some());
        assert!(service.allocator(TypeHandle::of::<u64>()).is_none());
    }

    #[test]
    fn provenance_tracks_multiple_allocations() {
        let mut service = AllocationService::new();
        let a = service.allocate::<u64>().unwrap();
        let b = service.allocate::<u64>().unwrap();
        assert_ne!(a, b);
        assert!(service.has_allocated(a));
        assert!(service.has_allocated(b));

        service.free(TypeHandle::of::<u64>(), a);
        assert!(!service.has_allocated(a));
        assert!(service.has_allocated(b));
    }
}
