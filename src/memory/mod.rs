//! Pooled memory management: the fixed-chunk [`PoolAllocator`], the per-type
//! [`AllocationService`] registry, and the owning [`Pooled`] pointer.

pub mod allocation_service;
pub mod pool;
pub mod pooled;

pub use allocation_service::{AllocationService, DEFAULT_POOL_CAPACITY};
pub use pool::{Index, PoolAllocator};
pub use pooled::Pooled;
