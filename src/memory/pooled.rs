//! Unique owning pointers into an [`AllocationService`] arena.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::rc::Rc;

use crate::error::PropkitError;
use crate::log::error;
use crate::memory::allocation_service::AllocationService;
use crate::reflection::TypeHandle;

/// A value constructed into pool memory, owned uniquely.
///
/// Dropping a `Pooled` runs the value's destructor in place and frees the
/// chunk back through the service that vended it. The service is kept alive
/// by the `Rc` the pointer carries, so a `Pooled` never outlives its arena.
pub struct Pooled<T: ?Sized + 'static> {
    pub(crate) ptr: NonNull<T>,
    /// Handle of the concrete type the chunk was allocated for; used to route
    /// the free back to the right pool even after unsizing.
    pub(crate) type_handle: TypeHandle,
    pub(crate) service: Rc<RefCell<AllocationService>>,
}

impl<T: 'static> Pooled<T> {
    /// Allocates a chunk for `T` from the service and moves `value` into it.
    pub fn new(
        service: &Rc<RefCell<AllocationService>>,
        value: T,
    ) -> Result<Pooled<T>, PropkitError> {
        let data = service.borrow_mut().allocate::<T>()?;
        let ptr = data.cast::<T>();
        unsafe { ptr.as_ptr().write(value) };
        Ok(Pooled {
            ptr,
            type_handle: TypeHandle::of::<T>(),
            service: Rc::clone(service),
        })
    }
}

impl<T: ?Sized + 'static> Pooled<T> {
    /// Handle of the concrete type this allocation was made for.
    #[must_use]
    pub fn type_handle(&self) -> TypeHandle {
        self.type_handle
    }

    /// The payload address. This is the value's identity within its arena.
    #[must_use]
    pub fn data(&self) -> NonNull<u8> {
        self.ptr.cast()
    }
}

impl<T: ?Sized + 'static> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Unique ownership: no other pointer to this chunk can be dereferenced.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized + 'static> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: ?Sized + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        unsafe { self.ptr.as_ptr().drop_in_place() };
        let freed = self
            .service
            .borrow_mut()
            .free(self.type_handle, self.data());
        if !freed {
            // Reached when the allocator was unregistered under us. Never
            // panic here; we are in a destructor.
            error!(
                "pooled object {:p} of type {} could not be freed",
                self.ptr.as_ptr(),
                self.type_handle.name()
            );
        }
    }
}

impl<T: ?Sized + 'static> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Pooled({} @ {:p})",
            self.type_handle.name(),
            self.ptr.as_ptr()
        )
    }
}
