//! Owning handle for a pool block

use core::fmt;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use rtk_core::KResult;

use crate::StaticPool;

/// A `T` living in a [`StaticPool`] block
///
/// Dropping the box runs `T`'s destructor and returns the block to its pool.
pub struct PoolBox<'a, T, const N: usize> {
    ptr: NonNull<T>,
    pool: &'a StaticPool<T, N>,
}

impl<'a, T, const N: usize> PoolBox<'a, T, N> {
    /// Allocate a block and move `value` into it
    pub fn alloc_with(pool: &'a StaticPool<T, N>, value: T) -> KResult<Self> {
        let ptr = pool.allocate()?;
        // SAFETY: fresh block, sized and aligned for `T`
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self { ptr, pool })
    }

    /// Give up ownership without freeing the block
    pub fn into_raw(self) -> NonNull<T> {
        let ptr = self.ptr;
        core::mem::forget(self);
        ptr
    }

    /// Rebuild a box from [`into_raw`](Self::into_raw)
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` on a box of the same pool and must not
    /// be owned by anything else.
    pub unsafe fn from_raw(pool: &'a StaticPool<T, N>, ptr: NonNull<T>) -> Self {
        Self { ptr, pool }
    }

    /// Move the value out and free the block
    pub fn into_inner(self) -> T {
        let ptr = self.ptr;
        let pool = self.pool;
        core::mem::forget(self);
        // SAFETY: the block holds an initialized `T` owned by this box
        let value = unsafe { ptr::read(ptr.as_ptr()) };
        let _ = pool.deallocate(ptr);
        value
    }
}

impl<T, const N: usize> Deref for PoolBox<'_, T, N> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: initialized in `alloc_with`, exclusively owned
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, const N: usize> DerefMut for PoolBox<'_, T, N> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: initialized in `alloc_with`, exclusively owned
        unsafe { self.ptr.as_mut() }
    }
}

impl<T, const N: usize> Drop for PoolBox<'_, T, N> {
    fn drop(&mut self) {
        // SAFETY: the box owns an initialized `T`
        unsafe { ptr::drop_in_place(self.ptr.as_ptr()) };
        // cannot fail: the pointer came from this pool
        let _ = self.pool.deallocate(self.ptr);
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for PoolBox<'_, T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PoolBox").field(&**self).finish()
    }
}

// SAFETY: the box owns its `T` exclusively
unsafe impl<T: Send, const N: usize> Send for PoolBox<'_, T, N> {}
unsafe impl<T: Sync, const N: usize> Sync for PoolBox<'_, T, N> {}
