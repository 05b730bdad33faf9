//! Static fixed-block pool
//!
//! Free blocks are chained through their own storage: while a block is free
//! its first word holds the index of the next free block. No side table is
//! needed and both allocation and deallocation are O(1).

use core::cell::{Cell, UnsafeCell};
use core::mem::{self, ManuallyDrop, MaybeUninit};
use core::ptr::NonNull;

use critical_section::Mutex;
use rtk_core::{Error, KResult};

use crate::PoolStats;

/// End of the free list
const NIL: usize = usize::MAX;

#[repr(C)]
union Block<T> {
    next: usize,
    // sizes and aligns the block; only ever accessed through a cast pointer
    #[allow(dead_code)]
    data: ManuallyDrop<MaybeUninit<T>>,
}

#[derive(Clone, Copy)]
struct FreeList {
    head: usize,
    free: usize,
    min_free: usize,
    ready: bool,
}

impl FreeList {
    const fn unready() -> Self {
        Self {
            head: NIL,
            free: 0,
            min_free: 0,
            ready: false,
        }
    }

    const fn full(blocks: usize) -> Self {
        Self {
            head: 0,
            free: blocks,
            min_free: blocks,
            ready: true,
        }
    }
}

/// Pool of `N` blocks, each large enough to hold a `T`
///
/// The pool hands out raw, uninitialized blocks; it never runs `T`'s
/// constructor or destructor. Use [`PoolBox`](crate::PoolBox) for an owning
/// handle that does.
///
/// The free list has to be built once with [`init`](Self::init) before the
/// first allocation.
///
/// ```
/// use rtk_mem::StaticPool;
///
/// static POOL: StaticPool<[u8; 16], 4> = StaticPool::new();
///
/// POOL.init();
/// let block = POOL.allocate().unwrap();
/// assert_eq!(POOL.available(), 3);
/// POOL.deallocate(block).unwrap();
/// assert!(POOL.is_full());
/// ```
pub struct StaticPool<T, const N: usize> {
    blocks: UnsafeCell<MaybeUninit<[Block<T>; N]>>,
    state: Mutex<Cell<FreeList>>,
}

// SAFETY: the free list is only touched inside a critical section and each
// handed-out block has a single owner.
unsafe impl<T: Send, const N: usize> Sync for StaticPool<T, N> {}
unsafe impl<T: Send, const N: usize> Send for StaticPool<T, N> {}

impl<T, const N: usize> StaticPool<T, N> {
    const VALID_SIZE: () = assert!(N > 0 && N < NIL, "pool needs at least one block");

    /// Create a pool. The free list is built by [`init`](Self::init).
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_SIZE;
        Self {
            blocks: UnsafeCell::new(MaybeUninit::uninit()),
            state: Mutex::new(Cell::new(FreeList::unready())),
        }
    }

    /// Build the free list. Calling it again is a no-op.
    pub fn init(&self) {
        critical_section::with(|cs| {
            let state = self.state.borrow(cs);
            if state.get().ready {
                return;
            }
            // SAFETY: an unready pool has handed out no blocks
            unsafe { self.link_all() };
            state.set(FreeList::full(N));
        });
    }

    /// Return every block to the free list.
    ///
    /// # Safety
    ///
    /// No block handed out earlier may be used after this call, or it can be
    /// handed out twice.
    pub unsafe fn reset(&self) {
        critical_section::with(|cs| {
            self.link_all();
            self.state.borrow(cs).set(FreeList::full(N));
        });
    }

    /// Take a block from the pool
    ///
    /// Safe to call from interrupt handlers.
    pub fn allocate(&self) -> KResult<NonNull<T>> {
        critical_section::with(|cs| {
            let state = self.state.borrow(cs);
            let mut list = state.get();
            if !list.ready {
                return Err(Error::NotInitialized);
            }
            if list.head == NIL {
                return Err(Error::NoMemory);
            }

            let block = self.block(list.head);
            // SAFETY: blocks on the free list hold a valid `next` link
            list.head = unsafe { (*block).next };
            list.free -= 1;
            list.min_free = list.min_free.min(list.free);
            state.set(list);

            // SAFETY: `block` points into `self.blocks`, never null
            Ok(unsafe { NonNull::new_unchecked(block.cast::<T>()) })
        })
    }

    /// Give a block back to the pool
    ///
    /// The pointer must come from [`allocate`](Self::allocate) on this pool.
    /// Pointers outside the backing array, or not on a block boundary, are
    /// rejected with [`Error::InvalidPointer`] and leave the pool untouched.
    ///
    /// Ownership is not tracked. A double release is only caught while every
    /// block is already free; releasing a block twice while others are
    /// still handed out corrupts the free list.
    pub fn deallocate(&self, ptr: NonNull<T>) -> KResult<()> {
        let index = self.index_of(ptr).ok_or(Error::InvalidPointer)?;

        critical_section::with(|cs| {
            let state = self.state.borrow(cs);
            let mut list = state.get();
            if !list.ready {
                return Err(Error::NotInitialized);
            }
            if list.free == N {
                // only catches a double release into an all-free pool
                return Err(Error::InvalidPointer);
            }

            // SAFETY: `index` is in range and the block is owned by the caller
            unsafe { (*self.block(index)).next = list.head };
            list.head = index;
            list.free += 1;
            state.set(list);
            Ok(())
        })
    }

    /// Non-blocking allocation for `nb` style callers
    pub fn poll_allocate(&self) -> nb::Result<NonNull<T>, Error> {
        rtk_core::nb_result(self.allocate())
    }

    /// Total number of blocks
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Size in bytes of one block
    pub const fn block_size(&self) -> usize {
        mem::size_of::<Block<T>>()
    }

    /// Number of free blocks
    pub fn available(&self) -> usize {
        critical_section::with(|cs| self.state.borrow(cs).get().free)
    }

    /// True when every block is free
    pub fn is_full(&self) -> bool {
        self.available() == N
    }

    /// True when no block is free
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Snapshot of the pool statistics
    pub fn stats(&self) -> PoolStats {
        let list = critical_section::with(|cs| self.state.borrow(cs).get());
        PoolStats {
            total_blocks: N,
            free_blocks: list.free,
            used_blocks: N - list.free,
            min_free_blocks: list.min_free,
        }
    }

    /// True if `ptr` names a block of this pool
    pub fn contains(&self, ptr: NonNull<T>) -> bool {
        self.index_of(ptr).is_some()
    }

    fn block(&self, index: usize) -> *mut Block<T> {
        debug_assert!(index < N);
        // SAFETY: `index < N` keeps the offset inside the backing array
        unsafe { self.blocks.get().cast::<Block<T>>().add(index) }
    }

    fn index_of(&self, ptr: NonNull<T>) -> Option<usize> {
        let base = self.blocks.get() as usize;
        let offset = (ptr.as_ptr() as usize).checked_sub(base)?;
        let size = mem::size_of::<Block<T>>();
        if offset % size != 0 {
            return None;
        }
        let index = offset / size;
        (index < N).then_some(index)
    }

    /// Chain all blocks in index order.
    ///
    /// # Safety
    ///
    /// Caller holds the critical section and no block is in use.
    unsafe fn link_all(&self) {
        for index in 0..N {
            let next = if index + 1 < N { index + 1 } else { NIL };
            (*self.block(index)).next = next;
        }
    }
}

impl<T, const N: usize> Default for StaticPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    #[allow(dead_code)]
    struct Sample {
        id: u32,
        payload: [u8; 12],
    }

    #[test]
    fn allocation_before_init_is_rejected() {
        let pool: StaticPool<Sample, 2> = StaticPool::new();
        assert_eq!(pool.allocate(), Err(Error::NotInitialized));
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn init_is_idempotent() {
        let pool: StaticPool<Sample, 3> = StaticPool::new();
        pool.init();
        let held = pool.allocate().expect("block");
        pool.init();
        assert_eq!(pool.available(), 2);
        pool.deallocate(held).expect("dealloc");
    }

    #[test]
    fn blocks_are_distinct_and_aligned() {
        let pool: StaticPool<u64, 4> = StaticPool::new();
        pool.init();
        let a = pool.allocate().expect("a");
        let b = pool.allocate().expect("b");
        assert_ne!(a, b);
        assert_eq!(a.as_ptr() as usize % mem::align_of::<u64>(), 0);
        assert_eq!(b.as_ptr() as usize % mem::align_of::<u64>(), 0);
        assert!(pool.contains(a));
    }

    #[test]
    fn freed_block_is_reused_first() {
        let pool: StaticPool<Sample, 4> = StaticPool::new();
        pool.init();
        let _a = pool.allocate().expect("a");
        let b = pool.allocate().expect("b");
        pool.deallocate(b).expect("dealloc");
        assert_eq!(pool.allocate().expect("again"), b);
    }

    #[test]
    fn misaligned_pointer_is_rejected() {
        let pool: StaticPool<[u32; 4], 2> = StaticPool::new();
        pool.init();
        let block = pool.allocate().expect("block");
        let inside = NonNull::new(block.as_ptr().cast::<u8>().wrapping_add(4).cast::<[u32; 4]>())
            .expect("non-null");
        assert_eq!(pool.deallocate(inside), Err(Error::InvalidPointer));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn release_with_nothing_outstanding_is_rejected() {
        let pool: StaticPool<u32, 2> = StaticPool::new();
        pool.init();
        let block = pool.allocate().expect("block");
        pool.deallocate(block).expect("first release");
        assert_eq!(pool.deallocate(block), Err(Error::InvalidPointer));
        assert!(pool.is_full());
    }

    #[test]
    fn reset_returns_everything() {
        let pool: StaticPool<u16, 3> = StaticPool::new();
        pool.init();
        for _ in 0..3 {
            pool.allocate().expect("block");
        }
        assert!(pool.is_empty());
        unsafe { pool.reset() };
        assert!(pool.is_full());
        assert_eq!(pool.stats().min_free_blocks, 3);
    }

    #[test]
    fn stats_track_low_water_mark() {
        let pool: StaticPool<u32, 4> = StaticPool::new();
        pool.init();
        let a = pool.allocate().expect("a");
        let b = pool.allocate().expect("b");
        pool.deallocate(a).expect("a");
        pool.deallocate(b).expect("b");

        let stats = pool.stats();
        assert_eq!(stats.free_blocks, 4);
        assert_eq!(stats.used_blocks, 0);
        assert_eq!(stats.min_free_blocks, 2);
        assert_eq!(stats.peak_utilization(), 50);
    }

    #[test]
    fn poll_allocate_would_block_when_exhausted() {
        let pool: StaticPool<u8, 1> = StaticPool::new();
        pool.init();
        assert!(pool.poll_allocate().is_ok());
        assert_eq!(pool.poll_allocate(), Err(nb::Error::WouldBlock));
    }
}
