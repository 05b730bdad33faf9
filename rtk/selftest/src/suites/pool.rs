//! Static pool checks

use core::ptr::NonNull;

use heapless::Vec;
use rtk_core::Error;
use rtk_mem::{PoolBox, StaticPool};

use crate::{ensure, ensure_eq, CaseResult, TestCase};

/// Block type used by the pool suite
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallBlock {
    pub id: u16,
    pub data: [u8; 14],
}

pub const BLOCKS: usize = 4;

pub struct PoolFixture<'a> {
    pub pool: &'a StaticPool<SmallBlock, BLOCKS>,
}

impl<'a> PoolFixture<'a> {
    /// Wrap `pool`, building its free list if needed
    pub fn new(pool: &'a StaticPool<SmallBlock, BLOCKS>) -> Self {
        pool.init();
        Self { pool }
    }
}

pub fn cases<'a>() -> [TestCase<PoolFixture<'a>>; 3] {
    [
        TestCase::new("pool_exhaust_and_refill", exhaust_and_refill),
        TestCase::new("pool_foreign_pointer", foreign_pointer),
        TestCase::new("pool_box_returns_block", box_returns_block),
    ]
}

fn exhaust_and_refill(fixture: &mut PoolFixture<'_>) -> CaseResult {
    let pool = fixture.pool;
    ensure!(pool.is_full(), "pool must start with every block free");

    let mut held: Vec<NonNull<SmallBlock>, BLOCKS> = Vec::new();
    while let Ok(block) = pool.allocate() {
        ensure!(held.push(block).is_ok(), "pool handed out too many blocks");
    }
    ensure_eq!(held.len(), BLOCKS);
    ensure_eq!(pool.allocate(), Err(Error::NoMemory));
    ensure!(pool.is_empty());

    for (freed, block) in held.iter().enumerate() {
        ensure_eq!(pool.deallocate(*block), Ok(()));
        ensure_eq!(pool.available(), freed + 1);
    }
    ensure!(pool.is_full());
    Ok(())
}

fn foreign_pointer(fixture: &mut PoolFixture<'_>) -> CaseResult {
    let pool = fixture.pool;
    let held = pool.allocate().map_err(|_| crate::Failure::new("allocate", line!()))?;
    let before = pool.available();

    let mut outside = SmallBlock::default();
    let foreign = NonNull::from(&mut outside);
    ensure!(!pool.contains(foreign));
    ensure_eq!(pool.deallocate(foreign), Err(Error::InvalidPointer));
    ensure_eq!(pool.available(), before);

    ensure_eq!(pool.deallocate(held), Ok(()));
    Ok(())
}

fn box_returns_block(fixture: &mut PoolFixture<'_>) -> CaseResult {
    let pool = fixture.pool;
    let block = SmallBlock {
        id: 7,
        data: [0xA5; 14],
    };
    let mut boxed = PoolBox::alloc_with(pool, block)
        .map_err(|_| crate::Failure::new("alloc_with", line!()))?;
    boxed.id += 1;
    ensure_eq!(boxed.id, 8);
    ensure_eq!(pool.available(), BLOCKS - 1);

    drop(boxed);
    ensure!(pool.is_full());
    Ok(())
}
