//! Ready-made suites for the kernel objects
//!
//! Each suite module has a fixture type naming the objects under test and a
//! `cases()` function listing its checks. Every case leaves its objects the
//! way it found them, so suites can be rerun against the same statics.

pub mod notification;
pub mod pool;
pub mod queue;
