//! Critical sections
//!
//! Thin RAII layer over the `critical-section` crate. The platform provides
//! the actual implementation: interrupt masking on a microcontroller, a
//! process-wide reentrant lock on a host.

#![allow(unsafe_code)]

use core::marker::PhantomData;

pub use critical_section::{CriticalSection, Mutex};

/// Guard for an entered critical section
///
/// The section is left when the guard is dropped. Guards must be dropped in
/// reverse order of creation, which lexical scoping gives for free.
pub struct CriticalGuard {
    state: critical_section::RestoreState,
    _not_send: PhantomData<*mut ()>,
}

impl CriticalGuard {
    /// Token proving the section is held, for use with [`Mutex::borrow`]
    pub fn token(&self) -> CriticalSection<'_> {
        // SAFETY: the section stays entered for as long as `self` lives
        unsafe { CriticalSection::new() }
    }
}

impl Drop for CriticalGuard {
    fn drop(&mut self) {
        // SAFETY: `state` came from the matching `acquire` in `enter`
        unsafe { critical_section::release(self.state) }
    }
}

/// Enter a critical section. Nested calls are allowed.
#[inline]
pub fn enter() -> CriticalGuard {
    // SAFETY: released exactly once by the guard's `Drop`
    let state = unsafe { critical_section::acquire() };
    CriticalGuard {
        state,
        _not_send: PhantomData,
    }
}

/// Leave a critical section explicitly
#[inline]
pub fn exit(guard: CriticalGuard) {
    drop(guard);
}

/// Run `f` inside a critical section
#[inline]
pub fn with<R>(f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
    critical_section::with(f)
}
