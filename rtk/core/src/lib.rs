#![no_std]
#![deny(unsafe_code)]

//! # RTK Core
//!
//! Types shared by every RTK crate: the runtime error taxonomy, task
//! priorities, tick arithmetic and the critical-section guard.

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod critical;
pub mod priority;
pub mod time;

pub use priority::*;
pub use time::*;

/// RTK version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used by every fallible runtime operation
pub type KResult<T> = Result<T, Error>;

/// Runtime error kinds
///
/// Each fallible kernel, queue, notification or pool operation reports
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// Queue has no free slot, or a notification is already pending
    QueueFull,
    /// Queue holds no item, or no notification is pending
    QueueEmpty,
    /// A blocking wait reached its deadline
    Timeout,
    /// Memory pool has no free block
    NoMemory,
    /// Pointer does not name a block of this pool
    InvalidPointer,
    /// Object used before it was initialized or before the kernel started
    NotInitialized,
}

impl Error {
    /// Returns true for conditions that clear up by themselves once another
    /// party makes progress.
    pub const fn is_transient(self) -> bool {
        matches!(self, Error::QueueFull | Error::QueueEmpty | Error::NoMemory)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QueueFull => write!(f, "queue is full"),
            Error::QueueEmpty => write!(f, "queue is empty"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::NoMemory => write!(f, "memory pool exhausted"),
            Error::InvalidPointer => write!(f, "pointer does not belong to the pool"),
            Error::NotInitialized => write!(f, "not initialized"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::QueueFull => defmt::write!(fmt, "QueueFull"),
            Error::QueueEmpty => defmt::write!(fmt, "QueueEmpty"),
            Error::Timeout => defmt::write!(fmt, "Timeout"),
            Error::NoMemory => defmt::write!(fmt, "NoMemory"),
            Error::InvalidPointer => defmt::write!(fmt, "InvalidPointer"),
            Error::NotInitialized => defmt::write!(fmt, "NotInitialized"),
        }
    }
}

/// Converts a kernel result into an [`nb::Result`].
///
/// Transient errors become [`nb::Error::WouldBlock`] so that callers can use
/// `nb::block!` or their own polling loop.
pub fn nb_result<T>(result: KResult<T>) -> nb::Result<T, Error> {
    result.map_err(|err| {
        if err.is_transient() {
            nb::Error::WouldBlock
        } else {
            nb::Error::Other(err)
        }
    })
}
