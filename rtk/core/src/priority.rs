//! Task priorities

use core::fmt;

/// Static task priority. Larger values are more urgent.
///
/// Level 0 is reserved for the idle task; application tasks use 1..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Priority of the idle task
    pub const IDLE: Priority = Priority(0);

    /// Lowest application priority
    pub const MIN: Priority = Priority(1);

    /// Highest application priority
    pub const MAX: Priority = Priority(u8::MAX);

    /// Create an application priority. Returns `None` for the idle level.
    pub const fn new(raw: u8) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Priority(raw))
        }
    }

    /// Create a priority without validation
    pub const fn new_unchecked(raw: u8) -> Self {
        Priority(raw)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Check whether this is the idle level
    pub const fn is_idle(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// Build an application [`Priority`] at compile time.
///
/// ```
/// use rtk_core::{priority, Priority};
///
/// const SENSOR: Priority = priority!(3);
/// assert_eq!(SENSOR.raw(), 3);
/// ```
#[macro_export]
macro_rules! priority {
    ($raw:expr) => {{
        const PRIORITY: $crate::Priority = match $crate::Priority::new($raw) {
            Some(priority) => priority,
            None => panic!("priority 0 is reserved for the idle task"),
        };
        PRIORITY
    }};
}
