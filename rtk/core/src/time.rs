//! Tick arithmetic
//!
//! The tick counter is a wrapping `u32`. Two ticks compare correctly as long
//! as they are less than half the counter range apart, which is why
//! [`Duration::MAX`] stops at `i32::MAX` ticks.

use core::fmt;

/// Value of the kernel tick counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(u32);

impl Tick {
    /// Tick counter value at start-up
    pub const ZERO: Tick = Tick(0);

    /// Create a tick from a raw counter value
    pub const fn new(raw: u32) -> Self {
        Tick(raw)
    }

    /// Get the raw counter value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The tick that follows this one
    pub const fn next(self) -> Self {
        Tick(self.0.wrapping_add(1))
    }

    /// The tick `duration` after this one
    pub const fn offset(self, duration: Duration) -> Self {
        Tick(self.0.wrapping_add(duration.0))
    }

    /// True once this tick is at or past `deadline`
    pub const fn has_reached(self, deadline: Tick) -> bool {
        (self.0.wrapping_sub(deadline.0) as i32) >= 0
    }

    /// Ticks elapsed between `earlier` and this tick
    pub const fn elapsed_since(self, earlier: Tick) -> Duration {
        Duration::from_ticks(self.0.wrapping_sub(earlier.0))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick {}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Tick {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "tick {}", self.0);
    }
}

/// Span of time measured in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u32);

impl Duration {
    /// No time at all
    pub const ZERO: Duration = Duration(0);

    /// Longest span that can be compared against the wrapping tick counter
    pub const MAX: Duration = Duration(i32::MAX as u32);

    /// Create a duration, saturating at [`Duration::MAX`]
    pub const fn from_ticks(ticks: u32) -> Self {
        if ticks > Self::MAX.0 {
            Self::MAX
        } else {
            Duration(ticks)
        }
    }

    /// Convert milliseconds to ticks at `tick_hz`, rounding up so a delay
    /// never comes out shorter than asked.
    pub const fn from_millis(ms: u32, tick_hz: u32) -> Self {
        let ticks = (ms as u64 * tick_hz as u64 + 999) / 1000;
        if ticks > Self::MAX.0 as u64 {
            Self::MAX
        } else {
            Duration(ticks as u32)
        }
    }

    /// Number of ticks in this span
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// Check if the span is empty
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ticks", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Duration {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}ticks", self.0);
    }
}

/// How long a blocking call may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Wait until the operation can complete
    Forever,
    /// Give up once this many ticks have passed
    After(Duration),
}

impl Timeout {
    /// Do not wait at all
    pub const NONE: Timeout = Timeout::After(Duration::ZERO);

    /// Timeout of `ticks` ticks
    pub const fn ticks(ticks: u32) -> Self {
        Timeout::After(Duration::from_ticks(ticks))
    }

    /// Absolute deadline for a wait starting at `now`, if any
    pub const fn deadline(self, now: Tick) -> Option<Tick> {
        match self {
            Timeout::Forever => None,
            Timeout::After(duration) => Some(now.offset(duration)),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Timeout {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Timeout::Forever => defmt::write!(fmt, "Forever"),
            Timeout::After(d) => defmt::write!(fmt, "After({})", d),
        }
    }
}
