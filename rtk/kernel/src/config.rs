//! Kernel configuration

use rtk_core::Duration;

/// Kernel configuration
///
/// All fields can be set in a `const` context so a kernel can be declared as
/// a `static`.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub name: &'static str,
    /// Frequency of the tick interrupt, used for millisecond conversions
    pub tick_hz: u32,
    /// Rotate equal-priority tasks on every tick
    pub time_slicing: bool,
    /// Called by the idle task before it waits for the next interrupt
    pub idle_callback: Option<fn()>,
}

impl KernelConfig {
    /// Default configuration: 1 kHz tick, no time slicing
    pub const fn new() -> Self {
        Self {
            name: "RTK",
            tick_hz: 1_000,
            time_slicing: false,
            idle_callback: None,
        }
    }

    /// Creates a new kernel configuration builder.
    pub const fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder {
            config: Self::new(),
        }
    }

    /// Milliseconds expressed in ticks of this kernel, rounded up
    pub const fn millis(&self, ms: u32) -> Duration {
        Duration::from_millis(ms, self.tick_hz)
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// Sets the kernel name.
    pub const fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the tick frequency in Hz.
    pub const fn tick_hz(mut self, hz: u32) -> Self {
        self.config.tick_hz = hz;
        self
    }

    /// Enables or disables round-robin among equal priorities on each tick.
    pub const fn time_slicing(mut self, enabled: bool) -> Self {
        self.config.time_slicing = enabled;
        self
    }

    /// Sets the idle callback function.
    pub const fn idle_callback(mut self, callback: fn()) -> Self {
        self.config.idle_callback = Some(callback);
        self
    }

    pub const fn build(self) -> KernelConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: KernelConfig = KernelConfig::builder()
        .name("test")
        .tick_hz(100)
        .time_slicing(true)
        .build();

    #[test]
    fn builder_works_in_const_context() {
        assert_eq!(CONFIG.name, "test");
        assert!(CONFIG.time_slicing);
        assert!(CONFIG.idle_callback.is_none());
        assert_eq!(CONFIG.millis(25).ticks(), 3);
    }
}
