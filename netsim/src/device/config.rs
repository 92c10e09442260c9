//! Timing parameters of a device actor.

use std::time::Duration;

/// Device actor timing.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    /// Delay between power on and operational.
    pub boot_delay: Duration,

    /// Period of hello messages while operational.
    pub hello_interval: Duration,

    /// Longest the actor loop sleeps without checking its timers.
    pub tick_interval: Duration,

    /// Delay between the hello and the routing refresh of a reconvergence.
    pub reconverge_delay: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            boot_delay: Duration::from_millis(500),
            hello_interval: Duration::from_secs(10),
            tick_interval: Duration::from_millis(100),
            reconverge_delay: Duration::from_secs(1),
        }
    }
}

impl DeviceConfig {
    /// Short timings for tests.
    pub fn fast() -> Self {
        Self {
            boot_delay: Duration::from_millis(10),
            hello_interval: Duration::from_secs(1),
            tick_interval: Duration::from_millis(10),
            reconverge_delay: Duration::from_millis(50),
        }
    }

    /// Set the boot delay.
    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    /// Set the hello interval.
    pub fn with_hello_interval(mut self, interval: Duration) -> Self {
        self.hello_interval = interval;
        self
    }
}
