//! Configuration structures for simulated links.

use std::time::Duration;

/// Latency of a link that has not been shaped.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(1);

/// Loss probability of a link that has not been shaped.
pub const DEFAULT_PACKET_LOSS: f64 = 0.0;

/// Latency multiplier per unit of congestion: `latency = base * (1 + 10 * level)`.
pub const CONGESTION_LATENCY_FACTOR: f64 = 10.0;

/// Loss added per unit of congestion.
pub const CONGESTION_LOSS_PER_LEVEL: f64 = 0.1;

/// Upper bound on loss reached through congestion.
pub const MAX_CONGESTION_LOSS: f64 = 0.5;

/// Registry-wide parameters.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Capacity of each device's inbound queue. A full queue drops the newest message.
    pub queue_capacity: usize,

    /// Latency that congestion scales from, and that `clear_congestion` restores.
    pub base_latency: Duration,

    /// Bound on the dispatcher join when the registry shuts down.
    pub shutdown_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            base_latency: DEFAULT_LATENCY,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    /// Set the inbound queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the base latency.
    pub fn with_base_latency(mut self, latency: Duration) -> Self {
        self.base_latency = latency;
        self
    }
}

/// Parameters of a newly created connection.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionOptions {
    /// Simulated propagation delay.
    pub latency: Duration,
    /// Probability that a message is lost in transit.
    pub packet_loss: f64,
    /// Bandwidth label carried over from discovery.
    pub bandwidth: Option<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
            packet_loss: DEFAULT_PACKET_LOSS,
            bandwidth: None,
        }
    }
}

impl ConnectionOptions {
    /// Set the latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the loss probability.
    pub fn with_packet_loss(mut self, packet_loss: f64) -> Self {
        self.packet_loss = packet_loss;
        self
    }

    /// Set the bandwidth label.
    pub fn with_bandwidth(mut self, bandwidth: Option<String>) -> Self {
        self.bandwidth = bandwidth;
        self
    }
}

/// Partial update of a connection; `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkProperties {
    /// New latency.
    pub latency: Option<Duration>,
    /// New loss probability.
    pub packet_loss: Option<f64>,
    /// New bandwidth label.
    pub bandwidth: Option<String>,
}

impl LinkProperties {
    /// Update only the latency.
    pub fn latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Update only the loss probability.
    pub fn packet_loss(packet_loss: f64) -> Self {
        Self {
            packet_loss: Some(packet_loss),
            ..Self::default()
        }
    }
}

/// Latency and loss of a link at congestion `level` (clamped to `0..=1`).
pub fn congestion_profile(base_latency: Duration, level: f64) -> (Duration, f64) {
    let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
    let factor = 1.0 + level * CONGESTION_LATENCY_FACTOR;
    let latency = Duration::from_nanos((base_latency.as_nanos() as f64 * factor).round() as u64);
    let loss = (DEFAULT_PACKET_LOSS + level * CONGESTION_LOSS_PER_LEVEL).min(MAX_CONGESTION_LOSS);
    (latency, loss)
}
