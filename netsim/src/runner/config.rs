//! Run configuration.
//!
//! Every timing knob of a run lives in [`SimulationConfig`]. It reads from
//! JSON with camelCase names and millisecond durations; missing fields take
//! their defaults.

use std::path::Path;
use std::time::Duration;

use netsim_core::{SimulationError, SimulationResult};
use serde::{Deserialize, Serialize};

use crate::device::DeviceConfig;
use crate::network::RegistryConfig;

/// Timing and sizing of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Capacity of each device's inbound queue.
    pub queue_capacity: usize,
    /// Link latency before any congestion.
    #[serde(rename = "baseLatencyMs", with = "millis")]
    pub base_latency: Duration,
    /// Bound on the registry dispatcher join at teardown.
    #[serde(rename = "ipcTimeoutMs", with = "millis")]
    pub ipc_timeout: Duration,

    /// Delay between power on and operational.
    #[serde(rename = "bootDelayMs", with = "millis")]
    pub boot_delay: Duration,
    /// Period of router hellos.
    #[serde(rename = "helloIntervalMs", with = "millis")]
    pub hello_interval: Duration,
    /// Actor loop tick.
    #[serde(rename = "tickIntervalMs", with = "millis")]
    pub tick_interval: Duration,
    /// Delay between hello and routing refresh during reconvergence.
    #[serde(rename = "reconvergeDelayMs", with = "millis")]
    pub reconverge_delay: Duration,

    /// Pause between two device power-ons.
    #[serde(rename = "startupStaggerMs", with = "millis")]
    pub startup_stagger: Duration,
    /// Pause between two ARP discoveries.
    #[serde(rename = "arpStaggerMs", with = "millis")]
    pub arp_stagger: Duration,
    /// Wait between hellos and routing table updates.
    #[serde(rename = "convergenceWaitMs", with = "millis")]
    pub convergence_wait: Duration,
    /// Settle time of the stabilization phase.
    #[serde(rename = "stabilizationWaitMs", with = "millis")]
    pub stabilization_wait: Duration,
    /// Settle time of the normal operation phase.
    #[serde(rename = "normalOperationMs", with = "millis")]
    pub normal_operation: Duration,
    /// Wait after a link failure.
    #[serde(rename = "linkFailureWaitMs", with = "millis")]
    pub link_failure_wait: Duration,
    /// Wait for reconvergence after recovery.
    #[serde(rename = "recoveryWaitMs", with = "millis")]
    pub recovery_wait: Duration,
    /// Wait after a configuration change.
    #[serde(rename = "configChangeWaitMs", with = "millis")]
    pub config_change_wait: Duration,

    /// Bound on the phase script of one scenario.
    #[serde(rename = "maxSimulationTimeMs", with = "millis")]
    pub max_simulation_time: Duration,
    /// Bound on each actor join at teardown.
    #[serde(rename = "joinTimeoutMs", with = "millis")]
    pub join_timeout: Duration,
    /// Seed of every random choice; `None` draws one from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            base_latency: Duration::from_millis(1),
            ipc_timeout: Duration::from_secs(5),
            boot_delay: Duration::from_millis(500),
            hello_interval: Duration::from_secs(10),
            tick_interval: Duration::from_millis(100),
            reconverge_delay: Duration::from_secs(1),
            startup_stagger: Duration::from_millis(500),
            arp_stagger: Duration::from_millis(200),
            convergence_wait: Duration::from_secs(3),
            stabilization_wait: Duration::from_secs(1),
            normal_operation: Duration::from_secs(2),
            link_failure_wait: Duration::from_secs(2),
            recovery_wait: Duration::from_secs(3),
            config_change_wait: Duration::from_secs(1),
            max_simulation_time: Duration::from_secs(300),
            join_timeout: Duration::from_secs(1),
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Every wait shortened, for tests and demos.
    pub fn fast() -> Self {
        Self {
            boot_delay: Duration::from_millis(10),
            hello_interval: Duration::from_secs(1),
            tick_interval: Duration::from_millis(10),
            reconverge_delay: Duration::from_millis(50),
            startup_stagger: Duration::from_millis(10),
            arp_stagger: Duration::from_millis(5),
            convergence_wait: Duration::from_millis(100),
            stabilization_wait: Duration::from_millis(50),
            normal_operation: Duration::from_millis(50),
            link_failure_wait: Duration::from_millis(50),
            recovery_wait: Duration::from_millis(200),
            config_change_wait: Duration::from_millis(50),
            max_simulation_time: Duration::from_secs(30),
            join_timeout: Duration::from_millis(200),
            ipc_timeout: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Read overrides from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> SimulationResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> SimulationResult<()> {
        if self.queue_capacity == 0 {
            return Err(SimulationError::InvalidConfig(
                "queueCapacity must be at least 1".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(SimulationError::InvalidConfig(
                "tickIntervalMs must be positive".to_string(),
            ));
        }
        if self.max_simulation_time.is_zero() {
            return Err(SimulationError::InvalidConfig(
                "maxSimulationTimeMs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Registry parameters of this run.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            queue_capacity: self.queue_capacity,
            base_latency: self.base_latency,
            shutdown_timeout: self.ipc_timeout,
        }
    }

    /// Device actor parameters of this run.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            boot_delay: self.boot_delay,
            hello_interval: self.hello_interval,
            tick_interval: self.tick_interval,
            reconverge_delay: self.reconverge_delay,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"queueCapacity": 8, "bootDelayMs": 20, "seed": 3}"#)
                .expect("parse");

        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.boot_delay, Duration::from_millis(20));
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.hello_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_serialized_names_are_milliseconds() {
        let json = serde_json::to_value(SimulationConfig::default()).expect("serialize");
        assert_eq!(json["helloIntervalMs"], 10_000);
        assert_eq!(json["queueCapacity"], 100);
        assert!(json["seed"].is_null());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = SimulationConfig {
            queue_capacity: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidConfig(_))
        ));
        assert!(SimulationConfig::fast().validate().is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"tickIntervalMs": 0}}"#).expect("write");
        assert!(SimulationConfig::from_json_file(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"recoveryWaitMs": 42}}"#).expect("write");
        let config = SimulationConfig::from_json_file(file.path()).expect("load");
        assert_eq!(config.recovery_wait, Duration::from_millis(42));
    }
}
