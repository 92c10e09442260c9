//! Fault injection.
//!
//! [`Fault`] is a single fault requested by a driver through
//! [`Simulation::inject_fault`](super::Simulation::inject_fault).
//! [`FaultInjector`] is a fault strategy that picks its own victims; the
//! day 2 link failure and configuration change phases run the built-in
//! [`RandomLinkFailure`] and [`RandomConfigChange`] injectors through the
//! same [`FaultContext`].
//!
//! # Usage
//!
//! ```ignore
//! use netsim::{FaultContext, FaultInjector};
//! use netsim_core::SimulationResult;
//!
//! struct FailFirstRouter;
//!
//! #[async_trait]
//! impl FaultInjector for FailFirstRouter {
//!     fn name(&self) -> &str { "fail_first_router" }
//!     async fn inject(&mut self, ctx: &mut FaultContext<'_>) -> SimulationResult<()> {
//!         if let Some(router) = ctx.routers().first() {
//!             router.simulate_device_failure().await.ok();
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use netsim_core::{SimulationError, SimulationResult};

use super::report::{EventKind, EventLog};
use crate::device::DeviceHandle;
use crate::network::ConnectionRegistry;
use crate::rng::SimRng;

/// A fault requested by kind, target device and string parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Disable the link between `target` and `neighbor`.
    LinkFailure {
        /// One endpoint.
        target: String,
        /// The other endpoint.
        neighbor: String,
    },
    /// Fail a whole device.
    DeviceFailure {
        /// Device to fail.
        target: String,
    },
    /// Take one interface down.
    InterfaceDown {
        /// Device owning the interface.
        target: String,
        /// Interface name.
        interface: String,
    },
    /// Shape the link between `target` and `neighbor` for congestion.
    Congestion {
        /// One endpoint.
        target: String,
        /// The other endpoint.
        neighbor: String,
        /// Congestion level in `0..=1`.
        level: f64,
    },
    /// Reset every link to its base latency and zero loss.
    ClearCongestion,
}

impl Fault {
    /// Build a fault from its request form.
    ///
    /// Kinds: `link_failure` (`neighbor`), `device_failure`,
    /// `interface_down` (`interface`), `congestion` (`neighbor`, `level`)
    /// and `clear_congestion`.
    pub fn parse(
        kind: &str,
        target: &str,
        params: &HashMap<String, String>,
    ) -> SimulationResult<Self> {
        let param = |name: &str| {
            params.get(name).cloned().ok_or_else(|| {
                SimulationError::InvalidFault(format!("{kind} requires a '{name}' parameter"))
            })
        };

        match kind {
            "link_failure" => Ok(Fault::LinkFailure {
                target: target.to_string(),
                neighbor: param("neighbor")?,
            }),
            "device_failure" => Ok(Fault::DeviceFailure {
                target: target.to_string(),
            }),
            "interface_down" => Ok(Fault::InterfaceDown {
                target: target.to_string(),
                interface: param("interface")?,
            }),
            "congestion" => {
                let raw = param("level")?;
                let level: f64 = raw.trim().parse().map_err(|_| {
                    SimulationError::InvalidFault(format!("congestion level '{raw}' is not a number"))
                })?;
                if !(0.0..=1.0).contains(&level) {
                    return Err(SimulationError::InvalidFault(format!(
                        "congestion level {level} outside 0..1"
                    )));
                }
                Ok(Fault::Congestion {
                    target: target.to_string(),
                    neighbor: param("neighbor")?,
                    level,
                })
            }
            "clear_congestion" => Ok(Fault::ClearCongestion),
            other => Err(SimulationError::InvalidFault(format!(
                "unknown fault kind '{other}'"
            ))),
        }
    }

    /// Request name of the fault kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::LinkFailure { .. } => "link_failure",
            Fault::DeviceFailure { .. } => "device_failure",
            Fault::InterfaceDown { .. } => "interface_down",
            Fault::Congestion { .. } => "congestion",
            Fault::ClearCongestion => "clear_congestion",
        }
    }

    /// Device the fault is aimed at.
    pub fn target(&self) -> Option<&str> {
        match self {
            Fault::LinkFailure { target, .. }
            | Fault::DeviceFailure { target }
            | Fault::InterfaceDown { target, .. }
            | Fault::Congestion { target, .. } => Some(target),
            Fault::ClearCongestion => None,
        }
    }
}

/// What a [`FaultInjector`] can reach: the registry, the devices, the event
/// log and the run's seeded randomness.
pub struct FaultContext<'a> {
    registry: &'a ConnectionRegistry,
    devices: &'a [DeviceHandle],
    events: &'a mut EventLog,
    random: &'a mut SimRng,
}

impl<'a> FaultContext<'a> {
    /// Create a new fault context.
    pub fn new(
        registry: &'a ConnectionRegistry,
        devices: &'a [DeviceHandle],
        events: &'a mut EventLog,
        random: &'a mut SimRng,
    ) -> Self {
        Self {
            registry,
            devices,
            events,
            random,
        }
    }

    /// The live registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        self.registry
    }

    /// Every device, in topology order.
    pub fn devices(&self) -> &[DeviceHandle] {
        self.devices
    }

    /// Look up a device.
    pub fn device(&self, name: &str) -> Option<&DeviceHandle> {
        self.devices.iter().find(|d| d.name() == name)
    }

    /// Router devices, in topology order.
    pub fn routers(&self) -> Vec<&DeviceHandle> {
        self.devices
            .iter()
            .filter(|d| d.device_type() == netsim_core::DeviceType::Router)
            .collect()
    }

    /// The seeded random generator of the run.
    pub fn random(&mut self) -> &mut SimRng {
        self.random
    }

    /// Append an event to the run's log.
    pub fn record(&mut self, kind: EventKind, message: impl Into<String>, device: Option<&str>) {
        self.events.record(kind, message, device);
    }

    /// Disable the link between `a` and `b` and let both endpoints react.
    pub async fn fail_link(&mut self, a: &str, b: &str) {
        self.registry.disable(a, b);
        for (device, neighbor) in [(a, b), (b, a)] {
            if let Some(handle) = self.device(device) {
                if let Err(err) = handle.handle_link_failure(neighbor).await {
                    tracing::warn!(device, error = %err, "link failure not handled");
                }
            }
        }
    }
}

/// A fault strategy run against a live simulation.
#[async_trait]
pub trait FaultInjector: Send {
    /// Name of this fault injector for reporting.
    fn name(&self) -> &str;

    /// Inject faults using the provided context.
    async fn inject(&mut self, ctx: &mut FaultContext<'_>) -> SimulationResult<()>;
}

/// Fails the link between two distinct devices picked at random.
#[derive(Debug, Default)]
pub struct RandomLinkFailure;

#[async_trait]
impl FaultInjector for RandomLinkFailure {
    fn name(&self) -> &str {
        "random_link_failure"
    }

    async fn inject(&mut self, ctx: &mut FaultContext<'_>) -> SimulationResult<()> {
        let devices = ctx.registry().registered_devices();
        let Some((i, j)) = ctx.random().pick_pair(devices.len()) else {
            tracing::debug!("fewer than two devices, no link to fail");
            return Ok(());
        };
        let (a, b) = (&devices[i], &devices[j]);

        ctx.record(
            EventKind::LinkFailure,
            format!("Link failure between {a} and {b}"),
            Some(a),
        );
        ctx.fail_link(a, b).await;
        Ok(())
    }
}

/// Toggles the first interface of a router picked at random.
#[derive(Debug, Default)]
pub struct RandomConfigChange;

#[async_trait]
impl FaultInjector for RandomConfigChange {
    fn name(&self) -> &str {
        "random_config_change"
    }

    async fn inject(&mut self, ctx: &mut FaultContext<'_>) -> SimulationResult<()> {
        let routers: Vec<String> = ctx.routers().iter().map(|r| r.name().to_string()).collect();
        let Some(index) = ctx.random().index(routers.len()) else {
            tracing::debug!("no router for a configuration change");
            return Ok(());
        };
        let router = &routers[index];

        ctx.record(
            EventKind::ConfigChange,
            format!("Configuration change on {router}"),
            Some(router),
        );
        if let Some(handle) = ctx.device(router) {
            if let Err(err) = handle.simulate_interface_change().await {
                tracing::warn!(device = %router, error = %err, "configuration change failed");
            }
        }
        Ok(())
    }
}

/// Congests one enabled link picked at random.
#[derive(Debug, Clone)]
pub struct LinkCongestion {
    /// Congestion level in `0..=1`.
    pub level: f64,
}

impl LinkCongestion {
    /// Injector applying `level`.
    pub fn new(level: f64) -> Self {
        Self { level }
    }
}

#[async_trait]
impl FaultInjector for LinkCongestion {
    fn name(&self) -> &str {
        "link_congestion"
    }

    async fn inject(&mut self, ctx: &mut FaultContext<'_>) -> SimulationResult<()> {
        let enabled: Vec<_> = ctx
            .registry()
            .connections()
            .into_iter()
            .filter(|c| c.enabled)
            .collect();
        let Some(index) = ctx.random().index(enabled.len()) else {
            return Ok(());
        };
        let conn = &enabled[index];

        ctx.record(
            EventKind::FaultInjection,
            format!(
                "Congestion {:.2} between {} and {}",
                self.level, conn.device_a, conn.device_b
            ),
            Some(&conn.device_a),
        );
        ctx.registry()
            .apply_congestion(&conn.device_a, &conn.device_b, self.level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_link_failure() {
        let fault = Fault::parse("link_failure", "r1", &params(&[("neighbor", "sw1")]))
            .expect("valid");
        assert_eq!(
            fault,
            Fault::LinkFailure {
                target: "r1".into(),
                neighbor: "sw1".into()
            }
        );
        assert_eq!(fault.kind(), "link_failure");
        assert_eq!(fault.target(), Some("r1"));
    }

    #[test]
    fn test_parse_missing_parameter() {
        let err = Fault::parse("interface_down", "r1", &HashMap::new()).expect_err("missing");
        assert!(matches!(err, SimulationError::InvalidFault(_)));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_parse_unknown_kind() {
        assert!(Fault::parse("meteor_strike", "r1", &HashMap::new()).is_err());
    }

    #[test]
    fn test_parse_congestion_level() {
        let ok = Fault::parse(
            "congestion",
            "r1",
            &params(&[("neighbor", "r2"), ("level", "0.5")]),
        )
        .expect("valid");
        assert!(matches!(ok, Fault::Congestion { level, .. } if level == 0.5));

        for bad in ["1.5", "-0.1", "heavy"] {
            assert!(Fault::parse(
                "congestion",
                "r1",
                &params(&[("neighbor", "r2"), ("level", bad)])
            )
            .is_err());
        }
    }
}
