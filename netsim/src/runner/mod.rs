//! Scenario orchestration and reporting.
//!
//! ## Submodules
//!
//! - `config` - SimulationConfig with every timing knob of a run
//! - `scenario` - the day1/day2 phase scripts
//! - `topology` - startup order and link wiring derived from a topology
//! - `orchestrator` - Simulation and NetworkSimulator
//! - `fault_injector` - Fault requests and FaultInjector strategies
//! - `report` - events and the SimulationReport result record

pub mod config;
pub mod fault_injector;
pub(crate) mod orchestrator;
pub mod report;
pub mod scenario;
pub mod topology;

// Re-export main types at module level
pub use config::SimulationConfig;
pub use fault_injector::{
    Fault, FaultContext, FaultInjector, LinkCongestion, RandomConfigChange, RandomLinkFailure,
};
pub use orchestrator::{NetworkSimulator, Simulation};
pub use report::{
    DeviceState, EventKind, EventLog, SimulationEvent, SimulationReport, SimulationStatistics,
};
pub use scenario::{Phase, Scenario};
