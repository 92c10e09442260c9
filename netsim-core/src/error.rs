use thiserror::Error;

/// Errors surfaced to the caller of a simulation.
///
/// Runtime anomalies inside a run (dropped messages, lost packets, actor
/// faults) never show up here; they are absorbed into statistics and
/// events. What remains is configuration that cannot be run at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// The requested scenario name is not one of the canned scripts.
    #[error("unknown scenario '{0}' (expected 'day1' or 'day2')")]
    UnknownScenario(String),

    /// The topology snapshot references something that does not exist.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// A device name that is not part of the running simulation.
    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    /// A fault request that cannot be applied.
    #[error("invalid fault: {0}")]
    InvalidFault(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A JSON document could not be parsed or produced.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SimulationError {
    /// Whether this error belongs to the configuration class, raised before
    /// any device actor is started.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Serialization(_))
    }
}

/// A type alias for `Result<T, SimulationError>`.
pub type SimulationResult<T> = Result<T, SimulationError>;

impl From<std::io::Error> for SimulationError {
    fn from(err: std::io::Error) -> Self {
        SimulationError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SimulationError {
    fn from(err: serde_json::Error) -> Self {
        SimulationError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_class() {
        assert!(SimulationError::UnknownScenario("day3".into()).is_configuration_error());
        assert!(SimulationError::InvalidTopology("x".into()).is_configuration_error());
        assert!(SimulationError::InvalidFault("x".into()).is_configuration_error());
        assert!(!SimulationError::Io("disk".into()).is_configuration_error());
    }

    #[test]
    fn test_display_mentions_scenario() {
        let err = SimulationError::UnknownScenario("day3".into());
        assert_eq!(
            err.to_string(),
            "unknown scenario 'day3' (expected 'day1' or 'day2')"
        );
    }
}
