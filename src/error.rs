use std::fmt;

/// Result type for planner operations
pub type Result<T> = std::result::Result<T, McviError>;

/// Main error type for the MCVI library
#[derive(Debug, Clone)]
pub enum McviError {
    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Action index outside the simulator's action space
    InvalidAction {
        action: i64,
        max_actions: usize,
    },

    /// Simulator returned an invalid state, observation or reward
    SimulatorViolation(String),

    /// Numerical computation errors (non-finite bounds, degenerate weights)
    NumericalError(String),

    /// Empty belief distribution
    EmptyBelief(String),

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),
}

impl fmt::Display for McviError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McviError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            McviError::InvalidAction { action, max_actions } => {
                write!(f, "Invalid action {}: must be in [0, {})", action, max_actions)
            }
            McviError::SimulatorViolation(msg) => write!(f, "Simulator violation: {}", msg),
            McviError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            McviError::EmptyBelief(msg) => write!(f, "Empty belief: {}", msg),
            McviError::IoError(msg) => write!(f, "IO error: {}", msg),
            McviError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for McviError {}

// Conversion from std::io::Error
impl From<std::io::Error> for McviError {
    fn from(err: std::io::Error) -> Self {
        McviError::IoError(err.to_string())
    }
}

// Conversion from bincode::Error
impl From<bincode::Error> for McviError {
    fn from(err: bincode::Error) -> Self {
        McviError::SerializationError(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for McviError {
    fn from(err: serde_json::Error) -> Self {
        McviError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl McviError {
    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        McviError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn simulator_violation<S: Into<String>>(msg: S) -> Self {
        McviError::SimulatorViolation(msg.into())
    }
}
