use thiserror::Error;

use super::config::ConfigError;
use super::replica::ReplicaError;
use crate::core::io::system::SystemLoadError;
use crate::core::space::InvariantError;

/// Fatal condition raised by a move kernel during one trial.
///
/// Recoverable conditions never surface here; they become no-op trials or infinite energies.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("Replica exchange failed: {0}")]
    Replica(#[from] ReplicaError),

    #[error("Iterative procedure failed to converge after {iterations} iterations")]
    Convergence { iterations: usize },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

/// A [`TrialError`] attributed to the move that raised it.
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("Move '{name}' lost replica synchronization: {source}")]
    Replica {
        name: String,
        #[source]
        source: ReplicaError,
    },

    #[error("Move '{name}' failed to converge after {iterations} iterations")]
    Convergence { name: String, iterations: usize },

    #[error("Move '{name}' aborted: {reason}")]
    Internal { name: String, reason: String },
}

impl MoveError {
    pub fn from_trial(name: &str, error: TrialError) -> Self {
        let name = name.to_string();
        match error {
            TrialError::Replica(source) => MoveError::Replica { name, source },
            TrialError::Convergence { iterations } => MoveError::Convergence { name, iterations },
            TrialError::Internal(reason) => MoveError::Internal { name, reason },
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("System setup failed: {source}")]
    System {
        #[from]
        source: SystemLoadError,
    },

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error("Configuration invariant violated: {0}")]
    Invariant(#[from] InvariantError),

    #[error("Simulation phase '{phase}' failed: {reason}")]
    PhaseFailed { phase: &'static str, reason: String },
}
