use super::config::ConfigError;
use super::energy::EvaluationError;
use super::mapping::MappingError;
use super::solver::SolverError;
use crate::core::grid::GridError;
use crate::core::models::molecule::MoleculeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {source}")]
    Configuration {
        #[from]
        source: ConfigError,
    },

    #[error("Grid access failed: {source}")]
    Grid {
        #[from]
        source: GridError,
    },

    #[error("Mapping failed: {source}")]
    Mapping {
        #[from]
        source: MappingError,
    },

    #[error("Solver failed: {source}")]
    Solver {
        #[from]
        source: SolverError,
    },

    #[error("Evaluation failed: {source}")]
    Evaluation {
        #[from]
        source: EvaluationError,
    },

    #[error("Calculation references unknown {0}")]
    MoleculeNotFound(MoleculeId),

    #[error("Calculation {calculation} focuses on calculation {parent}, which {reason}")]
    FocusParent {
        calculation: usize,
        parent: usize,
        reason: &'static str,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the error stems from an inconsistent setup rather than from the numerics.
    pub fn is_configuration(&self) -> bool {
        match self {
            EngineError::Configuration { .. }
            | EngineError::MoleculeNotFound(_)
            | EngineError::FocusParent { .. } => true,
            EngineError::Solver { source } => matches!(source, SolverError::Configuration { .. }),
            EngineError::Evaluation { source } => {
                matches!(source, EvaluationError::Configuration { .. })
            }
            _ => false,
        }
    }
}
