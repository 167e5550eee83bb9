//! Error types for the SCF engine

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScfError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown mixing method `{0}` (expected `plain` or `diis`)")]
    UnknownMixingMethod(String),

    #[error("unknown mixed variable `{0}` (expected `density` or `potential`)")]
    UnknownMixedQuantity(String),

    #[error("total energy is not finite at SCF iteration {iteration}")]
    NonFiniteEnergy { iteration: usize },

    #[error("mixed variable is not finite after mixing at SCF iteration {iteration}")]
    NonFiniteVariable { iteration: usize },
}
