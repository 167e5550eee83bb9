// Main library file for SCF calculations

pub mod app;
pub mod config;
pub mod error;
pub mod field;
pub mod io;
pub mod model;
pub mod scf_impl;

pub use error::ScfError;
pub use field::{FieldSet, MixedVariable};
pub use model::{ModelParams, ModelSystem};
pub use scf_impl::{
    Energies, HamiltonianMode, KohnShamState, LocalReducer, MixedQuantity, MixingMethod, Reducer,
    ScfDriver, ScfOutcome, ScfSettings, ScfStatus, StopHandle,
};
