//! Input/Output operations for SCF calculations
//!
//! This module handles logging setup and result files.

mod output;

pub use output::{setup_output, write_density_profile};
