//! Core domain models for provisioning
//!
//! This module defines pipeline runs, steps, their validated context and the
//! error types every layer reports with.

pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod step;

pub use context::*;
pub use error::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
