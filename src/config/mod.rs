//! Configuration and shared types
//!
//! Settings loading, the error taxonomy, and the closed enums shared by
//! every operation.

pub mod settings;
pub mod types;
