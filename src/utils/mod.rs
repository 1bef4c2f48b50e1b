//! Utilities
//!
//! Path resolution shared by the generation registry and the sandbox.

pub mod paths;
