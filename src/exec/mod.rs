//! Execution control
//!
//! External process invocation and the type-state sandbox chain.

pub mod command;
pub mod preexec;
