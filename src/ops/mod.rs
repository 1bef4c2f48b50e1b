//! Top-level operations
//!
//! Each operation takes already-validated arguments plus the loaded
//! [`Settings`](crate::config::settings::Settings) and drives the lower
//! layers. User-facing output is printed here and nowhere below.

pub mod apply;
pub mod enter;
pub mod generation;
pub mod install;
