//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: namespace -> mount -> chroot

pub mod chroot;
pub mod mount;
pub mod namespace;
