//! nixos-genctl: generation, profile and activation lifecycle for NixOS
//!
//! # Architecture
//!
//! This crate is organized leaf-first:
//!
//! ## Paths ([`utils`])
//! - [`utils::paths`]: symlink resolution inside a root, mountpoint checks
//!
//! ## Generations ([`generation`])
//! - [`generation::parse`]: `<profile>-<number>-link` names and best-effort
//!   per-generation reads
//! - [`generation::profile`]: profile directories, atomic profile swaps
//! - [`generation::registry`]: listing and loading generations
//!
//! ## Activation ([`activation`])
//! - [`activation::target`]: flake / legacy target resolution
//! - [`activation::builder`]: the external builder seam
//! - [`activation::planner`]: build → publish → activate
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::namespace`]: private namespace entry
//! - [`kernel::mount`]: bind mounts into a target root
//! - [`kernel::chroot`]: root changes for this process or a child
//!
//! ## Execution Control ([`exec`])
//! - [`exec::command`]: external process status handling
//! - [`exec::preexec`]: type-state enforced entry into a target root
//!
//! ## Scoped Resources ([`safety`])
//! - [`safety::workspace`]: temporary build directories
//!
//! ## Configuration ([`config`])
//! - [`config::settings`]: settings file loading
//! - [`config::types`]: error taxonomy and shared closed enums
//!
//! ## Operations ([`ops`])
//! - `apply`, `install`, `enter`, `generation list|switch|rollback`

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Generations & Profiles
pub mod generation;

// Build & Activation
pub mod activation;

// Scoped Resources
pub mod safety;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// Top-level operations
pub mod ops;

// CLI entrypoint wiring for the genctl binary
pub mod cli;

pub use config::types::{LifecycleError, Result};
