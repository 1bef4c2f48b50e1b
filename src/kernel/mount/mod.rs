//! Bind mounts and propagation changes for a target root

pub mod filesystem;

pub use filesystem::{MountOperation, RootMounts};
