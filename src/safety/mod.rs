//! Scoped resources
//!
//! Temporary directories owned by one operation and released on every exit
//! path.

pub mod workspace;
