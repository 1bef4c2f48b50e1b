//! Building and activating configurations
//!
//! Target resolution, the external builder seam, and the planner that ties a
//! build to profile publication and activation.

pub mod builder;
pub mod planner;
pub mod target;
