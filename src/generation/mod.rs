//! Generations and profiles
//!
//! Profiles are symlinks in a profile directory that point at
//! `<profile>-<number>-link` entries, each of which links to one built
//! system closure.

pub mod parse;
pub mod profile;
pub mod registry;
pub mod types;

pub use profile::{Profile, ProfileLayout, SYSTEM_PROFILE};
pub use types::{Generation, PartialRead};
