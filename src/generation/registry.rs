/// Generation discovery and ordering for a profile
use crate::config::types::{LifecycleError, Result};
use crate::generation::parse::read_generation;
use crate::generation::profile::Profile;
use crate::generation::types::{Generation, PartialRead};
use std::fs;

impl Profile {
    /// Every generation of this profile, highest number first.
    ///
    /// Sub-read failures inside a generation are logged and the partially
    /// filled generation is still returned. A profile that was never used
    /// has no generations.
    pub fn list_generations(&self) -> Result<Vec<Generation>> {
        let current = self.current_number();
        let mut generations = Vec::new();

        for number in self.generation_numbers()? {
            let read = read_generation(&self.generation_path(number), number);
            if let Some(err) = read.aggregate_error() {
                log::warn!("Profile '{}': {}", self.name(), err);
                for failure in &read.failures {
                    log::debug!("  {}", failure);
                }
            }

            let mut generation = read.value;
            generation.is_current = current == Some(number);
            generations.push(generation);
        }

        Ok(generations)
    }

    /// Read a single generation; fails only if its entry does not exist.
    pub fn load_generation(&self, number: u64) -> Result<PartialRead<Generation>> {
        let path = self.generation_path(number);
        if fs::symlink_metadata(&path).is_err() {
            return Err(LifecycleError::GenerationNotFound {
                profile: self.name().to_string(),
                number,
            });
        }

        let mut read = read_generation(&path, number);
        read.value.is_current = self.current_number() == Some(number);
        Ok(read)
    }

    /// The greatest generation number below the current one
    pub fn previous_number(&self) -> Result<u64> {
        let current = self.current_number().ok_or_else(|| {
            LifecycleError::Config(format!(
                "profile '{}' has no current generation",
                self.name()
            ))
        })?;

        self.generation_numbers()?
            .into_iter()
            .find(|number| *number < current)
            .ok_or_else(|| LifecycleError::GenerationNotFound {
                profile: self.name().to_string(),
                number: current.saturating_sub(1),
            })
    }
}
