/// Profiles: named, atomically swapped symlinks to numbered generations
use crate::config::types::{LifecycleError, Result};
use crate::generation::parse::{generation_link_name, generation_path, parse_generation_name};
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Name of the distinguished default profile
pub const SYSTEM_PROFILE: &str = "system";

const PROFILES_DIR: &str = "nix/var/nix/profiles";
const SYSTEM_PROFILES_SUBDIR: &str = "system-profiles";

/// Where profile directories live, optionally under an alternate root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileLayout {
    root: PathBuf,
}

impl Default for ProfileLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl ProfileLayout {
    /// Layout for a system mounted at `root` (e.g. `/mnt` during install)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR)
    }

    /// `system` lives directly in the profiles directory, every other name in
    /// the private `system-profiles` subdirectory.
    pub fn directory_for(&self, name: &str) -> PathBuf {
        if name == SYSTEM_PROFILE {
            self.profiles_dir()
        } else {
            self.profiles_dir().join(SYSTEM_PROFILES_SUBDIR)
        }
    }
}

/// A named profile and its generation history
#[derive(Clone, Debug)]
pub struct Profile {
    name: String,
    directory: PathBuf,
}

impl Profile {
    pub fn new(name: &str, layout: &ProfileLayout) -> Result<Self> {
        validate_profile_name(name)?;
        Ok(Self {
            name: name.to_string(),
            directory: layout.directory_for(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The profile's own symlink
    pub fn link(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    pub fn generation_path(&self, number: u64) -> PathBuf {
        generation_path(&self.directory, &self.name, number)
    }

    /// Create the profile's container directory if it is missing.
    ///
    /// Returns whether this call created it; a directory created concurrently
    /// by someone else counts as success.
    pub fn ensure_directory(&self) -> Result<bool> {
        if let Some(parent) = self.directory.parent() {
            fs::create_dir_all(parent).map_err(|e| creation_error(parent, e))?;
        }

        match fs::create_dir(&self.directory) {
            Ok(()) => {
                log::info!("Created profile directory {}", self.directory.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(creation_error(&self.directory, e)),
        }
    }

    /// Numbers of every generation entry currently in the directory
    pub fn generation_numbers(&self) -> Result<Vec<u64>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LifecycleError::Io(e)),
        };

        let mut numbers = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };
            if let Some(number) = entry
                .file_name()
                .to_str()
                .and_then(|name| parse_generation_name(&self.name, name))
            {
                numbers.push(number);
            }
        }
        numbers.sort_unstable_by(|a, b| b.cmp(a));
        Ok(numbers)
    }

    /// Number of the generation the profile link points at.
    ///
    /// `None` when the link is missing, unparsable, or points at a generation
    /// entry that no longer exists.
    pub fn current_number(&self) -> Option<u64> {
        let target = fs::read_link(self.link()).ok()?;
        let name = target.file_name()?.to_str()?;
        let number = parse_generation_name(&self.name, name)?;
        fs::symlink_metadata(self.generation_path(number))
            .ok()
            .map(|_| number)
    }

    /// Point the profile at `store_path`, creating a new generation.
    ///
    /// When the current generation already resolves to `store_path` nothing
    /// changes and its number is returned.
    pub fn set(&self, store_path: &Path) -> Result<u64> {
        self.ensure_directory()?;

        if let Some(current) = self.current_number() {
            if let Ok(existing) = fs::read_link(self.generation_path(current)) {
                if existing == store_path {
                    log::info!(
                        "Profile '{}' already at {} (generation {})",
                        self.name,
                        store_path.display(),
                        current
                    );
                    return Ok(current);
                }
            }
        }

        let next = self
            .generation_numbers()?
            .first()
            .map_or(1, |highest| highest + 1);
        let generation_link = self.generation_path(next);
        symlink(store_path, &generation_link).map_err(|e| set_error(&generation_link, e))?;

        self.swap_link(next)?;
        log::info!(
            "Profile '{}' now at generation {} ({})",
            self.name,
            next,
            store_path.display()
        );
        Ok(next)
    }

    /// Repoint the profile at an existing generation
    pub fn switch_to(&self, number: u64) -> Result<()> {
        if fs::symlink_metadata(self.generation_path(number)).is_err() {
            return Err(LifecycleError::GenerationNotFound {
                profile: self.name.clone(),
                number,
            });
        }
        self.swap_link(number)?;
        log::info!("Profile '{}' switched to generation {}", self.name, number);
        Ok(())
    }

    /// Replace the profile link through a temporary link and rename(2) so
    /// readers never observe a missing profile.
    fn swap_link(&self, number: u64) -> Result<()> {
        let temp_link = self
            .directory
            .join(format!(".{}-{}.tmp", self.name, Uuid::new_v4()));
        symlink(generation_link_name(&self.name, number), &temp_link)
            .map_err(|e| set_error(&temp_link, e))?;

        if let Err(e) = fs::rename(&temp_link, self.link()) {
            if let Err(cleanup) = fs::remove_file(&temp_link) {
                log::warn!(
                    "Failed to remove temporary link {}: {}",
                    temp_link.display(),
                    cleanup
                );
            }
            return Err(set_error(&self.link(), e));
        }
        Ok(())
    }
}

fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.starts_with('.') {
        return Err(LifecycleError::Config(format!(
            "invalid profile name '{}'",
            name
        )));
    }
    Ok(())
}

fn creation_error(path: &Path, e: io::Error) -> LifecycleError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return LifecycleError::PermissionDenied(format!("creating {}", path.display()));
    }
    LifecycleError::ResourceCreationFailed(format!("{}: {}", path.display(), e))
}

fn set_error(path: &Path, e: io::Error) -> LifecycleError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return LifecycleError::PermissionDenied(format!("writing {}", path.display()));
    }
    LifecycleError::ProfileSetFailed(format!("{}: {}", path.display(), e))
}
