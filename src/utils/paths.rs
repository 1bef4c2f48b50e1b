/// Path resolution helpers: symlink following, mountpoint detection and
/// root-relative canonicalization.
use crate::config::types::{LifecycleError, Result};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

/// Join `path` under `root`, treating an absolute `path` as root-relative.
pub fn join_in_root(root: &Path, path: &Path) -> PathBuf {
    root.join(path.strip_prefix("/").unwrap_or(path))
}

/// Location that a file at `relative` inside `root` really lives at.
///
/// When the file inside the root is a symlink, it is dereferenced once the
/// way a process chrooted into `root` would see it: an absolute target starts
/// over at `root`, a relative target starts at the file's own directory, and
/// `..` never climbs above `root`. Otherwise the plain joined path is
/// returned, whether or not it exists.
pub fn resolve_in_root(root: &Path, relative: &Path) -> Result<PathBuf> {
    let candidate = join_in_root(root, relative);

    let metadata = match fs::symlink_metadata(&candidate) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidate),
        Err(e) => return Err(LifecycleError::Io(e)),
    };

    if !metadata.file_type().is_symlink() {
        return Ok(candidate);
    }

    let target = fs::read_link(&candidate)?;
    let mut inside = PathBuf::new();
    if !target.is_absolute() {
        if let Some(parent) = relative.parent() {
            push_clamped(&mut inside, parent);
        }
    }
    push_clamped(&mut inside, &target);

    let resolved = root.join(inside);
    if !resolved.starts_with(root) {
        return Err(LifecycleError::Config(format!(
            "{} resolves outside {}",
            candidate.display(),
            root.display()
        )));
    }
    Ok(resolved)
}

/// Apply `path` to a root-relative `base` without touching the filesystem.
/// `/` restarts at the root and `..` at the root stays there.
fn push_clamped(base: &mut PathBuf, path: &Path) {
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => *base = PathBuf::new(),
            Component::CurDir => {}
            Component::ParentDir => {
                base.pop();
            }
            Component::Normal(name) => base.push(name),
        }
    }
}

/// Whether `path` is the root of a mounted filesystem.
///
/// A directory is a mountpoint when it lives on a different device than its
/// parent, or when it is its own parent (`/`).
pub fn is_mountpoint(path: &Path) -> io::Result<bool> {
    let metadata = fs::metadata(path)?;
    let parent = path.join("..");
    let parent_metadata = fs::metadata(&parent)?;

    if metadata.dev() != parent_metadata.dev() {
        return Ok(true);
    }
    Ok(metadata.ino() == parent_metadata.ino())
}

/// Canonicalize a path that must be an existing directory
pub fn canonical_dir(path: &Path) -> Result<PathBuf> {
    let canonical = path.canonicalize().map_err(|e| {
        LifecycleError::Io(io::Error::new(
            e.kind(),
            format!("Failed to resolve {}: {}", path.display(), e),
        ))
    })?;

    if !canonical.is_dir() {
        return Err(LifecycleError::Config(format!(
            "{} is not a directory",
            canonical.display()
        )));
    }

    Ok(canonical)
}
