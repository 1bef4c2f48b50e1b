/// Core types and structures for the genctl system
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What the builder is asked to produce, and whether publish/activation follows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildType {
    /// Build the system closure only
    System,
    /// Build the system closure, publish it and run an activation action
    SystemActivation,
    /// Build a QEMU VM running the configuration
    VM,
    /// Build a QEMU VM that boots through the configured bootloader
    VMWithBootloader,
}

impl BuildType {
    /// Attribute under `config.system.build` that the builder realises
    pub fn build_attribute(self) -> &'static str {
        match self {
            BuildType::System | BuildType::SystemActivation => "toplevel",
            BuildType::VM => "vm",
            BuildType::VMWithBootloader => "vmWithBootLoader",
        }
    }

    pub fn is_vm(self) -> bool {
        matches!(self, BuildType::VM | BuildType::VMWithBootloader)
    }
}

/// Action passed to a generation's `switch-to-configuration` entry point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationAction {
    Switch,
    Boot,
    Test,
    DryActivate,
}

impl ActivationAction {
    /// Derive the action from the `(activate, boot, dry)` request flags.
    ///
    /// `Ok(None)` means no activation step runs at all (plain build).
    /// `(activate=false, boot=true, dry=true)` has no defined meaning and is
    /// rejected.
    pub fn from_flags(activate: bool, boot: bool, dry: bool) -> Result<Option<Self>> {
        match (activate, boot, dry) {
            (true, _, true) => Ok(Some(ActivationAction::DryActivate)),
            (true, true, false) => Ok(Some(ActivationAction::Switch)),
            (true, false, false) => Ok(Some(ActivationAction::Test)),
            (false, true, false) => Ok(Some(ActivationAction::Boot)),
            (false, false, _) => Ok(None),
            (false, true, true) => Err(LifecycleError::Config(
                "a dry run cannot be combined with boot-only activation".to_string(),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivationAction::Switch => "switch",
            ActivationAction::Boot => "boot",
            ActivationAction::Test => "test",
            ActivationAction::DryActivate => "dry-activate",
        }
    }
}

impl fmt::Display for ActivationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified cause of a failed mount or chroot syscall
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountErrorKind {
    PermissionDenied,
    Busy,
    NotADirectory,
    SymlinkLoop,
    NameTooLong,
    NoSuchPath,
    OutOfMemory,
    Other,
}

impl MountErrorKind {
    pub fn from_errno(errno: nix::errno::Errno) -> Self {
        use nix::errno::Errno;

        match errno {
            Errno::EACCES | Errno::EPERM => MountErrorKind::PermissionDenied,
            Errno::EBUSY => MountErrorKind::Busy,
            Errno::ENOTDIR => MountErrorKind::NotADirectory,
            Errno::ELOOP => MountErrorKind::SymlinkLoop,
            Errno::ENAMETOOLONG => MountErrorKind::NameTooLong,
            Errno::ENOENT => MountErrorKind::NoSuchPath,
            Errno::ENOMEM => MountErrorKind::OutOfMemory,
            _ => MountErrorKind::Other,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            MountErrorKind::PermissionDenied => "permission denied",
            MountErrorKind::Busy => "device or resource busy",
            MountErrorKind::NotADirectory => "not a directory",
            MountErrorKind::SymlinkLoop => "too many levels of symbolic links",
            MountErrorKind::NameTooLong => "path name too long",
            MountErrorKind::NoSuchPath => "no such file or directory",
            MountErrorKind::OutOfMemory => "out of kernel memory",
            MountErrorKind::Other => "unexpected error",
        }
    }
}

/// A failed mount, remount or chroot, with the offending path retained
#[derive(Error, Debug)]
#[error("{operation} {}: {}", path.display(), kind.describe())]
pub struct MountError {
    pub kind: MountErrorKind,
    pub path: PathBuf,
    pub operation: &'static str,
    #[source]
    pub errno: nix::errno::Errno,
}

impl MountError {
    pub fn new(operation: &'static str, path: impl Into<PathBuf>, errno: nix::errno::Errno) -> Self {
        Self {
            kind: MountErrorKind::from_errno(errno),
            path: path.into(),
            operation,
            errno,
        }
    }
}

/// Which independent piece of a generation could not be read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadFailureKind {
    Manifest,
    VersionFile,
    KernelVersion,
    Specializations,
    CreationTime,
}

/// One non-fatal failure encountered while reading a generation
#[derive(Clone, Debug)]
pub struct ReadFailure {
    pub kind: ReadFailureKind,
    pub message: String,
}

impl fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Custom error types for genctl
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no configuration found: {0}")]
    ConfigurationNotFound(String),

    #[error("unable to infer system name from hostname: {0}")]
    UnknownHostname(String),

    #[error("build failed: {message}")]
    BuildFailed { status: Option<i32>, message: String },

    #[error("failed to set profile: {0}")]
    ProfileSetFailed(String),

    #[error("specialisation '{0}' does not exist in the new configuration")]
    UnknownSpecialization(String),

    #[error("activation failed: {message}")]
    ActivationFailed { status: Option<i32>, message: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed to create resource: {0}")]
    ResourceCreationFailed(String),

    #[error("unsupported root: {0}")]
    UnsupportedOs(String),

    #[error("mount failed: {0}")]
    Mount(#[from] MountError),

    #[error("namespace error: {0}")]
    Namespace(String),

    #[error("generation {number} of profile '{profile}' not found")]
    GenerationNotFound { profile: String, number: u64 },

    #[error("generation {number} read partially ({} failures)", failures.len())]
    GenerationReadPartial { number: u64, failures: Vec<ReadFailure> },
}

impl LifecycleError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::UnsupportedOs(_) => 3,
            LifecycleError::ResourceCreationFailed(_) | LifecycleError::Namespace(_) => 4,
            LifecycleError::PermissionDenied(_) => 13,
            LifecycleError::Mount(e) => match e.kind {
                MountErrorKind::PermissionDenied => 13,
                MountErrorKind::OutOfMemory => 1,
                _ => 4,
            },
            LifecycleError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => 13,
            LifecycleError::BuildFailed { status, .. }
            | LifecycleError::ActivationFailed { status, .. } => match status {
                Some(code) if *code != 0 => *code,
                _ => 1,
            },
            _ => 1,
        }
    }
}

/// Result type alias for genctl operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn test_activation_action_table() {
        use ActivationAction::*;

        assert_eq!(ActivationAction::from_flags(true, true, false).unwrap(), Some(Switch));
        assert_eq!(ActivationAction::from_flags(true, false, false).unwrap(), Some(Test));
        assert_eq!(ActivationAction::from_flags(false, true, false).unwrap(), Some(Boot));
        assert_eq!(ActivationAction::from_flags(true, false, true).unwrap(), Some(DryActivate));
        assert_eq!(ActivationAction::from_flags(true, true, true).unwrap(), Some(DryActivate));
        assert_eq!(ActivationAction::from_flags(false, false, true).unwrap(), None);
        assert_eq!(ActivationAction::from_flags(false, false, false).unwrap(), None);
    }

    #[test]
    fn test_dry_boot_without_activate_rejected() {
        let err = ActivationAction::from_flags(false, true, true).unwrap_err();
        assert!(matches!(err, LifecycleError::Config(_)));
    }

    #[test]
    fn test_mount_errno_classification() {
        assert_eq!(MountErrorKind::from_errno(Errno::EPERM), MountErrorKind::PermissionDenied);
        assert_eq!(MountErrorKind::from_errno(Errno::EACCES), MountErrorKind::PermissionDenied);
        assert_eq!(MountErrorKind::from_errno(Errno::EBUSY), MountErrorKind::Busy);
        assert_eq!(MountErrorKind::from_errno(Errno::ELOOP), MountErrorKind::SymlinkLoop);
        assert_eq!(MountErrorKind::from_errno(Errno::ENOMEM), MountErrorKind::OutOfMemory);
        assert_eq!(MountErrorKind::from_errno(Errno::EIO), MountErrorKind::Other);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(LifecycleError::UnsupportedOs("x".into()).exit_code(), 3);
        assert_eq!(LifecycleError::ResourceCreationFailed("x".into()).exit_code(), 4);
        assert_eq!(LifecycleError::PermissionDenied("x".into()).exit_code(), 13);

        let busy = MountError::new("bind mount", "/mnt/dev", Errno::EBUSY);
        assert_eq!(LifecycleError::from(busy).exit_code(), 4);
        let denied = MountError::new("chroot", "/mnt", Errno::EPERM);
        assert_eq!(LifecycleError::from(denied).exit_code(), 13);
        let oom = MountError::new("remount", "/", Errno::ENOMEM);
        assert_eq!(LifecycleError::from(oom).exit_code(), 1);

        let build = LifecycleError::BuildFailed {
            status: Some(100),
            message: "nix build exited".into(),
        };
        assert_eq!(build.exit_code(), 100);
        let activation = LifecycleError::ActivationFailed {
            status: None,
            message: "killed".into(),
        };
        assert_eq!(activation.exit_code(), 1);
        assert_eq!(LifecycleError::Config("bad".into()).exit_code(), 1);
    }

    #[test]
    fn test_mount_error_message_keeps_path() {
        let err = MountError::new("bind mount", "/mnt/proc", Errno::ENOTDIR);
        let msg = err.to_string();
        assert!(msg.contains("/mnt/proc"));
        assert!(msg.contains("not a directory"));
    }
}
