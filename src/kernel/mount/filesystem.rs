/// Mount plumbing for a target root
use crate::config::types::{LifecycleError, MountError, Result};
use crate::utils::paths::{join_in_root, resolve_in_root};
use nix::mount::{mount, MsFlags};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Host pseudo-filesystems bound into the target. `/sys` may be absent on the
/// host (e.g. in some containers) and is then skipped.
const REQUIRED_BINDS: &[&str] = &["dev", "proc"];
const OPTIONAL_BINDS: &[&str] = &["sys"];

const RESOLV_CONF: &str = "etc/resolv.conf";

/// One mount or remount; never persisted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountOperation {
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub flags: MsFlags,
    pub operation: &'static str,
}

impl MountOperation {
    pub fn recursive_bind(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(source.into()),
            target: target.into(),
            flags: MsFlags::MS_BIND | MsFlags::MS_REC,
            operation: "recursive bind mount",
        }
    }

    pub fn bind(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(source.into()),
            target: target.into(),
            flags: MsFlags::MS_BIND,
            operation: "bind mount",
        }
    }

    pub fn make_private(target: impl Into<PathBuf>) -> Self {
        Self {
            source: None,
            target: target.into(),
            flags: MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            operation: "remount private",
        }
    }

    pub fn apply(&self) -> Result<()> {
        mount(
            self.source.as_deref(),
            self.target.as_path(),
            None::<&str>,
            self.flags,
            None::<&str>,
        )
        .map_err(|errno| MountError::new(self.operation, &self.target, errno))?;

        log::debug!(
            "{} {} -> {}",
            self.operation,
            self.source
                .as_deref()
                .map_or_else(|| "-".to_string(), |s| s.display().to_string()),
            self.target.display()
        );
        Ok(())
    }
}

/// The set of binds that make a target root usable for activation
#[derive(Clone, Debug)]
pub struct RootMounts {
    root: PathBuf,
    host_root: PathBuf,
}

impl RootMounts {
    pub fn new(root: impl Into<PathBuf>, host_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            host_root: host_root.into(),
        }
    }

    /// Create every mount target inside the root and return the operations
    /// in the order they must be applied. Nothing is mounted here.
    pub fn prepare(&self) -> Result<Vec<MountOperation>> {
        let mut operations = Vec::new();

        for name in REQUIRED_BINDS.iter().chain(OPTIONAL_BINDS) {
            let source = self.host_root.join(name);
            if OPTIONAL_BINDS.contains(name) && !source.is_dir() {
                log::debug!("Host has no {}, not binding it", source.display());
                continue;
            }
            let target = self.root.join(name);
            create_mount_dir(&target)?;
            operations.push(MountOperation::recursive_bind(source, target));
        }

        if let Some(operation) = self.prepare_resolv_conf()? {
            operations.push(operation);
        }

        Ok(operations)
    }

    /// Apply [`prepare`](Self::prepare)'d operations in order, stopping at the
    /// first failure.
    pub fn mount_all(&self) -> Result<()> {
        for operation in self.prepare()? {
            operation.apply()?;
        }
        Ok(())
    }

    fn prepare_resolv_conf(&self) -> Result<Option<MountOperation>> {
        let host_file = join_in_root(&self.host_root, Path::new(RESOLV_CONF));
        if !host_file.exists() {
            log::debug!("No host resolver configuration at {}", host_file.display());
            return Ok(None);
        }

        // The target's resolv.conf is often a symlink into /run or /etc/static.
        // Binding onto it directly would follow the link on the host side.
        let target = resolve_in_root(&self.root, Path::new(RESOLV_CONF))?;
        if fs::symlink_metadata(&target).is_err() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| creation_error(parent, e))?;
            }
            fs::File::create(&target).map_err(|e| creation_error(&target, e))?;
        }

        Ok(Some(MountOperation::bind(host_file, target)))
    }
}

fn create_mount_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(creation_error(path, e)),
    }
}

fn creation_error(path: &Path, e: io::Error) -> LifecycleError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return LifecycleError::PermissionDenied(format!("creating {}", path.display()));
    }
    LifecycleError::ResourceCreationFailed(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn fake_host(with_sys: bool) -> tempfile::TempDir {
        let host = tempfile::tempdir().unwrap();
        fs::create_dir(host.path().join("dev")).unwrap();
        fs::create_dir(host.path().join("proc")).unwrap();
        if with_sys {
            fs::create_dir(host.path().join("sys")).unwrap();
        }
        fs::create_dir(host.path().join("etc")).unwrap();
        fs::write(host.path().join("etc/resolv.conf"), "nameserver 10.0.0.1\n").unwrap();
        host
    }

    #[test]
    fn test_prepare_creates_targets_in_order() {
        let host = fake_host(true);
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("dev")).unwrap();

        let operations = RootMounts::new(root.path(), host.path()).prepare().unwrap();
        let targets: Vec<PathBuf> = operations.iter().map(|op| op.target.clone()).collect();

        assert_eq!(
            targets,
            vec![
                root.path().join("dev"),
                root.path().join("proc"),
                root.path().join("sys"),
                root.path().join("etc/resolv.conf"),
            ]
        );
        assert!(root.path().join("proc").is_dir());
        assert!(root.path().join("etc/resolv.conf").is_file());
        assert_eq!(operations[0].flags, MsFlags::MS_BIND | MsFlags::MS_REC);
        assert_eq!(operations[3].flags, MsFlags::MS_BIND);
    }

    #[test]
    fn test_missing_host_sys_is_skipped() {
        let host = fake_host(false);
        let root = tempfile::tempdir().unwrap();

        let operations = RootMounts::new(root.path(), host.path()).prepare().unwrap();
        assert!(operations.iter().all(|op| !op.target.ends_with("sys")));
    }

    #[test]
    fn test_resolv_conf_symlink_resolved_inside_root() {
        let host = fake_host(false);
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("etc")).unwrap();
        symlink("/run/systemd/resolve/stub-resolv.conf", root.path().join("etc/resolv.conf"))
            .unwrap();

        let operations = RootMounts::new(root.path(), host.path()).prepare().unwrap();
        let resolv = operations.last().unwrap();

        let expected = root.path().join("run/systemd/resolve/stub-resolv.conf");
        assert_eq!(resolv.target, expected);
        assert!(expected.is_file());
        assert_eq!(resolv.source.as_deref(), Some(host.path().join("etc/resolv.conf").as_path()));
    }

    #[test]
    fn test_relative_resolv_conf_symlink() {
        let host = fake_host(false);
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("etc")).unwrap();
        symlink("static/resolv.conf", root.path().join("etc/resolv.conf")).unwrap();

        let operations = RootMounts::new(root.path(), host.path()).prepare().unwrap();
        assert_eq!(
            operations.last().unwrap().target,
            root.path().join("etc/static/resolv.conf")
        );
    }

    #[test]
    fn test_resolv_conf_parent_links_never_leave_root() {
        let host = fake_host(false);
        let scratch = tempfile::tempdir().unwrap();
        let root = scratch.path().join("a/b/root");
        fs::create_dir_all(root.join("etc")).unwrap();
        symlink("../../../escaped/resolv.conf", root.join("etc/resolv.conf")).unwrap();

        let operations = RootMounts::new(&root, host.path()).prepare().unwrap();
        let resolv = operations.last().unwrap();

        assert_eq!(resolv.target, root.join("escaped/resolv.conf"));
        assert!(root.join("escaped/resolv.conf").is_file());
        assert!(!scratch.path().join("a/escaped").exists());
    }

    #[test]
    fn test_absolute_resolv_conf_link_with_parents_stays_in_root() {
        let host = fake_host(false);
        let scratch = tempfile::tempdir().unwrap();
        let root = scratch.path().join("root");
        fs::create_dir_all(root.join("etc")).unwrap();
        symlink("/../../outside/resolv.conf", root.join("etc/resolv.conf")).unwrap();

        let operations = RootMounts::new(&root, host.path()).prepare().unwrap();

        assert_eq!(operations.last().unwrap().target, root.join("outside/resolv.conf"));
        assert!(!scratch.path().join("outside").exists());
    }

    #[test]
    fn test_unprivileged_bind_reports_target() {
        if nix::unistd::geteuid().is_root() {
            return;
        }
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();

        let err = MountOperation::bind(source.path(), target.path())
            .apply()
            .unwrap_err();
        match err {
            LifecycleError::Mount(ref e) => {
                assert_eq!(e.path, target.path());
                assert_eq!(e.operation, "bind mount");
            }
            ref other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.exit_code(), 13);
    }

    #[test]
    fn test_no_host_resolv_conf() {
        let host = fake_host(false);
        fs::remove_file(host.path().join("etc/resolv.conf")).unwrap();
        let root = tempfile::tempdir().unwrap();

        let operations = RootMounts::new(root.path(), host.path()).prepare().unwrap();
        assert_eq!(operations.len(), 2);
    }
}
