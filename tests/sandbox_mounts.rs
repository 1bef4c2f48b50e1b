//! Mounting and activation inside a target root.
//!
//! These need root and a kernel that allows new mount namespaces; otherwise
//! each test returns early. Every mount happens in a mount namespace private
//! to a helper thread and disappears with it, and the temporary root is only
//! removed after that thread has exited.

use nix::sched::{unshare, CloneFlags};
use nixos_genctl::config::types::LifecycleError;
use nixos_genctl::exec::preexec::{Mounted, Sandbox, SandboxOptions};
use nixos_genctl::kernel::mount::MountOperation;
use nixos_genctl::kernel::namespace::{harden_mount_propagation, NAMESPACE_MARKER_ENV};
use nixos_genctl::utils::paths::is_mountpoint;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Host directories that make `/bin/sh` runnable inside the root
const HOST_TOOLS: &[&str] = &["bin", "sbin", "lib", "lib64", "usr", "nix"];

fn privileged() -> bool {
    if nix::unistd::geteuid().is_root() {
        return true;
    }
    eprintln!("skipping: not running as root");
    false
}

/// Run `f` on a thread with its own mount namespace; `None` if the kernel
/// refuses one.
fn in_mount_namespace<T, F>(f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::spawn(move || {
        if let Err(e) = unshare(CloneFlags::CLONE_NEWNS) {
            eprintln!("skipping: cannot create mount namespace: {}", e);
            return None;
        }
        harden_mount_propagation().unwrap();
        Some(f())
    })
    .join()
    .unwrap()
}

fn write_script(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// An installed-looking root whose system lives at `/system`.
///
/// Kept under the build directory, since `/tmp` may be mounted `noexec`.
fn marked_root(activate: &str, tmpfiles: &str) -> tempfile::TempDir {
    let root = tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).unwrap();
    fs::create_dir(root.path().join("etc")).unwrap();
    fs::write(root.path().join("etc/NIXOS"), "").unwrap();
    write_script(&root.path().join("system/activate"), activate);
    write_script(&root.path().join("system/sw/bin/systemd-tmpfiles"), tmpfiles);
    root
}

fn mounted(root: &Path) -> Sandbox<Mounted> {
    std::env::set_var(NAMESPACE_MARKER_ENV, "1");
    let options = SandboxOptions {
        root: root.to_path_buf(),
        system: PathBuf::from("/system"),
        silent: false,
        host_root: PathBuf::from("/"),
    };
    Sandbox::new(options)
        .enter_namespace()
        .unwrap()
        .validate_root()
        .unwrap()
        .prepare_mounts()
        .unwrap()
}

fn bind_host_tools(root: &Path) {
    for name in HOST_TOOLS {
        let source = Path::new("/").join(name);
        if !source.is_dir() {
            continue;
        }
        let target = root.join(name);
        fs::create_dir_all(&target).unwrap();
        MountOperation::recursive_bind(source, target).apply().unwrap();
    }
}

#[test]
fn test_prepare_mounts_binds_dev_and_proc() {
    if !privileged() {
        return;
    }
    let root = marked_root("exit 0", "exit 0");
    let path = root.path().canonicalize().unwrap();

    let checked = in_mount_namespace(move || {
        let _sandbox = mounted(&path);
        (
            is_mountpoint(&path.join("dev")).unwrap(),
            is_mountpoint(&path.join("proc")).unwrap(),
            path.join("proc/self").exists(),
        )
    });

    if let Some((dev, proc_, proc_self)) = checked {
        assert!(dev, "dev not mounted");
        assert!(proc_, "proc not mounted");
        assert!(proc_self);
    }
    // Never visible outside the helper thread's namespace.
    assert!(!root.path().join("proc/self").exists());
}

#[test]
fn test_activation_failure_is_fatal_with_its_status() {
    if !privileged() {
        return;
    }
    let root = marked_root("exit 7", "exit 0");
    let path = root.path().canonicalize().unwrap();

    let outcome = in_mount_namespace(move || {
        let sandbox = mounted(&path);
        bind_host_tools(&path);
        sandbox.activate().map(|_| ())
    });

    if let Some(outcome) = outcome {
        match outcome {
            Err(LifecycleError::ActivationFailed { status, .. }) => assert_eq!(status, Some(7)),
            other => panic!("expected activation failure, got {:?}", other),
        }
    }
}

#[test]
fn test_tmpfiles_failure_is_ignored() {
    if !privileged() {
        return;
    }
    let root = marked_root(
        r#"echo "$IN_NIXOS_ENTER $LOCALE_ARCHIVE" > /activated"#,
        "exit 1",
    );
    let path = root.path().canonicalize().unwrap();

    let outcome = in_mount_namespace(move || {
        let sandbox = mounted(&path);
        bind_host_tools(&path);
        sandbox.activate().map(|_| ())
    });

    if let Some(outcome) = outcome {
        assert!(outcome.is_ok(), "activation failed: {:?}", outcome);
        assert_eq!(
            fs::read_to_string(root.path().join("activated")).unwrap(),
            "1 /system/sw/lib/locale/locale-archive\n"
        );
    }
}
