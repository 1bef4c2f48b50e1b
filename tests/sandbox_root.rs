//! Target root validation happens before anything is mounted

use nixos_genctl::config::types::LifecycleError;
use nixos_genctl::exec::preexec::{Sandbox, SandboxOptions};
use nixos_genctl::kernel::namespace::NAMESPACE_MARKER_ENV;
use std::fs;

fn options(root: &std::path::Path) -> SandboxOptions {
    SandboxOptions {
        root: root.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn test_unmarked_root_rejected_before_mounting() {
    // Pretend the namespace already exists so no re-exec happens.
    std::env::set_var(NAMESPACE_MARKER_ENV, "1");

    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("etc")).unwrap();

    let sandbox = Sandbox::new(options(root.path())).enter_namespace().unwrap();
    let err = match sandbox.validate_root() {
        Ok(_) => panic!("unmarked root accepted"),
        Err(e) => e,
    };

    assert!(matches!(err, LifecycleError::UnsupportedOs(_)));
    assert_eq!(err.exit_code(), 3);
    // Nothing was created inside the root.
    assert!(!root.path().join("dev").exists());
    assert!(!root.path().join("proc").exists());
}

#[test]
fn test_marked_root_validates() {
    std::env::set_var(NAMESPACE_MARKER_ENV, "1");

    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("etc")).unwrap();
    fs::write(root.path().join("etc/NIXOS"), "").unwrap();

    let sandbox = Sandbox::new(options(root.path()))
        .enter_namespace()
        .unwrap()
        .validate_root()
        .unwrap();
    assert_eq!(sandbox.root(), root.path().canonicalize().unwrap());
}
