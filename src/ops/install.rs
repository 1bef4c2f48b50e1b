/// Install a configuration into a freshly mounted root
use crate::activation::builder::{BuildOptions, Builder, NixBuilder};
use crate::activation::planner::INSTALL_BOOTLOADER_ENV;
use crate::activation::target::resolve_build_target;
use crate::config::settings::Settings;
use crate::config::types::{BuildType, LifecycleError, Result};
use crate::exec::command::{activation_failure, run_best_effort, run_checked};
use crate::exec::preexec::ROOT_MARKER;
use crate::generation::{Profile, ProfileLayout, SYSTEM_PROFILE};
use crate::safety::workspace::Workspace;
use crate::utils::paths::{canonical_dir, is_mountpoint};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Command;

const SWITCH_IN_ROOT: &str = "/run/current-system/bin/switch-to-configuration";
const PASSWD_IN_ROOT: &str = "/nix/var/nix/profiles/system/sw/bin/passwd";

#[derive(Clone, Debug)]
pub struct InstallRequest {
    pub root: PathBuf,
    pub target: Option<String>,
    pub bootloader: bool,
    pub root_passwd: bool,
    pub extra_build_args: Vec<String>,
}

/// Build the system into `root`, publish it and finish the installation
pub fn install(settings: &Settings, request: &InstallRequest) -> Result<()> {
    let builder = NixBuilder::new(settings.verbose);
    let root = install_system(&builder, settings, request)?;

    if request.bootloader {
        log::info!("Installing bootloader");
        let mut cmd = enter_command(&root, [SWITCH_IN_ROOT, "boot"], settings.verbose)?;
        cmd.env(INSTALL_BOOTLOADER_ENV, "1");
        run_checked(&mut cmd, activation_failure)?;
    }

    if request.root_passwd {
        println!("Setting root password...");
        let mut cmd = enter_command(&root, [PASSWD_IN_ROOT], settings.verbose)?;
        if !run_best_effort(&mut cmd) {
            log::warn!("Failed to set root password; run `genctl enter --root {} -- passwd` later", root.display());
        }
    }

    println!("Installation finished.");
    Ok(())
}

/// Everything up to a bootable profile: build into the root's store, publish
/// the `system` profile under the root and create the root marker.
///
/// Returns the canonical root.
pub fn install_system<B: Builder>(
    builder: &B,
    settings: &Settings,
    request: &InstallRequest,
) -> Result<PathBuf> {
    let root = canonical_dir(&request.root)?;
    match is_mountpoint(&root) {
        Ok(true) => {}
        Ok(false) => log::warn!("{} is not a mountpoint", root.display()),
        Err(e) => log::warn!("Could not check whether {} is a mountpoint: {}", root.display(), e),
    }

    let target = resolve_build_target(request.target.as_deref(), &root.join("etc/nixos"), None)?;

    let workspace = Workspace::in_temp_dir()?;
    let mut extra_args = settings.extra_build_args.clone();
    extra_args.extend(request.extra_build_args.iter().cloned());
    let options = BuildOptions {
        result_link: Some(workspace.result_link()),
        dry_run: false,
        store: Some(root.clone()),
        extra_args,
    };

    log::info!("Building {} into {}", target, root.display());
    let store_path = builder
        .build(&target, BuildType::SystemActivation, &options)?
        .store_path
        .ok_or_else(|| LifecycleError::BuildFailed {
            status: None,
            message: "builder did not report a result path".to_string(),
        })?;

    let profile = Profile::new(SYSTEM_PROFILE, &ProfileLayout::with_root(&root))?;
    let number = profile.set(&store_path)?;
    log::info!("Published generation {} under {}", number, root.display());

    touch_marker(&root)?;
    Ok(root)
}

fn touch_marker(root: &Path) -> Result<()> {
    let marker = root.join(ROOT_MARKER);
    if let Some(parent) = marker.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&marker)?;
    Ok(())
}

/// This binary's own `enter` operation as a child process
fn enter_command<I, S>(root: &Path, argv: I, verbose: bool) -> Result<Command>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let exe = std::env::current_exe()?;
    let mut cmd = Command::new(exe);
    if verbose {
        cmd.arg("--verbose");
    }
    cmd.arg("enter").arg("--root").arg(root).arg("--");
    cmd.args(argv.into_iter().map(Into::into));
    Ok(cmd)
}
