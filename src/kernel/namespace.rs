/// Private mount/UTS/PID namespace entry by re-executing under `unshare`
use crate::config::types::{LifecycleError, Result};
use crate::kernel::mount::MountOperation;
use std::convert::Infallible;
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStringExt;

/// Set in the environment of the re-executed process so it does not unshare again
pub const NAMESPACE_MARKER_ENV: &str = "GENCTL_IN_NAMESPACE";

const UNSHARE: &str = "unshare";

/// Whether this process image was started by [`reexec_in_namespace`]
pub fn in_private_namespace() -> bool {
    std::env::var_os(NAMESPACE_MARKER_ENV).is_some()
}

/// Full argument vector of the `unshare` invocation wrapping `command`.
///
/// Unprivileged callers are mapped to root inside a new user namespace.
pub fn unshare_argv(command: Vec<OsString>, privileged: bool) -> Vec<OsString> {
    let mut argv: Vec<OsString> = [UNSHARE, "--fork", "--mount", "--uts", "--pid", "--mount-proc"]
        .iter()
        .map(OsString::from)
        .collect();
    if !privileged {
        argv.push(OsString::from("--map-root-user"));
    }
    argv.extend(command);
    argv
}

/// Replace the current process with itself running inside fresh namespaces.
///
/// All original arguments are forwarded. Never returns on success.
pub fn reexec_in_namespace() -> Result<Infallible> {
    let exe = std::env::current_exe().map_err(|e| {
        LifecycleError::Namespace(format!("cannot locate current executable: {}", e))
    })?;

    let mut command = vec![exe.into_os_string()];
    command.extend(std::env::args_os().skip(1));
    let privileged = nix::unistd::geteuid().is_root();
    let argv = to_cstrings(unshare_argv(command, privileged))?;

    std::env::set_var(NAMESPACE_MARKER_ENV, "1");
    log::debug!("Re-executing inside a private namespace (privileged: {})", privileged);

    let program = CString::new(UNSHARE)
        .map_err(|e| LifecycleError::Namespace(e.to_string()))?;
    nix::unistd::execvp(&program, &argv)
        .map_err(|e| LifecycleError::Namespace(format!("failed to execute {}: {}", UNSHARE, e)))
}

/// Make every mount below `/` private so later binds stay in this namespace.
///
/// Must succeed before any other mount.
pub fn harden_mount_propagation() -> Result<()> {
    MountOperation::make_private("/").apply()?;
    log::debug!("Mount propagation hardened: / set to MS_PRIVATE|MS_REC");
    Ok(())
}

pub(crate) fn to_cstrings(args: Vec<OsString>) -> Result<Vec<CString>> {
    args.into_iter()
        .map(|arg| {
            CString::new(arg.into_vec())
                .map_err(|_| LifecycleError::Config("argument contains a NUL byte".to_string()))
        })
        .collect()
}
