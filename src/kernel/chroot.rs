/// Changing the filesystem root, for this process or a child
use crate::config::types::{LifecycleError, MountError, Result};
use std::ffi::{CString, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

/// A command whose child chroots into `root` and changes to `/` before exec.
///
/// `program` is looked up inside the new root.
pub fn chrooted_command(root: &Path, program: impl AsRef<OsStr>) -> Result<Command> {
    let root_c = CString::new(root.as_os_str().as_bytes()).map_err(|_| {
        LifecycleError::Config(format!("root path {} contains a NUL byte", root.display()))
    })?;

    let mut cmd = Command::new(program);
    // SAFETY: the closure runs between fork and exec and only issues the
    // async-signal-safe chroot(2) and chdir(2) on a CString allocated before
    // the fork.
    unsafe {
        cmd.pre_exec(move || {
            if libc::chroot(root_c.as_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::chdir(b"/\0".as_ptr() as *const libc::c_char) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    Ok(cmd)
}

/// chroot the current process into `root`
pub fn enter_root(root: &Path) -> Result<()> {
    nix::unistd::chroot(root).map_err(|errno| MountError::new("chroot", root, errno))?;
    nix::unistd::chdir("/").map_err(|errno| MountError::new("chdir", "/", errno))?;
    log::debug!("Changed root to {}", root.display());
    Ok(())
}
