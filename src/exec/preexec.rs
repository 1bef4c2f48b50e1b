/// Ordered entry into a target root
///
/// The sequence is fixed and enforced by the type parameter of [`Sandbox`]:
/// 1. private mount/UTS/PID namespace (re-exec under `unshare`)
/// 2. canonicalize the target root and require its marker file
/// 3. privatize `/`, then bind `/dev`, `/proc`, `/sys` and the resolver config
/// 4. run the system's activation script chrooted into the root
/// 5. replace this process with the user command, chrooted
///
/// The root is validated before anything is mounted, so a directory that is
/// not an installed system is never touched.
use crate::config::types::{LifecycleError, Result};
use crate::exec::command::{activation_failure, run_best_effort, run_checked};
use crate::kernel::chroot::{chrooted_command, enter_root};
use crate::kernel::mount::RootMounts;
use crate::kernel::namespace::{
    harden_mount_propagation, in_private_namespace, reexec_in_namespace, to_cstrings,
};
use std::convert::Infallible;
use std::ffi::OsString;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// File whose presence marks a directory as an installed system root
pub const ROOT_MARKER: &str = "etc/NIXOS";

/// Default system profile, as seen from inside the root
pub const DEFAULT_SYSTEM: &str = "/nix/var/nix/profiles/system";

/// Type-state marker: nothing done yet
pub struct Uninitialized;

/// Type-state marker: running inside a private namespace
pub struct NamespaceCreated;

/// Type-state marker: target root canonicalized and carries the marker file
pub struct RootValidated;

/// Type-state marker: pseudo-filesystems bound into the root
pub struct Mounted;

/// Type-state marker: activation script has run
pub struct Activated;

#[derive(Clone, Debug)]
pub struct SandboxOptions {
    /// Target root as given by the caller
    pub root: PathBuf,
    /// System to activate, a path inside the root
    pub system: PathBuf,
    /// Hide activation output
    pub silent: bool,
    /// Where the host's `/dev`, `/proc`, `/sys` and `/etc` are found
    pub host_root: PathBuf,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/mnt"),
            system: PathBuf::from(DEFAULT_SYSTEM),
            silent: false,
            host_root: PathBuf::from("/"),
        }
    }
}

/// What runs in the root once it is ready
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnterCommand {
    /// Interactive login shell
    Shell,
    /// A command line run through a login shell
    Inline(String),
    /// An argument vector, looked up on `PATH`
    Argv(Vec<String>),
}

impl EnterCommand {
    /// At most one of `command` and `args` may be given
    pub fn from_parts(command: Option<String>, args: Vec<String>) -> Result<Self> {
        match (command, args.is_empty()) {
            (Some(_), false) => Err(LifecycleError::Config(
                "--command cannot be combined with a command argument list".to_string(),
            )),
            (Some(command), true) => Ok(EnterCommand::Inline(command)),
            (None, false) => Ok(EnterCommand::Argv(args)),
            (None, true) => Ok(EnterCommand::Shell),
        }
    }

    /// Argument vector to exec inside the root
    pub fn argv(&self, system: &Path) -> Vec<OsString> {
        let shell = system.join("sw/bin/bash").into_os_string();
        match self {
            EnterCommand::Shell => vec![shell, "--login".into()],
            EnterCommand::Inline(command) => {
                vec![shell, "--login".into(), "-c".into(), command.into()]
            }
            EnterCommand::Argv(args) => args.iter().map(OsString::from).collect(),
        }
    }
}

/// Canonicalize `root` and require the installed-system marker inside it
pub fn validate_target_root(root: &Path) -> Result<PathBuf> {
    let canonical = root.canonicalize().map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => {
            LifecycleError::PermissionDenied(format!("resolving {}", root.display()))
        }
        _ => LifecycleError::UnsupportedOs(format!("{}: {}", root.display(), e)),
    })?;

    if !canonical.is_dir() {
        return Err(LifecycleError::UnsupportedOs(format!(
            "{} is not a directory",
            canonical.display()
        )));
    }

    let marker = canonical.join(ROOT_MARKER);
    if !marker.exists() {
        return Err(LifecycleError::UnsupportedOs(format!(
            "{} does not exist; {} is not an installed system",
            marker.display(),
            canonical.display()
        )));
    }

    Ok(canonical)
}

/// A target root moving through the entry sequence
///
/// ```no_run
/// # fn main() -> nixos_genctl::config::types::Result<()> {
/// use nixos_genctl::exec::preexec::{EnterCommand, Sandbox, SandboxOptions};
///
/// let never = Sandbox::new(SandboxOptions::default())
///     .enter_namespace()?
///     .validate_root()?
///     .prepare_mounts()?
///     .activate()?
///     .exec(&EnterCommand::Shell)?;
/// match never {}
/// # }
/// ```
///
/// Mounting before the root is validated does not compile:
///
/// ```compile_fail
/// use nixos_genctl::exec::preexec::{Sandbox, SandboxOptions};
///
/// let sandbox = Sandbox::new(SandboxOptions::default()).enter_namespace().unwrap();
/// let _ = sandbox.prepare_mounts();
/// ```
///
/// Neither does executing without activation:
///
/// ```compile_fail
/// use nixos_genctl::exec::preexec::{EnterCommand, Sandbox, SandboxOptions};
///
/// let sandbox = Sandbox::new(SandboxOptions::default());
/// let _ = sandbox.exec(&EnterCommand::Shell);
/// ```
pub struct Sandbox<S> {
    options: SandboxOptions,
    root: PathBuf,
    _state: PhantomData<S>,
}

impl<S> Sandbox<S> {
    fn transition<T>(self) -> Sandbox<T> {
        Sandbox {
            options: self.options,
            root: self.root,
            _state: PhantomData,
        }
    }
}

impl Sandbox<Uninitialized> {
    pub fn new(options: SandboxOptions) -> Self {
        let root = options.root.clone();
        Self {
            options,
            root,
            _state: PhantomData,
        }
    }

    /// Enter a private namespace.
    ///
    /// Outside one, this re-executes the whole process under `unshare` and
    /// does not return; the new image reaches this point again with the
    /// marker set and continues.
    pub fn enter_namespace(self) -> Result<Sandbox<NamespaceCreated>> {
        if !in_private_namespace() {
            match reexec_in_namespace()? {}
        }
        log::debug!("Running inside private namespace");
        Ok(self.transition())
    }
}

impl Sandbox<NamespaceCreated> {
    pub fn validate_root(mut self) -> Result<Sandbox<RootValidated>> {
        self.root = validate_target_root(&self.options.root)?;
        log::debug!("Target root {} validated", self.root.display());
        Ok(self.transition())
    }
}

impl Sandbox<RootValidated> {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Privatize `/` and bind the host pseudo-filesystems into the root
    pub fn prepare_mounts(self) -> Result<Sandbox<Mounted>> {
        harden_mount_propagation()?;
        RootMounts::new(&self.root, &self.options.host_root).mount_all()?;
        log::info!("Prepared mounts in {}", self.root.display());
        Ok(self.transition())
    }
}

impl Sandbox<Mounted> {
    fn in_root(&self, program: &Path) -> Result<Command> {
        let mut cmd = chrooted_command(&self.root, program)?;
        cmd.env("LOCALE_ARCHIVE", locale_archive(&self.options.system))
            .env("IN_NIXOS_ENTER", "1");
        if self.options.silent {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        Ok(cmd)
    }

    /// Run the system's activation script inside the root, then refresh
    /// tmpfiles. Only the activation script's failure is fatal.
    pub fn activate(self) -> Result<Sandbox<Activated>> {
        let system = &self.options.system;

        let mut activate = self.in_root(&system.join("activate"))?;
        run_checked(&mut activate, activation_failure)?;

        let mut tmpfiles = self.in_root(&system.join("sw/bin/systemd-tmpfiles"))?;
        tmpfiles.args(["--create", "--remove", "-E"]);
        if !run_best_effort(&mut tmpfiles) {
            log::debug!("systemd-tmpfiles failed inside {}", self.root.display());
        }

        Ok(self.transition())
    }
}

impl Sandbox<Activated> {
    /// Replace this process with `command` running inside the root
    pub fn exec(self, command: &EnterCommand) -> Result<Infallible> {
        let argv = command.argv(&self.options.system);
        let display = argv
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        let argv = to_cstrings(argv)?;
        let program = argv
            .first()
            .cloned()
            .ok_or_else(|| LifecycleError::Config("empty command".to_string()))?;

        std::env::set_var("LOCALE_ARCHIVE", locale_archive(&self.options.system));
        enter_root(&self.root)?;

        log::debug!("Executing {}", display);
        nix::unistd::execvp(&program, &argv).map_err(|errno| {
            LifecycleError::Io(io::Error::new(
                io::Error::from(errno).kind(),
                format!("failed to execute {}: {}", display, errno),
            ))
        })
    }
}

fn locale_archive(system: &Path) -> PathBuf {
    system.join("sw/lib/locale/locale-archive")
}
