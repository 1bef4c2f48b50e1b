/// The external package-build tool, behind the `Builder` seam
use crate::activation::target::BuildTarget;
use crate::config::types::{BuildType, Result};
use crate::exec::command::{build_failure, capture_stdout};
use std::path::PathBuf;
use std::process::Command;

/// Per-invocation builder options
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    /// Materialize a symlink to the result here; `None` only reports the path
    pub result_link: Option<PathBuf>,
    /// Evaluate and report what would be built without building
    pub dry_run: bool,
    /// Build into the store of an alternate root
    pub store: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

/// Outcome of a build; a dry run yields no store path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildOutput {
    pub store_path: Option<PathBuf>,
}

/// Turns a target into a store path
pub trait Builder {
    fn build(
        &self,
        target: &BuildTarget,
        build_type: BuildType,
        options: &BuildOptions,
    ) -> Result<BuildOutput>;
}

/// Builder backed by `nix build` (flakes) and `nix-build` (legacy)
#[derive(Clone, Debug, Default)]
pub struct NixBuilder {
    verbose: bool,
}

impl NixBuilder {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// The command line for one build, without running it
    pub fn command(
        &self,
        target: &BuildTarget,
        build_type: BuildType,
        options: &BuildOptions,
    ) -> Command {
        let attribute = build_type.build_attribute();
        let mut cmd = match target {
            BuildTarget::Flake(flake) => {
                let mut cmd = Command::new("nix");
                cmd.args(["--extra-experimental-features", "nix-command flakes", "build"]);
                cmd.arg(flake.installable(attribute));
                cmd.arg("--print-out-paths");
                match &options.result_link {
                    Some(link) => {
                        cmd.arg("--out-link").arg(link);
                    }
                    None => {
                        cmd.arg("--no-link");
                    }
                }
                if self.verbose {
                    cmd.args(["--print-build-logs", "-v"]);
                }
                cmd
            }
            BuildTarget::Legacy { config_path } => {
                let mut cmd = Command::new("nix-build");
                cmd.arg("<nixpkgs/nixos>");
                cmd.arg("-A").arg(format!("config.system.build.{}", attribute));
                cmd.arg("-I").arg(format!("nixos-config={}", config_path.display()));
                match &options.result_link {
                    Some(link) => {
                        cmd.arg("--out-link").arg(link);
                    }
                    None => {
                        cmd.arg("--no-out-link");
                    }
                }
                if self.verbose {
                    cmd.arg("-v");
                }
                cmd
            }
        };

        if options.dry_run {
            cmd.arg("--dry-run");
        }
        if let Some(store) = &options.store {
            cmd.arg("--store").arg(store);
        }
        cmd.args(&options.extra_args);
        cmd
    }
}

impl Builder for NixBuilder {
    fn build(
        &self,
        target: &BuildTarget,
        build_type: BuildType,
        options: &BuildOptions,
    ) -> Result<BuildOutput> {
        let mut cmd = self.command(target, build_type, options);
        log::info!("Building {} ({:?})", target, build_type);
        let stdout = capture_stdout(&mut cmd, build_failure)?;

        if options.dry_run {
            return Ok(BuildOutput { store_path: None });
        }

        let store_path = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(PathBuf::from)
            .ok_or_else(|| build_failure(None, "builder did not report a result path".to_string()))?;

        Ok(BuildOutput {
            store_path: Some(store_path),
        })
    }
}
