/// The build → publish → activate state machine
use crate::activation::builder::{BuildOptions, Builder};
use crate::activation::target::{resolve_build_target, LEGACY_CONFIG_ENV};
use crate::config::settings::Settings;
use crate::config::types::{ActivationAction, BuildType, LifecycleError, Result};
use crate::exec::command::{activation_failure, describe, run_best_effort, run_checked};
use crate::generation::{Profile, ProfileLayout};
use crate::safety::workspace::Workspace;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Marker file naming the specialisation the running system booted into
pub const SPECIALISATION_MARKER: &str = "etc/NIXOS_SPECIALISATION";

/// Environment variable asking the activation script to (re)install the bootloader
pub const INSTALL_BOOTLOADER_ENV: &str = "NIXOS_INSTALL_BOOTLOADER";

const SWITCH_SCRIPT: &str = "bin/switch-to-configuration";

/// Already-validated arguments of one apply invocation
#[derive(Clone, Debug, Default)]
pub struct ApplyRequest {
    /// Flake reference or legacy path; detected from settings when absent
    pub target: Option<String>,
    /// `VM` or `VMWithBootloader` when a VM build was requested
    pub vm: Option<BuildType>,
    pub activate: bool,
    pub boot: bool,
    pub dry: bool,
    pub specialization: Option<String>,
    pub profile_name: Option<String>,
    pub install_bootloader: bool,
    pub output_link: Option<PathBuf>,
    pub extra_build_args: Vec<String>,
}

/// What one request will do, decided before anything runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivationPlan {
    pub build_type: BuildType,
    /// Ask the builder to evaluate only
    pub dry_run_build: bool,
    /// Point the profile at the result
    pub publish: bool,
    pub action: Option<ActivationAction>,
}

impl ActivationPlan {
    pub fn from_request(request: &ApplyRequest) -> Result<Self> {
        let action = ActivationAction::from_flags(request.activate, request.boot, request.dry)?;

        let build_type = match request.vm {
            Some(vm) if vm.is_vm() => vm,
            Some(other) => {
                return Err(LifecycleError::Config(format!(
                    "{:?} is not a virtual machine build",
                    other
                )))
            }
            None if request.activate || request.boot => BuildType::SystemActivation,
            None => BuildType::System,
        };

        let activating = build_type == BuildType::SystemActivation;
        Ok(Self {
            build_type,
            dry_run_build: request.dry && build_type == BuildType::System,
            publish: activating && !request.dry,
            action: if activating { action } else { None },
        })
    }
}

/// How an apply run ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Dry evaluation; nothing was built
    Evaluated,
    /// A VM was built; `run_script` starts it
    VirtualMachine { run_script: PathBuf },
    Built {
        store_path: PathBuf,
        generation: Option<u64>,
        action: Option<ActivationAction>,
    },
}

/// Which generation a switch should land on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchTarget {
    Number(u64),
    /// The greatest generation below the current one
    Previous,
}

/// Drives builds, profile publication and activation for one settings value
pub struct ActivationPlanner<'a, B: Builder> {
    builder: &'a B,
    settings: &'a Settings,
    layout: ProfileLayout,
    scratch_dir: PathBuf,
}

impl<'a, B: Builder> ActivationPlanner<'a, B> {
    pub fn new(builder: &'a B, settings: &'a Settings) -> Self {
        Self {
            builder,
            settings,
            layout: ProfileLayout::default(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Publish profiles under an alternate root
    pub fn with_layout(mut self, layout: ProfileLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Parent directory for temporary build workspaces
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    fn profile(&self, name: Option<&str>) -> Result<Profile> {
        Profile::new(name.unwrap_or(&self.settings.default_profile), &self.layout)
    }

    /// Build a configuration and, depending on the request, publish and
    /// activate it.
    pub fn apply(&self, request: &ApplyRequest) -> Result<ApplyOutcome> {
        let legacy_override = std::env::var_os(LEGACY_CONFIG_ENV).map(PathBuf::from);
        let target = resolve_build_target(
            request.target.as_deref(),
            &self.settings.config_location,
            legacy_override,
        )?;
        let plan = ActivationPlan::from_request(request)?;
        log::debug!("Activation plan: {:?}", plan);

        // Lives until the end of this call so the result link keeps the
        // closure alive through activation.
        let mut _workspace = None;
        let result_link = if plan.dry_run_build {
            None
        } else if let Some(output) = &request.output_link {
            Some(output.clone())
        } else {
            let workspace = Workspace::new(&self.scratch_dir)?;
            let link = workspace.result_link();
            _workspace = Some(workspace);
            Some(link)
        };

        let mut extra_args = self.settings.extra_build_args.clone();
        extra_args.extend(request.extra_build_args.iter().cloned());
        let options = BuildOptions {
            result_link,
            dry_run: plan.dry_run_build,
            store: None,
            extra_args,
        };

        let output = self.builder.build(&target, plan.build_type, &options)?;
        let store_path = match output.store_path {
            Some(path) => path,
            None if plan.dry_run_build => {
                log::info!("Dry build of {} finished", target);
                return Ok(ApplyOutcome::Evaluated);
            }
            None => {
                return Err(LifecycleError::BuildFailed {
                    status: None,
                    message: "builder did not report a result path".to_string(),
                })
            }
        };

        if plan.build_type.is_vm() {
            let run_script = find_vm_script(&store_path).unwrap_or_else(|| store_path.clone());
            return Ok(ApplyOutcome::VirtualMachine { run_script });
        }

        if plan.action.is_some() && self.settings.use_nvd {
            self.show_diff(&store_path);
        }

        let generation = if plan.publish {
            let profile = self.profile(request.profile_name.as_deref())?;
            Some(profile.set(&store_path)?)
        } else {
            None
        };

        if let Some(action) = plan.action {
            let specialization = resolve_specialization(
                request.specialization.as_deref(),
                &self.settings.current_system,
            );
            let script = activation_script(&store_path, specialization.as_deref())?;
            run_activation(&script, action, request.install_bootloader)?;
        }

        Ok(ApplyOutcome::Built {
            store_path,
            generation,
            action: plan.action,
        })
    }

    /// Repoint a profile at an existing generation and activate it.
    ///
    /// A dry switch leaves the profile alone and runs `dry-activate`.
    pub fn switch_generation(
        &self,
        profile_name: Option<&str>,
        target: SwitchTarget,
        dry: bool,
        specialization: Option<&str>,
    ) -> Result<u64> {
        let profile = self.profile(profile_name)?;
        let number = match target {
            SwitchTarget::Number(number) => number,
            SwitchTarget::Previous => profile.previous_number()?,
        };

        let generation = profile.load_generation(number)?;
        if let Some(err) = generation.aggregate_error() {
            log::warn!("Profile '{}': {}", profile.name(), err);
            for failure in &generation.failures {
                log::debug!("  {}", failure);
            }
        }

        let specialization =
            resolve_specialization(specialization, &self.settings.current_system);
        let script = activation_script(&generation.value.path, specialization.as_deref())?;

        let action = if dry {
            ActivationAction::DryActivate
        } else {
            profile.switch_to(number)?;
            ActivationAction::Switch
        };
        run_activation(&script, action, false)?;
        Ok(number)
    }

    fn show_diff(&self, store_path: &Path) {
        let mut cmd = Command::new("nvd");
        cmd.arg("diff").arg(&self.settings.current_system).arg(store_path);
        if !run_best_effort(&mut cmd) {
            log::warn!("Failed to show closure diff with `{}`", describe(&cmd));
        }
    }
}

/// The specialisation to activate: the explicit name if given, else the one
/// the running system was booted with. An empty name means none.
pub fn resolve_specialization(explicit: Option<&str>, current_system: &Path) -> Option<String> {
    if let Some(name) = explicit {
        return (!name.is_empty()).then(|| name.to_string());
    }

    let marker = current_system.join(SPECIALISATION_MARKER);
    match fs::read_to_string(&marker) {
        Ok(content) => {
            let name = content.trim();
            (!name.is_empty()).then(|| name.to_string())
        }
        Err(e) => {
            log::warn!(
                "Could not read specialisation marker {}: {}; using base configuration",
                marker.display(),
                e
            );
            None
        }
    }
}

/// Locate the activation entry point of a build result
pub fn activation_script(result: &Path, specialization: Option<&str>) -> Result<PathBuf> {
    match specialization {
        Some(name) => {
            let script = result.join("specialisation").join(name).join(SWITCH_SCRIPT);
            if script.exists() {
                Ok(script)
            } else {
                Err(LifecycleError::UnknownSpecialization(name.to_string()))
            }
        }
        None => Ok(result.join(SWITCH_SCRIPT)),
    }
}

/// Run an activation entry point to completion; its exit status becomes ours
pub fn run_activation(script: &Path, action: ActivationAction, install_bootloader: bool) -> Result<()> {
    let mut cmd = Command::new(script);
    cmd.arg(action.as_str());
    if install_bootloader {
        cmd.env(INSTALL_BOOTLOADER_ENV, "1");
    }

    log::info!("Activating configuration ({})", action);
    run_checked(&mut cmd, activation_failure)
}

fn find_vm_script(result: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(result.join("bin")).ok()?;
    let mut scripts: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with("run-") && name.ends_with("-vm"))
        })
        .map(|entry| entry.path())
        .collect();
    scripts.sort();
    scripts.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(activate: bool, boot: bool, dry: bool) -> ApplyRequest {
        ApplyRequest {
            activate,
            boot,
            dry,
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_switch() {
        let plan = ActivationPlan::from_request(&request(true, true, false)).unwrap();
        assert_eq!(plan.build_type, BuildType::SystemActivation);
        assert!(plan.publish);
        assert!(!plan.dry_run_build);
        assert_eq!(plan.action, Some(ActivationAction::Switch));
    }

    #[test]
    fn test_plan_dry_activate_builds_for_real() {
        let plan = ActivationPlan::from_request(&request(true, false, true)).unwrap();
        assert_eq!(plan.build_type, BuildType::SystemActivation);
        assert!(!plan.dry_run_build);
        assert!(!plan.publish);
        assert_eq!(plan.action, Some(ActivationAction::DryActivate));
    }

    #[test]
    fn test_plan_dry_build_only() {
        let plan = ActivationPlan::from_request(&request(false, false, true)).unwrap();
        assert_eq!(plan.build_type, BuildType::System);
        assert!(plan.dry_run_build);
        assert!(!plan.publish);
        assert_eq!(plan.action, None);
    }

    #[test]
    fn test_plan_vm_never_activates() {
        let mut req = request(true, true, false);
        req.vm = Some(BuildType::VMWithBootloader);
        let plan = ActivationPlan::from_request(&req).unwrap();
        assert_eq!(plan.build_type, BuildType::VMWithBootloader);
        assert!(!plan.publish);
        assert_eq!(plan.action, None);

        req.vm = Some(BuildType::System);
        assert!(ActivationPlan::from_request(&req).is_err());
    }

    #[test]
    fn test_plan_rejects_dry_boot() {
        assert!(ActivationPlan::from_request(&request(false, true, true)).is_err());
    }

    #[test]
    fn test_specialization_from_marker() {
        let system = tempfile::tempdir().unwrap();
        fs::create_dir_all(system.path().join("etc")).unwrap();
        fs::write(system.path().join(SPECIALISATION_MARKER), "gaming\n").unwrap();

        assert_eq!(resolve_specialization(None, system.path()), Some("gaming".to_string()));
        assert_eq!(
            resolve_specialization(Some("work"), system.path()),
            Some("work".to_string())
        );
        assert_eq!(resolve_specialization(Some(""), system.path()), None);
    }

    #[test]
    fn test_specialization_marker_missing_or_empty() {
        let system = tempfile::tempdir().unwrap();
        assert_eq!(resolve_specialization(None, system.path()), None);

        fs::create_dir_all(system.path().join("etc")).unwrap();
        fs::write(system.path().join(SPECIALISATION_MARKER), "  \n").unwrap();
        assert_eq!(resolve_specialization(None, system.path()), None);
    }

    #[test]
    fn test_activation_script_paths() {
        let result = tempfile::tempdir().unwrap();
        assert_eq!(
            activation_script(result.path(), None).unwrap(),
            result.path().join("bin/switch-to-configuration")
        );

        let err = activation_script(result.path(), Some("gaming")).unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownSpecialization(ref name) if name == "gaming"));

        let spec_bin = result.path().join("specialisation/gaming/bin");
        fs::create_dir_all(&spec_bin).unwrap();
        fs::write(spec_bin.join("switch-to-configuration"), "").unwrap();
        assert_eq!(
            activation_script(result.path(), Some("gaming")).unwrap(),
            spec_bin.join("switch-to-configuration")
        );
    }

    #[test]
    fn test_find_vm_script() {
        let result = tempfile::tempdir().unwrap();
        assert_eq!(find_vm_script(result.path()), None);

        fs::create_dir_all(result.path().join("bin")).unwrap();
        fs::write(result.path().join("bin/run-host-vm"), "").unwrap();
        assert_eq!(
            find_vm_script(result.path()),
            Some(result.path().join("bin/run-host-vm"))
        );
    }
}
