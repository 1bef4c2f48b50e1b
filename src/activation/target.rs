/// Build target resolution: flake references and legacy configuration paths
use crate::config::types::{LifecycleError, Result};
use once_cell::sync::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming a legacy configuration file
pub const LEGACY_CONFIG_ENV: &str = "NIXOS_CONFIG";

static HOSTNAME: OnceCell<String> = OnceCell::new();

/// Local hostname, looked up once per process
pub fn local_hostname() -> Result<&'static str> {
    HOSTNAME
        .get_or_try_init(|| {
            let name = nix::unistd::gethostname()
                .map_err(|e| LifecycleError::UnknownHostname(e.to_string()))?;
            let name = name
                .into_string()
                .map_err(|_| LifecycleError::UnknownHostname("hostname is not UTF-8".to_string()))?;
            if name.is_empty() {
                return Err(LifecycleError::UnknownHostname("hostname is empty".to_string()));
            }
            Ok(name)
        })
        .map(String::as_str)
}

/// `<uri>#<system name>`; the name may be left empty and inferred later
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlakeRef {
    pub uri: String,
    pub system_name: String,
}

impl FlakeRef {
    pub fn parse(reference: &str) -> Self {
        match reference.split_once('#') {
            Some((uri, name)) => Self {
                uri: uri.to_string(),
                system_name: name.to_string(),
            },
            None => Self {
                uri: reference.to_string(),
                system_name: String::new(),
            },
        }
    }

    /// Fill an empty system name from the local hostname
    pub fn infer_system_name(&mut self) -> Result<()> {
        if self.system_name.is_empty() {
            self.system_name = local_hostname()?.to_string();
            log::debug!("Inferred flake system name '{}'", self.system_name);
        }
        Ok(())
    }

    /// Installable for `nix build` for the given build attribute
    pub fn installable(&self, attribute: &str) -> String {
        format!(
            "{}#nixosConfigurations.\"{}\".config.system.build.{}",
            self.uri, self.system_name, attribute
        )
    }
}

impl fmt::Display for FlakeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.uri, self.system_name)
    }
}

/// What to build
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildTarget {
    Flake(FlakeRef),
    Legacy { config_path: PathBuf },
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildTarget::Flake(flake) => write!(f, "{}", flake),
            BuildTarget::Legacy { config_path } => write!(f, "{}", config_path.display()),
        }
    }
}

/// Decide what to build.
///
/// An explicit target wins. Otherwise `config_location` is searched for a
/// `flake.nix`, then `legacy_override` (usually `$NIXOS_CONFIG`), then
/// `<config_location>/configuration.nix`. Flake targets get their system
/// name inferred from the hostname when it was left out.
pub fn resolve_build_target(
    explicit: Option<&str>,
    config_location: &Path,
    legacy_override: Option<PathBuf>,
) -> Result<BuildTarget> {
    let mut target = match explicit {
        Some(reference) => classify_explicit(reference)?,
        None => detect_location(config_location, legacy_override)?,
    };

    if let BuildTarget::Flake(ref mut flake) = target {
        flake.infer_system_name()?;
    }

    log::debug!("Resolved build target {}", target);
    Ok(target)
}

fn classify_explicit(reference: &str) -> Result<BuildTarget> {
    if reference.contains('#') {
        return Ok(BuildTarget::Flake(FlakeRef::parse(reference)));
    }

    let path = Path::new(reference);
    if path.is_dir() {
        if path.join("flake.nix").is_file() {
            return Ok(BuildTarget::Flake(FlakeRef::parse(reference)));
        }
        let config = path.join("configuration.nix");
        if config.is_file() {
            return Ok(BuildTarget::Legacy {
                config_path: config,
            });
        }
        return Err(LifecycleError::ConfigurationNotFound(format!(
            "{} contains neither flake.nix nor configuration.nix",
            path.display()
        )));
    }
    if path.is_file() {
        return Ok(BuildTarget::Legacy {
            config_path: path.to_path_buf(),
        });
    }

    // Remote flake references such as github:owner/repo
    if reference.contains(':') {
        return Ok(BuildTarget::Flake(FlakeRef::parse(reference)));
    }

    Err(LifecycleError::ConfigurationNotFound(format!(
        "{} does not exist",
        reference
    )))
}

fn detect_location(config_location: &Path, legacy_override: Option<PathBuf>) -> Result<BuildTarget> {
    if config_location.join("flake.nix").is_file() {
        return Ok(BuildTarget::Flake(FlakeRef {
            uri: config_location.to_string_lossy().into_owned(),
            system_name: String::new(),
        }));
    }

    if let Some(path) = legacy_override {
        if path.exists() {
            return Ok(BuildTarget::Legacy { config_path: path });
        }
        log::warn!(
            "{} points at missing {}",
            LEGACY_CONFIG_ENV,
            path.display()
        );
    }

    let legacy = config_location.join("configuration.nix");
    if legacy.is_file() {
        return Ok(BuildTarget::Legacy {
            config_path: legacy,
        });
    }

    Err(LifecycleError::ConfigurationNotFound(format!(
        "no flake.nix or configuration.nix in {}",
        config_location.display()
    )))
}
