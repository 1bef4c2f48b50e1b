use crate::activation::planner::ApplyRequest;
use crate::config::settings::Settings;
use crate::config::types::{ActivationAction, BuildType, LifecycleError};
use crate::exec::preexec::{EnterCommand, DEFAULT_SYSTEM};
use crate::ops;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "genctl", author, version, about, long_about = None)]
struct Cli {
    /// Debug logging and verbose build output
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Settings file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a configuration and activate it
    Apply(ApplyArgs),
    /// Install a configuration into a mounted root
    Install {
        /// Root to install into [default: settings `root`]
        #[arg(long)]
        root: Option<PathBuf>,
        /// Flake reference (`uri#name`) or configuration path
        target: Option<String>,
        /// Do not prompt for a root password
        #[arg(long)]
        no_root_passwd: bool,
        /// Do not install the bootloader
        #[arg(long)]
        no_bootloader: bool,
        /// Extra argument passed to the builder (repeatable)
        #[arg(long = "build-arg", value_name = "ARG", allow_hyphen_values = true)]
        build_args: Vec<String>,
    },
    /// Run a command or shell inside an installed root
    Enter {
        /// Root to enter [default: settings `root`]
        #[arg(long)]
        root: Option<PathBuf>,
        /// System to activate, as seen from inside the root
        #[arg(long, default_value = DEFAULT_SYSTEM)]
        system: PathBuf,
        /// Command line run through a login shell
        #[arg(short, long, conflicts_with = "args")]
        command: Option<String>,
        /// Hide activation output
        #[arg(long)]
        silent: bool,
        /// Command and arguments to execute
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Inspect and switch generations
    #[command(subcommand)]
    Generation(GenerationCommands),
}

#[derive(Args)]
struct ApplyArgs {
    /// Flake reference (`uri#name`) or configuration path
    target: Option<String>,
    /// Evaluate only, or dry-activate when activating
    #[arg(long)]
    dry: bool,
    /// Do not activate the new configuration now
    #[arg(long)]
    no_activate: bool,
    /// Do not make the new configuration the boot default
    #[arg(long)]
    no_boot: bool,
    /// Build a virtual machine instead
    #[arg(long, conflicts_with = "vm_with_bootloader")]
    vm: bool,
    /// Build a virtual machine that boots through its bootloader
    #[arg(long)]
    vm_with_bootloader: bool,
    /// Activate this specialisation
    #[arg(short, long)]
    specialisation: Option<String>,
    /// Publish to this profile instead of the default
    #[arg(short, long)]
    profile_name: Option<String>,
    /// (Re)install the bootloader during activation
    #[arg(long)]
    install_bootloader: bool,
    /// Keep a result symlink here
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Extra argument passed to the builder (repeatable)
    #[arg(long = "build-arg", value_name = "ARG", allow_hyphen_values = true)]
    build_args: Vec<String>,
}

#[derive(Subcommand)]
enum GenerationCommands {
    /// List generations of a profile
    List {
        #[arg(short, long)]
        profile: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Activate an existing generation
    Switch {
        number: u64,
        #[arg(short, long)]
        profile: Option<String>,
        #[arg(long)]
        dry: bool,
        #[arg(short, long)]
        specialisation: Option<String>,
    },
    /// Activate the generation before the current one
    Rollback {
        #[arg(short, long)]
        profile: Option<String>,
        #[arg(long)]
        dry: bool,
        #[arg(short, long)]
        specialisation: Option<String>,
    },
}

impl ApplyArgs {
    fn into_request(self) -> Result<ApplyRequest> {
        let activate = !self.no_activate;
        let boot = !self.no_boot;
        ActivationAction::from_flags(activate, boot, self.dry)
            .context("--dry together with --no-activate requires --no-boot")?;

        let vm = if self.vm {
            Some(BuildType::VM)
        } else if self.vm_with_bootloader {
            Some(BuildType::VMWithBootloader)
        } else {
            None
        };

        Ok(ApplyRequest {
            target: self.target,
            vm,
            activate,
            boot,
            dry: self.dry,
            specialization: self.specialisation,
            profile_name: self.profile_name,
            install_bootloader: self.install_bootloader,
            output_link: self.output,
            extra_build_args: self.build_args,
        })
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

/// Parse arguments, run the requested operation and return the process exit
/// code. Errors are printed as a single line.
pub fn run() -> i32 {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {:#}", err);
            exit_code(&err)
        }
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<LifecycleError>()
        .map_or(1, LifecycleError::exit_code)
}

fn dispatch(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())
        .context("loading settings")?
        .with_verbose(cli.verbose);

    match cli.command {
        Commands::Apply(args) => {
            let request = args.into_request()?;
            ops::apply::apply(&settings, &request)?;
        }
        Commands::Install {
            root,
            target,
            no_root_passwd,
            no_bootloader,
            build_args,
        } => {
            let request = ops::install::InstallRequest {
                root: root.unwrap_or_else(|| settings.root.clone()),
                target,
                bootloader: !no_bootloader,
                root_passwd: !no_root_passwd,
                extra_build_args: build_args,
            };
            ops::install::install(&settings, &request)?;
        }
        Commands::Enter {
            root,
            system,
            command,
            silent,
            args,
        } => {
            let request = ops::enter::EnterRequest {
                root: root.unwrap_or_else(|| settings.root.clone()),
                system,
                command: EnterCommand::from_parts(command, args)?,
                silent,
            };
            match ops::enter::enter(&request)? {}
        }
        Commands::Generation(GenerationCommands::List { profile, json }) => {
            ops::generation::list(&settings, profile.as_deref(), json)?;
        }
        Commands::Generation(GenerationCommands::Switch {
            number,
            profile,
            dry,
            specialisation,
        }) => {
            ops::generation::switch(
                &settings,
                profile.as_deref(),
                Some(number),
                dry,
                specialisation.as_deref(),
            )?;
        }
        Commands::Generation(GenerationCommands::Rollback {
            profile,
            dry,
            specialisation,
        }) => {
            ops::generation::switch(&settings, profile.as_deref(), None, dry, specialisation.as_deref())?;
        }
    }
    Ok(())
}
