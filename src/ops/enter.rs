/// Run a command inside an installed root
use crate::config::types::Result;
use crate::exec::preexec::{EnterCommand, Sandbox, SandboxOptions};
use std::convert::Infallible;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct EnterRequest {
    pub root: PathBuf,
    pub system: PathBuf,
    pub command: EnterCommand,
    pub silent: bool,
}

/// Does not return on success: the process becomes `request.command`
pub fn enter(request: &EnterRequest) -> Result<Infallible> {
    let options = SandboxOptions {
        root: request.root.clone(),
        system: request.system.clone(),
        silent: request.silent,
        ..Default::default()
    };

    Sandbox::new(options)
        .enter_namespace()?
        .validate_root()?
        .prepare_mounts()?
        .activate()?
        .exec(&request.command)
}
