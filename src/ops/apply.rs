/// Build a configuration and switch to it
use crate::activation::builder::NixBuilder;
use crate::activation::planner::{ActivationPlanner, ApplyOutcome, ApplyRequest};
use crate::config::settings::Settings;
use crate::config::types::Result;

pub fn apply(settings: &Settings, request: &ApplyRequest) -> Result<()> {
    let builder = NixBuilder::new(settings.verbose);
    let planner = ActivationPlanner::new(&builder, settings);

    match planner.apply(request)? {
        ApplyOutcome::Evaluated => {}
        ApplyOutcome::VirtualMachine { run_script } => {
            println!(
                "Done. The virtual machine can be started by running {}",
                run_script.display()
            );
        }
        ApplyOutcome::Built {
            store_path,
            generation,
            action,
        } => {
            if let Some(number) = generation {
                log::info!("Generation {} published", number);
            }
            match (action, &request.output_link) {
                (None, Some(link)) => println!("{}", link.display()),
                (None, None) => println!("{}", store_path.display()),
                (Some(action), _) => log::info!("Finished {}", action),
            }
        }
    }
    Ok(())
}
