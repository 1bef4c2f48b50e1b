/// Listing, switching and rolling back generations
use crate::activation::builder::NixBuilder;
use crate::activation::planner::{ActivationPlanner, SwitchTarget};
use crate::config::settings::Settings;
use crate::config::types::{LifecycleError, Result};
use crate::generation::{Generation, Profile, ProfileLayout};

pub fn list(settings: &Settings, profile: Option<&str>, json: bool) -> Result<()> {
    let profile = Profile::new(profile.unwrap_or(&settings.default_profile), &ProfileLayout::default())?;
    let generations = profile.list_generations()?;

    if json {
        let out = serde_json::to_string_pretty(&generations)
            .map_err(|e| LifecycleError::Config(format!("Failed to serialize generations: {}", e)))?;
        println!("{}", out);
    } else {
        print!("{}", render_table(&generations));
    }
    Ok(())
}

/// Switch to generation `number`, or to the previous one when `None`
pub fn switch(
    settings: &Settings,
    profile: Option<&str>,
    number: Option<u64>,
    dry: bool,
    specialization: Option<&str>,
) -> Result<()> {
    let builder = NixBuilder::new(settings.verbose);
    let planner = ActivationPlanner::new(&builder, settings);
    let target = number.map_or(SwitchTarget::Previous, SwitchTarget::Number);

    let number = planner.switch_generation(profile, target, dry, specialization)?;
    log::info!("Activated generation {}", number);
    Ok(())
}

/// Human-readable table, one generation per line
pub fn render_table(generations: &[Generation]) -> String {
    let mut out = format!(
        "{:>6}  {:<7}  {:<19}  {:<24}  {:<16}  {}\n",
        "GEN", "CURRENT", "CREATED", "VERSION", "KERNEL", "SPECIALISATIONS"
    );

    for generation in generations {
        let created = generation
            .creation_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let specializations = if generation.specializations.is_empty() {
            "-".to_string()
        } else {
            generation.specializations.join(",")
        };

        out.push_str(&format!(
            "{:>6}  {:<7}  {:<19}  {:<24}  {:<16}  {}\n",
            generation.number,
            if generation.is_current { "*" } else { "" },
            created,
            generation.os_version.as_deref().unwrap_or("-"),
            generation.kernel_version.as_deref().unwrap_or("-"),
            specializations
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_table_marks_current() {
        let mut current = Generation::empty(41, PathBuf::from("/p/system-41-link"));
        current.is_current = true;
        current.os_version = Some("24.05.1234".to_string());
        current.specializations = vec!["gaming".to_string(), "work".to_string()];
        let old = Generation::empty(40, PathBuf::from("/p/system-40-link"));

        let table = render_table(&[current, old]);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("GEN"));
        assert!(lines[1].trim_start().starts_with("41  *"));
        assert!(lines[1].contains("24.05.1234"));
        assert!(lines[1].ends_with("gaming,work"));
        assert!(lines[2].trim_start().starts_with("40"));
        assert!(!lines[2].contains('*'));
    }
}
