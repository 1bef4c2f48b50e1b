/// Generation directory name parsing and best-effort field reads
use crate::config::types::ReadFailureKind;
use crate::generation::types::{Generation, GenerationManifest, PartialRead};
use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "nixos-version.json";
pub const VERSION_FILE: &str = "nixos-version";
pub const KERNEL_MODULES_DIR: &str = "kernel-modules/lib/modules";
pub const SPECIALISATION_DIR: &str = "specialisation";

/// Directory entry name for generation `number` of `profile`
pub fn generation_link_name(profile: &str, number: u64) -> String {
    format!("{}-{}-link", profile, number)
}

/// Parse `"<profile>-<digits>-link"` back into its number.
///
/// Anything else, including names with a sign, whitespace or an empty number,
/// is not a generation entry.
pub fn parse_generation_name(profile: &str, name: &str) -> Option<u64> {
    let rest = name.strip_prefix(profile)?.strip_prefix('-')?;
    let digits = rest.strip_suffix("-link")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Read everything that can be read about the generation at `path`.
///
/// Each field is read independently; a failure is recorded and the
/// remaining fields are still populated.
pub fn read_generation(path: &Path, number: u64) -> PartialRead<Generation> {
    let mut read = PartialRead::new(Generation::empty(number, path.to_path_buf()));

    match creation_time(path) {
        Ok(time) => read.value.creation_time = Some(time),
        Err(e) => read.record(ReadFailureKind::CreationTime, e.to_string()),
    }

    match read_manifest(&path.join(MANIFEST_FILE)) {
        Ok(manifest) => {
            let generation = &mut read.value;
            generation.os_version = manifest.nixos_version;
            generation.source_revision = manifest.nixpkgs_revision;
            generation.configuration_revision = manifest.configuration_revision;
            generation.description = manifest.description;
        }
        Err(message) => read.record(ReadFailureKind::Manifest, message),
    }

    if read.value.os_version.is_none() {
        match fs::read_to_string(path.join(VERSION_FILE)) {
            Ok(content) => read.value.os_version = Some(content.trim().to_string()),
            Err(e) => read.record(
                ReadFailureKind::VersionFile,
                format!("{}: {}", path.join(VERSION_FILE).display(), e),
            ),
        }
    }

    match kernel_version(&path.join(KERNEL_MODULES_DIR)) {
        Ok(version) => read.value.kernel_version = Some(version),
        Err(message) => read.record(ReadFailureKind::KernelVersion, message),
    }

    match specializations(&path.join(SPECIALISATION_DIR)) {
        Ok(names) => read.value.specializations = names,
        Err(e) => read.record(
            ReadFailureKind::Specializations,
            format!("{}: {}", path.join(SPECIALISATION_DIR).display(), e),
        ),
    }

    read
}

/// Birth time of the generation link, else its modification time
fn creation_time(path: &Path) -> io::Result<DateTime<Local>> {
    let metadata = fs::symlink_metadata(path)?;
    let time = metadata.created().or_else(|_| metadata.modified())?;
    Ok(DateTime::<Local>::from(time))
}

fn read_manifest(path: &Path) -> Result<GenerationManifest, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

fn kernel_version(modules_dir: &Path) -> Result<String, String> {
    let mut names = sorted_entry_names(modules_dir)
        .map_err(|e| format!("{}: {}", modules_dir.display(), e))?;
    if names.is_empty() {
        return Err(format!("{}: no kernel modules directory", modules_dir.display()));
    }
    Ok(names.remove(0))
}

/// Specialisation names; a generation without the directory has none
fn specializations(dir: &Path) -> io::Result<Vec<String>> {
    match sorted_entry_names(dir) {
        Ok(names) => Ok(names),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn sorted_entry_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Path of the generation entry inside a profile directory
pub fn generation_path(directory: &Path, profile: &str, number: u64) -> PathBuf {
    directory.join(generation_link_name(profile, number))
}
