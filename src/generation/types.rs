use crate::config::types::{LifecycleError, ReadFailure, ReadFailureKind};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One built system closure, discovered from a profile directory
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub number: u64,
    pub creation_time: Option<DateTime<Local>>,
    pub is_current: bool,
    pub kernel_version: Option<String>,
    /// Sorted lexicographically
    pub specializations: Vec<String>,
    pub os_version: Option<String>,
    pub source_revision: Option<String>,
    pub configuration_revision: Option<String>,
    pub description: Option<String>,
    /// The `<profile>-<number>-link` entry this generation was read from
    #[serde(skip)]
    pub path: PathBuf,
}

impl Generation {
    pub(crate) fn empty(number: u64, path: PathBuf) -> Self {
        Self {
            number,
            creation_time: None,
            is_current: false,
            kernel_version: None,
            specializations: Vec::new(),
            os_version: None,
            source_revision: None,
            configuration_revision: None,
            description: None,
            path,
        }
    }
}

/// Per-generation `nixos-version.json`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationManifest {
    pub nixos_version: Option<String>,
    pub nixpkgs_revision: Option<String>,
    pub configuration_revision: Option<String>,
    pub description: Option<String>,
}

/// A best-effort value together with the independent reads that failed
/// while producing it.
#[derive(Clone, Debug)]
pub struct PartialRead<T> {
    pub value: T,
    pub failures: Vec<ReadFailure>,
}

impl<T> PartialRead<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            failures: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, kind: ReadFailureKind, message: impl Into<String>) {
        self.failures.push(ReadFailure {
            kind,
            message: message.into(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, kind: ReadFailureKind) -> bool {
        self.failures.iter().any(|f| f.kind == kind)
    }
}

impl PartialRead<Generation> {
    /// The aggregate error for this read, if any sub-read failed
    pub fn aggregate_error(&self) -> Option<LifecycleError> {
        if self.failures.is_empty() {
            return None;
        }
        Some(LifecycleError::GenerationReadPartial {
            number: self.value.number,
            failures: self.failures.clone(),
        })
    }
}
