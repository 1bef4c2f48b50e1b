//! Incomplete generations are reported at warn level

use log::{Level, LevelFilter, Log, Metadata, Record};
use nixos_genctl::generation::{Profile, ProfileLayout};
use std::fs;
use std::os::unix::fs::symlink;
use std::sync::{Mutex, Once};

struct Recorder {
    records: Mutex<Vec<(Level, String)>>,
}

impl Log for Recorder {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static RECORDER: Recorder = Recorder {
    records: Mutex::new(Vec::new()),
};
static INIT: Once = Once::new();

fn warnings() -> Vec<String> {
    RECORDER
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|(level, _)| *level == Level::Warn)
        .map(|(_, message)| message.clone())
        .collect()
}

#[test]
fn test_partial_generation_is_warned_about() {
    INIT.call_once(|| {
        log::set_logger(&RECORDER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });

    let root = tempfile::tempdir().unwrap();
    let profile = Profile::new("system", &ProfileLayout::with_root(root.path())).unwrap();
    profile.ensure_directory().unwrap();

    let bare = root.path().join("nix/store/aaa-nixos-system-3");
    fs::create_dir_all(&bare).unwrap();
    fs::write(bare.join("nixos-version"), "24.05\n").unwrap();
    symlink(&bare, profile.directory().join("system-3-link")).unwrap();

    let generations = profile.list_generations().unwrap();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0].os_version.as_deref(), Some("24.05"));

    let warned = warnings();
    assert!(
        warned
            .iter()
            .any(|message| message.contains("'system'") && message.contains("generation 3")),
        "no warning among {:?}",
        warned
    );
}
