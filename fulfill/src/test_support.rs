//! Test-only helpers for building controllers and config files.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use crate::core::registry::ActionSpec;
use crate::core::task::Params;

/// Callback controller that answers with `respond(&params)` after `delay`.
///
/// Runs on a spawned tokio task, so it needs a runtime; under
/// `start_paused` the delay is virtual.
pub fn delayed<F>(delay: Duration, respond: F) -> ActionSpec
where
    F: Fn(&Params) -> String + Send + Sync + 'static,
{
    let respond = Arc::new(respond);
    ActionSpec::callback(move |params, next| {
        let respond = Arc::clone(&respond);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = next.resolve(respond(&params));
        });
    })
}

/// Shared, ordered log of events recorded by controllers.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().expect("recorder lock").push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("recorder lock").clone()
    }
}

/// Temp dir holding `fulfill.toml` with `contents`; keep the dir alive.
pub fn config_file(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fulfill.toml");
    fs::write(&path, contents).expect("write config");
    (dir, path)
}
