//! Watches the config file and the manifest, reporting which one changed.
//! Like the plugin watchers, the parent directory is watched and events are
//! filtered by file name.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info};

use crate::error::{CrxmError, Result};

/// Ordered by how much has to be redone: a config change implies a manifest
/// reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProjectChange {
    Manifest,
    Config,
}

pub type ChangeSink = Arc<dyn Fn(ProjectChange) + Send + Sync>;

pub struct ProjectWatcher {
    watchers: Vec<(PathBuf, RecommendedWatcher)>,
}

impl ProjectWatcher {
    pub fn start(config: Option<&Path>, manifest: &Path, sink: ChangeSink) -> Result<Self> {
        let mut watchers = Vec::with_capacity(2);
        if let Some(config) = config {
            watchers.push((config.to_path_buf(), watch_file(config, ProjectChange::Config, Arc::clone(&sink))?));
        }
        watchers.push((manifest.to_path_buf(), watch_file(manifest, ProjectChange::Manifest, sink)?));
        info!(files = watchers.len(), "watching config and manifest");
        Ok(Self { watchers })
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.watchers.iter().map(|(p, _)| p.as_path())
    }

    pub fn stop(self) {
        for (path, watcher) in self.watchers {
            drop(watcher);
            debug!(path = %path.display(), "stopped watching");
        }
    }
}

fn watch_file(path: &Path, change: ProjectChange, sink: ChangeSink) -> Result<RecommendedWatcher> {
    let file_name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let watch_err = |source| CrxmError::Watch {
        path: path.to_path_buf(),
        source,
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let relevant = (event.kind.is_modify() || event.kind.is_create())
                && event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()));
            if relevant {
                sink(change);
            }
        }
    })
    .map_err(watch_err)?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(watch_err)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn reports_which_file_changed() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("crxm.config.toml");
        let manifest = dir.path().join("manifest.json");
        fs::write(&config, "").unwrap();
        fs::write(&manifest, "{}").unwrap();

        let seen: Arc<Mutex<Vec<ProjectChange>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let watcher = ProjectWatcher::start(
            Some(&config),
            &manifest,
            Arc::new(move |c| sink.lock().push(c)),
        )
        .unwrap();
        assert_eq!(watcher.paths().count(), 2);

        fs::write(&manifest, r#"{"name":"x"}"#).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && !seen.lock().contains(&ProjectChange::Manifest) {
            thread::sleep(Duration::from_millis(20));
        }
        watcher.stop();

        assert!(seen.lock().contains(&ProjectChange::Manifest));
        assert!(!seen.lock().contains(&ProjectChange::Config));
    }

    #[test]
    fn config_outranks_manifest() {
        assert!(ProjectChange::Config > ProjectChange::Manifest);
    }
}
