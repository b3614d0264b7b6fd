//! Default watch behaviour: compile once, then recompile whenever the entry file
//! is created or modified.
//!
//! The parent directory is watched (non-recursively) instead of the file itself,
//! since editors that save by rename would otherwise orphan an inode watch.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, warn};

use super::{Plugin, ResultSender, WatchHandle};
use crate::error::PluginError;

const POLL: Duration = Duration::from_millis(100);
const SETTLE: Duration = Duration::from_millis(30);

pub struct FileWatch {
    watcher: Option<RecommendedWatcher>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    path: PathBuf,
}

impl FileWatch {
    pub fn start(
        plugin: Arc<dyn Plugin>,
        path: &Path,
        on_result: ResultSender,
    ) -> Result<Box<dyn WatchHandle>, PluginError> {
        let path = path.to_path_buf();

        // initial compilation; a broken file keeps being watched so a fix recovers
        match plugin.compile(&path) {
            Ok(bytes) => on_result(bytes),
            Err(e) => error!(plugin = plugin.name(), "{e}"),
        }

        let file_name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (tx, rx) = mpsc::channel::<()>();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if relevant {
                        let _ = tx.send(());
                    }
                }
            })
            .map_err(|source| PluginError::Watch {
                plugin: plugin.name().to_string(),
                path: path.clone(),
                source,
            })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| PluginError::Watch {
                plugin: plugin.name().to_string(),
                path: path.clone(),
                source,
            })?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            let path = path.clone();
            thread::spawn(move || loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                match rx.recv_timeout(POLL) {
                    Ok(()) => {
                        // collapse a burst of writes into one compile
                        thread::sleep(SETTLE);
                        while rx.try_recv().is_ok() {}
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }

                        debug!(plugin = plugin.name(), path = %path.display(), "recompiling");
                        match plugin.compile(&path) {
                            Ok(bytes) => on_result(bytes),
                            Err(e) => error!(plugin = plugin.name(), "{e}"),
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            })
        };

        Ok(Box::new(FileWatch {
            watcher: Some(watcher),
            stop,
            thread: Some(thread),
            path,
        }))
    }
}

impl WatchHandle for FileWatch {
    fn stop(mut self: Box<Self>) -> Result<(), PluginError> {
        self.stop.store(true, Ordering::SeqCst);
        self.watcher.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(path = %self.path.display(), "watch thread panicked");
            }
        }
        Ok(())
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}
