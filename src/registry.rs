//! # Build-target registry
//!
//! Maps a random handle to `{entry point, plugins, category}` and owns the table
//! of compiled results. Handles are fresh UUIDs on every add, so a handle kept
//! past its target's removal simply finds nothing.
//!
//! Watch lifecycle is `stopped → watching → stopped`. Watchers run on their own
//! threads and write results through a shared table; listeners are invoked on
//! those threads after each store.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CrxmError, PluginError, Result};
use crate::plugin::{ResultSender, TargetPlugins, WatchHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFlag {
    Content,
    Sw,
    Css,
    Html,
    HtmlScript,
    HtmlHref,
}

impl TargetFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetFlag::Content => "content",
            TargetFlag::Sw => "sw",
            TargetFlag::Css => "css",
            TargetFlag::Html => "html",
            TargetFlag::HtmlScript => "html_script",
            TargetFlag::HtmlHref => "html_href",
        }
    }
}

impl fmt::Display for TargetFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetHandle(String);

impl TargetHandle {
    fn generate() -> Self {
        TargetHandle(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct BuildTarget {
    pub handle: TargetHandle,
    pub entry_point: PathBuf,
    pub plugins: TargetPlugins,
    pub flag: TargetFlag,
}

impl BuildTarget {
    fn matches(&self, path: &Path, flag: Option<TargetFlag>) -> bool {
        self.entry_point == path && flag.map_or(true, |f| f == self.flag)
    }
}

pub type TargetListener = Arc<dyn Fn(&BuildTarget) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Stopped,
    Watching,
}

type ResultTable = Arc<RwLock<HashMap<TargetHandle, Arc<[u8]>>>>;
type ListenerTable = Arc<RwLock<Vec<(ListenerId, TargetListener)>>>;

pub struct TargetRegistry {
    targets: Vec<BuildTarget>,
    results: ResultTable,
    listeners: ListenerTable,
    next_listener: u64,
    watchers: Vec<(TargetHandle, Box<dyn WatchHandle>)>,
    state: WatchState,
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetRegistry")
            .field("targets", &self.targets)
            .field("state", &self.state)
            .finish()
    }
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            results: Arc::default(),
            listeners: Arc::default(),
            next_listener: 0,
            watchers: Vec::new(),
            state: WatchState::Stopped,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Registration
    // ═══════════════════════════════════════════════════════════════════════════

    /// Always creates a new target; the same path may be registered repeatedly.
    pub fn add_target(
        &mut self,
        entry_point: impl Into<PathBuf>,
        plugins: TargetPlugins,
        flag: TargetFlag,
    ) -> TargetHandle {
        let handle = TargetHandle::generate();
        let entry_point = entry_point.into();
        debug!(%handle, %flag, entry = %entry_point.display(), "add target");

        self.targets.push(BuildTarget {
            handle: handle.clone(),
            entry_point,
            plugins,
            flag,
        });
        handle
    }

    /// Remove the first target matching `path` (and `flag`, when given),
    /// stopping its watcher first. No match is a no-op.
    pub fn remove_target(&mut self, path: &Path, flag: Option<TargetFlag>) {
        if let Some(index) = self.targets.iter().position(|t| t.matches(path, flag)) {
            let target = self.targets.remove(index);
            if let Some(i) = self.watchers.iter().position(|(h, _)| *h == target.handle) {
                let (_, watcher) = self.watchers.remove(i);
                if let Err(e) = watcher.stop() {
                    warn!("{e}");
                }
            }
            self.results.write().remove(&target.handle);
            debug!(handle = %target.handle, flag = %target.flag, entry = %path.display(), "remove target");
        }
    }

    /// Stop watching and drop every target and result. Listeners stay.
    pub fn clear(&mut self) {
        self.stop_watch();
        self.targets.clear();
        self.results.write().clear();
    }

    pub fn handle_for_path(&self, path: &Path, flag: Option<TargetFlag>) -> Option<TargetHandle> {
        self.targets
            .iter()
            .find(|t| t.matches(path, flag))
            .map(|t| t.handle.clone())
    }

    pub fn target(&self, handle: &TargetHandle) -> Option<&BuildTarget> {
        self.targets.iter().find(|t| &t.handle == handle)
    }

    pub fn targets(&self) -> &[BuildTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Results
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn result(&self, handle: &TargetHandle) -> Option<Arc<[u8]>> {
        self.results.read().get(handle).cloned()
    }

    pub fn result_for_path(&self, path: &Path, flag: Option<TargetFlag>) -> Option<Arc<[u8]>> {
        self.handle_for_path(path, flag)
            .and_then(|handle| self.result(&handle))
    }

    /// Result for `path`, compiling the target on the spot when nothing has been
    /// stored yet. `None` means no such target is registered.
    pub fn result_or_compile(
        &self,
        path: &Path,
        flag: Option<TargetFlag>,
    ) -> Result<Option<Arc<[u8]>>> {
        let Some(handle) = self.handle_for_path(path, flag) else {
            return Ok(None);
        };
        if let Some(bytes) = self.result(&handle) {
            return Ok(Some(bytes));
        }

        debug!(%handle, entry = %path.display(), "result not ready, forcing compile");
        self.compile_force(&handle)?;
        Ok(self.result(&handle))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Compilation
    // ═══════════════════════════════════════════════════════════════════════════

    fn ensure_entries(&self) -> Result<()> {
        match self.targets.iter().find(|t| !t.entry_point.is_file()) {
            Some(missing) => Err(CrxmError::MissingEntry(missing.entry_point.clone())),
            None => Ok(()),
        }
    }

    /// Compile every target once, in parallel. Any missing entry or plugin
    /// failure fails the whole batch.
    pub fn build(&self) -> Result<()> {
        self.ensure_entries()?;

        let compiled: Vec<(TargetHandle, std::result::Result<Vec<u8>, PluginError>)> = self
            .targets
            .par_iter()
            .map(|t| (t.handle.clone(), t.plugins.build.compile(&t.entry_point)))
            .collect();

        let mut fresh = HashMap::with_capacity(compiled.len());
        for (handle, result) in compiled {
            fresh.insert(handle, Arc::from(result?));
        }

        info!(targets = fresh.len(), "compiled all targets");
        *self.results.write() = fresh;
        Ok(())
    }

    /// Recompile one target with its build plugin, whatever the watch state.
    pub fn compile_force(&self, handle: &TargetHandle) -> Result<BuildTarget> {
        let target = self
            .target(handle)
            .cloned()
            .ok_or_else(|| CrxmError::UnknownTarget(handle.to_string()))?;

        let bytes = target.plugins.build.compile(&target.entry_point)?;
        self.results.write().insert(target.handle.clone(), Arc::from(bytes));
        Ok(target)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Watching
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn state(&self) -> WatchState {
        self.state
    }

    fn sender_for(&self, target: &BuildTarget) -> ResultSender {
        let results = Arc::clone(&self.results);
        let listeners = Arc::clone(&self.listeners);
        let target = target.clone();

        Arc::new(move |bytes: Vec<u8>| {
            results
                .write()
                .insert(target.handle.clone(), Arc::from(bytes));
            debug!(handle = %target.handle, flag = %target.flag, "watch result stored");

            // snapshot so a listener may add or remove listeners
            let snapshot: Vec<TargetListener> =
                listeners.read().iter().map(|(_, l)| Arc::clone(l)).collect();
            for listener in snapshot {
                listener(&target);
            }
        })
    }

    pub fn watch(&mut self) -> Result<()> {
        if self.state == WatchState::Watching {
            return Err(CrxmError::WatchAlreadyActive);
        }
        self.ensure_entries()?;

        let mut started: Vec<(TargetHandle, Box<dyn WatchHandle>)> =
            Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let sender = self.sender_for(target);
            match Arc::clone(&target.plugins.watch).watch(&target.entry_point, sender) {
                Ok(handle) => started.push((target.handle.clone(), handle)),
                Err(e) => {
                    for (_, handle) in started {
                        if let Err(stop_err) = handle.stop() {
                            warn!("{stop_err}");
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        info!(targets = started.len(), "watching");
        self.watchers = started;
        self.state = WatchState::Watching;
        Ok(())
    }

    /// Stop and join every watcher. Always safe to call.
    pub fn stop_watch(&mut self) {
        for (_, handle) in self.watchers.drain(..) {
            if let Err(e) = handle.stop() {
                warn!("{e}");
            }
        }
        self.state = WatchState::Stopped;
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Listeners
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn add_listener(&mut self, listener: TargetListener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.write().retain(|(l, _)| *l != id);
    }
}

impl Drop for TargetRegistry {
    fn drop(&mut self) {
        self.stop_watch();
    }
}
