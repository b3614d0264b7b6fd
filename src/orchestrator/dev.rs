//! Development driver: watch everything, re-emit on change, tell the clients.
//!
//! Watcher threads never touch the pipeline. They only record work in a single
//! pending slot; [`DevSession::process_pending`] drains it on the driver's
//! thread, every [`DRAIN_INTERVAL`] when [`DevSession::run`] is used. A burst
//! of events therefore becomes one pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info};

use super::Pipeline;
use crate::config::ConfigLoader;
use crate::error::{CrxmError, Result};
use crate::registry::{BuildTarget, ListenerId, TargetFlag};
use crate::reload::{ConsoleLevel, ReloadChannel, ReloadToken};
use crate::watcher::{ProjectChange, ProjectWatcher};

pub const DRAIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Pending {
    project: Option<ProjectChange>,
    targets: Vec<BuildTarget>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.project.is_none() && self.targets.is_empty()
    }
}

/// What one drained pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevPass {
    Idle,
    Reloaded(ProjectChange),
    Updated(Vec<ReloadToken>),
}

pub struct DevSession {
    pipeline: Pipeline,
    channel: Arc<dyn ReloadChannel>,
    pending: Arc<Mutex<Pending>>,
    project_watcher: Option<ProjectWatcher>,
    listener: Option<ListenerId>,
    stop: Arc<AtomicBool>,
}

impl DevSession {
    /// Initial pipeline: clean, register, watch, emit, then watch the config
    /// and manifest.
    pub fn start(loader: ConfigLoader, channel: Arc<dyn ReloadChannel>) -> Result<Self> {
        let pipeline = Pipeline::open(loader, true)?;
        let mut session = Self {
            pipeline,
            channel,
            pending: Arc::default(),
            project_watcher: None,
            listener: None,
            stop: Arc::new(AtomicBool::new(false)),
        };

        session.pipeline.cleanup()?;
        session.pipeline.register()?;
        session.listen();
        session.restart_watch()?;
        // a broken source must not keep the session from starting
        if let Err(e) = session.pipeline.dist() {
            session.report(&e);
        }
        session.watch_project()?;

        info!(build_id = session.pipeline.build_id(), "dev session started");
        Ok(session)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Set to stop [`run`](Self::run) after its current pass.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Record a config or manifest change as if the project watcher saw it.
    pub fn queue(&self, change: ProjectChange) {
        let mut pending = self.pending.lock();
        pending.project = pending.project.max(Some(change));
    }

    /// Forward watch results into the pending slot. Registered once per session.
    fn listen(&mut self) {
        if self.listener.is_some() {
            return;
        }
        let pending = Arc::clone(&self.pending);
        let id = self
            .pipeline
            .registry_mut()
            .add_listener(Arc::new(move |target: &BuildTarget| {
                let mut pending = pending.lock();
                if !pending.targets.iter().any(|t| t.handle == target.handle) {
                    pending.targets.push(target.clone());
                }
            }));
        self.listener = Some(id);
    }

    fn watch_project(&mut self) -> Result<()> {
        if let Some(old) = self.project_watcher.take() {
            old.stop();
        }
        let pending = Arc::clone(&self.pending);
        let watcher = ProjectWatcher::start(
            self.pipeline.config_path(),
            &self.pipeline.manifest_path(),
            Arc::new(move |change| {
                let mut pending = pending.lock();
                pending.project = pending.project.max(Some(change));
            }),
        )?;
        self.project_watcher = Some(watcher);
        Ok(())
    }

    /// Restart every target watcher. Their initial compiles are already in the
    /// result table, so the updates they queued are dropped.
    fn restart_watch(&mut self) -> Result<()> {
        let registry = self.pipeline.registry_mut();
        registry.stop_watch();
        registry.watch()?;
        self.pending.lock().targets.clear();
        Ok(())
    }

    /// Drain the pending slot once.
    pub fn process_pending(&mut self) -> Result<DevPass> {
        let work = std::mem::take(&mut *self.pending.lock());
        if work.is_empty() {
            return Ok(DevPass::Idle);
        }

        if let Some(change) = work.project {
            self.reload(change)?;
            return Ok(DevPass::Reloaded(change));
        }

        let mut restart = false;
        if work.targets.iter().any(|t| t.flag == TargetFlag::Html) {
            restart = self.pipeline.refresh_popup()?;
        }
        if restart {
            self.restart_watch()?;
        }
        self.pipeline.dist()?;

        let mut tokens: Vec<ReloadToken> = Vec::new();
        for target in &work.targets {
            let token = ReloadToken::for_flag(target.flag);
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        for token in &tokens {
            self.channel.send(*token, None);
        }
        info!(targets = work.targets.len(), "rebuilt");
        Ok(DevPass::Updated(tokens))
    }

    fn reload(&mut self, change: ProjectChange) -> Result<()> {
        match change {
            ProjectChange::Config => {
                info!("config updated");
                self.pipeline.reload_config()?;
            }
            ProjectChange::Manifest => {
                info!("manifest updated");
                self.pipeline.reload_manifest()?;
            }
        }

        self.pipeline.register()?;
        self.restart_watch()?;
        self.pipeline.dist()?;
        if change == ProjectChange::Config {
            // the manifest path may have moved
            self.watch_project()?;
        }
        self.channel.send(ReloadToken::All, None);
        Ok(())
    }

    /// Drain every [`DRAIN_INTERVAL`] until the stop flag is set. Errors are
    /// reported and the session keeps going.
    pub fn run(&mut self) {
        while !self.stop.load(Ordering::SeqCst) {
            thread::sleep(DRAIN_INTERVAL);
            if let Err(e) = self.process_pending() {
                self.report(&e);
            }
        }
    }

    fn report(&self, e: &CrxmError) {
        error!(kind = e.name(), "{e}");
        self.channel.console(ConsoleLevel::Error, &e.to_string());
    }

    pub fn shutdown(mut self) {
        if let Some(watcher) = self.project_watcher.take() {
            watcher.stop();
        }
        if let Some(id) = self.listener.take() {
            self.pipeline.registry_mut().remove_listener(id);
        }
        self.pipeline.registry_mut().stop_watch();
        self.stop.store(true, Ordering::SeqCst);
        info!("dev session stopped");
    }
}
