//! # Orchestrator
//!
//! [`Pipeline`] owns every stage (config, manifest, plugins, registry,
//! registerer, popup resolver, distributor) and exposes them in the order the
//! drivers call them: load → register → compile or watch → dist. Registry
//! mutation only happens through `&mut self`, so there is one writer at a time.

pub mod build;
pub mod dev;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{ConfigLoader, ProjectConfig};
use crate::emit::{DistInput, DistReport, Distributor};
use crate::error::Result;
use crate::manifest::{load_manifest, ManifestModel, ManifestResources};
use crate::plugin::PluginSet;
use crate::popup::PopupResolver;
use crate::registerer::{BundlerRegisterer, RegistrationReport};
use crate::registry::TargetRegistry;
use crate::telemetry;

pub use build::build;
pub use dev::{DevSession, DRAIN_INTERVAL};

pub struct Pipeline {
    loader: ConfigLoader,
    config: ProjectConfig,
    manifest: ManifestModel,
    resources: ManifestResources,
    plugins: PluginSet,
    registry: TargetRegistry,
    registerer: BundlerRegisterer,
    popup: PopupResolver,
    distributor: Distributor,
}

impl Pipeline {
    /// Load the config and the manifest. Nothing is registered yet.
    pub fn open(mut loader: ConfigLoader, dev: bool) -> Result<Self> {
        let config = loader.load_config()?.clone();
        telemetry::init_tracing(config.log_level);

        let manifest = load_manifest(&config.manifest_path())?;
        let resources = ManifestResources::parse(&manifest, &config.project_dir());
        let plugins = PluginSet::from_config(&config)?;
        info!(
            manifest = %config.manifest_path().display(),
            dev,
            "project loaded"
        );

        Ok(Self {
            loader,
            config,
            manifest,
            resources,
            plugins,
            registry: TargetRegistry::new(),
            registerer: BundlerRegisterer::new(),
            popup: PopupResolver::new(),
            distributor: Distributor::new(dev),
        })
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.loader.config_path()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config.manifest_path()
    }

    pub fn manifest(&self) -> &ManifestModel {
        &self.manifest
    }

    pub fn resources(&self) -> &ManifestResources {
        &self.resources
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TargetRegistry {
        &mut self.registry
    }

    pub fn popup(&self) -> &PopupResolver {
        &self.popup
    }

    pub fn build_id(&self) -> &str {
        self.distributor.build_id()
    }

    /// Fresh config read. Plugin rules may have changed, so every target is
    /// dropped and the manifest is registered from scratch on the next
    /// [`register`](Self::register).
    pub fn reload_config(&mut self) -> Result<()> {
        let config = self.loader.load_config()?.clone();
        let plugins = PluginSet::from_config(&config)?;

        self.config = config;
        self.plugins = plugins;
        self.registry.clear();
        self.registerer.reset();
        self.popup = PopupResolver::new();
        debug!("config reloaded");

        self.reload_manifest()
    }

    /// Fresh manifest read; the previous model is replaced wholesale.
    pub fn reload_manifest(&mut self) -> Result<()> {
        let manifest = load_manifest(&self.config.manifest_path())?;
        self.resources = ManifestResources::parse(&manifest, &self.config.project_dir());
        self.manifest = manifest;
        debug!("manifest reloaded");
        Ok(())
    }

    pub fn register(&mut self) -> Result<RegistrationReport> {
        self.registerer.register_all(
            &self.resources,
            &self.plugins,
            &mut self.registry,
            &mut self.popup,
        )
    }

    /// Re-read the popup page. Returns whether its resource set changed.
    pub fn refresh_popup(&mut self) -> Result<bool> {
        self.popup.refresh(&self.plugins, &mut self.registry)
    }

    pub fn cleanup(&mut self) -> Result<()> {
        self.distributor.cleanup(&self.config)
    }

    pub fn dist(&mut self) -> Result<DistReport> {
        let project_dir = self.config.project_dir();
        let mut input = DistInput {
            config: &self.config,
            manifest: &self.manifest,
            resources: &self.resources,
            project_dir: &project_dir,
            registry: &self.registry,
            popup: &mut self.popup,
        };
        self.distributor.dist(&mut input)
    }
}
