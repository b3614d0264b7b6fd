//! # crx-monkey
//!
//! One manifest in, two artifacts out: a Chrome MV3 extension directory and a
//! Tampermonkey userscript.
//!
//! ## Pipeline
//!
//! 1. **Config**: `crxm.config.toml` (or `.json`) is located and parsed into a
//!    [`ProjectConfig`].
//! 2. **Manifest**: the project manifest is loaded and every referenced source
//!    (content scripts, styles, service worker, popup page, icons) is resolved
//!    against the project directory.
//! 3. **Registration**: each source becomes a build target in the
//!    [`registry::TargetRegistry`], paired with the plugins that match its path.
//!    Re-registration only touches what the manifest added or removed.
//! 4. **Compilation**: targets are compiled once in parallel, or watched.
//! 5. **Emission**: the extension tree is written under content-hashed names
//!    with a rewritten `manifest.json`, and the userscript is synthesized from the
//!    same compiled results.
//!
//! ## Userscript invariants
//!
//! - Every compiled source becomes a uniquely named function. The name is derived
//!   from the source path only, so it is stable across builds.
//! - Styles are applied before scripts of the same entry.
//! - An entry only runs when `location.href` matches one of its patterns, at the
//!   point its `run_at` asks for.
//!
//! [`build`] drives the one-shot pipeline; [`DevSession`] keeps it running and
//! pushes reload tokens to the clients.

pub mod config;
pub mod devclient;
pub mod diff;
pub mod emit;
pub mod error;
pub mod js;
pub mod manifest;
pub mod orchestrator;
pub mod plugin;
pub mod popup;
pub mod registerer;
pub mod registry;
pub mod reload;
pub mod telemetry;
pub mod template;
pub mod userscript;
pub mod watcher;

#[cfg(test)]
mod registry_tests;

pub use config::{ConfigLoader, LogLevel, ProjectConfig};
pub use emit::{DistReport, Distributor};
pub use error::{CrxmError, PluginError, Result};
pub use manifest::{ManifestModel, ManifestResources};
pub use orchestrator::{build, DevSession, Pipeline};
pub use registry::{BuildTarget, TargetFlag, TargetHandle, TargetRegistry};
pub use reload::{ReloadChannel, ReloadToken, TracingReloadChannel};
pub use userscript::{build_userscript, UserscriptBundle};
