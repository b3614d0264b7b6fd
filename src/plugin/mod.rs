//! # Plugin execution layer
//!
//! A plugin turns one entry file into bytes. It offers two capabilities behind a
//! single trait: a one-shot `compile`, and a long-lived `watch` that reports new
//! bytes on every source change. Built-ins recompile through
//! [`watch::FileWatch`]; a plugin backed by a tool with its own watch mode can
//! override `watch`.
//!
//! Plugins are matched to files by an ordered list of `(pattern, plugin)` rules.
//! The first rule whose regex matches the absolute path wins.

pub mod builtin;
pub mod watch;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use crate::config::PluginRuleConfig;
use crate::error::{CrxmError, PluginError, Result};

pub use builtin::{CommandPlugin, FilePlugin, ScriptPlugin};
pub use watch::FileWatch;

/// Receives freshly compiled bytes from a watcher thread.
pub type ResultSender = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

pub trait WatchHandle: Send {
    /// Release the underlying file watcher and join its thread.
    fn stop(self: Box<Self>) -> std::result::Result<(), PluginError>;
}

pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn compile(&self, path: &Path) -> std::result::Result<Vec<u8>, PluginError>;

    /// Start watching `path`. Must call `on_result` once with an initial
    /// compilation and again after every change.
    fn watch(
        self: Arc<Self>,
        path: &Path,
        on_result: ResultSender,
    ) -> std::result::Result<Box<dyn WatchHandle>, PluginError>;
}

/// Build and watch plugins chosen for one target.
#[derive(Clone)]
pub struct TargetPlugins {
    pub build: Arc<dyn Plugin>,
    pub watch: Arc<dyn Plugin>,
}

impl fmt::Debug for TargetPlugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetPlugins")
            .field("build", &self.build.name())
            .field("watch", &self.watch.name())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rule lists
// ═══════════════════════════════════════════════════════════════════════════════

struct PluginRule {
    pattern: Regex,
    plugin: Arc<dyn Plugin>,
}

#[derive(Default)]
pub struct PluginRules {
    rules: Vec<PluginRule>,
}

impl fmt::Debug for PluginRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.rules
                    .iter()
                    .map(|r| (r.pattern.as_str(), r.plugin.name())),
            )
            .finish()
    }
}

impl PluginRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pattern: &str, plugin: Arc<dyn Plugin>) -> Result<()> {
        let pattern = Regex::new(pattern).map_err(|source| CrxmError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.rules.push(PluginRule { pattern, plugin });
        Ok(())
    }

    /// Instantiate the built-in plugin named by each rule. Command plugins run
    /// in `root`.
    pub fn from_config(rules: &[PluginRuleConfig], root: &Path) -> Result<Self> {
        let mut out = Self::new();
        for rule in rules {
            out.push(&rule.pattern, builtin::from_rule(rule, root)?)?;
        }
        Ok(out)
    }

    pub fn resolve(&self, path: &Path) -> Option<Arc<dyn Plugin>> {
        let key = path.to_string_lossy();
        self.rules
            .iter()
            .find(|r| r.pattern.is_match(&key))
            .map(|r| Arc::clone(&r.plugin))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Build and watch rule lists from the project config.
#[derive(Debug, Default)]
pub struct PluginSet {
    pub build: PluginRules,
    pub watch: PluginRules,
}

impl PluginSet {
    pub fn from_config(config: &crate::config::ProjectConfig) -> Result<Self> {
        Ok(Self {
            build: PluginRules::from_config(&config.build, &config.root)?,
            watch: PluginRules::from_config(&config.watch, &config.root)?,
        })
    }

    /// Both plugins for `path`. An unmatched path is a configuration error.
    pub fn resolve(&self, path: &Path) -> Result<TargetPlugins> {
        let build = self.build.resolve(path).ok_or_else(|| CrxmError::NoPlugin {
            purpose: "building",
            path: path.to_path_buf(),
        })?;
        let watch = self.watch.resolve(path).ok_or_else(|| CrxmError::NoPlugin {
            purpose: "watching",
            path: path.to_path_buf(),
        })?;
        Ok(TargetPlugins { build, watch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn first_matching_rule_wins() {
        let mut rules = PluginRules::new();
        rules.push(r"\.js$", Arc::new(ScriptPlugin)).unwrap();
        rules.push(r".*", Arc::new(FilePlugin)).unwrap();

        assert_eq!(rules.resolve(Path::new("/p/a.js")).unwrap().name(), "script");
        assert_eq!(rules.resolve(Path::new("/p/a.css")).unwrap().name(), "file");
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let mut rules = PluginRules::new();
        let err = rules.push("(", Arc::new(FilePlugin)).unwrap_err();
        assert!(matches!(err, CrxmError::InvalidPattern { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn unmatched_path_names_the_path() {
        let set = PluginSet::from_config(&crate::config::ProjectConfig::default()).unwrap();
        let err = set.resolve(&PathBuf::from("/p/logo.svg")).unwrap_err();
        assert!(matches!(err, CrxmError::NoPlugin { purpose: "building", .. }));
        assert!(err.to_string().contains("/p/logo.svg"));
    }

    #[test]
    fn default_rules_cover_scripts_styles_and_pages() {
        let set = PluginSet::from_config(&crate::config::ProjectConfig::default()).unwrap();
        assert_eq!(set.resolve(Path::new("/p/c.js")).unwrap().build.name(), "script");
        assert_eq!(set.resolve(Path::new("/p/c.css")).unwrap().build.name(), "file");
        assert_eq!(set.resolve(Path::new("/p/popup.html")).unwrap().watch.name(), "file");
    }
}
