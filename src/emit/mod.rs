//! # Emitters
//!
//! Writes compiled results to disk: the extension directory (hashed files,
//! rewritten `manifest.json`, static assets, dev clients) and the userscript.
//! The [`Distributor`] owns the output cache and the session's build id.

pub mod cache;
pub mod extension;
pub mod files;
pub mod userjs;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ProjectConfig;
use crate::devclient::DEV_USERJS_FILE;
use crate::error::Result;
use crate::manifest::{ManifestModel, ManifestResources};
use crate::popup::PopupResolver;
use crate::registry::TargetRegistry;

pub use cache::OutputCache;

/// `var NAME = value;` lines for a category's defines.
pub fn define_prefix(defines: &BTreeMap<String, String>) -> String {
    defines
        .iter()
        .map(|(name, value)| format!("var {name} = {value};\n"))
        .collect()
}

/// Inputs of one emission.
pub struct DistInput<'a> {
    pub config: &'a ProjectConfig,
    pub manifest: &'a ManifestModel,
    pub resources: &'a ManifestResources,
    pub project_dir: &'a Path,
    pub registry: &'a TargetRegistry,
    pub popup: &'a mut PopupResolver,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistReport {
    /// Files actually written; unchanged outputs are not counted.
    pub written: usize,
    pub manifest: Option<PathBuf>,
    pub userjs: Option<PathBuf>,
    pub dev_userjs: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Distributor {
    cache: OutputCache,
    build_id: String,
    dev: bool,
}

impl Distributor {
    pub fn new(dev: bool) -> Self {
        Self {
            cache: OutputCache::new(),
            build_id: Uuid::new_v4().to_string(),
            dev,
        }
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn is_dev(&self) -> bool {
        self.dev
    }

    /// Emit every configured target. An empty output path skips its target.
    pub fn dist(&mut self, input: &mut DistInput<'_>) -> Result<DistReport> {
        let mut report = DistReport::default();

        if let Some(dir) = input.config.chrome_dir() {
            let (written, manifest) = extension::emit(self, input, &dir)?;
            report.written += written;
            report.manifest = Some(manifest);
        }

        if let Some(path) = input.config.userjs_path() {
            let (written, dev_path) = userjs::emit(self, input, &path)?;
            report.written += written;
            report.userjs = Some(path);
            report.dev_userjs = dev_path;
        }

        info!(written = report.written, dev = self.dev, "dist complete");
        Ok(report)
    }

    /// Remove the extension directory and the userscript file(s). Nothing
    /// else is touched.
    pub fn cleanup(&mut self, config: &ProjectConfig) -> Result<()> {
        if let Some(dir) = config.chrome_dir() {
            files::remove_path(&dir)?;
            self.cache.forget_under(&dir);
            debug!(dir = %dir.display(), "removed extension output");
        }
        if let Some(path) = config.userjs_path() {
            files::remove_path(&path)?;
            self.cache.forget(&path);
            let dev = dev_userjs_path(&path);
            files::remove_path(&dev)?;
            self.cache.forget(&dev);
            debug!(path = %path.display(), "removed userscript output");
        }
        Ok(())
    }

    fn write(&mut self, path: &Path, bytes: &[u8]) -> Result<usize> {
        Ok(usize::from(self.cache.write(path, bytes)?))
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        self.cache.forget(path);
        files::remove_path(path)
    }
}

/// `dev.user.js` next to the userscript.
pub fn dev_userjs_path(userjs: &Path) -> PathBuf {
    userjs
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(DEV_USERJS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defines_become_var_lines() {
        let mut defines = BTreeMap::new();
        defines.insert("API".to_string(), "\"https://api\"".to_string());
        defines.insert("DEBUG".to_string(), "true".to_string());
        assert_eq!(
            define_prefix(&defines),
            "var API = \"https://api\";\nvar DEBUG = true;\n"
        );
        assert_eq!(define_prefix(&BTreeMap::new()), "");
    }

    #[test]
    fn cleanup_only_touches_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig {
            root: dir.path().to_path_buf(),
            ..ProjectConfig::default()
        };
        let chrome = dir.path().join("dist/chrome");
        std::fs::create_dir_all(&chrome).unwrap();
        std::fs::write(chrome.join("manifest.json"), "{}").unwrap();
        std::fs::write(dir.path().join("dist/bundle.user.js"), "").unwrap();
        std::fs::write(dir.path().join("dist/dev.user.js"), "").unwrap();
        std::fs::write(dir.path().join("dist/keep.txt"), "").unwrap();

        Distributor::new(false).cleanup(&config).unwrap();

        assert!(!chrome.exists());
        assert!(!dir.path().join("dist/bundle.user.js").exists());
        assert!(!dir.path().join("dist/dev.user.js").exists());
        assert!(dir.path().join("dist/keep.txt").exists());
    }
}
