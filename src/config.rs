//! # Project configuration
//!
//! `crxm.config.toml` (or `crxm.config.json`) is searched upward from the working
//! directory. Every load reads the file fresh from disk; nothing from a previous
//! load survives except what the caller keeps.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CrxmError, IoResultExt, Result};

pub const CONFIG_FILE_NAMES: [&str; 2] = ["crxm.config.toml", "crxm.config.json"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    #[default]
    Error,
    Debug,
}

impl LogLevel {
    /// `EnvFilter` directive for this level. Errors are always shown.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info | LogLevel::Error => "info",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Extension output directory. Empty skips the extension target.
    #[serde(default = "OutputConfig::default_chrome")]
    pub chrome: String,
    /// Userscript output file. Empty skips the userscript target.
    #[serde(default = "OutputConfig::default_userjs")]
    pub userjs: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            chrome: Self::default_chrome(),
            userjs: Self::default_userjs(),
        }
    }
}

impl OutputConfig {
    fn default_chrome() -> String {
        "dist/chrome".to_string()
    }

    fn default_userjs() -> String {
        "dist/bundle.user.js".to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    #[serde(default = "ServerConfig::default_websocket")]
    pub websocket: u16,
    #[serde(default)]
    pub disable_sock_in_userjs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            websocket: Self::default_websocket(),
            disable_sock_in_userjs: false,
        }
    }
}

impl ServerConfig {
    fn default_host() -> String {
        "localhost".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_websocket() -> u16 {
        8081
    }
}

/// One `(pattern, plugin)` rule. Rules are tried in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PluginRuleConfig {
    pub pattern: String,
    pub plugin: String,
    /// Shell command for the `command` plugin; `{path}` is replaced by the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl PluginRuleConfig {
    pub fn new(pattern: &str, plugin: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            plugin: plugin.to_string(),
            command: None,
        }
    }
}

fn default_rules() -> Vec<PluginRuleConfig> {
    vec![
        PluginRuleConfig::new(r"^.*\.(js|mjs|cjs)$", "script"),
        PluginRuleConfig::new(r"^.*\.(css|html|htm)$", "file"),
    ]
}

/// Global declarations injected ahead of compiled code, per category.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DefineConfig {
    #[serde(default)]
    pub sw: BTreeMap<String, String>,
    #[serde(default)]
    pub contentscripts: BTreeMap<String, String>,
    #[serde(default)]
    pub popup: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    #[serde(default = "ProjectConfig::default_manifest")]
    pub manifest: String,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_rules")]
    pub build: Vec<PluginRuleConfig>,
    #[serde(default = "default_rules")]
    pub watch: Vec<PluginRuleConfig>,
    /// Extra userscript header pairs, e.g. `[["@author", "me"]]`.
    #[serde(default)]
    pub header: Vec<(String, String)>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<String>,
    #[serde(default)]
    pub popup_in_userscript: bool,
    #[serde(default)]
    pub define: DefineConfig,

    /// Directory holding the config file; relative paths resolve against it.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            manifest: Self::default_manifest(),
            output: OutputConfig::default(),
            server: ServerConfig::default(),
            build: default_rules(),
            watch: default_rules(),
            header: Vec::new(),
            log_level: LogLevel::default(),
            public: None,
            popup_in_userscript: false,
            define: DefineConfig::default(),
            root: PathBuf::new(),
        }
    }
}

impl ProjectConfig {
    fn default_manifest() -> String {
        "manifest.json".to_string()
    }

    fn resolve(&self, p: &str) -> PathBuf {
        self.root.join(p)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.manifest)
    }

    /// Directory holding the manifest. Manifest paths and `_locales` resolve
    /// against it.
    pub fn project_dir(&self) -> PathBuf {
        self.manifest_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    pub fn chrome_dir(&self) -> Option<PathBuf> {
        non_empty(&self.output.chrome).map(|p| self.resolve(p))
    }

    pub fn userjs_path(&self) -> Option<PathBuf> {
        non_empty(&self.output.userjs).map(|p| self.resolve(p))
    }

    pub fn public_dir(&self) -> Option<PathBuf> {
        self.public.as_deref().and_then(non_empty).map(|p| self.resolve(p))
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Walk up from `start` looking for one of [`CONFIG_FILE_NAMES`].
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Read and parse one config file. The root is set to the file's directory.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig> {
    let source = fs::read_to_string(path).at_path(path)?;

    let parse_err = |message: String| CrxmError::ConfigParse {
        path: path.to_path_buf(),
        message,
    };

    let mut config: ProjectConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let value: serde_json::Value =
                serde_json::from_str(&source).map_err(|e| parse_err(e.to_string()))?;
            if !value.is_object() {
                return Err(parse_err("the config must be a JSON object".to_string()));
            }
            serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))?
        }
        _ => toml::from_str(&source).map_err(|e| parse_err(e.to_string()))?,
    };

    config.root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Ok(config)
}

/// Owns the currently loaded config. Replaces the process-global loader with an
/// explicit instance held by the driver.
#[derive(Debug)]
pub struct ConfigLoader {
    search_dir: PathBuf,
    explicit: Option<PathBuf>,
    config_path: Option<PathBuf>,
    config: Option<ProjectConfig>,
}

impl ConfigLoader {
    pub fn new(search_dir: impl Into<PathBuf>) -> Self {
        Self {
            search_dir: search_dir.into(),
            explicit: None,
            config_path: None,
            config: None,
        }
    }

    /// Use `path` directly instead of searching.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let search_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            search_dir,
            explicit: Some(path),
            config_path: None,
            config: None,
        }
    }

    pub fn load_config(&mut self) -> Result<&ProjectConfig> {
        let path = match &self.explicit {
            Some(p) if p.is_file() => p.clone(),
            Some(p) => return Err(CrxmError::ConfigNotFound(p.display().to_string())),
            None => find_config_file(&self.search_dir)
                .ok_or_else(|| CrxmError::ConfigNotFound(CONFIG_FILE_NAMES[0].to_string()))?,
        };

        let config = load_config_file(&path)?;
        debug!(path = %path.display(), "loaded config");

        self.config_path = Some(path);
        Ok(&*self.config.insert(config))
    }

    pub fn use_config(&self) -> Option<&ProjectConfig> {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
