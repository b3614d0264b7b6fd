//! # Error taxonomy
//!
//! Every fallible operation in the pipeline returns [`CrxmError`]. Plugin failures
//! are kept in their own [`PluginError`] type so callers can pass them through
//! unmodified (the dev driver logs them and keeps running, a one-shot build
//! aborts on them).

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrxmError>;

#[derive(Debug, Error)]
pub enum CrxmError {
    #[error("The config file not found. Please create \"{0}\"")]
    ConfigNotFound(String),

    #[error("Failed to parse the config {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("The manifest is not exported as an object in {0}")]
    ManifestNotObject(PathBuf),

    #[error("Failed to parse the manifest {path}: {message}")]
    ManifestParse { path: PathBuf, message: String },

    #[error("Could not find the appropriate plugin for {purpose} \"{path}\"")]
    NoPlugin {
        purpose: &'static str,
        path: PathBuf,
    },

    #[error("Unknown plugin \"{name}\" declared for pattern \"{pattern}\"")]
    UnknownPlugin { name: String, pattern: String },

    #[error("Invalid plugin pattern \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Entry file not found: {0}")]
    MissingEntry(PathBuf),

    #[error("Watchers are already running; stop them before watching again")]
    WatchAlreadyActive,

    #[error("No build target is registered with handle {0}")]
    UnknownTarget(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Locale error: {0}")]
    Locale(String),

    #[error("Failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CrxmError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CrxmError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable error name, printed ahead of the message by the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            CrxmError::ConfigNotFound(_) => "ConfigNotFound",
            CrxmError::ConfigParse { .. } => "ConfigParseError",
            CrxmError::ManifestNotObject(_) => "ManifestNotObject",
            CrxmError::ManifestParse { .. } => "ManifestParseError",
            CrxmError::NoPlugin { .. } => "NoPlugin",
            CrxmError::UnknownPlugin { .. } => "UnknownPlugin",
            CrxmError::InvalidPattern { .. } => "InvalidPattern",
            CrxmError::MissingEntry(_) => "MissingEntry",
            CrxmError::WatchAlreadyActive => "WatchAlreadyActive",
            CrxmError::UnknownTarget(_) => "UnknownTarget",
            CrxmError::Plugin(_) => "PluginError",
            CrxmError::Io { .. } => "IoError",
            CrxmError::Watch { .. } => "WatchError",
            CrxmError::Locale(_) => "LocaleError",
            CrxmError::Serialize(_) => "SerializeError",
        }
    }

    /// Configuration problems abort a dev cycle just like a one-shot build.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CrxmError::ConfigNotFound(_)
                | CrxmError::ConfigParse { .. }
                | CrxmError::ManifestNotObject(_)
                | CrxmError::ManifestParse { .. }
                | CrxmError::NoPlugin { .. }
                | CrxmError::UnknownPlugin { .. }
                | CrxmError::InvalidPattern { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("[{plugin}] {path}: {message}")]
    Compile {
        plugin: String,
        path: PathBuf,
        message: String,
    },

    #[error("[{plugin}] failed to read {path}: {source}")]
    Io {
        plugin: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[{plugin}] failed to watch {path}: {source}")]
    Watch {
        plugin: String,
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

impl PluginError {
    pub fn compile(plugin: &str, path: &Path, message: impl Into<String>) -> Self {
        PluginError::Compile {
            plugin: plugin.to_string(),
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Attach the offending path to a raw `io::Result`.
pub(crate) trait IoResultExt<T> {
    fn at_path(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at_path(self, path: &Path) -> Result<T> {
        self.map_err(|e| CrxmError::io(path, e))
    }
}
