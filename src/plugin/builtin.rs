use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::debug;

use super::{FileWatch, Plugin, ResultSender, WatchHandle};
use crate::config::PluginRuleConfig;
use crate::error::{CrxmError, PluginError, Result};
use crate::js;

/// Map a config rule to its built-in plugin.
pub fn from_rule(rule: &PluginRuleConfig, root: &Path) -> Result<Arc<dyn Plugin>> {
    match rule.plugin.as_str() {
        "script" => Ok(Arc::new(ScriptPlugin)),
        "file" => Ok(Arc::new(FilePlugin)),
        "command" => {
            let command = rule.command.clone().ok_or_else(|| CrxmError::ConfigParse {
                path: root.to_path_buf(),
                message: format!(
                    "the command plugin for pattern \"{}\" needs a `command`",
                    rule.pattern
                ),
            })?;
            Ok(Arc::new(CommandPlugin::new(command, root)))
        }
        other => Err(CrxmError::UnknownPlugin {
            name: other.to_string(),
            pattern: rule.pattern.clone(),
        }),
    }
}

fn read(plugin: &str, path: &Path) -> std::result::Result<Vec<u8>, PluginError> {
    fs::read(path).map_err(|source| PluginError::Io {
        plugin: plugin.to_string(),
        path: path.to_path_buf(),
        source,
    })
}

/// Raw loader: bytes in, bytes out.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilePlugin;

impl Plugin for FilePlugin {
    fn name(&self) -> &str {
        "file"
    }

    fn compile(&self, path: &Path) -> std::result::Result<Vec<u8>, PluginError> {
        read(self.name(), path)
    }

    fn watch(
        self: Arc<Self>,
        path: &Path,
        on_result: ResultSender,
    ) -> std::result::Result<Box<dyn WatchHandle>, PluginError> {
        FileWatch::start(self, path, on_result)
    }
}

/// Plain JavaScript. The entry is parsed as a classic script so syntax errors
/// surface at build time, then printed back.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptPlugin;

impl Plugin for ScriptPlugin {
    fn name(&self) -> &str {
        "script"
    }

    fn compile(&self, path: &Path) -> std::result::Result<Vec<u8>, PluginError> {
        let bytes = read(self.name(), path)?;
        let source = String::from_utf8(bytes)
            .map_err(|_| PluginError::compile(self.name(), path, "source is not valid UTF-8"))?;

        js::reprint_script(&source)
            .map(String::into_bytes)
            .map_err(|errors| PluginError::compile(self.name(), path, errors.join("\n")))
    }

    fn watch(
        self: Arc<Self>,
        path: &Path,
        on_result: ResultSender,
    ) -> std::result::Result<Box<dyn WatchHandle>, PluginError> {
        FileWatch::start(self, path, on_result)
    }
}

/// Runs an external tool; its stdout is the compiled output. `{path}` in the
/// command line is replaced by the quoted entry path.
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    command: String,
    cwd: PathBuf,
}

impl CommandPlugin {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
        }
    }

    fn command_line(&self, path: &Path) -> String {
        self.command.replace("{path}", &shell_quote(&path.to_string_lossy()))
    }
}

#[cfg(unix)]
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(not(unix))]
fn shell_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        "command"
    }

    fn compile(&self, path: &Path) -> std::result::Result<Vec<u8>, PluginError> {
        let line = self.command_line(path);
        debug!(command = %line, "running command plugin");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&line);
            c
        };

        let output = cmd
            .current_dir(&self.cwd)
            .output()
            .map_err(|source| PluginError::Io {
                plugin: self.name().to_string(),
                path: path.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::compile(
                self.name(),
                path,
                format!("`{line}` exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(output.stdout)
    }

    fn watch(
        self: Arc<Self>,
        path: &Path,
        on_result: ResultSender,
    ) -> std::result::Result<Box<dyn WatchHandle>, PluginError> {
        FileWatch::start(self, path, on_result)
    }
}
