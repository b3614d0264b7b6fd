//! Live-update notifications sent to connected dev clients.
//!
//! The socket server is not part of this crate. Anything that can deliver a
//! JSON text frame to every client implements [`ReloadChannel`]; the default
//! channel only logs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::registry::TargetFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReloadToken {
    ReloadContentScript,
    ReloadSw,
    ReloadCss,
    ReloadPopupJs,
    ReloadPopupHtml,
    All,
}

impl ReloadToken {
    pub fn as_str(self) -> &'static str {
        match self {
            ReloadToken::ReloadContentScript => "RELOAD_CONTENT_SCRIPT",
            ReloadToken::ReloadSw => "RELOAD_SW",
            ReloadToken::ReloadCss => "RELOAD_CSS",
            ReloadToken::ReloadPopupJs => "RELOAD_POPUP_JS",
            ReloadToken::ReloadPopupHtml => "RELOAD_POPUP_HTML",
            ReloadToken::All => "ALL",
        }
    }

    /// Token announced after a target of category `flag` was rebuilt.
    pub fn for_flag(flag: TargetFlag) -> Self {
        match flag {
            TargetFlag::Content => ReloadToken::ReloadContentScript,
            TargetFlag::Sw => ReloadToken::ReloadSw,
            TargetFlag::Css => ReloadToken::ReloadCss,
            TargetFlag::HtmlScript => ReloadToken::ReloadPopupJs,
            TargetFlag::Html | TargetFlag::HtmlHref => ReloadToken::ReloadPopupHtml,
        }
    }
}

impl fmt::Display for ReloadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadContent {
    #[serde(rename = "reloadType")]
    pub reload_type: ReloadToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// `{"type":"reload","content":{"reloadType":…,"data":…}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ReloadMessage {
    Reload(ReloadContent),
}

impl ReloadMessage {
    pub fn new(token: ReloadToken, data: Option<Value>) -> Self {
        ReloadMessage::Reload(ReloadContent {
            reload_type: token,
            data,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
}

pub trait ReloadChannel: Send + Sync {
    /// Deliver a reload message to every connected client.
    fn send(&self, token: ReloadToken, data: Option<Value>);

    /// Surface a dev-time message in the clients' consoles.
    fn console(&self, level: ConsoleLevel, text: &str);
}

/// Logs every message instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReloadChannel;

impl ReloadChannel for TracingReloadChannel {
    fn send(&self, token: ReloadToken, data: Option<Value>) {
        match ReloadMessage::new(token, data).to_json() {
            Ok(frame) => debug!(%token, %frame, "dispatch reload"),
            Err(e) => warn!(%token, "reload message not serializable: {e}"),
        }
    }

    fn console(&self, level: ConsoleLevel, text: &str) {
        match level {
            ConsoleLevel::Log => info!(target: "crxm::console", "{text}"),
            ConsoleLevel::Warn => warn!(target: "crxm::console", "{text}"),
            ConsoleLevel::Error => error!(target: "crxm::console", "{text}"),
        }
    }
}
