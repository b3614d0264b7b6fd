//! # Manifest model
//!
//! Typed view of the project manifest. Unknown keys (permissions, host
//! permissions, ...) are kept verbatim in `extra` maps so the emitted
//! `manifest.json` round-trips them.
//!
//! A loaded [`ManifestModel`] is never edited in place. The extension emitter
//! works on a [`ManifestWorkspace`], a fresh copy per emission that accepts
//! `resolve(source → target)` rewrites.

pub mod i18n;
pub mod loader;
pub mod resources;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use loader::load_manifest;
pub use resources::{ManifestResources, ResourceRef};

/// Content-script keys that only this tool understands. Chrome rejects or warns
/// on them, so they never reach the emitted manifest.
pub const CUSTOM_CONTENT_SCRIPT_KEYS: [&str; 3] = [
    "use_isolated_connection",
    "userscript_direct_inject",
    "trusted_inject",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunAt {
    DocumentStart,
    DocumentEnd,
    #[default]
    DocumentIdle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum World {
    #[default]
    Isolated,
    Main,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ContentScriptEntry {
    #[serde(default)]
    pub matches: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub js: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub css: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<RunAt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<World>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userscript_direct_inject: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_inject: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_isolated_connection: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentScriptEntry {
    pub fn run_at(&self) -> RunAt {
        self.run_at.unwrap_or_default()
    }

    pub fn world(&self) -> World {
        self.world.unwrap_or_default()
    }

    /// In the userscript, inject through a page `<script>` element instead of
    /// calling the functions from the sandbox.
    pub fn dom_inject(&self) -> bool {
        self.userscript_direct_inject.unwrap_or(false)
    }

    pub fn trusted_inject(&self) -> bool {
        self.trusted_inject.unwrap_or(true)
    }

    pub fn use_isolated_connection(&self) -> bool {
        self.use_isolated_connection.unwrap_or(false)
    }

    fn strip_custom_keys(&mut self) {
        self.userscript_direct_inject = None;
        self.trusted_inject = None;
        self.use_isolated_connection = None;
        for key in CUSTOM_CONTENT_SCRIPT_KEYS {
            self.extra.remove(key);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Background {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_worker: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_popup: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_manifest_version() -> u8 {
    3
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ManifestModel {
    #[serde(default = "default_manifest_version")]
    pub manifest_version: u8,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// size → path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub icons: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_scripts: Vec<ContentScriptEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ManifestModel {
    pub fn service_worker(&self) -> Option<&str> {
        self.background
            .as_ref()
            .and_then(|b| b.service_worker.as_deref())
    }

    pub fn popup(&self) -> Option<&str> {
        self.action.as_ref().and_then(|a| a.default_popup.as_deref())
    }

    /// Icons ordered by numeric size, smallest first.
    pub fn icons_by_size(&self) -> Vec<(u32, &str)> {
        let mut icons: Vec<(u32, &str)> = self
            .icons
            .iter()
            .filter_map(|(size, path)| size.parse::<u32>().ok().map(|s| (s, path.as_str())))
            .collect();
        icons.sort_by_key(|(size, _)| *size);
        icons
    }

    pub fn uses_isolated_connection(&self) -> bool {
        self.content_scripts
            .iter()
            .any(ContentScriptEntry::use_isolated_connection)
    }

    /// Rewrite every occurrence of `source` in background, action, content
    /// scripts and icons to `target`. Fields that don't reference `source` are
    /// left alone.
    pub fn resolve(&mut self, source: &str, target: &str) {
        let rewrite = |slot: &mut String| {
            if slot == source {
                *slot = target.to_string();
            }
        };

        if let Some(sw) = self
            .background
            .as_mut()
            .and_then(|b| b.service_worker.as_mut())
        {
            rewrite(sw);
        }

        if let Some(popup) = self.action.as_mut().and_then(|a| a.default_popup.as_mut()) {
            rewrite(popup);
        }

        for entry in &mut self.content_scripts {
            entry.js.iter_mut().for_each(rewrite);
            entry.css.iter_mut().for_each(rewrite);
        }

        self.icons.values_mut().for_each(rewrite);
    }
}

/// Per-emission copy of the manifest that the emitter rewrites and serializes.
#[derive(Debug, Clone)]
pub struct ManifestWorkspace {
    manifest: ManifestModel,
}

impl ManifestWorkspace {
    pub fn new(raw: &ManifestModel) -> Self {
        Self {
            manifest: raw.clone(),
        }
    }

    pub fn manifest(&self) -> &ManifestModel {
        &self.manifest
    }

    pub fn resolve(&mut self, source: &str, target: &str) {
        self.manifest.resolve(source, target);
    }

    /// `Extension Name` → `[Dev] Extension Name`. An i18n name is looked up in
    /// the `en` locale first.
    pub fn enable_dev_mode(&mut self, en_name: Option<String>) {
        let name = en_name.unwrap_or_else(|| self.manifest.name.clone());
        self.manifest.name = format!("[Dev] {name}");
    }

    pub fn add_content_script(
        &mut self,
        js: Vec<String>,
        css: Vec<String>,
        matches: Vec<String>,
        world: World,
        run_at: Option<RunAt>,
    ) {
        self.manifest.content_scripts.push(ContentScriptEntry {
            matches,
            js,
            css,
            run_at,
            world: Some(world),
            ..Default::default()
        });
    }

    /// The manifest as it is written to disk, without tool-specific keys.
    pub fn to_output(&self) -> ManifestModel {
        let mut out = self.manifest.clone();
        out.content_scripts
            .iter_mut()
            .for_each(ContentScriptEntry::strip_custom_keys);
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_output())
    }
}
