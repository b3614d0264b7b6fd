//! `// ==UserScript==` metadata block.

use std::fmt;
use std::path::Path;

use crate::config::ProjectConfig;
use crate::emit::files::file_to_data_uri;
use crate::error::Result;
use crate::manifest::i18n::{messages_for, DEFAULT_LANG};
use crate::manifest::{ManifestModel, ManifestResources};

pub const ALL_URLS: &str = "<all_urls>";

/// Ordered `(key, value)` metadata lines. `@name` keys always lead the block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFactory {
    detail: Vec<(String, String)>,
}

impl HeaderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key.starts_with("@name") {
            let at = self
                .detail
                .iter()
                .take_while(|(k, _)| k.starts_with("@name"))
                .count();
            self.detail.insert(at, (key, value.into()));
        } else {
            self.detail.push((key, value.into()));
        }
    }

    /// Push unless the exact pair is already present. Returns whether it was added.
    pub fn push_unique(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let (key, value) = (key.into(), value.into());
        if self.detail.iter().any(|(k, v)| *k == key && *v == value) {
            return false;
        }
        self.push(key, value);
        true
    }

    /// Set the value of every line with `key`. Returns how many were replaced.
    pub fn replace(&mut self, key: &str, value: &str) -> usize {
        let mut replaced = 0;
        for (k, v) in &mut self.detail {
            if k == key {
                *v = value.to_string();
                replaced += 1;
            }
        }
        replaced
    }

    pub fn exists(&self, key: &str) -> bool {
        self.detail.iter().any(|(k, _)| k == key)
    }

    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.detail
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.detail
    }
}

impl fmt::Display for HeaderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "// ==UserScript==")?;
        for (key, value) in &self.detail {
            writeln!(f, "// {key} {value}")?;
        }
        write!(f, "// ==/UserScript==")
    }
}

/// Header derived from the manifest and the project config.
pub fn manifest_header(
    manifest: &ManifestModel,
    resources: &ManifestResources,
    project_dir: &Path,
    config: &ProjectConfig,
) -> Result<HeaderFactory> {
    let mut header = HeaderFactory::new();

    let mut matches: Vec<&str> = Vec::new();
    for pattern in manifest.content_scripts.iter().flat_map(|e| &e.matches) {
        if !matches.contains(&pattern.as_str()) {
            matches.push(pattern);
        }
    }
    if matches.contains(&ALL_URLS) {
        header.push("@match", "http://*/*");
        header.push("@match", "https://*/*");
    } else {
        for pattern in matches {
            header.push("@match", pattern);
        }
    }

    header.push("@version", manifest.version.as_str());
    header.push("@run-at", "document-start");

    push_localized(&mut header, "@name", &messages_for(project_dir, &manifest.name)?);
    if !manifest.description.is_empty() {
        push_localized(
            &mut header,
            "@description",
            &messages_for(project_dir, &manifest.description)?,
        );
    }

    if manifest.content_scripts.iter().any(|e| e.dom_inject()) {
        header.push_unique("@grant", "unsafeWindow");
    }

    if let Some(icon) = resources.icons.first() {
        header.push("@icon", file_to_data_uri(&icon.path)?);
    }

    if config.popup_in_userscript && manifest.popup().is_some() {
        header.push_unique("@grant", "GM.registerMenuCommand");
        header.push_unique("@grant", "unsafeWindow");
    }

    for (key, value) in &config.header {
        header.push(key.as_str(), value.as_str());
    }

    Ok(header)
}

fn push_localized(
    header: &mut HeaderFactory,
    key: &str,
    messages: &std::collections::BTreeMap<String, String>,
) {
    if let Some(default) = messages.get(DEFAULT_LANG) {
        header.push(key, default.as_str());
    }
    for (lang, message) in messages.iter().filter(|(l, _)| *l != DEFAULT_LANG) {
        header.push(format!("{key}:{lang}"), message.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn manifest(value: serde_json::Value) -> ManifestModel {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn names_lead_the_block() {
        let mut h = HeaderFactory::new();
        h.push("@version", "1.0");
        h.push("@name", "Ext");
        h.push("@match", "https://a.com/*");
        h.push("@name:ja", "拡張");

        let keys: Vec<&str> = h.entries().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["@name", "@name:ja", "@version", "@match"]);
        assert_eq!(
            h.to_string(),
            "// ==UserScript==\n// @name Ext\n// @name:ja 拡張\n// @version 1.0\n// @match https://a.com/*\n// ==/UserScript=="
        );
    }

    #[test]
    fn push_unique_replace_exists() {
        let mut h = HeaderFactory::new();
        assert!(h.push_unique("@grant", "unsafeWindow"));
        assert!(!h.push_unique("@grant", "unsafeWindow"));
        assert!(h.push_unique("@grant", "GM_xmlhttpRequest"));
        assert!(h.exists("@grant"));
        assert!(!h.exists("@icon"));

        h.push("@version", "1");
        assert_eq!(h.replace("@version", "2"), 1);
        assert_eq!(h.values("@version").collect::<Vec<_>>(), vec!["2"]);
        assert_eq!(h.replace("@nothing", "x"), 0);
    }

    #[test]
    fn all_urls_becomes_http_and_https() {
        let m = manifest(serde_json::json!({
            "name": "Ext", "version": "0.1.0",
            "content_scripts": [
                { "matches": ["https://a.com/*"], "js": ["a.js"] },
                { "matches": ["<all_urls>", "https://a.com/*"], "js": ["b.js"] }
            ]
        }));
        let dir = tempfile::tempdir().unwrap();
        let res = ManifestResources::parse(&m, dir.path());
        let h = manifest_header(&m, &res, dir.path(), &ProjectConfig::default()).unwrap();

        assert_eq!(
            h.values("@match").collect::<Vec<_>>(),
            vec!["http://*/*", "https://*/*"]
        );
        assert_eq!(h.values("@run-at").collect::<Vec<_>>(), vec!["document-start"]);
        assert!(!h.exists("@grant"));
        assert!(!h.exists("@description"));
    }

    #[test]
    fn localized_names_grants_icon_and_extra_headers() {
        let dir = tempfile::tempdir().unwrap();
        for (lang, name) in [("en", "Hello"), ("ja", "こんにちは")] {
            let d = dir.path().join("_locales").join(lang);
            fs::create_dir_all(&d).unwrap();
            fs::write(
                d.join("messages.json"),
                format!(r#"{{"appName": {{"message": "{name}"}}}}"#),
            )
            .unwrap();
        }
        fs::write(dir.path().join("16.png"), [1u8, 2, 3]).unwrap();
        fs::write(dir.path().join("48.png"), [4u8]).unwrap();

        let m = manifest(serde_json::json!({
            "name": "__MSG_appName__", "version": "2.0", "description": "Plain",
            "icons": { "48": "48.png", "16": "16.png" },
            "action": { "default_popup": "popup.html" },
            "content_scripts": [
                { "matches": ["https://a.com/*", "https://a.com/*"], "js": ["a.js"], "userscript_direct_inject": true }
            ]
        }));
        let config = ProjectConfig {
            popup_in_userscript: true,
            header: vec![("@author".into(), "me".into())],
            ..ProjectConfig::default()
        };
        let res = ManifestResources::parse(&m, dir.path());
        let h = manifest_header(&m, &res, dir.path(), &config).unwrap();

        assert_eq!(h.entries()[0], ("@name".to_string(), "Hello".to_string()));
        assert_eq!(h.entries()[1], ("@name:ja".to_string(), "こんにちは".to_string()));
        assert_eq!(h.values("@match").collect::<Vec<_>>(), vec!["https://a.com/*"]);
        assert_eq!(h.values("@description").collect::<Vec<_>>(), vec!["Plain"]);
        assert_eq!(
            h.values("@grant").collect::<Vec<_>>(),
            vec!["unsafeWindow", "GM.registerMenuCommand"]
        );
        assert_eq!(
            h.values("@icon").collect::<Vec<_>>(),
            vec!["data:image/png;base64,AQID"]
        );
        assert_eq!(h.entries().last().unwrap(), &("@author".to_string(), "me".to_string()));
    }
}
