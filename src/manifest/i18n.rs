//! `__MSG_key__` lookups against `<manifest dir>/_locales/<lang>/messages.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::error::{CrxmError, IoResultExt, Result};

lazy_static! {
    static ref MSG_KEY_RE: Regex = Regex::new(r"^__MSG_(.+)__$").unwrap();
}

pub const DEFAULT_LANG: &str = "en";

#[derive(Debug, Deserialize)]
struct MessageEntry {
    message: String,
}

pub fn locales_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("_locales")
}

/// `__MSG_appName__` → `appName`.
pub fn message_key(value: &str) -> Option<&str> {
    MSG_KEY_RE
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Languages present under `_locales`. `en` is mandatory once the directory exists.
pub fn enabled_langs(locales: &Path) -> Result<Vec<String>> {
    let mut langs = Vec::new();
    for entry in fs::read_dir(locales).at_path(locales)? {
        let entry = entry.at_path(locales)?;
        if entry.path().is_dir() {
            langs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    langs.sort();

    if !langs.iter().any(|l| l == DEFAULT_LANG) {
        return Err(CrxmError::Locale(format!(
            "There is no {DEFAULT_LANG} directory in {}",
            locales.display()
        )));
    }
    Ok(langs)
}

/// Message `key` for `lang`, or `None` if the language doesn't define it.
/// Keys match case-insensitively, like the browser does.
pub fn get_message(locales: &Path, lang: &str, key: &str) -> Result<Option<String>> {
    let path = locales.join(lang).join("messages.json");
    if !path.is_file() {
        return Ok(None);
    }

    let source = fs::read_to_string(&path).at_path(&path)?;
    let messages: BTreeMap<String, MessageEntry> = serde_json::from_str(&source)
        .map_err(|e| CrxmError::Locale(format!("{}: {e}", path.display())))?;

    let found = messages
        .get(key)
        .or_else(|| {
            messages
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .map(|m| m.message.clone());
    Ok(found)
}

/// Every translation of `value`, keyed by language. A plain value (no
/// `__MSG_…__`) maps to itself under `en`.
pub fn messages_for(project_dir: &Path, value: &str) -> Result<BTreeMap<String, String>> {
    let mut result = BTreeMap::new();
    result.insert(DEFAULT_LANG.to_string(), value.to_string());

    let Some(key) = message_key(value) else {
        return Ok(result);
    };

    let locales = locales_dir(project_dir);
    if !locales.is_dir() {
        return Ok(result);
    }

    for lang in enabled_langs(&locales)? {
        if let Some(msg) = get_message(&locales, &lang, key)? {
            result.insert(lang, msg);
        }
    }
    Ok(result)
}
