use std::fs;
use std::path::Path;

use tracing::debug;

use super::ManifestModel;
use crate::error::{CrxmError, IoResultExt, Result};

/// Read the manifest fresh from disk. JSON and TOML are accepted; the top-level
/// value has to be an object.
pub fn load_manifest(path: &Path) -> Result<ManifestModel> {
    let source = fs::read_to_string(path).at_path(path)?;

    let parse_err = |message: String| CrxmError::ManifestParse {
        path: path.to_path_buf(),
        message,
    };

    let manifest = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str::<ManifestModel>(&source).map_err(|e| parse_err(e.to_string()))?,
        _ => {
            let value: serde_json::Value =
                serde_json::from_str(&source).map_err(|e| parse_err(e.to_string()))?;
            if !value.is_object() {
                return Err(CrxmError::ManifestNotObject(path.to_path_buf()));
            }
            serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))?
        }
    };

    debug!(path = %path.display(), name = %manifest.name, "loaded manifest");
    Ok(manifest)
}
