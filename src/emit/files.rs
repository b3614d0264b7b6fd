//! Output naming and small file helpers shared by both emitters.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;
use walkdir::WalkDir;
use xxhash_rust::xxh32::xxh32;

use crate::error::{CrxmError, IoResultExt, Result};

/// xxh32 (seed 0) of the path's UTF-8 bytes, as a decimal string.
///
/// Names only need to be stable across builds of this tool; they are not
/// meant to match names produced by other bundlers.
pub fn hash32(path: &Path) -> String {
    xxh32(path.to_string_lossy().as_bytes(), 0).to_string()
}

/// Basename of `path` with its extension replaced by `ext` (appended when
/// there is none).
pub fn change_ext(path: &Path, ext: &str) -> String {
    let base = path.file_name().map(PathBuf::from).unwrap_or_default();
    base.with_extension(ext).to_string_lossy().into_owned()
}

/// `<hash32(path)>_<basename with ext>`.
pub fn output_file_name(path: &Path, ext: &str) -> String {
    format!("{}_{}", hash32(path), change_ext(path, ext))
}

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" | "ogv" => "video/ogg",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

pub fn data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

pub fn file_to_data_uri(path: &Path) -> Result<String> {
    let bytes = fs::read(path).at_path(path)?;
    Ok(data_uri(&bytes, mime_for(path)))
}

/// Write `bytes`, creating parent directories.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at_path(parent)?;
    }
    fs::write(path, bytes).at_path(path)
}

/// Recursively copy `from` into `to`, overwriting existing files. Returns the
/// number of files copied.
pub fn copy_dir(from: &Path, to: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            CrxmError::io(path, e.into())
        })?;
        let Ok(rel) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).at_path(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).at_path(parent)?;
            }
            fs::copy(entry.path(), &dest).at_path(entry.path())?;
            copied += 1;
        }
    }
    debug!(from = %from.display(), to = %to.display(), files = copied, "copied directory");
    Ok(copied)
}

/// Remove a file or directory tree. Missing paths are fine.
pub fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).at_path(path)
    } else if path.exists() {
        fs::remove_file(path).at_path(path)
    } else {
        Ok(())
    }
}
