//! Derived resource list of a manifest: every JS/CSS/HTML/icon path, resolved
//! against the project directory and de-duplicated by absolute path.

use std::path::{Component, Path, PathBuf};

use super::ManifestModel;

/// One resource as declared (`raws`, every spelling seen) and resolved (`path`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub raws: Vec<String>,
    pub path: PathBuf,
}

impl ResourceRef {
    /// The first spelling found in the manifest.
    pub fn raw(&self) -> &str {
        self.raws.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconRef {
    pub size: u32,
    pub raw: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestResources {
    pub content: Vec<ResourceRef>,
    pub sw: Vec<ResourceRef>,
    pub css: Vec<ResourceRef>,
    pub popup: Vec<ResourceRef>,
    /// Smallest first.
    pub icons: Vec<IconRef>,
}

impl ManifestResources {
    pub fn parse(manifest: &ManifestModel, project_dir: &Path) -> Self {
        let mut out = ManifestResources::default();

        if let Some(sw) = manifest.service_worker() {
            push_unique(&mut out.sw, sw, project_dir);
        }

        if let Some(popup) = manifest.popup() {
            push_unique(&mut out.popup, popup, project_dir);
        }

        for entry in &manifest.content_scripts {
            for js in &entry.js {
                push_unique(&mut out.content, js, project_dir);
            }
            for css in &entry.css {
                push_unique(&mut out.css, css, project_dir);
            }
        }

        out.icons = manifest
            .icons_by_size()
            .into_iter()
            .map(|(size, raw)| IconRef {
                size,
                raw: raw.to_string(),
                path: absolutize(project_dir, raw),
            })
            .collect();

        out
    }

    pub fn content_paths(&self) -> Vec<String> {
        to_strings(&self.content)
    }

    pub fn sw_paths(&self) -> Vec<String> {
        to_strings(&self.sw)
    }

    pub fn css_paths(&self) -> Vec<String> {
        to_strings(&self.css)
    }

    pub fn popup_paths(&self) -> Vec<String> {
        to_strings(&self.popup)
    }

    /// Find the resource whose raw spelling is `raw` in any category.
    pub fn find_raw(&self, raw: &str) -> Option<&ResourceRef> {
        self.content
            .iter()
            .chain(&self.css)
            .chain(&self.sw)
            .chain(&self.popup)
            .find(|r| r.raws.iter().any(|s| s == raw))
    }
}

fn to_strings(refs: &[ResourceRef]) -> Vec<String> {
    refs.iter().map(|r| path_key(&r.path)).collect()
}

pub(crate) fn push_unique(list: &mut Vec<ResourceRef>, raw: &str, dir: &Path) {
    let path = absolutize(dir, raw);
    match list.iter_mut().find(|r| r.path == path) {
        Some(existing) => {
            if !existing.raws.iter().any(|r| r == raw) {
                existing.raws.push(raw.to_string());
            }
        }
        None => list.push(ResourceRef {
            raws: vec![raw.to_string()],
            path,
        }),
    }
}

/// Join `raw` onto `dir` and fold `.`/`..` lexically, so `./a.js` and `a.js`
/// name the same resource.
pub fn absolutize(dir: &Path, raw: &str) -> PathBuf {
    let joined = dir.join(raw);
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// String form used as the diff/registry key for a path.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestModel;

    fn manifest(value: serde_json::Value) -> ManifestModel {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn shared_script_appears_once() {
        let m = manifest(serde_json::json!({
            "name": "x", "version": "1",
            "content_scripts": [
                { "matches": ["<all_urls>"], "js": ["a.js", "a.js"] },
                { "matches": ["https://a.com/*"], "js": ["a.js"], "css": ["s.css"] }
            ]
        }));
        let res = ManifestResources::parse(&m, Path::new("/proj"));

        assert_eq!(res.content_paths(), vec!["/proj/a.js"]);
        assert_eq!(res.css_paths(), vec!["/proj/s.css"]);
    }

    #[test]
    fn different_spellings_of_one_file_collapse() {
        let m = manifest(serde_json::json!({
            "name": "x", "version": "1",
            "content_scripts": [
                { "matches": ["<all_urls>"], "js": ["src/a.js"] },
                { "matches": ["<all_urls>"], "js": ["./src/../src/a.js"] }
            ]
        }));
        let res = ManifestResources::parse(&m, Path::new("/proj"));

        assert_eq!(res.content.len(), 1);
        assert_eq!(res.content[0].raws, vec!["src/a.js", "./src/../src/a.js"]);
        assert_eq!(res.content[0].raw(), "src/a.js");
    }

    #[test]
    fn collects_sw_popup_and_icons() {
        let m = manifest(serde_json::json!({
            "name": "x", "version": "1",
            "icons": { "48": "i/48.png", "16": "i/16.png" },
            "background": { "service_worker": "sw.js" },
            "action": { "default_popup": "popup/index.html" }
        }));
        let res = ManifestResources::parse(&m, Path::new("/proj"));

        assert_eq!(res.sw_paths(), vec!["/proj/sw.js"]);
        assert_eq!(res.popup_paths(), vec!["/proj/popup/index.html"]);
        assert_eq!(res.icons[0].size, 16);
        assert_eq!(res.icons[1].path, PathBuf::from("/proj/i/48.png"));
        assert!(res.find_raw("sw.js").is_some());
    }

    #[test]
    fn absolutize_folds_dots() {
        assert_eq!(
            absolutize(Path::new("/a/b"), "../c/./d.js"),
            PathBuf::from("/a/c/d.js")
        );
    }
}
