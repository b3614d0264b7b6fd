//! # Popup resource resolver
//!
//! Parses the popup page, tracks its local `<script src>`, stylesheet
//! `<link href>`, other `<link href>` and media references, registers scripts
//! and stylesheets as build targets and rewrites all of them once output exists.
//! Everything else is copied verbatim.
//!
//! Two rewrite modes:
//! - extension: references point at emitted files (`<hash>_name.js`,
//!   `/public/<name>` for copied files);
//! - userscript: everything is inlined into the document.
//!
//! The resolver is an explicit instance owned by the pipeline. Re-registering
//! the same entry only diffs; the page target itself is registered once.

pub mod html;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::diff::{ResourceSet, ResourceSetDiff};
use crate::emit::files::{file_to_data_uri, output_file_name};
use crate::error::{CrxmError, IoResultExt, Result};
use crate::manifest::resources::{path_key, push_unique};
use crate::manifest::ResourceRef;
use crate::plugin::{PluginSet, TargetPlugins};
use crate::registry::{TargetFlag, TargetHandle, TargetRegistry};

pub use html::HtmlDocument;
use html::{HREF_TAGS, MEDIA_TAGS, SCRIPT_TAGS};

/// Hides scrollbars inside the userscript's iframe overlay.
pub const USERSCRIPT_POPUP_STYLE: &str = "body {
  overflow: auto;
  scrollbar-width: none;
  -ms-overflow-style: none;
}

::-webkit-scrollbar {
  width: 0;
  height: 0;
}";

/// Local references of one popup page, resolved against the page directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopupAssets {
    pub scripts: Vec<ResourceRef>,
    /// stylesheets
    pub hrefs: Vec<ResourceRef>,
    pub srcs: Vec<ResourceRef>,
    /// non-stylesheet links
    pub links: Vec<ResourceRef>,
}

impl PopupAssets {
    pub fn collect(doc: &HtmlDocument, html_dir: &Path) -> Self {
        let gather = |raws: Vec<String>| {
            let mut refs = Vec::new();
            for raw in raws {
                push_unique(&mut refs, &raw, html_dir);
            }
            refs
        };

        Self {
            scripts: gather(doc.references(SCRIPT_TAGS, "src")),
            hrefs: gather(doc.stylesheet_references()),
            srcs: gather(doc.references(MEDIA_TAGS, "src")),
            links: gather(doc.link_asset_references()),
        }
    }

    pub fn resource_set(&self) -> ResourceSet {
        let keys = |refs: &[ResourceRef]| refs.iter().map(|r| path_key(&r.path)).collect();
        ResourceSet {
            scripts: keys(&self.scripts),
            hrefs: keys(&self.hrefs),
            srcs: keys(&self.srcs),
            links: keys(&self.links),
        }
    }

    /// Files copied verbatim, with the elements and attribute naming them.
    fn copied(&self) -> impl Iterator<Item = (&ResourceRef, &'static [&'static str], &'static str)> {
        self.srcs
            .iter()
            .map(|r| (r, MEDIA_TAGS, "src"))
            .chain(self.links.iter().map(|r| (r, HREF_TAGS, "href")))
    }

    fn is_copied(&self, path: &Path) -> bool {
        self.srcs.iter().chain(&self.links).any(|r| r.path == path)
    }

    fn for_flag(&self, flag: TargetFlag) -> &[ResourceRef] {
        match flag {
            TargetFlag::HtmlScript => &self.scripts,
            _ => &self.hrefs,
        }
    }
}

/// A registered page resource: its handle and every spelling used in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub handle: TargetHandle,
    pub raws: Vec<String>,
    pub path: PathBuf,
    pub flag: TargetFlag,
}

/// One file to write, relative to the extension output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupOutput {
    /// `<hash>_<basename>.html`
    pub html_file_name: String,
    pub html: String,
    pub files: Vec<OutputFile>,
    /// Previously copied files no longer referenced.
    pub stale: Vec<String>,
}

/// A computed registration; see [`PopupResolver::plan`].
pub struct PopupPlan {
    entry: PathBuf,
    replaces: bool,
    assets: PopupAssets,
    diff: ResourceSetDiff,
    page_plugins: Option<TargetPlugins>,
    additions: Vec<(ResourceRef, TargetPlugins, TargetFlag)>,
}

impl PopupPlan {
    pub fn diff(&self) -> &ResourceSetDiff {
        &self.diff
    }
}

#[derive(Debug, Default)]
pub struct PopupResolver {
    entry: Option<PathBuf>,
    html_handle: Option<TargetHandle>,
    assets: Option<PopupAssets>,
    sync_results: Vec<SyncResult>,
    stale_media: Vec<PathBuf>,
}

impl PopupResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self) -> Option<&Path> {
        self.entry.as_deref()
    }

    pub fn assets(&self) -> Option<&PopupAssets> {
        self.assets.as_ref()
    }

    pub fn sync_results(&self) -> &[SyncResult] {
        &self.sync_results
    }

    /// Parse `entry`, diff its references against the last registration and
    /// sync the registry.
    pub fn register(
        &mut self,
        entry: &Path,
        plugins: &PluginSet,
        registry: &mut TargetRegistry,
    ) -> Result<ResourceSetDiff> {
        let plan = self.plan(entry, plugins)?;
        Ok(self.apply(plan, registry))
    }

    /// Everything [`register`](Self::register) would do, without doing it.
    /// All plugins are resolved here, so a plan that exists can be applied
    /// without failing.
    pub fn plan(&self, entry: &Path, plugins: &PluginSet) -> Result<PopupPlan> {
        let replaces = self.entry.as_deref().is_some_and(|current| current != entry);

        let source = fs::read_to_string(entry).at_path(entry)?;
        let doc = HtmlDocument::parse(&source).map_err(|e| CrxmError::io(entry, e))?;
        let html_dir = entry.parent().unwrap_or_else(|| Path::new(""));
        let assets = PopupAssets::collect(&doc, html_dir);

        let previous = if replaces {
            None
        } else {
            self.assets.as_ref().map(PopupAssets::resource_set)
        };
        let diff = ResourceSet::diff(previous.as_ref(), &assets.resource_set());

        let page_plugins = match self.html_handle {
            Some(_) if !replaces => None,
            _ => Some(plugins.resolve(entry)?),
        };

        let mut additions = Vec::new();
        for (flag, added) in [
            (TargetFlag::HtmlScript, &diff.scripts.add),
            (TargetFlag::HtmlHref, &diff.hrefs.add),
        ] {
            for key in added {
                if let Some(r) = assets.for_flag(flag).iter().find(|r| path_key(&r.path) == *key) {
                    additions.push((r.clone(), plugins.resolve(&r.path)?, flag));
                }
            }
        }

        Ok(PopupPlan {
            entry: entry.to_path_buf(),
            replaces,
            assets,
            diff,
            page_plugins,
            additions,
        })
    }

    pub fn apply(&mut self, plan: PopupPlan, registry: &mut TargetRegistry) -> ResourceSetDiff {
        let PopupPlan {
            entry,
            replaces,
            assets,
            diff,
            page_plugins,
            additions,
        } = plan;

        if replaces {
            self.remove(registry);
        }

        if let Some(page_plugins) = page_plugins {
            self.html_handle = Some(registry.add_target(&entry, page_plugins, TargetFlag::Html));
        }

        for (r, target_plugins, flag) in additions {
            let handle = registry.add_target(&r.path, target_plugins, flag);
            self.sync_results.push(SyncResult {
                handle,
                raws: r.raws,
                path: r.path,
                flag,
            });
        }

        for (flag, deleted) in [
            (TargetFlag::HtmlScript, &diff.scripts.delete),
            (TargetFlag::HtmlHref, &diff.hrefs.delete),
        ] {
            for key in deleted {
                registry.remove_target(Path::new(key), Some(flag));
                self.sync_results
                    .retain(|s| !(s.flag == flag && path_key(&s.path) == *key));
            }
        }

        // a resource may be spelled differently after an edit
        for s in &mut self.sync_results {
            if let Some(r) = assets.for_flag(s.flag).iter().find(|r| r.path == s.path) {
                s.raws = r.raws.clone();
            }
        }

        self.stale_media
            .extend(diff.srcs.delete.iter().chain(&diff.links.delete).map(PathBuf::from));
        self.stale_media.retain(|p| !assets.is_copied(p));

        debug!(entry = %entry.display(), resources = self.sync_results.len(), "popup registered");
        self.entry = Some(entry);
        self.assets = Some(assets);
        diff
    }

    /// Re-read the current entry. Returns whether its resource set changed.
    pub fn refresh(&mut self, plugins: &PluginSet, registry: &mut TargetRegistry) -> Result<bool> {
        let Some(entry) = self.entry.clone() else {
            return Ok(false);
        };
        let diff = self.register(&entry, plugins, registry)?;
        Ok(!diff.is_empty())
    }

    /// Unregister the page and everything it loads. The page file itself is
    /// left alone.
    pub fn remove(&mut self, registry: &mut TargetRegistry) {
        for s in self.sync_results.drain(..) {
            registry.remove_target(&s.path, Some(s.flag));
        }
        if let Some(entry) = self.entry.take() {
            registry.remove_target(&entry, Some(TargetFlag::Html));
            info!(entry = %entry.display(), "popup removed");
        }
        if let Some(assets) = self.assets.take() {
            self.stale_media
                .extend(assets.srcs.into_iter().chain(assets.links).map(|r| r.path));
        }
        self.html_handle = None;
    }

    fn document(&self, entry: &Path, registry: &TargetRegistry) -> Result<HtmlDocument> {
        let bytes = registry
            .result_or_compile(entry, Some(TargetFlag::Html))?
            .ok_or_else(|| CrxmError::UnknownTarget(entry.display().to_string()))?;
        HtmlDocument::parse(&String::from_utf8_lossy(&bytes)).map_err(|e| CrxmError::io(entry, e))
    }

    fn compiled(&self, s: &SyncResult, registry: &TargetRegistry) -> Result<String> {
        let bytes = registry
            .result_or_compile(&s.path, Some(s.flag))?
            .ok_or_else(|| CrxmError::UnknownTarget(s.path.display().to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Page and assets for the extension. `script_prefix` goes in front of
    /// every page script. `None` when no popup is registered.
    pub fn extension_output(
        &mut self,
        registry: &TargetRegistry,
        script_prefix: &str,
    ) -> Result<Option<PopupOutput>> {
        let Some(entry) = self.entry.clone() else {
            return Ok(None);
        };
        let doc = self.document(&entry, registry)?;
        let mut files = Vec::new();

        for s in &self.sync_results {
            let text = self.compiled(s, registry)?;
            let (name, tags, attr, bytes) = match s.flag {
                TargetFlag::HtmlScript => (
                    output_file_name(&s.path, "js"),
                    SCRIPT_TAGS,
                    "src",
                    format!("{script_prefix}{text}").into_bytes(),
                ),
                _ => (output_file_name(&s.path, "css"), HREF_TAGS, "href", text.into_bytes()),
            };
            for raw in &s.raws {
                doc.rewrite_attr(tags, attr, raw, &name);
            }
            files.push(OutputFile { name, bytes });
        }

        if let Some(assets) = &self.assets {
            for (media, tags, attr) in assets.copied() {
                let base = basename(&media.path);
                let bytes = fs::read(&media.path).at_path(&media.path)?;
                for raw in &media.raws {
                    doc.rewrite_attr(tags, attr, raw, &format!("/public/{base}"));
                }
                files.push(OutputFile {
                    name: format!("public/{base}"),
                    bytes,
                });
            }
        }

        let stale = self
            .stale_media
            .drain(..)
            .map(|p| format!("public/{}", basename(&p)))
            .collect();

        Ok(Some(PopupOutput {
            html_file_name: output_file_name(&entry, "html"),
            html: doc.to_html().map_err(|e| CrxmError::io(&entry, e))?,
            files,
            stale,
        }))
    }

    /// Self-contained page for the userscript overlay: scripts and styles
    /// inlined, media as data URIs, scrollbars hidden.
    pub fn inline_html(&self, registry: &TargetRegistry, script_prefix: &str) -> Result<Option<String>> {
        let Some(entry) = self.entry.as_deref() else {
            return Ok(None);
        };
        let doc = self.document(entry, registry)?;

        for s in &self.sync_results {
            let text = self.compiled(s, registry)?;
            for raw in &s.raws {
                match s.flag {
                    TargetFlag::HtmlScript => {
                        doc.inline_script(raw, &format!("{script_prefix}{text}"));
                    }
                    _ => {
                        doc.inline_stylesheet(raw, &text);
                    }
                }
            }
        }

        if let Some(assets) = &self.assets {
            for (media, tags, attr) in assets.copied() {
                let uri = file_to_data_uri(&media.path)?;
                for raw in &media.raws {
                    doc.rewrite_attr(tags, attr, raw, &uri);
                }
            }
        }

        doc.append_style(USERSCRIPT_POPUP_STYLE);
        doc.to_html().map(Some).map_err(|e| CrxmError::io(entry, e))
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;

    struct Fixture {
        dir: tempfile::TempDir,
        plugins: PluginSet,
        registry: TargetRegistry,
        popup: PopupResolver,
    }

    impl Fixture {
        fn new(page: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("popup.html"), page).unwrap();
            fs::write(dir.path().join("popup.js"), "console.log('popup')").unwrap();
            fs::write(dir.path().join("popup.css"), "body{margin:0}").unwrap();
            fs::write(dir.path().join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
            Self {
                dir,
                plugins: PluginSet::from_config(&ProjectConfig::default()).unwrap(),
                registry: TargetRegistry::new(),
                popup: PopupResolver::new(),
            }
        }

        fn entry(&self) -> PathBuf {
            self.dir.path().join("popup.html")
        }

        fn register(&mut self) -> ResourceSetDiff {
            let entry = self.entry();
            self.popup
                .register(&entry, &self.plugins, &mut self.registry)
                .unwrap()
        }
    }

    const PAGE: &str = r#"<html><head><link rel="stylesheet" href="./popup.css"></head>
<body><img src="logo.png"><script src="popup.js"></script></body></html>"#;

    #[test]
    fn registers_page_and_resources_once() {
        let mut fx = Fixture::new(PAGE);
        let diff = fx.register();

        assert_eq!(diff.scripts.add.len(), 1);
        assert_eq!(diff.hrefs.add.len(), 1);
        assert_eq!(diff.srcs.add.len(), 1);
        // page + script + stylesheet; media are copied, not compiled
        assert_eq!(fx.registry.len(), 3);

        let again = fx.register();
        assert!(again.is_empty());
        assert_eq!(fx.registry.len(), 3);
        assert_eq!(fx.popup.sync_results().len(), 2);
    }

    #[test]
    fn edits_add_and_remove_targets() {
        let mut fx = Fixture::new(PAGE);
        fx.register();

        fs::write(fx.dir.path().join("extra.js"), "1").unwrap();
        fs::write(
            fx.entry(),
            r#"<html><body><script src="extra.js"></script></body></html>"#,
        )
        .unwrap();
        let diff = fx.register();

        assert_eq!(diff.scripts.delete.len(), 1);
        assert_eq!(diff.hrefs.delete.len(), 1);
        assert_eq!(diff.scripts.add.len(), 1);
        assert_eq!(fx.registry.len(), 2);
        let flags: Vec<TargetFlag> = fx.popup.sync_results().iter().map(|s| s.flag).collect();
        assert_eq!(flags, vec![TargetFlag::HtmlScript]);
    }

    #[test]
    fn extension_mode_points_at_hashed_files() {
        let mut fx = Fixture::new(PAGE);
        fx.register();
        fx.registry.build().unwrap();

        let out = fx.popup.extension_output(&fx.registry, "var A = 1;\n").unwrap().unwrap();
        let script_name = output_file_name(&fx.dir.path().join("popup.js"), "js");
        let css_name = output_file_name(&fx.dir.path().join("popup.css"), "css");

        assert!(out.html.contains(&format!(r#"<script src="{script_name}">"#)));
        assert!(out.html.contains(&format!(r#"href="{css_name}""#)));
        assert!(out.html.contains(r#"<img src="/public/logo.png">"#));
        assert!(out.html_file_name.ends_with("_popup.html"));

        let script = out.files.iter().find(|f| f.name == script_name).unwrap();
        assert!(String::from_utf8_lossy(&script.bytes).starts_with("var A = 1;\n"));
        assert!(out.files.iter().any(|f| f.name == "public/logo.png"));
    }

    #[test]
    fn userscript_mode_inlines_everything() {
        let mut fx = Fixture::new(PAGE);
        fx.register();
        fx.registry.build().unwrap();

        let html = fx.popup.inline_html(&fx.registry, "").unwrap().unwrap();
        assert!(!html.contains("src=\"popup.js\""));
        assert!(html.contains("console.log("));
        assert!(html.contains("<style>body{margin:0}</style>"));
        assert!(html.contains("data:image/png;base64,"));
        assert!(html.contains("scrollbar-width: none"));
    }

    #[test]
    fn removed_media_become_stale() {
        let mut fx = Fixture::new(PAGE);
        fx.register();
        fs::write(fx.entry(), "<html><body></body></html>").unwrap();
        fx.register();
        fx.registry.build().unwrap();

        let out = fx.popup.extension_output(&fx.registry, "").unwrap().unwrap();
        assert_eq!(out.stale, vec!["public/logo.png"]);

        let out = fx.popup.extension_output(&fx.registry, "").unwrap().unwrap();
        assert!(out.stale.is_empty());
    }

    #[test]
    fn icon_links_are_copied_not_compiled() {
        let mut fx = Fixture::new(
            r#"<html><head><link rel="icon" href="logo.png"><link rel="stylesheet" href="popup.css"></head>
<body><script src="popup.js"></script></body></html>"#,
        );
        let diff = fx.register();
        assert_eq!(diff.links.add.len(), 1);
        assert_eq!(diff.hrefs.add.len(), 1);
        assert_eq!(fx.registry.len(), 3);
        fx.registry.build().unwrap();

        let out = fx.popup.extension_output(&fx.registry, "").unwrap().unwrap();
        assert!(out.html.contains(r#"href="/public/logo.png""#));
        assert!(out.files.iter().any(|f| f.name == "public/logo.png"));

        let html = fx.popup.inline_html(&fx.registry, "").unwrap().unwrap();
        assert!(html.contains(r#"rel="icon" href="data:image/png;base64,"#));
    }

    #[test]
    fn unmatched_resource_plans_nothing() {
        let mut fx = Fixture::new(r#"<html><body><script src="app.ts"></script></body></html>"#);
        let entry = fx.entry();
        assert!(fx.popup.plan(&entry, &fx.plugins).is_err());
        assert!(fx.popup.entry().is_none());
        assert!(fx.registry.is_empty());

        fs::write(&entry, PAGE).unwrap();
        let plan = fx.popup.plan(&entry, &fx.plugins).unwrap();
        assert_eq!(plan.diff().scripts.add.len(), 1);
        assert!(fx.registry.is_empty());
        fx.popup.apply(plan, &mut fx.registry);
        assert_eq!(fx.registry.len(), 3);
    }

    #[test]
    fn remove_unregisters_without_touching_the_file() {
        let mut fx = Fixture::new(PAGE);
        fx.register();
        fx.popup.remove(&mut fx.registry);

        assert!(fx.registry.is_empty());
        assert!(fx.entry().is_file());
        assert!(fx.popup.entry().is_none());
    }
}
