//! Manifest-level registration: diff the manifest's resources against the last
//! registered set and add or remove build targets to match.

use std::path::Path;

use tracing::{debug, info};

use crate::diff::{diff_from, Diff};
use crate::error::Result;
use crate::manifest::ManifestResources;
use crate::plugin::{PluginSet, TargetPlugins};
use crate::popup::PopupResolver;
use crate::registry::{TargetFlag, TargetRegistry};

/// What one `register_all` pass changed, per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    pub content: Diff,
    pub sw: Diff,
    pub css: Diff,
    pub popup: Diff,
}

impl RegistrationReport {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.sw.is_empty() && self.css.is_empty() && self.popup.is_empty()
    }
}

/// Remembers the resource keys registered by the previous pass.
#[derive(Debug, Default)]
pub struct BundlerRegisterer {
    content: Option<Vec<String>>,
    sw: Option<Vec<String>>,
    css: Option<Vec<String>>,
    popup: Option<Vec<String>>,
}

impl BundlerRegisterer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sync the registry with `resources`. Plugins for every added resource,
    /// popup page resources included, are resolved first; an unmatched one
    /// fails the pass before anything changes.
    pub fn register_all(
        &mut self,
        resources: &ManifestResources,
        plugins: &PluginSet,
        registry: &mut TargetRegistry,
        popup: &mut PopupResolver,
    ) -> Result<RegistrationReport> {
        let content_now = resources.content_paths();
        let sw_now = resources.sw_paths();
        let css_now = resources.css_paths();
        let popup_now = resources.popup_paths();

        let report = RegistrationReport {
            content: diff_from(self.content.as_deref(), &content_now),
            sw: diff_from(self.sw.as_deref(), &sw_now),
            css: diff_from(self.css.as_deref(), &css_now),
            popup: diff_from(self.popup.as_deref(), &popup_now),
        };

        let groups = [
            (TargetFlag::Content, &report.content),
            (TargetFlag::Sw, &report.sw),
            (TargetFlag::Css, &report.css),
        ];

        let mut additions: Vec<(&str, TargetPlugins, TargetFlag)> = Vec::new();
        for (flag, diff) in groups {
            for path in &diff.add {
                additions.push((path, plugins.resolve(Path::new(path))?, flag));
            }
        }
        let popup_plans = report
            .popup
            .add
            .iter()
            .map(|entry| popup.plan(Path::new(entry), plugins))
            .collect::<Result<Vec<_>>>()?;

        for (path, target_plugins, flag) in additions {
            let handle = registry.add_target(path, target_plugins, flag);
            debug!(%handle, %flag, path, "target added");
        }
        for (flag, diff) in groups {
            for path in &diff.delete {
                registry.remove_target(Path::new(path), Some(flag));
                debug!(%flag, path, "target removed");
            }
        }

        self.content = Some(content_now);
        self.sw = Some(sw_now);
        self.css = Some(css_now);

        if !report.popup.delete.is_empty() {
            popup.remove(registry);
        }
        for plan in popup_plans {
            popup.apply(plan, registry);
        }
        self.popup = Some(popup_now);

        if !report.is_empty() {
            info!(
                added = report.content.add.len() + report.sw.add.len() + report.css.add.len(),
                removed = report.content.delete.len() + report.sw.delete.len() + report.css.delete.len(),
                popup = report.popup.add.len(),
                "registered manifest resources"
            );
        }
        Ok(report)
    }

    /// Forget everything registered so far. The next pass registers the whole
    /// manifest again.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PluginRuleConfig, ProjectConfig};
    use crate::error::CrxmError;
    use crate::manifest::ManifestModel;
    use std::fs;

    struct Project {
        dir: tempfile::TempDir,
        plugins: PluginSet,
        registry: TargetRegistry,
        popup: PopupResolver,
        registerer: BundlerRegisterer,
    }

    impl Project {
        fn new(config: ProjectConfig) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for f in ["a.js", "b.js", "sw.js", "a.css"] {
                fs::write(dir.path().join(f), "/* */").unwrap();
            }
            fs::write(
                dir.path().join("popup.html"),
                r#"<html><body><script src="a.js"></script></body></html>"#,
            )
            .unwrap();
            Self {
                dir,
                plugins: PluginSet::from_config(&config).unwrap(),
                registry: TargetRegistry::new(),
                popup: PopupResolver::new(),
                registerer: BundlerRegisterer::new(),
            }
        }

        fn register(&mut self, manifest: serde_json::Value) -> Result<RegistrationReport> {
            let m: ManifestModel = serde_json::from_value(manifest).unwrap();
            let res = ManifestResources::parse(&m, self.dir.path());
            self.registerer
                .register_all(&res, &self.plugins, &mut self.registry, &mut self.popup)
        }

        fn key(&self, name: &str) -> String {
            self.dir.path().join(name).to_string_lossy().into_owned()
        }
    }

    fn content(js: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "name": "x", "version": "1",
            "content_scripts": [{ "matches": ["<all_urls>"], "js": js }]
        })
    }

    #[test]
    fn incremental_add() {
        let mut p = Project::new(ProjectConfig::default());

        let first = p.register(content(&["a.js"])).unwrap();
        assert_eq!(first.content.add, vec![p.key("a.js")]);
        assert_eq!(p.registry.len(), 1);

        let second = p.register(content(&["a.js", "b.js"])).unwrap();
        assert_eq!(second.content.add, vec![p.key("b.js")]);
        assert!(second.content.delete.is_empty());
        assert_eq!(p.registry.len(), 2);
    }

    #[test]
    fn unchanged_manifest_is_a_no_op() {
        let mut p = Project::new(ProjectConfig::default());
        p.register(content(&["a.js", "b.js"])).unwrap();
        let again = p.register(content(&["a.js", "b.js"])).unwrap();
        assert!(again.is_empty());
        assert_eq!(p.registry.len(), 2);
    }

    #[test]
    fn removed_resources_leave_the_registry() {
        let mut p = Project::new(ProjectConfig::default());
        p.register(content(&["a.js", "b.js"])).unwrap();
        let report = p.register(content(&["b.js"])).unwrap();

        assert_eq!(report.content.delete, vec![p.key("a.js")]);
        assert_eq!(p.registry.len(), 1);
        let a = p.dir.path().join("a.js");
        assert!(p.registry.handle_for_path(&a, Some(TargetFlag::Content)).is_none());
    }

    #[test]
    fn categories_are_registered_independently() {
        let mut p = Project::new(ProjectConfig::default());
        let report = p
            .register(serde_json::json!({
                "name": "x", "version": "1",
                "background": { "service_worker": "a.js" },
                "action": { "default_popup": "popup.html" },
                "content_scripts": [{ "matches": ["<all_urls>"], "js": ["a.js"], "css": ["a.css"] }]
            }))
            .unwrap();

        assert_eq!(report.sw.add.len(), 1);
        assert_eq!(report.popup.add, vec![p.key("popup.html")]);
        let a = p.dir.path().join("a.js");
        for flag in [TargetFlag::Content, TargetFlag::Sw, TargetFlag::HtmlScript] {
            assert!(p.registry.handle_for_path(&a, Some(flag)).is_some(), "{flag}");
        }
        // a.js ×3, a.css, popup.html
        assert_eq!(p.registry.len(), 5);

        let report = p.register(content(&["a.js"])).unwrap();
        assert_eq!(report.popup.delete, vec![p.key("popup.html")]);
        assert_eq!(p.registry.len(), 1);
        assert!(p.popup.entry().is_none());
    }

    #[test]
    fn unmatched_resource_fails_before_registering() {
        let config = ProjectConfig {
            build: vec![PluginRuleConfig::new(r"a\.js$", "script")],
            watch: vec![PluginRuleConfig::new(r"a\.js$", "script")],
            ..ProjectConfig::default()
        };
        let mut p = Project::new(config);

        let err = p.register(content(&["a.js", "b.js"])).unwrap_err();
        assert!(matches!(err, CrxmError::NoPlugin { .. }), "{err}");
        assert!(p.registry.is_empty());

        // nothing was committed, so a fixed manifest registers everything
        let report = p.register(content(&["a.js"])).unwrap();
        assert_eq!(report.content.add.len(), 1);
    }

    #[test]
    fn unmatched_popup_resource_fails_before_registering() {
        let mut p = Project::new(ProjectConfig::default());
        fs::write(
            p.dir.path().join("popup.html"),
            r#"<html><body><script src="app.ts"></script></body></html>"#,
        )
        .unwrap();
        let manifest = serde_json::json!({
            "name": "x", "version": "1",
            "action": { "default_popup": "popup.html" },
            "content_scripts": [{ "matches": ["<all_urls>"], "js": ["a.js"] }]
        });

        let err = p.register(manifest.clone()).unwrap_err();
        assert!(matches!(err, CrxmError::NoPlugin { .. }), "{err}");
        assert!(p.registry.is_empty());
        assert!(p.popup.entry().is_none());

        // the failed pass left no half-registered state behind
        fs::write(
            p.dir.path().join("popup.html"),
            r#"<html><body><script src="b.js"></script></body></html>"#,
        )
        .unwrap();
        let report = p.register(manifest).unwrap();
        assert_eq!(report.content.add, vec![p.key("a.js")]);
        assert_eq!(report.popup.add, vec![p.key("popup.html")]);
        // a.js, popup.html, b.js
        assert_eq!(p.registry.len(), 3);
    }
}
