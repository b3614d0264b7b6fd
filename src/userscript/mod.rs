//! # Userscript synthesizer
//!
//! Turns the compiled content scripts and styles into one Tampermonkey
//! script: metadata header, one function per resource, an optional popup menu
//! command, and an injector that replays the manifest's `content_scripts`
//! rules (URL patterns, `run_at`, direct call or page `<script>`).

pub mod bundler;
pub mod codeblock;
pub mod header;
pub mod injector;

use std::path::Path;

use tracing::{debug, warn};

use crate::config::ProjectConfig;
use crate::emit::define_prefix;
use crate::error::Result;
use crate::manifest::i18n::{messages_for, DEFAULT_LANG};
use crate::manifest::resources::path_key;
use crate::manifest::{ManifestModel, ManifestResources};
use crate::popup::PopupResolver;
use crate::registry::{TargetFlag, TargetRegistry};

pub use bundler::{PopupMenu, UserscriptBundle};
pub use codeblock::{function_name, BlockKind, CodeBlock};
pub use header::{manifest_header, HeaderFactory};
pub use injector::{match_pattern_to_regex, url_guard, CodeInjector};

/// Everything the synthesizer reads. Nothing here is mutated.
#[derive(Debug, Clone, Copy)]
pub struct UserscriptSources<'a> {
    pub manifest: &'a ManifestModel,
    pub resources: &'a ManifestResources,
    pub project_dir: &'a Path,
    pub config: &'a ProjectConfig,
    pub registry: &'a TargetRegistry,
    pub popup: &'a PopupResolver,
}

/// Collect a fresh bundle. Results that are not compiled yet are compiled on
/// the spot.
pub fn build_userscript(src: &UserscriptSources<'_>) -> Result<UserscriptBundle> {
    let header = manifest_header(src.manifest, src.resources, src.project_dir, src.config)?;

    let mut injector = CodeInjector::new();
    for entry in &src.manifest.content_scripts {
        injector.add_entry(entry, src.project_dir);
    }

    let mut bundle = UserscriptBundle::new(header, injector);

    for css in &src.resources.css {
        match src.registry.result_or_compile(&css.path, Some(TargetFlag::Css))? {
            Some(bytes) => bundle.add_block(CodeBlock::style(
                path_key(&css.path),
                String::from_utf8_lossy(&bytes),
            )),
            None => warn!(path = %css.path.display(), "style is not registered, skipped"),
        }
    }

    let defines = define_prefix(&src.config.define.contentscripts);
    for script in &src.resources.content {
        match src.registry.result_or_compile(&script.path, Some(TargetFlag::Content))? {
            Some(bytes) => bundle.add_block(CodeBlock::script(
                path_key(&script.path),
                format!("{defines}{}", String::from_utf8_lossy(&bytes)),
            )),
            None => warn!(path = %script.path.display(), "content script is not registered, skipped"),
        }
    }

    if src.config.popup_in_userscript {
        let popup_defines = define_prefix(&src.config.define.popup);
        if let Some(html) = src.popup.inline_html(src.registry, &popup_defines)? {
            let title = messages_for(src.project_dir, &src.manifest.name)?
                .remove(DEFAULT_LANG)
                .unwrap_or_else(|| src.manifest.name.clone());
            bundle.set_popup(PopupMenu { title, html });
        }
    }

    debug!(blocks = bundle.blocks().len(), "userscript assembled");
    Ok(bundle)
}
