//! Chrome extension output.
//!
//! Every compiled resource is written as `<hash32(path)>_<basename>` and the
//! manifest workspace is resolved to the new name. `manifest.json` is written
//! last, once every rewrite has happened.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::files::{copy_dir, output_file_name};
use super::{define_prefix, DistInput, Distributor};
use crate::devclient::{
    build_id_prefix, dev_content_script, dev_service_worker, isolated_connector,
    DEV_CONTENT_SCRIPT_FILE, ISOLATED_CONNECTOR_FILE,
};
use crate::error::{IoResultExt, Result};
use crate::manifest::i18n::{locales_dir, messages_for, DEFAULT_LANG};
use crate::manifest::resources::absolutize;
use crate::manifest::{ManifestWorkspace, RunAt, World};
use crate::registry::TargetFlag;
use crate::userscript::header::ALL_URLS;

/// Returns the number of files written and the manifest path.
pub(super) fn emit(
    dist: &mut Distributor,
    input: &mut DistInput<'_>,
    out_dir: &Path,
) -> Result<(usize, PathBuf)> {
    let mut ws = ManifestWorkspace::new(input.manifest);
    let mut written = 0;

    // ═══════════════════════════════════════════════════════════════════════════
    // Scripts and styles
    // ═══════════════════════════════════════════════════════════════════════════

    let connected: HashSet<PathBuf> = input
        .manifest
        .content_scripts
        .iter()
        .filter(|e| e.use_isolated_connection())
        .flat_map(|e| e.js.iter().map(|raw| absolutize(input.project_dir, raw)))
        .collect();

    let content_defines = define_prefix(&input.config.define.contentscripts);
    for r in &input.resources.content {
        let Some(bytes) = input.registry.result_or_compile(&r.path, Some(TargetFlag::Content))? else {
            warn!(path = %r.path.display(), "content script is not registered, skipped");
            continue;
        };
        let mut code = String::new();
        if dist.dev || connected.contains(&r.path) {
            code.push_str(&build_id_prefix(&dist.build_id));
        }
        code.push_str(&content_defines);
        code.push_str(&String::from_utf8_lossy(&bytes));

        let name = output_file_name(&r.path, "js");
        written += dist.write(&out_dir.join(&name), code.as_bytes())?;
        for raw in &r.raws {
            ws.resolve(raw, &name);
        }
    }

    let sw_defines = define_prefix(&input.config.define.sw);
    for r in &input.resources.sw {
        let Some(bytes) = input.registry.result_or_compile(&r.path, Some(TargetFlag::Sw))? else {
            warn!(path = %r.path.display(), "service worker is not registered, skipped");
            continue;
        };
        let code = format!("{sw_defines}{}", String::from_utf8_lossy(&bytes));
        let code = if dist.dev {
            dev_service_worker(&input.config.server, &code)
        } else {
            code
        };

        let name = output_file_name(&r.path, "js");
        written += dist.write(&out_dir.join(&name), code.as_bytes())?;
        for raw in &r.raws {
            ws.resolve(raw, &name);
        }
    }

    for r in &input.resources.css {
        let Some(bytes) = input.registry.result_or_compile(&r.path, Some(TargetFlag::Css))? else {
            warn!(path = %r.path.display(), "style is not registered, skipped");
            continue;
        };
        let name = output_file_name(&r.path, "css");
        written += dist.write(&out_dir.join(&name), &bytes)?;
        for raw in &r.raws {
            ws.resolve(raw, &name);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Popup
    // ═══════════════════════════════════════════════════════════════════════════

    let popup_defines = define_prefix(&input.config.define.popup);
    if let Some(out) = input.popup.extension_output(input.registry, &popup_defines)? {
        for file in &out.files {
            written += dist.write(&out_dir.join(&file.name), &file.bytes)?;
        }
        for stale in &out.stale {
            dist.remove(&out_dir.join(stale))?;
        }
        written += dist.write(&out_dir.join(&out.html_file_name), out.html.as_bytes())?;
        for r in &input.resources.popup {
            for raw in &r.raws {
                ws.resolve(raw, &out.html_file_name);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Static assets
    // ═══════════════════════════════════════════════════════════════════════════

    for icon in &input.resources.icons {
        let base = icon
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = format!("assets/icons/{base}");
        let bytes = fs::read(&icon.path).at_path(&icon.path)?;
        written += dist.write(&out_dir.join(&target), &bytes)?;
        ws.resolve(&icon.raw, &target);
    }

    let locales = locales_dir(input.project_dir);
    if locales.is_dir() {
        written += copy_dir(&locales, &out_dir.join("_locales"))?;
    }

    if let Some(public) = input.config.public_dir() {
        if public.is_dir() {
            written += copy_dir(&public, &out_dir.join("public"))?;
        } else {
            warn!(path = %public.display(), "public directory not found");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Generated clients
    // ═══════════════════════════════════════════════════════════════════════════

    if dist.dev {
        let code = dev_content_script(&dist.build_id, &input.config.server);
        written += dist.write(&out_dir.join(DEV_CONTENT_SCRIPT_FILE), code.as_bytes())?;
        ws.add_content_script(
            vec![DEV_CONTENT_SCRIPT_FILE.to_string()],
            Vec::new(),
            vec![ALL_URLS.to_string()],
            World::Isolated,
            Some(RunAt::DocumentStart),
        );

        let en_name = messages_for(input.project_dir, &input.manifest.name)?.remove(DEFAULT_LANG);
        ws.enable_dev_mode(en_name);
    }

    if input.manifest.uses_isolated_connection() {
        let mut matches: Vec<String> = Vec::new();
        for m in input
            .manifest
            .content_scripts
            .iter()
            .filter(|e| e.use_isolated_connection())
            .flat_map(|e| &e.matches)
        {
            if !matches.contains(m) {
                matches.push(m.clone());
            }
        }

        let config_json = serde_json::to_string(input.config)?;
        let code = isolated_connector(&dist.build_id, &config_json);
        written += dist.write(&out_dir.join(ISOLATED_CONNECTOR_FILE), code.as_bytes())?;
        ws.add_content_script(
            vec![ISOLATED_CONNECTOR_FILE.to_string()],
            Vec::new(),
            matches,
            World::Isolated,
            Some(RunAt::DocumentStart),
        );
    }

    let manifest_path = out_dir.join("manifest.json");
    written += dist.write(&manifest_path, ws.to_json()?.as_bytes())?;
    debug!(dir = %out_dir.display(), written, "extension emitted");
    Ok((written, manifest_path))
}
