//! Userscript output, plus the `dev.user.js` loader in development.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{dev_userjs_path, DistInput, Distributor};
use crate::devclient::dev_userjs_loader;
use crate::error::Result;
use crate::userscript::{build_userscript, UserscriptSources};

/// Returns the number of files written and the dev loader path, if any.
pub(super) fn emit(
    dist: &mut Distributor,
    input: &mut DistInput<'_>,
    path: &Path,
) -> Result<(usize, Option<PathBuf>)> {
    let bundle = build_userscript(&UserscriptSources {
        manifest: input.manifest,
        resources: input.resources,
        project_dir: input.project_dir,
        config: input.config,
        registry: input.registry,
        popup: &*input.popup,
    })?;

    let mut written = dist.write(path, bundle.render().as_bytes())?;

    if !dist.dev {
        debug!(path = %path.display(), "userscript emitted");
        return Ok((written, None));
    }

    let mut header = bundle.header().clone();
    header.push_unique("@grant", "GM_xmlhttpRequest");
    header.push_unique("@connect", input.config.server.host.as_str());

    let trusted = input
        .manifest
        .content_scripts
        .iter()
        .any(|e| e.trusted_inject());
    let loader = dev_userjs_loader(&input.config.server, trusted);

    let dev_path = dev_userjs_path(path);
    written += dist.write(&dev_path, format!("{header}\n\n{loader}").as_bytes())?;
    debug!(path = %path.display(), dev = %dev_path.display(), "userscript emitted");
    Ok((written, Some(dev_path)))
}
