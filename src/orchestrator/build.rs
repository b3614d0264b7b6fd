//! One-shot production build. Every error is fatal.

use tracing::info;

use super::Pipeline;
use crate::config::ConfigLoader;
use crate::emit::DistReport;
use crate::error::Result;

pub fn build(loader: ConfigLoader) -> Result<DistReport> {
    let mut pipeline = Pipeline::open(loader, false)?;

    pipeline.cleanup()?;
    let report = pipeline.register()?;
    info!(
        content = report.content.add.len(),
        sw = report.sw.add.len(),
        css = report.css.add.len(),
        "targets registered"
    );

    pipeline.registry().build()?;
    pipeline.dist()
}
