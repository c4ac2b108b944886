use std::{fs, path::Path};

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Only the first call installs.
pub fn init() -> anyhow::Result<()> {
    PROM_HANDLE.get_or_try_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install Prometheus metrics recorder")
    })?;
    Ok(())
}

pub fn render() -> Option<String> {
    PROM_HANDLE.get().map(PrometheusHandle::render)
}

/// Write the current exposition text to `path` (textfile collector format).
pub fn write_textfile(path: &Path) -> anyhow::Result<()> {
    let body = render().context("Prometheus recorder not initialized")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;

    tracing::debug!(path = %path.display(), "wrote metrics textfile");
    Ok(())
}
