use std::{path::PathBuf, sync::Arc, time::Duration};

use meter_model::domain::DailyUsage;

use crate::{
    config::AppConfig,
    pipeline::Pipeline,
    sinks::{DailyStore, YearBatchSink},
    sources::Nem12FileSource,
    transform::DailyCompleteness,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub failed: usize,
}

/// Load each file as its own session into `store`.
///
/// A failing session is logged and counted; the remaining files still load.
pub async fn load_files<D, I, P>(cfg: &AppConfig, store: D, files: I) -> LoadReport
where
    D: DailyStore + Clone + 'static,
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut report = LoadReport::default();

    for file in files {
        let file: PathBuf = file.into();
        let sink = YearBatchSink::new(
            store.clone(),
            cfg.store.site_name.clone(),
            cfg.sink.max_batch_size,
            cfg.sink.max_retries,
            Duration::from_millis(cfg.sink.retry_backoff_ms),
        );
        let pipeline: Pipeline<_, DailyUsage, _> = Pipeline {
            source: Nem12FileSource::new([file.clone()]),
            transforms: vec![Arc::new(DailyCompleteness::new(cfg.load.incomplete_days))],
            sink,
        };

        match pipeline.run().await {
            Ok(()) => {
                report.loaded += 1;
                tracing::info!(file = %file.display(), "loaded");
            }
            Err(e) => {
                report.failed += 1;
                metrics::counter!("nem12_sessions_failed_total").increment(1);
                tracing::error!(file = %file.display(), error = %e, "session abandoned");
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{nem12::parser::fixtures::*, sinks::MemoryStore};

    #[tokio::test]
    async fn a_malformed_file_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.csv");
        let bad = dir.path().join("bad.csv");
        let other = dir.path().join("other.csv");
        std::fs::write(&good, lines(&[header(NMI, "E1", "30"), day("20190331", "1.0", 48, "A")])).unwrap();
        std::fs::write(&bad, lines(&[day("20190331", "1.0", 48, "A"), header(NMI, "E1", "30")])).unwrap();
        std::fs::write(
            &other,
            lines(&[header("6123456789", "E1", "30"), day("20190401", "2.0", 48, "A")]),
        )
        .unwrap();

        let cfg = AppConfig::from_toml_str("").expect("config");
        let store = Arc::new(MemoryStore::new());
        let report = load_files(&cfg, store.clone(), [&good, &bad, &other]).await;

        assert_eq!(report, LoadReport { loaded: 2, failed: 1 });
        assert!(store.daily(NMI, "20190331").await.is_some());
        assert!(store.daily("6123456789", "20190401").await.is_some());
        assert_eq!(store.daily_count().await, 2);
    }
}
