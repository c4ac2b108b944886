use std::{collections::HashSet, future::Future, time::Duration};

use futures::StreamExt;
use meter_model::domain::DailyUsage;

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    sinks::store::{DailyStore, SiteDocument, StoreError},
};

/// Writes daily usage to a [`DailyStore`], one batch per (nmi, calendar year).
///
/// Input is expected grouped by nmi and ordered by date, as produced by the
/// NEM12 aggregation; a new batch starts whenever the nmi or year changes. The
/// site document is upserted right before the first batch of each nmi is
/// written, so an abandoned session leaves no site behind.
pub struct YearBatchSink<D> {
    store: D,
    site_name: String,
    max_batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl<D: DailyStore> YearBatchSink<D> {
    pub fn new(
        store: D,
        site_name: impl Into<String>,
        max_batch_size: usize,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            site_name: site_name.into(),
            max_batch_size,
            max_retries,
            retry_backoff,
        }
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e @ (StoreError::BatchTooLarge { .. } | StoreError::MixedBatch { .. })) => {
                    metrics::counter!("daily_store_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        what,
                        "daily store write failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, what, "daily store write failed, giving up");
                    metrics::counter!("daily_store_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }

    async fn upsert_site(&self, first: &DailyUsage) -> Result<(), PipelineError> {
        let site = SiteDocument {
            nmi: first.nmi.clone(),
            name: self.site_name.clone(),
            interval_length: first.interval_length,
            uom: first.uom.clone(),
        };
        self.with_retry("site", || self.store.upsert_site(&site)).await
    }

    async fn flush_batch(
        &self,
        batch: &[DailyUsage],
        sites: &mut HashSet<String>,
    ) -> Result<(), PipelineError> {
        let Some(first) = batch.first() else {
            return Ok(());
        };
        if batch.len() > self.max_batch_size {
            metrics::counter!("daily_store_errors_total").increment(1);
            return Err(PipelineError::Sink(
                StoreError::BatchTooLarge {
                    size: batch.len(),
                    limit: self.max_batch_size,
                }
                .to_string(),
            ));
        }

        if !sites.contains(&first.nmi) {
            self.upsert_site(first).await?;
            sites.insert(first.nmi.clone());
        }

        let nmi = first.nmi.as_str();
        let year = first.year();
        let outcome = self
            .with_retry("dailies", || self.store.upsert_dailies(nmi, year, batch))
            .await?;

        metrics::counter!("daily_store_documents_written_total").increment(outcome.written as u64);
        metrics::counter!("daily_store_documents_unchanged_total").increment(outcome.unchanged as u64);
        tracing::info!(
            nmi,
            year,
            written = outcome.written,
            unchanged = outcome.unchanged,
            "stored daily usage"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl<D: DailyStore> Sink<DailyUsage> for YearBatchSink<D> {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<DailyUsage>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut buffer: Vec<DailyUsage> = Vec::new();
        let mut sites: HashSet<String> = HashSet::new();

        while let Some(item) = input.next().await {
            let daily = match item {
                Ok(env) => env.payload,
                Err(e) if e.is_item_level() => {
                    tracing::warn!(error = %e, "skipping day");
                    continue;
                }
                Err(e) => {
                    // Nothing buffered is written once the session has failed.
                    tracing::error!(error = %e, discarded = buffer.len(), "upstream failed, abandoning session");
                    return Err(e);
                }
            };

            let boundary = buffer
                .first()
                .is_some_and(|b| b.nmi != daily.nmi || b.year() != daily.year());
            if boundary {
                self.flush_batch(&buffer, &mut sites).await?;
                buffer.clear();
            }
            buffer.push(daily);
        }

        self.flush_batch(&buffer, &mut sites).await
    }
}
