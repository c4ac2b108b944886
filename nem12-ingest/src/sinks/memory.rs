use std::collections::BTreeMap;

use meter_model::domain::DailyUsage;
use tokio::sync::Mutex;

use crate::sinks::store::{
    check_batch, document_id, DailyDocument, DailyStore, SiteDocument, StoreError, UpsertOutcome,
};

/// In-process [`DailyStore`] keyed by (nmi, document id).
#[derive(Debug, Default)]
pub struct MemoryStore {
    sites: Mutex<BTreeMap<String, SiteDocument>>,
    dailies: Mutex<BTreeMap<(String, String), DailyDocument>>,
    batches: Mutex<Vec<(String, i32, usize)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn site(&self, nmi: &str) -> Option<SiteDocument> {
        self.sites.lock().await.get(nmi).cloned()
    }

    pub async fn daily(&self, nmi: &str, id: &str) -> Option<DailyDocument> {
        self.dailies
            .lock()
            .await
            .get(&(nmi.to_string(), id.to_string()))
            .cloned()
    }

    pub async fn daily_count(&self) -> usize {
        self.dailies.lock().await.len()
    }

    /// (nmi, year, size) of every batch received, in order.
    pub async fn batches(&self) -> Vec<(String, i32, usize)> {
        self.batches.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl DailyStore for MemoryStore {
    async fn upsert_site(&self, site: &SiteDocument) -> Result<(), StoreError> {
        self.sites
            .lock()
            .await
            .insert(site.nmi.clone(), site.clone());
        Ok(())
    }

    async fn upsert_dailies(
        &self,
        nmi: &str,
        year: i32,
        dailies: &[DailyUsage],
    ) -> Result<UpsertOutcome, StoreError> {
        check_batch(nmi, year, dailies)?;

        let mut docs = self.dailies.lock().await;
        let mut outcome = UpsertOutcome::default();
        for daily in dailies {
            let doc = DailyDocument::from_usage(daily)?;
            let key = (nmi.to_string(), document_id(daily)?);
            if docs.get(&key) == Some(&doc) {
                outcome.unchanged += 1;
            } else {
                docs.insert(key, doc);
                outcome.written += 1;
            }
        }

        self.batches
            .lock()
            .await
            .push((nmi.to_string(), year, dailies.len()));
        Ok(outcome)
    }
}
