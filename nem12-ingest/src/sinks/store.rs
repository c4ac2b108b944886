use std::sync::Arc;

use meter_model::domain::DailyUsage;
use serde::{Deserialize, Serialize};
use time::{format_description::BorrowedFormatItem, macros::format_description};

const DOCUMENT_ID_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year][month][day]");
const INTERVAL_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store i/o error at {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("batch of {size} documents exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
    #[error("batch for {nmi}/{year} contains a day from {other}")]
    MixedBatch { nmi: String, year: i32, other: String },
    #[error("invalid date: {0}")]
    Date(#[from] time::error::Format),
}

/// Top-level document describing a metering site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDocument {
    pub nmi: String,
    pub name: String,
    pub interval_length: u32,
    pub uom: String,
}

/// The meter-owned fields of a daily document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDocument {
    pub interval_date: String,
    pub meter_consumptions: Vec<f64>,
    pub meter_generations: Vec<f64>,
    pub meter_qualities: Vec<String>,
    pub complete: bool,
}

impl DailyDocument {
    pub fn from_usage(daily: &DailyUsage) -> Result<Self, StoreError> {
        Ok(Self {
            interval_date: daily.interval_date.format(INTERVAL_DATE_FORMAT)?,
            meter_consumptions: daily.consumptions.clone(),
            meter_generations: daily.generations.clone(),
            meter_qualities: daily.qualities.clone(),
            complete: daily.complete,
        })
    }
}

/// `YYYYMMDD`, the key of a daily document under its site.
pub fn document_id(daily: &DailyUsage) -> Result<String, StoreError> {
    Ok(daily.interval_date.format(DOCUMENT_ID_FORMAT)?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub written: usize,
    pub unchanged: usize,
}

impl std::ops::AddAssign for UpsertOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.written += rhs.written;
        self.unchanged += rhs.unchanged;
    }
}

/// Document storage for site and daily documents.
///
/// Upserts merge: re-submitting a date replaces that date's meter fields and
/// leaves any other fields of the document alone.
#[async_trait::async_trait]
pub trait DailyStore: Send + Sync {
    async fn upsert_site(&self, site: &SiteDocument) -> Result<(), StoreError>;

    /// All `dailies` belong to `nmi` and fall in calendar `year`. On error no
    /// document of the batch is visible.
    async fn upsert_dailies(
        &self,
        nmi: &str,
        year: i32,
        dailies: &[DailyUsage],
    ) -> Result<UpsertOutcome, StoreError>;
}

#[async_trait::async_trait]
impl<T: DailyStore + ?Sized> DailyStore for Arc<T> {
    async fn upsert_site(&self, site: &SiteDocument) -> Result<(), StoreError> {
        (**self).upsert_site(site).await
    }

    async fn upsert_dailies(
        &self,
        nmi: &str,
        year: i32,
        dailies: &[DailyUsage],
    ) -> Result<UpsertOutcome, StoreError> {
        (**self).upsert_dailies(nmi, year, dailies).await
    }
}

/// Reject a batch that mixes sites or years.
pub fn check_batch(nmi: &str, year: i32, dailies: &[DailyUsage]) -> Result<(), StoreError> {
    match dailies.iter().find(|d| d.nmi != nmi || d.year() != year) {
        Some(d) => Err(StoreError::MixedBatch {
            nmi: nmi.to_string(),
            year,
            other: format!("{}/{}", d.nmi, d.interval_date),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use meter_model::domain::DailyUsage;
    use time::Date;

    pub fn daily(nmi: &str, date: Date, value: f64) -> DailyUsage {
        DailyUsage {
            nmi: nmi.to_string(),
            interval_date: date,
            interval_length: 30,
            uom: "KWH".to_string(),
            consumptions: vec![value; 48],
            generations: vec![0.0; 48],
            qualities: vec!["A".to_string(); 48],
            complete: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::daily;
    use super::*;
    use time::macros::date;

    #[test]
    fn daily_document_uses_iso_date_and_compact_id() {
        let d = daily("6408091979", date!(2019 - 03 - 01), 1.0);
        assert_eq!(document_id(&d).unwrap(), "20190301");

        let doc = DailyDocument::from_usage(&d).unwrap();
        assert_eq!(doc.interval_date, "2019-03-01");
        assert_eq!(doc.meter_consumptions.len(), 48);
        assert!(doc.complete);
    }

    #[test]
    fn batches_must_share_site_and_year() {
        let days = vec![
            daily("6408091979", date!(2019 - 12 - 31), 1.0),
            daily("6408091979", date!(2020 - 01 - 01), 1.0),
        ];
        assert!(check_batch("6408091979", 2019, &days[..1]).is_ok());
        assert!(matches!(
            check_batch("6408091979", 2019, &days),
            Err(StoreError::MixedBatch { .. })
        ));
        assert!(check_batch("6123456789", 2019, &days[..1]).is_err());
    }
}
