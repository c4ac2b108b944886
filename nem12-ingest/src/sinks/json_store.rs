use std::path::{Path, PathBuf};

use meter_model::domain::DailyUsage;
use serde_json::{Map, Value};

use crate::sinks::store::{
    check_batch, document_id, DailyDocument, DailyStore, SiteDocument, StoreError, UpsertOutcome,
};

/// Daily fields filled by the other data sources. Created empty, never overwritten here.
const FOREIGN_FIELDS: [&str; 3] = ["solar_generations", "battery_charges", "battery_discharges"];

/// File-system document store.
///
/// Layout: `<root>/<collection>/<nmi>.json` for the site and
/// `<root>/<collection>/<nmi>/dailies/<YYYYMMDD>.json` per day. Each document
/// is replaced atomically via a temporary file and rename. A daily batch is
/// staged in full before any document is renamed into place, so a failed batch
/// leaves the previous documents untouched.
#[derive(Debug, Clone)]
pub struct JsonDocumentStore {
    root: PathBuf,
    collection: String,
}

impl JsonDocumentStore {
    pub fn new<P: Into<PathBuf>>(root: P, collection: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            collection: collection.into(),
        }
    }

    pub fn site_path(&self, nmi: &str) -> PathBuf {
        self.root.join(&self.collection).join(format!("{nmi}.json"))
    }

    pub fn dailies_dir(&self, nmi: &str) -> PathBuf {
        self.root.join(&self.collection).join(nmi).join("dailies")
    }

    pub fn daily_path(&self, nmi: &str, id: &str) -> PathBuf {
        self.dailies_dir(nmi).join(format!("{id}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |error| StoreError::Io {
        path: path.display().to_string(),
        error,
    }
}

async fn read_object(path: &Path) -> Result<Option<Map<String, Value>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Ok(None),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

/// Write `doc` next to `path` under a temporary name; returns the temporary path.
async fn stage_object(path: &Path, doc: &Map<String, Value>) -> Result<PathBuf, StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }
    let body = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await.map_err(io_error(&tmp))?;
    Ok(tmp)
}

async fn write_object(path: &Path, doc: &Map<String, Value>) -> Result<(), StoreError> {
    let tmp = stage_object(path, doc).await?;
    tokio::fs::rename(&tmp, path).await.map_err(io_error(path))
}

async fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if let Err(e) = tokio::fs::remove_file(tmp).await {
            tracing::warn!(path = %tmp.display(), error = %e, "failed to remove staged document");
        }
    }
}

/// Overlay `fields` on `existing`; returns the merged document and whether it changed.
fn merge_fields(
    existing: Option<Map<String, Value>>,
    fields: Map<String, Value>,
    defaults: &[&str],
) -> (Map<String, Value>, bool) {
    let mut merged = existing.clone().unwrap_or_default();
    for (key, value) in fields {
        merged.insert(key, value);
    }
    for key in defaults {
        merged
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
    }
    let changed = existing.as_ref() != Some(&merged);
    (merged, changed)
}

fn to_object<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

impl JsonDocumentStore {
    async fn stage_dailies(
        &self,
        nmi: &str,
        dailies: &[DailyUsage],
        staged: &mut Vec<(PathBuf, PathBuf)>,
        outcome: &mut UpsertOutcome,
    ) -> Result<(), StoreError> {
        for daily in dailies {
            let path = self.daily_path(nmi, &document_id(daily)?);
            let existing = read_object(&path).await?;
            let fields = to_object(&DailyDocument::from_usage(daily)?)?;

            let (merged, changed) = merge_fields(existing, fields, &FOREIGN_FIELDS);
            if changed {
                let tmp = stage_object(&path, &merged).await?;
                staged.push((tmp, path));
            } else {
                outcome.unchanged += 1;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DailyStore for JsonDocumentStore {
    async fn upsert_site(&self, site: &SiteDocument) -> Result<(), StoreError> {
        let path = self.site_path(&site.nmi);
        let existing = read_object(&path).await?;
        let (merged, changed) = merge_fields(existing, to_object(site)?, &[]);
        if changed {
            write_object(&path, &merged).await?;
        }
        Ok(())
    }

    async fn upsert_dailies(
        &self,
        nmi: &str,
        year: i32,
        dailies: &[DailyUsage],
    ) -> Result<UpsertOutcome, StoreError> {
        check_batch(nmi, year, dailies)?;

        let mut staged = Vec::new();
        let mut outcome = UpsertOutcome::default();
        if let Err(e) = self.stage_dailies(nmi, dailies, &mut staged, &mut outcome).await {
            discard(&staged).await;
            return Err(e);
        }

        for (tmp, path) in &staged {
            tokio::fs::rename(tmp, path).await.map_err(io_error(path))?;
        }
        outcome.written = staged.len();

        tracing::debug!(nmi, year, written = outcome.written, unchanged = outcome.unchanged, "upserted daily documents");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::store::fixtures::daily;
    use serde_json::json;
    use time::macros::date;

    const NMI: &str = "6408091979";

    fn read(path: &Path) -> Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn writes_site_and_daily_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDocumentStore::new(dir.path(), "sites");

        store
            .upsert_site(&SiteDocument {
                nmi: NMI.to_string(),
                name: "Home".to_string(),
                interval_length: 30,
                uom: "KWH".to_string(),
            })
            .await
            .unwrap();
        let outcome = store
            .upsert_dailies(NMI, 2019, &[daily(NMI, date!(2019 - 03 - 31), 1.5)])
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome { written: 1, unchanged: 0 });

        let site = read(&dir.path().join("sites").join("6408091979.json"));
        assert_eq!(site["name"], json!("Home"));
        assert_eq!(site["uom"], json!("KWH"));

        let doc = read(&store.daily_path(NMI, "20190331"));
        assert_eq!(doc["interval_date"], json!("2019-03-31"));
        assert_eq!(doc["meter_consumptions"].as_array().unwrap().len(), 48);
        assert_eq!(doc["meter_consumptions"][0], json!(1.5));
        assert_eq!(doc["solar_generations"], json!([]));
        assert_eq!(doc["complete"], json!(true));
    }

    #[tokio::test]
    async fn resubmitting_a_day_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDocumentStore::new(dir.path(), "sites");
        let days = [daily(NMI, date!(2019 - 03 - 31), 1.0), daily(NMI, date!(2019 - 04 - 01), 2.0)];

        store.upsert_dailies(NMI, 2019, &days).await.unwrap();
        let again = store.upsert_dailies(NMI, 2019, &days).await.unwrap();

        assert_eq!(again, UpsertOutcome { written: 0, unchanged: 2 });
        let files = std::fs::read_dir(store.dailies_dir(NMI)).unwrap().count();
        assert_eq!(files, 2);
    }

    #[tokio::test]
    async fn upsert_overwrites_meter_fields_and_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDocumentStore::new(dir.path(), "sites");
        let path = store.daily_path(NMI, "20190331");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            serde_json::to_vec(&json!({
                "interval_date": "2019-03-31",
                "meter_consumptions": [9.0],
                "solar_generations": [0.1, 0.2],
            }))
            .unwrap(),
        )
        .unwrap();

        let outcome = store
            .upsert_dailies(NMI, 2019, &[daily(NMI, date!(2019 - 03 - 31), 1.0)])
            .await
            .unwrap();
        assert_eq!(outcome.written, 1);

        let doc = read(&path);
        assert_eq!(doc["meter_consumptions"], json!(vec![1.0; 48]));
        assert_eq!(doc["solar_generations"], json!([0.1, 0.2]));
        assert_eq!(doc["battery_charges"], json!([]));
    }

    #[tokio::test]
    async fn failed_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDocumentStore::new(dir.path(), "sites");
        // A directory squatting on the second day's staging path makes its write fail.
        let blocked = store.daily_path(NMI, "20190401").with_extension("json.tmp");
        std::fs::create_dir_all(&blocked).unwrap();
        let days = [daily(NMI, date!(2019 - 03 - 31), 1.0), daily(NMI, date!(2019 - 04 - 01), 2.0)];

        let err = store.upsert_dailies(NMI, 2019, &days).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!store.daily_path(NMI, "20190331").exists());
        assert!(!store.daily_path(NMI, "20190331").with_extension("json.tmp").exists());

        std::fs::remove_dir(&blocked).unwrap();
        let outcome = store.upsert_dailies(NMI, 2019, &days).await.unwrap();
        assert_eq!(outcome, UpsertOutcome { written: 2, unchanged: 0 });
    }

    #[tokio::test]
    async fn mixed_year_batches_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDocumentStore::new(dir.path(), "sites");
        let days = [daily(NMI, date!(2019 - 12 - 31), 1.0), daily(NMI, date!(2020 - 01 - 01), 1.0)];

        let err = store.upsert_dailies(NMI, 2019, &days).await.unwrap_err();
        assert!(matches!(err, StoreError::MixedBatch { .. }));
        assert!(!store.dailies_dir(NMI).exists());
    }
}
