use std::path::PathBuf;

use futures::Stream;
use meter_model::domain::DailyUsage;

use crate::{
    nem12::{daily_usage, parse_files, Nem12Error},
    pipeline::{Envelope, PipelineError, Source},
};

/// Daily usage from a set of NEM12 files parsed as one session.
///
/// The whole set is parsed and aggregated before the first item is yielded,
/// so a malformed file yields a single error and no days.
pub struct Nem12FileSource {
    paths: Vec<PathBuf>,
}

impl Nem12FileSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

fn load_daily_usage(paths: &[PathBuf]) -> Result<Vec<DailyUsage>, Nem12Error> {
    let session = parse_files(paths)?;
    daily_usage(&session)
}

#[async_trait::async_trait]
impl Source<DailyUsage> for Nem12FileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<DailyUsage>, PipelineError>> + Send>> {
        let paths = self.paths.clone();
        let s = async_stream::try_stream! {
            let loaded = tokio::task::spawn_blocking(move || load_daily_usage(&paths))
                .await
                .map_err(|e| PipelineError::Source(format!("nem12 parser task failed: {e}")))?;

            let dailies = loaded.map_err(|e| PipelineError::Source(e.to_string()))?;

            for daily in dailies {
                yield Envelope::new(daily);
            }
        };

        Box::pin(s)
    }
}
