use meter_model::domain::DailyUsage;

use crate::{
    config::IncompleteDayPolicy,
    pipeline::{Envelope, PipelineError, Transform},
};

/// Apply the incomplete-day policy to one day.
///
/// Complete days always pass. Incomplete days are rejected under
/// [`IncompleteDayPolicy::Drop`] and passed through with `complete = false`
/// under [`IncompleteDayPolicy::Flag`].
pub fn check_completeness(
    env: Envelope<DailyUsage>,
    policy: IncompleteDayPolicy,
) -> Result<Envelope<DailyUsage>, PipelineError> {
    let d = &env.payload;
    if d.complete {
        return Ok(env);
    }

    metrics::counter!("nem12_incomplete_days_total").increment(1);
    match policy {
        IncompleteDayPolicy::Drop => Err(PipelineError::Rejected(format!(
            "incomplete day {} for nmi {}: {} intervals",
            d.interval_date,
            d.nmi,
            d.interval_count()
        ))),
        IncompleteDayPolicy::Flag => {
            tracing::warn!(
                nmi = %d.nmi,
                date = %d.interval_date,
                intervals = d.interval_count(),
                "storing incomplete day"
            );
            Ok(env)
        }
    }
}

#[derive(Clone, Default)]
pub struct DailyCompleteness {
    policy: IncompleteDayPolicy,
}

impl DailyCompleteness {
    pub fn new(policy: IncompleteDayPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait::async_trait]
impl Transform<DailyUsage, DailyUsage> for DailyCompleteness {
    async fn apply(
        &self,
        input: Envelope<DailyUsage>,
    ) -> Result<Envelope<DailyUsage>, PipelineError> {
        check_completeness(input, self.policy)
    }
}
