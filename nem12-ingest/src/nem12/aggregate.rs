use std::collections::{btree_map::Entry, BTreeMap};

use meter_model::domain::{interval_count_for, DailyUsage, IntervalRow, IntervalTotal};
use time::Date;

use crate::nem12::{error::Nem12Error, flatten::flatten, parser::ParseSession};

/// Sum interval rows over registers, one total per (nmi, date, interval).
///
/// Consumption and generation are summed; generation is then made positive
/// since export channels may be signed. Quality, interval length and unit come
/// from the first row seen for the group. Output is ordered by key.
pub fn aggregate_intervals<I>(rows: I) -> Vec<IntervalTotal>
where
    I: IntoIterator<Item = IntervalRow>,
{
    let mut groups: BTreeMap<(String, Date, u32), IntervalTotal> = BTreeMap::new();

    for row in rows {
        match groups.entry((row.nmi.clone(), row.interval_date, row.interval)) {
            Entry::Vacant(slot) => {
                slot.insert(IntervalTotal {
                    nmi: row.nmi,
                    interval_date: row.interval_date,
                    interval: row.interval,
                    consumption: row.consumption,
                    generation: row.generation,
                    quality: row.quality,
                    interval_length: row.interval_length,
                    uom: row.uom,
                });
            }
            Entry::Occupied(mut slot) => {
                let total = slot.get_mut();
                total.consumption += row.consumption;
                total.generation += row.generation;
            }
        }
    }

    groups
        .into_values()
        .map(|mut total| {
            total.generation = total.generation.abs();
            total
        })
        .collect()
}

/// Collapse interval totals into one [`DailyUsage`] per (nmi, date).
///
/// Lists are ordered by interval index. A day is `complete` when it has exactly
/// the interval count its interval length implies.
pub fn aggregate_daily<I>(totals: I) -> Vec<DailyUsage>
where
    I: IntoIterator<Item = IntervalTotal>,
{
    let mut days: BTreeMap<(String, Date), Vec<IntervalTotal>> = BTreeMap::new();
    for total in totals {
        days.entry((total.nmi.clone(), total.interval_date))
            .or_default()
            .push(total);
    }

    days.into_iter()
        .filter_map(|((nmi, interval_date), mut intervals)| {
            intervals.sort_by_key(|t| t.interval);
            let first = intervals.first()?;
            let interval_length = first.interval_length;
            let uom = first.uom.clone();
            let expected = interval_count_for(interval_length);

            let complete = expected == Some(intervals.len())
                && intervals.iter().enumerate().all(|(i, t)| t.interval as usize == i + 1);

            Some(DailyUsage {
                nmi,
                interval_date,
                interval_length,
                uom,
                consumptions: intervals.iter().map(|t| t.consumption).collect(),
                generations: intervals.iter().map(|t| t.generation).collect(),
                qualities: intervals.into_iter().map(|t| t.quality).collect(),
                complete,
            })
        })
        .collect()
}

/// Flatten and aggregate a whole session into daily usage, ordered by (nmi, date).
pub fn daily_usage(session: &ParseSession) -> Result<Vec<DailyUsage>, Nem12Error> {
    let totals = aggregate_intervals(flatten(session)?);
    Ok(aggregate_daily(totals))
}
