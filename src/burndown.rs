//! Created / completed / open counts per period.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;

use crate::error::SyncError;
use crate::model::work_item::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Granularity {
    #[default]
    Daily,
    Monthly,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Granularity::Daily),
            "monthly" | "month" | "m" => Ok(Granularity::Monthly),
            other => Err(format!("unknown granularity '{other}' (use daily or monthly)")),
        }
    }
}

/// Inclusive date range covered by one point of the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub granularity: Granularity,
}

impl Granularity {
    pub fn period_of(&self, date: NaiveDate) -> Period {
        match self {
            Granularity::Daily => Period {
                start: date,
                end: date,
                granularity: *self,
            },
            Granularity::Monthly => {
                let start = date.with_day(1).unwrap_or(date);
                let end = start
                    .checked_add_months(Months::new(1))
                    .and_then(|d| d.checked_sub_days(Days::new(1)))
                    .unwrap_or(start);
                Period {
                    start,
                    end,
                    granularity: *self,
                }
            }
        }
    }
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    fn next(&self) -> Option<Period> {
        let after = self.end.checked_add_days(Days::new(1))?;
        Some(self.granularity.period_of(after))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            Granularity::Daily => write!(f, "{}", self.start.format("%Y-%m-%d")),
            Granularity::Monthly => write!(f, "{}", self.start.format("%Y-%m")),
        }
    }
}

/// Lifecycle of one item as far as burn-down is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurndownRecord {
    pub key: String,
    pub created: NaiveDate,
    pub closed: Option<NaiveDate>,
}

impl From<&WorkItem> for BurndownRecord {
    fn from(item: &WorkItem) -> Self {
        BurndownRecord {
            key: item.key(),
            created: item.created_at.date_naive(),
            closed: item.closed_at.map(|c| c.date_naive()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BurndownPoint {
    #[serde(serialize_with = "serialize_period")]
    pub period: Period,
    pub created: u32,
    pub completed: u32,
    pub open: u32,
}

fn serialize_period<S: serde::Serializer>(period: &Period, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(period)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BurndownSeries {
    pub points: Vec<BurndownPoint>,
}

impl BurndownSeries {
    pub fn max_open(&self) -> u32 {
        self.points.iter().map(|p| p.open).max().unwrap_or(0)
    }
}

/// Records whose creation date falls inside `period`.
pub fn created_in(records: &[BurndownRecord], period: &Period) -> usize {
    records.iter().filter(|r| period.contains(r.created)).count()
}

/// Records whose close date falls inside `period`.
pub fn completed_in(records: &[BurndownRecord], period: &Period) -> usize {
    records
        .iter()
        .filter(|r| r.closed.is_some_and(|c| period.contains(c)))
        .count()
}

/// Records created in or before `period`.
pub fn created_through(records: &[BurndownRecord], period: &Period) -> usize {
    records.iter().filter(|r| r.created <= period.end).count()
}

/// Records closed in or before `period`.
pub fn completed_through(records: &[BurndownRecord], period: &Period) -> usize {
    records
        .iter()
        .filter(|r| r.closed.is_some_and(|c| c <= period.end))
        .count()
}

/// Records created by the end of `period` and not yet closed by then.
/// Floors at zero when closes outnumber creations.
pub fn open_through(records: &[BurndownRecord], period: &Period) -> usize {
    created_through(records, period).saturating_sub(completed_through(records, period))
}

/// Builds the series from the earliest creation to the latest close, or to
/// `today` while anything is still open.
///
/// A record closed before it was created would drive the running balance
/// negative, so it is rejected instead of producing a misleading series.
pub fn aggregate(
    records: &[BurndownRecord],
    granularity: Granularity,
    today: NaiveDate,
) -> Result<BurndownSeries, SyncError> {
    if let Some(bad) = records.iter().find(|r| r.closed.is_some_and(|c| c < r.created)) {
        return Err(SyncError::DataInconsistency(format!(
            "item {} closed on {} before it was created on {}",
            bad.key,
            bad.closed.map(|c| c.to_string()).unwrap_or_default(),
            bad.created
        )));
    }

    let Some(first) = records.iter().map(|r| r.created).min() else {
        return Ok(BurndownSeries::default());
    };
    let last = records
        .iter()
        .map(|r| r.closed.unwrap_or(today).max(r.created))
        .max()
        .unwrap_or(first);

    let mut series = BurndownSeries::default();
    let mut period = Some(granularity.period_of(first));
    let mut open: i64 = 0;
    while let Some(current) = period.filter(|p| p.start <= last) {
        let created = created_in(records, &current) as u32;
        let completed = completed_in(records, &current) as u32;
        open += i64::from(created) - i64::from(completed);
        debug_assert_eq!(open as usize, open_through(records, &current));
        series.points.push(BurndownPoint {
            period: current,
            created,
            completed,
            open: u32::try_from(open).map_err(|_| {
                SyncError::DataInconsistency(format!("open count went negative in {current}"))
            })?,
        });
        period = current.next();
    }
    Ok(series)
}
