//! Time-window boundaries for the statistics reports.
//!
//! All boundaries are local-calendar midnights compared as naive
//! datetimes, so a DST jump cannot make a boundary unrepresentable.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Reporting window, measured back from the current moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
    #[default]
    All,
}

/// Returns the inclusive lower bound for `period`, or `None` for
/// [`Period::All`]. The week starts on the most recent Sunday, the month
/// on its first day, both at local midnight.
pub fn period_start(period: Period) -> Option<NaiveDateTime> {
    boundary_from(period, Local::now().naive_local())
}

/// Boundary math split from the clock so tests can pin "now".
fn boundary_from(period: Period, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let today = now.date();
    match period {
        Period::Today => Some(midnight(today)),
        Period::Week => {
            let days_back = today.weekday().num_days_from_sunday() as i64;
            Some(midnight(today - chrono::Duration::days(days_back)))
        }
        Period::Month => Some(midnight(today.with_day(1).unwrap_or(today))),
        Period::All => None,
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Parses a tracker timestamp and projects it onto the local calendar.
/// Anything that is not RFC 3339 reads as absent.
pub(crate) fn parse_local(timestamp: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|dt| dt.with_timezone(&Local).naive_local())
}
