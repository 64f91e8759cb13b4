//! Reduces irregular readings to one value per hour.
//!
//! Each hour of the window resolves to the mean of the readings inside it. Hours without
//! readings inherit the last raw reading of the most recent earlier hour that had any.
//! Hours before the first reading stay empty.

use crate::model::Reading;
use std::collections::BTreeMap;
use time::{Date, Duration, OffsetDateTime, Time, UtcOffset};

/// The closed hourly grid from `start 00:00` to `end 23:00` UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyWindow {
    first: OffsetDateTime,
    last: OffsetDateTime,
}

impl HourlyWindow {
    pub fn new(start: Date, end: Date) -> Self {
        Self {
            first: start.midnight().assume_utc(),
            last: end.midnight().assume_utc() + Duration::hours(23),
        }
    }

    pub fn hours(&self) -> impl Iterator<Item = OffsetDateTime> + '_ {
        std::iter::successors(Some(self.first), |hour| Some(*hour + Duration::HOUR))
            .take_while(|hour| *hour <= self.last)
    }

    pub fn len(&self) -> usize {
        if self.last < self.first {
            return 0;
        }
        ((self.last - self.first).whole_hours() + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Truncates a timestamp to the start of its hour, in UTC.
pub fn floor_hour(t: OffsetDateTime) -> OffsetDateTime {
    let t = t.to_offset(UtcOffset::UTC);
    t.replace_time(Time::MIDNIGHT) + Duration::hours(t.hour().into())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyValue {
    pub hour: OffsetDateTime,
    pub value: Option<f64>,
}

/// True when no hour resolved to a value, either because the station reported nothing
/// or because every reading fell outside the window.
pub fn is_unobserved(rows: &[HourlyValue]) -> bool {
    rows.iter().all(|row| row.value.is_none())
}

#[derive(Debug, Default)]
struct Bucket {
    sum: f64,
    count: u32,
    last: f64,
}

impl Bucket {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.last = value;
    }

    fn mean(&self) -> f64 {
        self.sum / f64::from(self.count)
    }
}

/// Produces exactly one [`HourlyValue`] per hour of `window`.
///
/// Readings may arrive in any order. Readings outside the window neither appear in the
/// output nor seed the carried value.
pub fn resample_hourly(mut readings: Vec<Reading>, window: &HourlyWindow) -> Vec<HourlyValue> {
    if readings.is_empty() {
        return window
            .hours()
            .map(|hour| HourlyValue { hour, value: None })
            .collect();
    }

    // stable, so equal timestamps keep their arrival order when picking the last one
    readings.sort_by_key(|r| r.time);
    let mut buckets: BTreeMap<OffsetDateTime, Bucket> = BTreeMap::new();
    for reading in &readings {
        buckets
            .entry(floor_hour(reading.time))
            .or_default()
            .push(reading.value);
    }

    let mut carried = None;
    window
        .hours()
        .map(|hour| match buckets.get(&hour) {
            Some(bucket) => {
                carried = Some(bucket.last);
                HourlyValue {
                    hour,
                    value: Some(bucket.mean()),
                }
            }
            None => HourlyValue {
                hour,
                value: carried,
            },
        })
        .collect()
}
