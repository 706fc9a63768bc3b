//! Date/device filtering and point-count decimation
//!
//! The filter is a pure function of a dataset and a request: it selects the
//! records inside an inclusive date range whose device tag is allowed, then
//! thins the survivors until they fit the point budget. Order is preserved
//! throughout.

use std::collections::HashSet;
use std::num::NonZeroUsize;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::model::{DeviceTag, LocationDataset, LocationRecord};

/// Default upper bound on the number of records returned to the client
pub const MAX_POINTS: usize = 60_000;

/// Smallest stride the decimation starts from
const MIN_STEP: usize = 2;

/// Selection criteria for one filter call
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRequest {
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Inclusive upper bound
    pub end: DateTime<Utc>,
    /// Allowed device tags; empty means every device passes
    pub selected_devices: HashSet<DeviceTag>,
}

impl FilterRequest {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        FilterRequest {
            start,
            end,
            selected_devices: HashSet::new(),
        }
    }

    pub fn with_devices<I, S>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DeviceTag>,
    {
        self.selected_devices = devices.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a single record passes both the date and the device condition
    ///
    /// Records whose timestamp cannot be parsed never match.
    pub fn matches(&self, record: &LocationRecord) -> bool {
        let in_range = parse_timestamp(&record.time)
            .is_some_and(|time| self.start <= time && time <= self.end);

        let device_allowed = self.selected_devices.is_empty()
            || record
                .device_tag
                .as_ref()
                .is_some_and(|tag| self.selected_devices.contains(tag));

        in_range && device_allowed
    }
}

/// How the decimation pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decimation {
    /// The input already fit the budget
    NotNeeded,
    /// The result fits the budget; `step` is the last stride applied
    Reduced { step: usize },
    /// The stride outgrew the sequence before the budget was met;
    /// the result is still over budget
    Exhausted { step: usize },
}

/// Result of [`filter`]: the surviving records plus bookkeeping for logging
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub records: Vec<LocationRecord>,
    /// Number of records that passed the predicate, before decimation
    pub matched: usize,
    pub decimation: Decimation,
}

/// Filter a dataset and decimate the result to at most `max_points` records
///
/// # Arguments
/// * `dataset` - The loaded dataset, left untouched
/// * `request` - Date range and device allow-list
/// * `max_points` - Point budget, usually [`MAX_POINTS`]
///
/// # Returns
/// * `FilterOutcome` - Surviving records in their original relative order
pub fn filter(
    dataset: &LocationDataset,
    request: &FilterRequest,
    max_points: NonZeroUsize,
) -> FilterOutcome {
    let mut records: Vec<LocationRecord> = dataset
        .locations
        .iter()
        .filter(|record| request.matches(record))
        .cloned()
        .collect();

    let matched = records.len();
    let decimation = decimate(&mut records, max_points);

    FilterOutcome {
        records,
        matched,
        decimation,
    }
}

/// Thin `items` in place until it holds at most `max_points` elements
///
/// Each pass drops every element whose index in the current sequence is a
/// multiple of `step`, then bumps `step` by one. The first stride is
/// `max(2, floor(len / max_points))`. Since index 0 is dropped on every pass
/// the loop always makes progress; it gives up once `step` is larger than the
/// remaining sequence.
pub fn decimate<T>(items: &mut Vec<T>, max_points: NonZeroUsize) -> Decimation {
    let max_points = max_points.get();
    if items.len() <= max_points {
        return Decimation::NotNeeded;
    }

    let mut step = (items.len() / max_points).max(MIN_STEP);
    loop {
        if step > items.len() {
            return Decimation::Exhausted { step };
        }

        let mut index = 0;
        items.retain(|_| {
            let keep = index % step != 0;
            index += 1;
            keep
        });

        if items.len() <= max_points {
            return Decimation::Reduced { step };
        }
        step += 1;
    }
}

/// Parse a timestamp value into an absolute point in time
///
/// Accepted forms:
/// * RFC 3339 strings (`2024-05-01T10:00:00.123Z`, `2024-05-01T12:00:00+02:00`)
/// * Naive ISO date-times (`2024-05-01T10:00:00`, `2024-05-01 10:00:00`), read as UTC
/// * ISO dates (`2024-05-01`), read as midnight UTC
/// * Numbers, read as milliseconds since the Unix epoch
///
/// Anything else yields `None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_timestamp_str(text.trim()),
        Value::Number(number) => {
            let millis = match number.as_i64() {
                Some(millis) => millis,
                None => {
                    let millis = number.as_f64()?;
                    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
                        return None;
                    }
                    millis.trunc() as i64
                }
            };
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
