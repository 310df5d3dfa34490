//! Timestamp derivations
//!
//! Pure functions that turn the raw epoch-millisecond `ts` of a log record
//! into the `timestamp`, `date` and calendar fields used by the time and
//! songplays tables, plus column builders that apply them to Arrow arrays.
//!
//! Both tables go through [`epoch_millis_to_seconds`] and
//! [`seconds_to_local_datetime_string`], so a given `ts` always lands on the
//! same wall-clock second in either table.

use crate::error::{Error, Result};
use crate::types::{InvalidValuePolicy, TimeZoneSetting};
use arrow::array::{Array, ArrayRef, AsArray, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use std::sync::Arc;

/// Format of the derived `date` column
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert epoch milliseconds to epoch seconds (floor division)
pub fn epoch_millis_to_seconds(ms: i64) -> i64 {
    ms.div_euclid(1000)
}

/// Render epoch seconds as wall-clock time in the given zone
pub fn seconds_to_local_datetime_string(seconds: i64, tz: TimeZoneSetting) -> Result<String> {
    Ok(seconds_to_local_datetime(seconds, tz)?
        .format(DATE_FORMAT)
        .to_string())
}

/// Resolve epoch seconds to a naive wall-clock datetime in the given zone
pub fn seconds_to_local_datetime(seconds: i64, tz: TimeZoneSetting) -> Result<NaiveDateTime> {
    let utc = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| Error::InvalidTimestamp {
        value: seconds.to_string(),
    })?;

    let local = match tz {
        TimeZoneSetting::Utc => utc.naive_utc(),
        TimeZoneSetting::Local => utc.with_timezone(&Local).naive_local(),
        TimeZoneSetting::Fixed(offset) => offset.from_utc_datetime(&utc.naive_utc()).naive_local(),
    };
    Ok(local)
}

/// Parse a derived `date` string back into a naive datetime
pub fn parse_datetime_string(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT).map_err(|_| Error::InvalidTimestamp {
        value: value.to_string(),
    })
}

/// Calendar fields of a wall-clock datetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    /// Hour of day, 0-23
    pub hour: i32,
    /// Day of month, 1-based
    pub day: i32,
    /// ISO-8601 week of year
    pub week: i32,
    /// Month, 1-12
    pub month: i32,
    /// Calendar year
    pub year: i32,
    /// Day of week, 1 = Sunday ... 7 = Saturday
    pub weekday: i32,
}

impl CalendarFields {
    /// Extract calendar fields from a wall-clock datetime
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        Self {
            hour: dt.hour() as i32,
            day: dt.day() as i32,
            week: dt.iso_week().week() as i32,
            month: dt.month() as i32,
            year: dt.year(),
            weekday: dt.weekday().number_from_sunday() as i32,
        }
    }
}

// ============================================================================
// Column builders
// ============================================================================

/// Build the epoch-seconds column from an epoch-milliseconds column
///
/// Accepts Int64, Float64 (truncated) and Utf8 (parsed) inputs since the
/// inferred type of `ts` depends on the raw JSON.
pub fn epoch_seconds_column(millis: &dyn Array, policy: InvalidValuePolicy) -> Result<ArrayRef> {
    let values = epoch_millis_values(millis, policy)?;
    let seconds: Int64Array = values
        .into_iter()
        .map(|v| v.map(epoch_millis_to_seconds))
        .collect();
    Ok(Arc::new(seconds))
}

/// Build the `date` string column from an epoch-seconds column
pub fn datetime_string_column(
    seconds: &dyn Array,
    tz: TimeZoneSetting,
    policy: InvalidValuePolicy,
) -> Result<ArrayRef> {
    let seconds = int64_values(seconds, policy)?;
    let mut out = Vec::with_capacity(seconds.len());
    for value in seconds {
        let rendered = match value {
            Some(s) => apply_policy(seconds_to_local_datetime_string(s, tz), policy)?,
            None => None,
        };
        out.push(rendered);
    }
    Ok(Arc::new(StringArray::from(out)))
}

/// Calendar columns derived from a `date` string column
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct CalendarColumns {
    pub hour: ArrayRef,
    pub day: ArrayRef,
    pub week: ArrayRef,
    pub month: ArrayRef,
    pub year: ArrayRef,
    pub weekday: ArrayRef,
}

/// Derive hour/day/week/month/year/weekday from a `date` string column
pub fn calendar_columns(dates: &dyn Array, policy: InvalidValuePolicy) -> Result<CalendarColumns> {
    let dates = dates.as_string_opt::<i32>().ok_or_else(|| {
        Error::transform(format!("date column must be Utf8, got {}", dates.data_type()))
    })?;

    let mut fields: Vec<Option<CalendarFields>> = Vec::with_capacity(dates.len());
    for value in dates.iter() {
        let parsed = match value {
            Some(s) => apply_policy(parse_datetime_string(s), policy)?,
            None => None,
        };
        fields.push(parsed.as_ref().map(CalendarFields::from_datetime));
    }

    let column = |f: fn(&CalendarFields) -> i32| -> ArrayRef {
        Arc::new(fields.iter().map(|c| c.as_ref().map(f)).collect::<Int32Array>())
    };

    Ok(CalendarColumns {
        hour: column(|c| c.hour),
        day: column(|c| c.day),
        week: column(|c| c.week),
        month: column(|c| c.month),
        year: column(|c| c.year),
        weekday: column(|c| c.weekday),
    })
}

/// Read an epoch-millisecond column as optional i64 values
fn epoch_millis_values(array: &dyn Array, policy: InvalidValuePolicy) -> Result<Vec<Option<i64>>> {
    match array.data_type() {
        DataType::Float64 => Ok(array
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.map(|f| f.trunc() as i64))
            .collect()),
        _ => int64_values(array, policy),
    }
}

/// Read an integer-like column as optional i64 values
fn int64_values(array: &dyn Array, policy: InvalidValuePolicy) -> Result<Vec<Option<i64>>> {
    match array.data_type() {
        DataType::Int64 => Ok(array.as_primitive::<Int64Type>().iter().collect()),
        DataType::Null => Ok(vec![None; array.len()]),
        DataType::Utf8 => {
            let strings = array.as_string::<i32>();
            let mut out = Vec::with_capacity(strings.len());
            for value in strings.iter() {
                let parsed = match value {
                    Some(s) => apply_policy(
                        s.trim().parse::<i64>().map_err(|_| Error::InvalidTimestamp {
                            value: s.to_string(),
                        }),
                        policy,
                    )?,
                    None => None,
                };
                out.push(parsed);
            }
            Ok(out)
        }
        other => {
            let casted = arrow::compute::cast(array, &DataType::Int64).map_err(|e| {
                Error::transform(format!("cannot read {other} column as integer: {e}"))
            })?;
            Ok(casted.as_primitive::<Int64Type>().iter().collect())
        }
    }
}

/// Apply the invalid-value policy to a single derivation result
fn apply_policy<T>(result: Result<T>, policy: InvalidValuePolicy) -> Result<Option<T>> {
    match (result, policy) {
        (Ok(v), _) => Ok(Some(v)),
        (Err(e), InvalidValuePolicy::Fail) => Err(e),
        (Err(e), InvalidValuePolicy::Null) => {
            tracing::debug!("Nulling derived value: {e}");
            Ok(None)
        }
    }
}
