use super::{Comparison, Candidate};
use crate::error::{QueryError, Result};
use crate::field::FieldDescriptor;
use crate::operator::Operator;
use crate::prefilter::{Command, PreFilter, TIME_FUZZ};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use std::sync::OnceLock;

static TIME_DELTA: OnceLock<Regex> = OnceLock::new();

fn time_delta() -> &'static Regex {
    TIME_DELTA.get_or_init(|| {
        Regex::new(r"^(?:(\d+)y)?(?:(\d+)M)?(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$")
            .unwrap()
    })
}

/// Seconds per unit, in the order of the delta regex groups (`yMwdhms`).
const UNITS: [i64; 7] = [365 * 86400, 30 * 86400, 7 * 86400, 86400, 3600, 60, 1];

const TIME_FORMATS: &str =
    "expected a UNIX timestamp, a delta like '2w3d', or a date like YYYY-MM-DD, MM/DD/YYYY or DD.MM.YYYY";

/// Seconds in a delta like `1w2d`, `None` if the text is not a delta.
pub(crate) fn parse_time_delta(text: &str) -> Option<i64> {
    let caps = time_delta().captures(text)?;
    let mut total: i64 = 0;
    let mut seen = false;
    for (index, unit) in UNITS.iter().enumerate() {
        if let Some(amount) = caps.get(index + 1) {
            let amount: i64 = amount.as_str().parse().ok()?;
            total = total.checked_add(amount.checked_mul(*unit)?)?;
            seen = true;
        }
    }
    seen.then_some(total)
}

/// Absolute point in time: a UNIX timestamp or a local date with optional time.
pub(crate) fn parse_timestamp(field: &str, text: &str) -> Result<f64> {
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .map(|ts| ts as f64)
            .map_err(|e| QueryError::invalid_value(field, text, e.to_string()));
    }

    let invalid = || QueryError::invalid_value(field, text, TIME_FORMATS);
    let date_format = if text.contains('/') {
        "%m/%d/%Y"
    } else if text.contains('.') {
        "%d.%m.%Y"
    } else {
        "%Y-%m-%d"
    };

    let normalized = text.trim().to_uppercase().replace(' ', "T");
    let datetime: NaiveDateTime = match normalized.split_once('T') {
        Some((date, time)) => {
            let date = NaiveDate::parse_from_str(date, date_format).map_err(|_| invalid())?;
            let time = match time.matches(':').count() {
                0 => NaiveTime::parse_from_str(&format!("{}:00", time), "%H:%M"),
                1 => NaiveTime::parse_from_str(time, "%H:%M"),
                _ => NaiveTime::parse_from_str(time, "%H:%M:%S"),
            }
            .map_err(|_| invalid())?;
            date.and_time(time)
        }
        None => NaiveDate::parse_from_str(&normalized, date_format)
            .map_err(|_| invalid())?
            .and_time(NaiveTime::MIN),
    };

    Local
        .from_local_datetime(&datetime)
        .earliest()
        .map(|dt| dt.timestamp() as f64)
        .ok_or_else(invalid)
}

fn time_pre_filter(operator: Operator, key: &str, threshold: i64) -> Option<PreFilter> {
    let command = match operator {
        Operator::Gt | Operator::Ge => {
            Command::compare_value("greater", key, threshold - TIME_FUZZ)
        }
        Operator::Lt | Operator::Le => Command::compare_value("less", key, threshold + TIME_FUZZ),
        Operator::Eq | Operator::Ne => return None,
    };
    Some(PreFilter::superset(command))
}

/// Filter on UNIX timestamps.
///
/// Relative values count backwards from now, so `completed>2d` means
/// "completed more than two days ago" and the comparison is mirrored.
#[derive(Debug)]
pub(crate) struct TimeFilter {
    threshold: f64,
    relative: bool,
    /// Unset (zero) timestamps never match, unless compared against zero.
    not_null: bool,
}

impl TimeFilter {
    pub fn new(field: &str, text: &str, now: f64, not_null: bool) -> Result<Self> {
        let (threshold, relative) = match parse_time_delta(text) {
            Some(delta) => (now - delta as f64, true),
            None => (parse_timestamp(field, text)?, false),
        };
        Ok(Self {
            threshold,
            relative,
            not_null,
        })
    }
}

impl Comparison for TimeFilter {
    fn kind(&self) -> &'static str {
        "TimeFilter"
    }

    fn eq(&self, candidate: &Candidate) -> Result<bool> {
        Ok(candidate.value()?.as_f64().unwrap_or(0.0) == self.threshold)
    }

    fn gt(&self, candidate: &Candidate) -> Result<bool> {
        Ok(candidate.value()?.as_f64().unwrap_or(0.0) > self.threshold)
    }

    fn matches(&self, candidate: &Candidate) -> Result<bool> {
        let value = candidate.value()?.as_f64().unwrap_or(0.0);
        if self.not_null && self.threshold != 0.0 && value == 0.0 {
            return Ok(false);
        }
        Ok(candidate.operator.compare(value, self.threshold))
    }

    fn effective(&self, operator: Operator) -> Operator {
        if self.relative {
            operator.mirrored()
        } else {
            operator
        }
    }

    fn pre_filter(
        &self,
        _field: &FieldDescriptor,
        operator: Operator,
        key: &str,
    ) -> Option<PreFilter> {
        // zero may just as well be an unset custom value
        if self.threshold == 0.0 {
            return None;
        }
        time_pre_filter(operator, key, self.threshold as i64)
    }
}

/// Filter on durations in seconds.
///
/// Accepts seconds, a delta like `3d`, or a date meaning "since then".
/// Items without a duration only match a zero duration.
#[derive(Debug)]
pub(crate) struct DurationFilter {
    seconds: f64,
}

impl DurationFilter {
    pub fn new(field: &str, text: &str, now: f64) -> Result<Self> {
        let seconds = if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            text.parse::<f64>()
                .map_err(|e| QueryError::invalid_value(field, text, e.to_string()))?
        } else if let Some(delta) = parse_time_delta(text) {
            delta as f64
        } else {
            now - parse_timestamp(field, text)?
        };
        Ok(Self { seconds })
    }
}

impl Comparison for DurationFilter {
    fn kind(&self) -> &'static str {
        "DurationFilter"
    }

    fn eq(&self, candidate: &Candidate) -> Result<bool> {
        Ok(candidate.value()?.as_f64().unwrap_or(0.0) == self.seconds)
    }

    fn gt(&self, candidate: &Candidate) -> Result<bool> {
        Ok(candidate.value()?.as_f64().unwrap_or(0.0) > self.seconds)
    }

    fn matches(&self, candidate: &Candidate) -> Result<bool> {
        let value = match candidate.value()?.as_f64() {
            Some(value) => value,
            None if self.seconds == 0.0 => 0.0,
            None => return Ok(false),
        };
        if self.seconds != 0.0 && value == 0.0 {
            return Ok(false);
        }
        Ok(candidate.operator.compare(value, self.seconds))
    }

    fn pre_filter(
        &self,
        _field: &FieldDescriptor,
        operator: Operator,
        key: &str,
    ) -> Option<PreFilter> {
        if self.seconds == 0.0 {
            return None;
        }
        time_pre_filter(operator, key, self.seconds as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_deltas() {
        assert_eq!(parse_time_delta("2w"), Some(14 * 86400));
        assert_eq!(parse_time_delta("1h30m"), Some(5400));
        assert_eq!(parse_time_delta("1y1M"), Some(395 * 86400));
        assert_eq!(parse_time_delta("45s"), Some(45));
        assert_eq!(parse_time_delta(""), None);
        assert_eq!(parse_time_delta("1990"), None);
        assert_eq!(parse_time_delta("30m1h"), None);
    }

    #[test]
    fn test_absolute_dates_agree() {
        let iso = parse_timestamp("completed", "1990-09-21").unwrap();
        assert_eq!(parse_timestamp("completed", "09/21/1990").unwrap(), iso);
        assert_eq!(parse_timestamp("completed", "21.09.1990").unwrap(), iso);
        assert_eq!(
            parse_timestamp("completed", "1990-09-21T12:00").unwrap(),
            iso + 12.0 * 3600.0
        );
        assert_eq!(
            parse_timestamp("completed", "1990-09-21 12:00:30").unwrap(),
            iso + 12.0 * 3600.0 + 30.0
        );
    }

    #[test]
    fn test_raw_timestamps_and_garbage() {
        assert_eq!(parse_timestamp("completed", "1700000000").unwrap(), 1.7e9);
        assert!(matches!(
            parse_timestamp("completed", "yesterday"),
            Err(QueryError::InvalidValue { .. })
        ));
        assert!(parse_timestamp("completed", "1990-13-45").is_err());
    }

    #[test]
    fn test_relative_time_mirrors_operator() {
        let filter = TimeFilter::new("completed", "2d", 1000000.0, false).unwrap();
        assert_eq!(filter.threshold, 1000000.0 - 2.0 * 86400.0);
        assert_eq!(filter.effective(Operator::Gt), Operator::Lt);
        assert_eq!(filter.effective(Operator::Le), Operator::Ge);
        let absolute = TimeFilter::new("completed", "1700000000", 0.0, false).unwrap();
        assert_eq!(absolute.effective(Operator::Gt), Operator::Gt);
    }

    #[test]
    fn test_duration_values() {
        let now = 2_000_000_000.0;
        assert_eq!(DurationFilter::new("leechtime", "0", now).unwrap().seconds, 0.0);
        assert_eq!(DurationFilter::new("leechtime", "90", now).unwrap().seconds, 90.0);
        assert_eq!(DurationFilter::new("leechtime", "1h", now).unwrap().seconds, 3600.0);
        let since = DurationFilter::new("leechtime", "1990-09-21", now).unwrap();
        assert_eq!(since.seconds, now - parse_timestamp("leechtime", "1990-09-21").unwrap());
    }
}
