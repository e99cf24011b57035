use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const ACCEPTED_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// 时间解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid timestamp \"{0}\": expected YYYY-MM-DD HH:MM:SS[.ffffff]")]
    InvalidTimestamp(String),

    #[error("Invalid time range: start {start} is after stop {stop}")]
    InvalidRange { start: String, stop: String },
}

/// 解析 `YYYY-MM-DD HH:MM:SS[.ffffff]` 格式的时间戳，精度截断到微秒
///
/// 也接受 `T` 分隔符和只有日期的写法（视为当天零点）。
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, TimeError> {
    let text = text.trim();

    for format in ACCEPTED_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(truncate_to_micros(ts));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }

    Err(TimeError::InvalidTimestamp(text.to_string()))
}

/// 格式化时间戳；没有小数部分时省略微秒
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

fn truncate_to_micros(ts: NaiveDateTime) -> NaiveDateTime {
    let micros = ts.nanosecond() / 1_000 * 1_000;
    ts.with_nanosecond(micros).unwrap_or(ts)
}

/// 闭区间时间范围 `[start, stop]`
///
/// `start == stop` 是合法的"瞬时"查询：返回该时刻之前最近的一个样本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    start: NaiveDateTime,
    stop: NaiveDateTime,
}

impl TimeRange {
    /// 创建时间范围
    ///
    /// # 错误
    /// * `InvalidRange` - start 晚于 stop
    pub fn new(start: NaiveDateTime, stop: NaiveDateTime) -> Result<Self, TimeError> {
        if start > stop {
            return Err(TimeError::InvalidRange {
                start: format_timestamp(&start),
                stop: format_timestamp(&stop),
            });
        }
        Ok(Self {
            start: truncate_to_micros(start),
            stop: truncate_to_micros(stop),
        })
    }

    /// 从两个日期字符串创建
    pub fn parse(start: &str, stop: &str) -> Result<Self, TimeError> {
        Self::new(parse_timestamp(start)?, parse_timestamp(stop)?)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn stop(&self) -> NaiveDateTime {
        self.stop
    }

    pub fn duration(&self) -> Duration {
        self.stop - self.start
    }

    pub fn is_instant(&self) -> bool {
        self.start == self.stop
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start && *ts <= self.stop
    }

    pub fn contains_range(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.stop <= self.stop
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start <= other.stop && other.start <= self.stop
    }

    /// 时间戳 `ts` 之前已覆盖的区间百分比（0..=100）
    ///
    /// 进度按时间覆盖率计算而不是行数，因为行数事先未知。
    pub fn progress_at(&self, ts: &NaiveDateTime) -> f64 {
        let total = self.duration().num_microseconds().unwrap_or(i64::MAX);
        if total <= 0 {
            return 100.0;
        }
        let done = (*ts - self.start).num_microseconds().unwrap_or(0);
        (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} .. {}]",
            format_timestamp(&self.start),
            format_timestamp(&self.stop)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let ts = parse_timestamp("2014-07-20 10:00:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2014-07-20 10:00:00");

        let ts = parse_timestamp("2014-07-20 10:00:00.123456").unwrap();
        assert_eq!(format_timestamp(&ts), "2014-07-20 10:00:00.123456");

        let ts = parse_timestamp("2014-07-20T10:00:00").unwrap();
        assert_eq!(ts.hour(), 10);

        let ts = parse_timestamp("2014-07-20").unwrap();
        assert_eq!(format_timestamp(&ts), "2014-07-20 00:00:00");
    }

    #[test]
    fn test_parse_truncates_to_micros() {
        let ts = parse_timestamp("2014-07-20 10:00:00.123456789").unwrap();
        assert_eq!(ts.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_parse_invalid_timestamp() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(TimeError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let result = TimeRange::parse("2013-01-02 00:00:00", "2013-01-01 00:00:00");
        assert!(matches!(result, Err(TimeError::InvalidRange { .. })));
    }

    #[test]
    fn test_instant_range() {
        let range = TimeRange::parse("2013-01-01 12:00:00", "2013-01-01 12:00:00").unwrap();
        assert!(range.is_instant());
        assert_eq!(range.progress_at(&range.start()), 100.0);
    }

    #[test]
    fn test_progress_is_time_coverage() {
        let range = TimeRange::parse("2013-01-01 00:00:00", "2013-01-02 00:00:00").unwrap();
        let noon = parse_timestamp("2013-01-01 12:00:00").unwrap();
        assert!((range.progress_at(&noon) - 50.0).abs() < 1e-9);

        let before = parse_timestamp("2012-12-31 00:00:00").unwrap();
        assert_eq!(range.progress_at(&before), 0.0);

        let after = parse_timestamp("2013-01-03 00:00:00").unwrap();
        assert_eq!(range.progress_at(&after), 100.0);
    }

    #[test]
    fn test_range_relations() {
        let day = TimeRange::parse("2013-01-01", "2013-01-02").unwrap();
        let morning = TimeRange::parse("2013-01-01 06:00:00", "2013-01-01 09:00:00").unwrap();
        let next_week = TimeRange::parse("2013-01-08", "2013-01-09").unwrap();

        assert!(day.contains_range(&morning));
        assert!(day.intersects(&morning));
        assert!(!day.intersects(&next_week));
        assert!(day.contains(&morning.stop()));
    }
}
