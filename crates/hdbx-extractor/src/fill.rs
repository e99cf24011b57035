use chrono::{Duration, NaiveDateTime};
use hdbx_types::{TimeRange, ValueRecord};

use crate::config::FillFromPastMode;

/// 是否需要从窗口之前补点
///
/// 窗口内没有样本，或第一个样本晚于 `start + duration * threshold%` 时需要补点。
pub fn needs_fill(range: &TimeRange, first: Option<NaiveDateTime>, threshold_percent: f64) -> bool {
    let Some(first) = first else {
        return true;
    };
    let total_us = range.duration().num_microseconds().unwrap_or(i64::MAX) as f64;
    let allowed = Duration::microseconds((total_us * threshold_percent / 100.0) as i64);
    first > range.start() + allowed
}

/// 按模式调整补点记录的时间戳；`None` 模式不补点
pub fn adjust(mode: FillFromPastMode, record: ValueRecord, start: NaiveDateTime) -> Option<ValueRecord> {
    match mode {
        FillFromPastMode::None => None,
        FillFromPastMode::KeepWindow => Some(record.with_timestamp(start)),
        FillFromPastMode::WidenWindow => Some(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdbx_types::{parse_timestamp, DataType, Datum, Writable};

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn day() -> TimeRange {
        TimeRange::parse("2013-01-01 00:00:00", "2013-01-02 00:00:00").unwrap()
    }

    #[test]
    fn test_needs_fill_threshold() {
        // 5% of a day is 72 minutes
        assert!(needs_fill(&day(), None, 5.0));
        assert!(!needs_fill(&day(), Some(ts("2013-01-01 00:00:00")), 5.0));
        assert!(!needs_fill(&day(), Some(ts("2013-01-01 01:12:00")), 5.0));
        assert!(needs_fill(&day(), Some(ts("2013-01-01 01:13:00")), 5.0));
        assert!(needs_fill(&day(), Some(ts("2013-01-01 00:00:01")), 0.0));
    }

    #[test]
    fn test_adjust_modes() {
        let record = ValueRecord::scalar(
            "A",
            ts("2012-12-31 23:00:00"),
            DataType::Double,
            Writable::ReadOnly,
            Some(Datum::Double(1.0)),
            None,
        );
        let start = ts("2013-01-01 00:00:00");

        assert!(adjust(FillFromPastMode::None, record.clone(), start).is_none());
        assert_eq!(
            adjust(FillFromPastMode::KeepWindow, record.clone(), start)
                .unwrap()
                .timestamp,
            start
        );
        assert_eq!(
            adjust(FillFromPastMode::WidenWindow, record, start)
                .unwrap()
                .timestamp,
            ts("2012-12-31 23:00:00")
        );
    }
}
