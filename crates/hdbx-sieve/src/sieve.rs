use chrono::NaiveDateTime;
use hdbx_types::{SourceId, ValueRecord};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::UnknownSourceError;
use crate::policy::{FillPolicy, SieveConfig};

/// 一次 `fill` 的统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FillReport {
    pub sources: usize,
    /// 所有数据源的时间戳并集大小
    pub timestamps: usize,
    /// 因时间戳重复被丢弃的记录数（保留第一条）
    pub duplicates_dropped: usize,
    /// 补点插入的记录数
    pub inserted: usize,
    pub elapsed: Duration,
}

/// 数据分拣器
///
/// 把 `Extractor::get` 得到的混合列表按数据源拆开，可选地对齐时间轴。
#[derive(Debug, Default)]
pub struct DataSieve {
    config: SieveConfig,
    order: Vec<SourceId>,
    buckets: HashMap<SourceId, Vec<ValueRecord>>,
    fill_elapsed: Duration,
}

impl DataSieve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SieveConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SieveConfig {
        &self.config
    }

    /// 按数据源分桶，保持桶内顺序；可以多次调用，每次传入部分结果
    pub fn divide(&mut self, values: Vec<ValueRecord>) {
        let count = values.len();
        for record in values {
            match self.buckets.get_mut(&record.source) {
                Some(bucket) => bucket.push(record),
                None => {
                    self.order.push(record.source.clone());
                    self.buckets.insert(record.source.clone(), vec![record]);
                }
            }
        }
        debug!(records = count, sources = self.order.len(), "Divided records");
    }

    /// 排序、去重，再按各数据源的策略补点
    pub fn fill(&mut self) -> FillReport {
        let started = Instant::now();
        let mut report = FillReport {
            sources: self.order.len(),
            ..FillReport::default()
        };

        for bucket in self.buckets.values_mut() {
            bucket.sort_by_key(|r| r.timestamp);
            let before = bucket.len();
            bucket.dedup_by_key(|r| r.timestamp);
            report.duplicates_dropped += before - bucket.len();
        }

        let union: BTreeSet<NaiveDateTime> = self
            .buckets
            .values()
            .flat_map(|bucket| bucket.iter().map(|r| r.timestamp))
            .collect();
        report.timestamps = union.len();

        for source in &self.order {
            let Some(bucket) = self.buckets.get_mut(source) else {
                continue;
            };
            let Some(format) = bucket.first().map(|r| r.format) else {
                continue;
            };
            if self.config.policy_for(source, format) == FillPolicy::CarryForward {
                report.inserted += carry_forward(bucket, &union);
            }
        }

        self.fill_elapsed = started.elapsed();
        report.elapsed = self.fill_elapsed;
        info!(
            sources = report.sources,
            timestamps = report.timestamps,
            duplicates = report.duplicates_dropped,
            inserted = report.inserted,
            elapsed_ms = self.fill_elapsed.as_millis() as u64,
            "Sieve fill finished"
        );
        report
    }

    /// 数据源列表，按首次出现的顺序
    pub fn sources(&self) -> &[SourceId] {
        &self.order
    }

    pub fn size(&self) -> usize {
        self.order.len()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.buckets.contains_key(source)
    }

    pub fn get_data(&self, source: &str) -> Result<&[ValueRecord], UnknownSourceError> {
        self.buckets
            .get(source)
            .map(Vec::as_slice)
            .ok_or_else(|| UnknownSourceError(source.to_string()))
    }

    /// 交出所有序列，按首次出现的顺序
    pub fn into_sequences(mut self) -> Vec<(SourceId, Arc<[ValueRecord]>)> {
        self.order
            .into_iter()
            .filter_map(|source| {
                let bucket = self.buckets.remove(&source)?;
                Some((source, Arc::from(bucket)))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.buckets.clear();
        self.fill_elapsed = Duration::ZERO;
    }

    /// 上一次 `fill` 的耗时
    pub fn fill_elapsed(&self) -> Duration {
        self.fill_elapsed
    }
}

// 桶已排序去重；只在两个相邻样本之间插入，首尾之外不补
fn carry_forward(bucket: &mut Vec<ValueRecord>, union: &BTreeSet<NaiveDateTime>) -> usize {
    if bucket.len() < 2 {
        return 0;
    }

    let original = bucket.len();
    let mut filled = Vec::with_capacity(union.len());
    let mut samples = std::mem::take(bucket).into_iter().peekable();
    while let Some(sample) = samples.next() {
        let gap = samples.peek().map(|next| {
            (
                Bound::Excluded(sample.timestamp),
                Bound::Excluded(next.timestamp),
            )
        });
        let copies: Vec<ValueRecord> = match gap {
            Some(gap) => union
                .range(gap)
                .map(|ts| sample.clone().with_timestamp(*ts))
                .collect(),
            None => Vec::new(),
        };
        filled.push(sample);
        filled.extend(copies);
    }

    *bucket = filled;
    bucket.len() - original
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdbx_types::{parse_timestamp, DataType, Datum, Writable};

    fn sample(source: &str, ts: &str, value: f64) -> ValueRecord {
        ValueRecord::scalar(
            source,
            parse_timestamp(ts).unwrap(),
            DataType::Double,
            Writable::ReadOnly,
            Some(Datum::Double(value)),
            None,
        )
    }

    fn timestamps(records: &[ValueRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.timestamp.format("%H:%M").to_string())
            .collect()
    }

    #[test]
    fn test_divide_keeps_first_seen_order() {
        let mut sieve = DataSieve::new();
        sieve.divide(vec![
            sample("B", "2013-01-01 01:00:00", 1.0),
            sample("A", "2013-01-01 02:00:00", 2.0),
        ]);
        sieve.divide(vec![sample("B", "2013-01-01 03:00:00", 3.0)]);

        assert_eq!(sieve.sources(), &["B".to_string(), "A".to_string()]);
        assert_eq!(sieve.size(), 2);
        assert_eq!(sieve.get_data("B").unwrap().len(), 2);
        assert!(sieve.contains("A"));
        assert!(!sieve.contains("C"));
    }

    #[test]
    fn test_unknown_source() {
        let sieve = DataSieve::new();
        assert_eq!(
            sieve.get_data("nope").unwrap_err(),
            UnknownSourceError("nope".to_string())
        );
    }

    #[test]
    fn test_fill_sorts_and_drops_duplicates() {
        let mut sieve = DataSieve::new();
        sieve.divide(vec![
            sample("A", "2013-01-01 03:00:00", 3.0),
            sample("A", "2013-01-01 01:00:00", 1.0),
            sample("A", "2013-01-01 03:00:00", 9.0),
        ]);

        let report = sieve.fill();
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(report.inserted, 0);

        let data = sieve.get_data("A").unwrap();
        assert_eq!(timestamps(data), vec!["01:00", "03:00"]);
        // 重复时间戳保留先到的记录
        assert_eq!(data[1].to_f64(), Some(3.0));
    }

    #[test]
    fn test_carry_forward_between_samples_only() {
        // s: t0, t4, t9；t: t1, t3, t4, t8
        let config = SieveConfig::default().with_override("s", FillPolicy::CarryForward);
        let mut sieve = DataSieve::with_config(config);
        sieve.divide(vec![
            sample("t", "2013-01-01 01:00:00", 10.0),
            sample("s", "2013-01-01 00:00:00", 0.0),
            sample("t", "2013-01-01 03:00:00", 30.0),
            sample("s", "2013-01-01 04:00:00", 4.0),
            sample("t", "2013-01-01 04:00:00", 40.0),
            sample("t", "2013-01-01 08:00:00", 80.0),
            sample("s", "2013-01-01 09:00:00", 9.0),
        ]);

        let report = sieve.fill();
        assert_eq!(report.timestamps, 6);
        assert_eq!(report.inserted, 3);

        let s = sieve.get_data("s").unwrap();
        assert_eq!(
            timestamps(s),
            vec!["00:00", "01:00", "03:00", "04:00", "08:00", "09:00"]
        );
        assert_eq!(s[1].to_f64(), Some(0.0));
        assert_eq!(s[4].to_f64(), Some(4.0));

        // t 没有补点策略，也不会在首尾之外补点
        let t = sieve.get_data("t").unwrap();
        assert_eq!(timestamps(t), vec!["01:00", "03:00", "04:00", "08:00"]);
    }

    #[test]
    fn test_carry_forward_does_not_extend_edges() {
        let config = SieveConfig::default().with_default(
            hdbx_types::DataFormat::Scalar,
            FillPolicy::CarryForward,
        );
        let mut sieve = DataSieve::with_config(config);
        sieve.divide(vec![
            sample("A", "2013-01-01 00:00:00", 0.0),
            sample("B", "2013-01-01 01:00:00", 1.0),
            sample("B", "2013-01-01 02:00:00", 2.0),
            sample("A", "2013-01-01 03:00:00", 3.0),
        ]);

        sieve.fill();
        assert_eq!(sieve.get_data("A").unwrap().len(), 4);
        assert_eq!(
            timestamps(sieve.get_data("B").unwrap()),
            vec!["01:00", "02:00"]
        );
    }

    #[test]
    fn test_into_sequences_and_clear() {
        let mut sieve = DataSieve::new();
        sieve.divide(vec![
            sample("A", "2013-01-01 00:00:00", 0.0),
            sample("B", "2013-01-01 01:00:00", 1.0),
        ]);
        sieve.fill();

        let sequences = sieve.into_sequences();
        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0].0, "A");
        assert_eq!(sequences[1].1.len(), 1);

        let mut sieve = DataSieve::new();
        sieve.divide(vec![sample("A", "2013-01-01 00:00:00", 0.0)]);
        sieve.clear();
        assert_eq!(sieve.size(), 0);
        assert_eq!(sieve.fill_elapsed(), Duration::ZERO);
    }
}
