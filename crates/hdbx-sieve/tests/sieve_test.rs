use chrono::{Duration, NaiveDateTime};
use hdbx_config::HdbxSettings;
use hdbx_sieve::{DataSieve, FillPolicy, SieveConfig};
use hdbx_types::{parse_timestamp, DataType, Datum, ValueRecord, Writable};
use std::fs;

/// 三个数据源交错的记录，每个数据源内部按时间排序
fn interleaved() -> Vec<ValueRecord> {
    let base = parse_timestamp("2013-01-01 00:00:00").unwrap();
    let mut values = Vec::new();
    for i in 0..30i64 {
        let source = ["x/y/z/a", "x/y/z/b", "x/y/z/c"][(i % 3) as usize];
        let ts = base + Duration::minutes(i * 7 + (i % 3) * 11);
        values.push(ValueRecord::scalar(
            source,
            ts,
            DataType::Int,
            Writable::ReadOnly,
            Some(Datum::Int(i)),
            None,
        ));
    }
    values
}

fn sorted_keys(values: &[ValueRecord]) -> Vec<(String, NaiveDateTime)> {
    let mut keys: Vec<_> = values
        .iter()
        .map(|v| (v.source.clone(), v.timestamp))
        .collect();
    keys.sort();
    keys
}

/// 不补点时，分拣后的并集与输入完全相同
#[test]
fn test_round_trip_without_fill() {
    let input = interleaved();
    let mut sieve = DataSieve::new();
    // 分两次传入
    let (first, second) = input.split_at(11);
    sieve.divide(first.to_vec());
    sieve.divide(second.to_vec());
    let report = sieve.fill();
    assert_eq!(report.inserted, 0);

    let output: Vec<ValueRecord> = sieve
        .into_sequences()
        .into_iter()
        .flat_map(|(_, seq)| seq.iter().cloned().collect::<Vec<_>>())
        .collect();
    assert_eq!(sorted_keys(&output), sorted_keys(&input));
}

#[test]
fn test_timestamps_strictly_increasing_after_fill() {
    let mut input = interleaved();
    input.reverse();
    input.push(input[0].clone());

    let config = SieveConfig::default().with_override("x/y/z/b", FillPolicy::CarryForward);
    let mut sieve = DataSieve::with_config(config);
    sieve.divide(input);
    let report = sieve.fill();
    assert_eq!(report.duplicates_dropped, 1);
    assert!(report.inserted > 0);

    for source in sieve.sources() {
        let data = sieve.get_data(source).unwrap();
        assert!(
            data.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
            "{} is not strictly increasing",
            source
        );
    }
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sieve.ini");
    fs::write(
        &path,
        "# sieve\nfill_scalar = carry_forward\ncarry_forward_sources = x/y/z/a\n",
    )
    .unwrap();

    let mut settings = HdbxSettings::new();
    settings.load_from_file(&path).unwrap();
    let config = SieveConfig::from_settings(&settings).unwrap();

    assert_eq!(config.scalar, FillPolicy::CarryForward);
    assert_eq!(config.vector, FillPolicy::None);
    assert!(config.overrides.contains_key("x/y/z/a"));
}
