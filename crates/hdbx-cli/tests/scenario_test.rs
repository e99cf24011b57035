use hdbx_cli::{fetch_and_sieve, print_sieve, ConsoleListener, ValuePrinter};
use hdbx_extractor::{Extractor, ExtractorConfig};
use hdbx_sieve::{FillPolicy, SieveConfig};
use hdbx_types::{Backend, DataFormat, TimeRange};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

async fn hdb_fixture() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let statements = [
        "CREATE TABLE adt (ID INTEGER PRIMARY KEY, full_name TEXT, data_type INTEGER, data_format INTEGER, writable INTEGER)",
        "INSERT INTO adt VALUES (1, 'A', 5, 0, 0)",
        "INSERT INTO adt VALUES (2, 'B', 5, 0, 0)",
        "CREATE TABLE att_00001 (time TEXT NOT NULL, value REAL)",
        "INSERT INTO att_00001 VALUES ('2013-01-01 01:00:00', 1.0)",
        "INSERT INTO att_00001 VALUES ('2013-01-01 05:00:00', 5.0)",
        "CREATE TABLE att_00002 (time TEXT NOT NULL, value REAL)",
        "INSERT INTO att_00002 VALUES ('2013-01-01 02:00:00', 20.0)",
        "INSERT INTO att_00002 VALUES ('2013-01-01 03:00:00', 30.0)",
        "INSERT INTO att_00002 VALUES ('2013-01-01 06:00:00', 60.0)",
    ];
    for sql in statements {
        db.execute(Statement::from_string(db.get_database_backend(), sql.to_string()))
            .await
            .unwrap();
    }
    db
}

fn day() -> TimeRange {
    TimeRange::parse("2013-01-01", "2013-01-02").unwrap()
}

fn sources(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_two_sources_sieved() {
    let (mut extractor, mut events) = Extractor::new(ExtractorConfig::default());
    extractor.attach(Backend::Hdb, hdb_fixture().await);

    let mut out = Vec::new();
    let sieve = fetch_and_sieve(
        &extractor,
        &mut events,
        &sources(&["A", "B"]),
        day(),
        SieveConfig::default(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(sieve.size(), 2);
    assert_eq!(sieve.sources(), &["A".to_string(), "B".to_string()]);
    assert_eq!(sieve.get_data("A").unwrap().len(), 2);
    assert_eq!(sieve.get_data("B").unwrap().len(), 3);
    assert!(sieve.get_data("C").is_err());

    let mut printed = Vec::new();
    print_sieve(&sieve, &ValuePrinter::default(), &mut printed).unwrap();
    let text = String::from_utf8(printed).unwrap();
    assert!(text.contains("\t* A\nvalues: 2\n1) \"A\": 2013-01-01 01:00:00 -> 1.00\n"));
    assert!(text.contains("3) \"B\": 2013-01-01 06:00:00 -> 60.00"));
}

#[tokio::test]
async fn test_carry_forward_aligns_sources() {
    let (mut extractor, mut events) = Extractor::new(ExtractorConfig::default());
    extractor.attach(Backend::Hdb, hdb_fixture().await);

    let config = SieveConfig::default().with_default(DataFormat::Scalar, FillPolicy::CarryForward);
    let mut out = Vec::new();
    let sieve = fetch_and_sieve(
        &extractor,
        &mut events,
        &sources(&["A", "B"]),
        day(),
        config,
        &mut out,
    )
    .await
    .unwrap();

    // A: 01:00, (02:00, 03:00), 05:00；B: 02:00, 03:00, (05:00), 06:00
    let a = sieve.get_data("A").unwrap();
    assert_eq!(a.len(), 4);
    assert_eq!(a[2].to_f64(), Some(1.0));
    let b = sieve.get_data("B").unwrap();
    assert_eq!(b.len(), 4);
    assert_eq!(b[2].to_f64(), Some(30.0));
}

#[tokio::test]
async fn test_fetch_error_is_reported_and_run_continues() {
    let (mut extractor, mut events) = Extractor::new(ExtractorConfig::default());
    extractor.attach(Backend::Hdb, hdb_fixture().await);

    let mut out = Vec::new();
    let sieve = fetch_and_sieve(
        &extractor,
        &mut events,
        &sources(&["A", "x/y/z/w"]),
        day(),
        SieveConfig::default(),
        &mut out,
    )
    .await
    .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("error fetching data: x/y/z/w: No attribute \"x/y/z/w\" in the archive"));
    assert_eq!(sieve.sources(), &["A".to_string()]);
}

#[tokio::test]
async fn test_progress_lines_and_rows_drained_before_finish() {
    let (mut extractor, mut events) = Extractor::new(ExtractorConfig::default().with_batch_size(1));
    extractor.attach(Backend::Hdb, hdb_fixture().await);

    let handle = extractor.get_data(&["A"], day()).unwrap();
    let mut listener = ConsoleListener::new(Vec::new());
    events.dispatch(&mut listener, &extractor).await;
    handle.wait().await.unwrap();

    // 完成通知之前，进度通知已经取走了全部记录
    assert_eq!(listener.received_at_finish().len(), 1);
    let (source, received) = &listener.received_at_finish()[0];
    assert_eq!(source, "A");
    assert_eq!(*received, 2);
    assert_eq!(listener.values().len(), 2);

    let text = String::from_utf8(listener.into_inner()).unwrap();
    let progress: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("\"A\" data extraction: "))
        .collect();
    assert!(progress.len() >= 3, "{}", text);
    assert_eq!(progress.first(), Some(&"\"A\" data extraction: 0.00%"));
    assert_eq!(progress.last(), Some(&"\"A\" data extraction: 100.00%"));

    let last_progress = text.find("\"A\" data extraction: 100.00%").unwrap();
    let finished = text.find("* \"A\": 2 rows in ").unwrap();
    assert!(last_progress < finished);
}
