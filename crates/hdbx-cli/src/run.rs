use hdbx_core::ExtractionEvents;
use hdbx_extractor::Extractor;
use hdbx_sieve::{DataSieve, SieveConfig};
use hdbx_types::TimeRange;
use std::io::Write;
use tracing::info;

use crate::listener::ConsoleListener;
use crate::printer::ValuePrinter;

/// 提取、分拣并返回分拣器
///
/// 单个数据源的错误只输出到 `out`，不会中断其它数据源。
pub async fn fetch_and_sieve<W: Write>(
    extractor: &Extractor,
    events: &mut ExtractionEvents,
    sources: &[String],
    range: TimeRange,
    sieve_config: SieveConfig,
    out: &mut W,
) -> anyhow::Result<DataSieve> {
    let mut sieve = DataSieve::with_config(sieve_config);
    if sources.is_empty() {
        writeln!(out, "no sources requested")?;
        return Ok(sieve);
    }

    let handle = extractor.get_data(sources, range)?;
    let mut listener = ConsoleListener::new(&mut *out);
    let summary = events.dispatch(&mut listener, extractor).await;
    let extraction = handle.wait().await?;

    info!(
        id = %extraction.id,
        rows = extraction.total_rows,
        failed = summary.failed.len(),
        "Extraction complete"
    );

    sieve.divide(listener.take_values());
    sieve.fill();
    Ok(sieve)
}

/// 按数据源输出分拣结果
pub fn print_sieve<W: Write>(
    sieve: &DataSieve,
    printer: &ValuePrinter,
    out: &mut W,
) -> std::io::Result<()> {
    writeln!(out, "sources:")?;
    for source in sieve.sources() {
        writeln!(out, "\t* {}", source)?;
        if let Ok(values) = sieve.get_data(source) {
            printer.print_value_list(out, values)?;
        }
    }
    Ok(())
}

/// 输出每个数据源的错误记录
pub async fn print_errors<W: Write>(
    extractor: &Extractor,
    sources: &[String],
    range: TimeRange,
    printer: &ValuePrinter,
    out: &mut W,
) -> std::io::Result<()> {
    for source in sources {
        match extractor.find_errors(source, range).await {
            Ok(records) => {
                writeln!(out, "\t* {}", source)?;
                printer.print_value_list(out, &records)?;
            }
            Err(e) => writeln!(out, "error fetching data: {}: {}", source, e)?,
        }
    }
    Ok(())
}
