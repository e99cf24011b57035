use hdbx_core::{ExtractionListener, SourceFetchError};
use hdbx_extractor::Extractor;
use hdbx_types::{SourceId, ValueRecord};
use std::fmt;
use std::io::Write;
use tracing::{debug, warn};

/// 控制台监听器：输出进度和错误，在进度和完成通知中取走数据
pub struct ConsoleListener<W: Write> {
    out: W,
    values: Vec<ValueRecord>,
    failures: Vec<(SourceId, String)>,
    /// 收到各数据源完成通知时已取走的记录数
    received_at_finish: Vec<(SourceId, usize)>,
}

impl<W: Write> ConsoleListener<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            values: Vec::new(),
            failures: Vec::new(),
            received_at_finish: Vec::new(),
        }
    }

    pub fn values(&self) -> &[ValueRecord] {
        &self.values
    }

    pub fn failures(&self) -> &[(SourceId, String)] {
        &self.failures
    }

    pub fn received_at_finish(&self) -> &[(SourceId, usize)] {
        &self.received_at_finish
    }

    /// 取走累积的记录
    pub fn take_values(&mut self) -> Vec<ValueRecord> {
        std::mem::take(&mut self.values)
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{}", args) {
            warn!(error = %e, "Cannot write to console");
        }
    }

    fn drain(&mut self, extractor: &Extractor) {
        let drain = extractor.get(&mut self.values);
        debug!(appended = drain.appended, total = self.values.len(), "Drained buffered rows");
    }
}

impl<W: Write> ExtractionListener<Extractor> for ConsoleListener<W> {
    fn on_source_progress_update(&mut self, ctx: &Extractor, source: &str, percent: f64) {
        debug!(source = %source, percent, "Extraction progress");
        self.drain(ctx);
        self.line(format_args!("\"{}\" data extraction: {:.2}%", source, percent));
    }

    fn on_source_extraction_finished(
        &mut self,
        ctx: &Extractor,
        source: &str,
        total_rows: usize,
        elapsed: f64,
    ) {
        self.received_at_finish
            .push((source.to_string(), self.values.len()));
        self.drain(ctx);
        self.line(format_args!(
            "* \"{}\": {} rows in {:.3}s",
            source, total_rows, elapsed
        ));
    }

    fn on_source_error(&mut self, _ctx: &Extractor, source: &str, error: &SourceFetchError) {
        self.failures.push((source.to_string(), error.to_string()));
        self.line(format_args!("error fetching data: {}: {}", source, error));
    }

    fn on_extraction_finished(&mut self, ctx: &Extractor, total_rows: usize, elapsed: f64) {
        self.drain(ctx);
        self.line(format_args!(
            "extraction finished: {} rows in {:.3}s",
            total_rows, elapsed
        ));
    }
}
