use futures::TryStreamExt;
use hdbx_core::{EventSender, ExtractionEvent, SourceFetchError};
use hdbx_types::{TimeRange, ValueRecord};
use sea_orm::{DatabaseConnection, StreamTrait};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::buffer::RowBuffer;
use crate::config::{ExtractorConfig, FillFromPastMode};
use crate::fill;
use crate::schema::{DbSchema, FetchPlan};

/// 单个数据源提取的结果
#[derive(Debug, Clone)]
pub(crate) enum SourceOutcome {
    Finished { source: String, rows: usize },
    Failed { source: String, error: SourceFetchError },
}

/// 单个数据源的提取任务
///
/// 同一数据源的所有事件都从这里按顺序发出。
pub(crate) struct SourceTask {
    pub source: String,
    pub range: TimeRange,
    pub db: Arc<DatabaseConnection>,
    pub schema: Arc<dyn DbSchema>,
    pub config: ExtractorConfig,
    pub buffer: RowBuffer,
    pub events: EventSender,
    pub last_error: Arc<Mutex<String>>,
}

/// 一轮记录交付后的进度跟踪
struct Progress {
    last_percent: f64,
    last_flush: Instant,
    delivered: usize,
}

impl SourceTask {
    pub async fn run(self) -> SourceOutcome {
        let started = Instant::now();
        self.events.progress(&self.source, 0.0);

        match self.fetch().await {
            Ok(rows) => {
                let elapsed = started.elapsed().as_secs_f64();
                self.events.progress(&self.source, 100.0);
                self.events.send(ExtractionEvent::SourceFinished {
                    source: self.source.clone(),
                    total_rows: rows,
                    elapsed,
                });
                info!(source = %self.source, rows, elapsed, "Source extraction finished");
                SourceOutcome::Finished {
                    source: self.source,
                    rows,
                }
            }
            Err(error) => {
                warn!(source = %self.source, error = %error, "Source extraction failed");
                if let Ok(mut last) = self.last_error.lock() {
                    *last = error.to_string();
                }
                self.events.send(ExtractionEvent::SourceFailed {
                    source: self.source.clone(),
                    error: error.clone(),
                });
                SourceOutcome::Failed {
                    source: self.source,
                    error,
                }
            }
        }
    }

    async fn fetch(&self) -> Result<usize, SourceFetchError> {
        let db = self.db.as_ref();
        let info = self.schema.source_info(db, &self.source).await?;

        // 瞬时查询：只取起点之前最近的一个样本
        if self.range.is_instant() {
            let mut round: Vec<ValueRecord> = self
                .schema
                .latest_before(db, &info, self.range.start())
                .await?
                .into_iter()
                .collect();
            return Ok(self.buffer.push_round(&mut round));
        }

        let batch_size = self.config.batch_size.max(1);
        let mut round = Vec::with_capacity(batch_size);

        // 补点查询必须在打开结果流之前完成：单连接的连接池在流存活期间无法执行其它查询
        if self.config.fill_from_past != FillFromPastMode::None {
            let first = self.schema.first_timestamp(db, &info, &self.range).await?;
            if fill::needs_fill(&self.range, first, self.config.fill_threshold_percent) {
                let past = self
                    .schema
                    .latest_before(db, &info, self.range.start())
                    .await?
                    .and_then(|r| fill::adjust(self.config.fill_from_past, r, self.range.start()));
                if let Some(record) = past {
                    debug!(source = %self.source, ts = %record.timestamp, "Filled from the past");
                    round.push(record);
                }
            }
        }

        let FetchPlan {
            statement,
            mut assembler,
        } = self.schema.range_plan(db, &info, &self.range);

        let mut progress = Progress {
            last_percent: 0.0,
            last_flush: Instant::now(),
            delivered: 0,
        };

        let stream = db
            .stream(statement)
            .await
            .map_err(|e| SourceFetchError::database(&self.source, e))?;
        futures::pin_mut!(stream);

        while let Some(row) = stream
            .try_next()
            .await
            .map_err(|e| SourceFetchError::database(&self.source, e))?
        {
            if let Some(record) = assembler.push(&row)? {
                round.push(record);
            }
            if round.len() >= batch_size || progress.last_flush.elapsed() >= self.config.poll_interval {
                self.flush(&mut round, &mut progress);
            }
        }

        if let Some(record) = assembler.finish() {
            round.push(record);
        }
        self.flush(&mut round, &mut progress);

        Ok(progress.delivered)
    }

    fn flush(&self, round: &mut Vec<ValueRecord>, progress: &mut Progress) {
        progress.last_flush = Instant::now();
        let Some(last_ts) = round.last().map(|r| r.timestamp) else {
            return;
        };

        progress.delivered += self.buffer.push_round(round);

        let percent = self.range.progress_at(&last_ts);
        if percent > progress.last_percent {
            progress.last_percent = percent;
            self.events.progress(&self.source, percent);
        }
    }
}
