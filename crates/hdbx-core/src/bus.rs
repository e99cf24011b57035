use crate::error::SourceFetchError;
use hdbx_types::SourceId;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// 提取过程中发布的事件
///
/// 同一数据源的事件按发送顺序到达；`AllFinished` 总是在所有数据源的
/// `SourceFinished`/`SourceFailed` 之后。
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEvent {
    /// 时间范围覆盖百分比（0..=100，单调不减）
    Progress { source: SourceId, percent: f64 },

    /// 数据源提取完成（每个成功的数据源恰好一次）
    SourceFinished {
        source: SourceId,
        total_rows: usize,
        elapsed: f64,
    },

    /// 数据源提取失败（每个失败的数据源恰好一次）
    SourceFailed {
        source: SourceId,
        error: SourceFetchError,
    },

    /// 整个请求完成（每次 get_data 恰好一次）
    AllFinished { total_rows: usize, elapsed: f64 },
}

/// 事件发送端，由提取任务持有
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ExtractionEvent>,
}

impl EventSender {
    pub fn send(&self, event: ExtractionEvent) {
        if self.tx.send(event).is_err() {
            trace!("Extraction event dropped: receiver closed");
        }
    }

    pub fn progress(&self, source: &str, percent: f64) {
        self.send(ExtractionEvent::Progress {
            source: source.to_string(),
            percent,
        });
    }
}

/// 创建事件通道
pub fn channel() -> (EventSender, ExtractionEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, ExtractionEvents { rx })
}

/// 事件接收端，由调用方的消费循环持有
pub struct ExtractionEvents {
    rx: mpsc::UnboundedReceiver<ExtractionEvent>,
}

impl ExtractionEvents {
    pub async fn recv(&mut self) -> Option<ExtractionEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ExtractionEvent> {
        self.rx.try_recv().ok()
    }

    /// 把事件分发给监听器，直到收到 `AllFinished` 或通道关闭
    ///
    /// `ctx` 原样传给每个回调，监听器可以借此回调提取引擎（例如 `get`）。
    pub async fn dispatch<C, L>(&mut self, listener: &mut L, ctx: &C) -> DispatchSummary
    where
        C: ?Sized,
        L: ExtractionListener<C> + ?Sized,
    {
        let mut summary = DispatchSummary::default();

        while let Some(event) = self.rx.recv().await {
            summary.events += 1;
            match event {
                ExtractionEvent::Progress { source, percent } => {
                    summary.progress_updates += 1;
                    listener.on_source_progress_update(ctx, &source, percent);
                }
                ExtractionEvent::SourceFinished {
                    source,
                    total_rows,
                    elapsed,
                } => {
                    listener.on_source_extraction_finished(ctx, &source, total_rows, elapsed);
                    summary.finished.push((source, total_rows));
                }
                ExtractionEvent::SourceFailed { source, error } => {
                    listener.on_source_error(ctx, &source, &error);
                    summary.failed.push((source, error));
                }
                ExtractionEvent::AllFinished {
                    total_rows,
                    elapsed,
                } => {
                    listener.on_extraction_finished(ctx, total_rows, elapsed);
                    summary.total_rows = total_rows;
                    summary.elapsed = elapsed;
                    summary.completed = true;
                    break;
                }
            }
        }

        debug!(
            events = summary.events,
            completed = summary.completed,
            "Event dispatch finished"
        );
        summary
    }
}

/// 一次分发循环的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchSummary {
    pub events: usize,
    pub progress_updates: usize,
    pub finished: Vec<(SourceId, usize)>,
    pub failed: Vec<(SourceId, SourceFetchError)>,
    pub total_rows: usize,
    pub elapsed: f64,
    /// 收到了 `AllFinished`
    pub completed: bool,
}

/// 提取监听器
///
/// 可选的便利接口：实现者对事件做出反应，通常在回调中通过 `ctx` 取走已缓冲的数据。
pub trait ExtractionListener<C: ?Sized> {
    fn on_source_progress_update(&mut self, _ctx: &C, _source: &str, _percent: f64) {}

    fn on_source_extraction_finished(
        &mut self,
        ctx: &C,
        source: &str,
        total_rows: usize,
        elapsed: f64,
    );

    fn on_source_error(&mut self, _ctx: &C, _source: &str, _error: &SourceFetchError) {}

    fn on_extraction_finished(&mut self, ctx: &C, total_rows: usize, elapsed: f64);
}
