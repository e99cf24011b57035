use hdbx_types::ValueRecord;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// 提取状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionState {
    #[default]
    Idle,
    Running,
    Finished,
}

/// 一次 `get` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drain {
    /// 本次追加到调用方向量的记录数
    pub appended: usize,
    pub state: ExtractionState,
}

#[derive(Debug, Default)]
struct BufferInner {
    pending: Vec<ValueRecord>,
    delivered: usize,
    state: ExtractionState,
}

/// 提取任务与消费者之间的行缓冲区
///
/// 生产者整轮追加，消费者在锁内把待取向量整体换出；临界区内不 await。
#[derive(Debug, Clone, Default)]
pub struct RowBuffer {
    inner: Arc<Mutex<BufferInner>>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 开始新的提取；上一次未取走的记录保留
    pub(crate) fn start(&self) {
        let mut inner = self.lock();
        inner.delivered = 0;
        inner.state = ExtractionState::Running;
    }

    pub(crate) fn finish(&self) {
        self.lock().state = ExtractionState::Finished;
    }

    /// 追加一轮记录
    pub(crate) fn push_round(&self, round: &mut Vec<ValueRecord>) -> usize {
        let n = round.len();
        if n > 0 {
            self.lock().pending.append(round);
        }
        n
    }

    /// 把自上次调用以来缓冲的记录移到 `out` 末尾
    pub fn drain_into(&self, out: &mut Vec<ValueRecord>) -> Drain {
        let mut inner = self.lock();
        let taken = std::mem::take(&mut inner.pending);
        let appended = taken.len();
        inner.delivered += appended;
        let state = inner.state;
        drop(inner);

        if out.is_empty() {
            *out = taken;
        } else {
            out.extend(taken);
        }
        Drain { appended, state }
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// 本次提取已交付给消费者的记录总数
    pub fn delivered(&self) -> usize {
        self.lock().delivered
    }

    pub fn state(&self) -> ExtractionState {
        self.lock().state
    }
}
