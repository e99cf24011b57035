//! HDB/HDB++ 历史数据提取引擎

pub mod buffer;
pub mod config;
pub mod extractor;
pub mod fill;
pub mod schema;
mod task;

pub use buffer::{Drain, ExtractionState, RowBuffer};
pub use config::{ExtractorConfig, FillFromPastMode, DEFAULT_FILL_THRESHOLD_PERCENT};
pub use extractor::{ConnectionInfo, ExtractionHandle, ExtractionSummary, Extractor};
pub use schema::{DbSchema, HdbSchema, HdbppSchema, SourceInfo};

pub use hdbx_core::{
    ConnectError, DispatchSummary, ExtractionEvent, ExtractionEvents, ExtractionListener,
    QueryError, SourceFetchError,
};
