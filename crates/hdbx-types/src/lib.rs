pub mod backend;
pub mod time;
pub mod value;

pub use backend::{Backend, ParseBackendError};
pub use time::{format_timestamp, parse_timestamp, TimeError, TimeRange};
pub use value::{DataFormat, DataType, Datum, Quality, ValueError, ValueRecord, Writable};

/// 数据源标识（例如 `domain/family/member/attribute`）
pub type SourceId = String;
