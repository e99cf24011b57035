use hdbx_types::TimeError;
use thiserror::Error;

/// 连接错误，对本次运行是致命的
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Unsupported database \"{0}\": only mysql and sqlite urls are accepted")]
    UnsupportedDatabase(String),

    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// 单次调用的请求错误
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Not connected to a database")]
    NotConnected,

    #[error("No sources requested")]
    EmptyRequest,

    #[error("Source requested twice: {0}")]
    DuplicateSource(String),

    #[error("An extraction is already in progress")]
    Busy,

    #[error("Invalid time range: {0}")]
    InvalidRange(#[from] TimeError),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Extraction aborted: {0}")]
    Aborted(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Source(#[from] SourceFetchError),
}

/// 单个数据源的提取错误
///
/// 可恢复：通过事件通道上报，不影响其它数据源。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceFetchError {
    #[error("No attribute \"{0}\" in the archive")]
    UnknownSource(String),

    #[error("\"{name}\": invalid type, format or writable ({detail})")]
    InvalidSourceType { name: String, detail: String },

    #[error("\"{name}\": database error: {message}")]
    Database { name: String, message: String },

    #[error("\"{name}\": cannot decode row: {message}")]
    Decode { name: String, message: String },
}

impl SourceFetchError {
    /// 出错的数据源名称
    pub fn source_name(&self) -> &str {
        match self {
            SourceFetchError::UnknownSource(name) => name,
            SourceFetchError::InvalidSourceType { name, .. }
            | SourceFetchError::Database { name, .. }
            | SourceFetchError::Decode { name, .. } => name,
        }
    }

    pub fn database(name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        SourceFetchError::Database {
            name: name.into(),
            message: err.to_string(),
        }
    }

    pub fn decode(name: impl Into<String>, message: impl Into<String>) -> Self {
        SourceFetchError::Decode {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// HDBX 统一错误类型
#[derive(Error, Debug)]
pub enum HdbxError {
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Fetch error: {0}")]
    Source(#[from] SourceFetchError),

    #[error("Time error: {0}")]
    Time(#[from] TimeError),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, HdbxError>;
