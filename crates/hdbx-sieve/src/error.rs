use thiserror::Error;

/// 分拣器中没有该数据源
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No data for source \"{0}\"")]
pub struct UnknownSourceError(pub String);
