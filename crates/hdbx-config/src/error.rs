use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Cannot load settings from {path}: {message}")]
    Load { path: String, message: String },

    #[error("Invalid value \"{value}\" for key \"{key}\": expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Missing required key: {0}")]
    MissingKey(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
