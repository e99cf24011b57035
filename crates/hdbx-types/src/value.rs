use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 值解析错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("Cannot parse \"{text}\" as {data_type:?}")]
    Parse { text: String, data_type: DataType },
}

/// 数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    UInt,
    Double,
    Boolean,
    String,
}

/// 数据格式：标量、一维数组（spectrum）或二维矩阵（image）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Scalar,
    Vector,
    Matrix,
}

/// 读写属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Writable {
    ReadOnly,
    WriteOnly,
    ReadWithWrite,
    ReadWrite,
}

impl Writable {
    /// 是否同时存储写入值
    pub fn has_write_value(&self) -> bool {
        matches!(self, Writable::ReadWrite | Writable::ReadWithWrite)
    }
}

/// Tango 属性质量因子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Valid,
    Invalid,
    Alarm,
    Changing,
    Warning,
    Unknown(i64),
}

impl Quality {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Quality::Valid,
            1 => Quality::Invalid,
            2 => Quality::Alarm,
            3 => Quality::Changing,
            4 => Quality::Warning,
            other => Quality::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Quality::Valid => 0,
            Quality::Invalid => 1,
            Quality::Alarm => 2,
            Quality::Changing => 3,
            Quality::Warning => 4,
            Quality::Unknown(code) => *code,
        }
    }

    /// 只有 Invalid 被视为错误标记
    pub fn is_error(&self) -> bool {
        matches!(self, Quality::Invalid)
    }
}

/// 单个数据元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Int(i64),
    UInt(u64),
    Double(f64),
    Bool(bool),
    Str(String),
}

impl Datum {
    /// 按照数据类型解析文本
    pub fn parse(text: &str, data_type: DataType) -> Result<Self, ValueError> {
        let trimmed = text.trim();
        let err = || ValueError::Parse {
            text: text.to_string(),
            data_type,
        };

        match data_type {
            DataType::Int => trimmed.parse().map(Datum::Int).map_err(|_| err()),
            DataType::UInt => trimmed.parse().map(Datum::UInt).map_err(|_| err()),
            DataType::Double => trimmed.parse().map(Datum::Double).map_err(|_| err()),
            DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" => Ok(Datum::Bool(true)),
                "0" | "false" => Ok(Datum::Bool(false)),
                _ => Err(err()),
            },
            DataType::String => Ok(Datum::Str(text.to_string())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int(v) => Some(*v as f64),
            Datum::UInt(v) => Some(*v as f64),
            Datum::Double(v) => Some(*v),
            Datum::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Datum::Str(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Int(v) => write!(f, "{}", v),
            Datum::UInt(v) => write!(f, "{}", v),
            Datum::Double(v) => write!(f, "{}", v),
            Datum::Bool(v) => write!(f, "{}", v),
            Datum::Str(s) => f.write_str(s),
        }
    }
}

/// 从历史数据库取出的一条记录
///
/// 标量只有一个元素；spectrum 每个下标一个元素。`None` 表示数据库中的 NULL。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub source: String,
    pub timestamp: NaiveDateTime,
    pub format: DataFormat,
    pub data_type: DataType,
    pub writable: Writable,
    pub read: Vec<Option<Datum>>,
    /// 只读属性为空
    pub write: Vec<Option<Datum>>,
    pub quality: Quality,
    pub error: Option<String>,
}

impl ValueRecord {
    /// 创建空记录，元素随后由 `set_element` 填充
    pub fn new(
        source: impl Into<String>,
        timestamp: NaiveDateTime,
        format: DataFormat,
        data_type: DataType,
        writable: Writable,
    ) -> Self {
        Self {
            source: source.into(),
            timestamp,
            format,
            data_type,
            writable,
            read: Vec::new(),
            write: Vec::new(),
            quality: Quality::Valid,
            error: None,
        }
    }

    /// 创建标量记录
    pub fn scalar(
        source: impl Into<String>,
        timestamp: NaiveDateTime,
        data_type: DataType,
        writable: Writable,
        read: Option<Datum>,
        write: Option<Datum>,
    ) -> Self {
        let mut record = Self::new(source, timestamp, DataFormat::Scalar, data_type, writable);
        record.set_element(0, read, write);
        record
    }

    /// 创建 spectrum 记录
    pub fn vector(
        source: impl Into<String>,
        timestamp: NaiveDateTime,
        data_type: DataType,
        writable: Writable,
        read: Vec<Option<Datum>>,
    ) -> Self {
        let mut record = Self::new(source, timestamp, DataFormat::Vector, data_type, writable);
        record.read = read;
        if writable.has_write_value() {
            record.write = vec![None; record.read.len()];
        }
        record
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error.filter(|e| !e.is_empty());
        self
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 设置下标 `index` 处的读/写值，必要时扩展数组
    pub fn set_element(&mut self, index: usize, read: Option<Datum>, write: Option<Datum>) {
        if self.read.len() <= index {
            self.read.resize(index + 1, None);
        }
        self.read[index] = read;

        if self.writable.has_write_value() {
            if self.write.len() <= index {
                self.write.resize(index + 1, None);
            }
            self.write[index] = write;
        }
    }

    /// 去重用的身份键
    pub fn key(&self) -> (&str, NaiveDateTime) {
        (&self.source, self.timestamp)
    }

    pub fn len(&self) -> usize {
        self.read.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty()
    }

    /// 所有读取值都为 NULL
    pub fn is_null(&self) -> bool {
        self.read.iter().all(Option::is_none)
    }

    pub fn null_count(&self) -> usize {
        self.read.iter().filter(|v| v.is_none()).count()
    }

    pub fn is_valid(&self) -> bool {
        !self.quality.is_error() && self.error.is_none()
    }

    /// 第一个读取值转换为 f64
    pub fn to_f64(&self) -> Option<f64> {
        self.read.first().and_then(|v| v.as_ref()).and_then(Datum::as_f64)
    }

    /// 第一个写入值转换为 f64
    pub fn write_to_f64(&self) -> Option<f64> {
        self.write.first().and_then(|v| v.as_ref()).and_then(Datum::as_f64)
    }

    pub fn to_f64_vec(&self) -> Vec<Option<f64>> {
        self.read
            .iter()
            .map(|v| v.as_ref().and_then(Datum::as_f64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_timestamp;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_datum_parse() {
        assert_eq!(Datum::parse("42", DataType::Int).unwrap(), Datum::Int(42));
        assert_eq!(Datum::parse(" 1.5 ", DataType::Double).unwrap(), Datum::Double(1.5));
        assert_eq!(Datum::parse("TRUE", DataType::Boolean).unwrap(), Datum::Bool(true));
        assert_eq!(Datum::parse("0", DataType::Boolean).unwrap(), Datum::Bool(false));
        assert!(Datum::parse("abc", DataType::Double).is_err());
        assert!(Datum::parse("-1", DataType::UInt).is_err());
    }

    #[test]
    fn test_scalar_record() {
        let record = ValueRecord::scalar(
            "test/dev/1/current",
            ts("2013-01-01 00:00:00"),
            DataType::Double,
            Writable::ReadWrite,
            Some(Datum::Double(1.25)),
            Some(Datum::Double(2.0)),
        );

        assert_eq!(record.len(), 1);
        assert_eq!(record.to_f64(), Some(1.25));
        assert_eq!(record.write_to_f64(), Some(2.0));
        assert!(record.is_valid());
        assert!(!record.is_null());
    }

    #[test]
    fn test_set_element_grows_vector() {
        let mut record = ValueRecord::new(
            "test/dev/1/spectrum",
            ts("2013-01-01 00:00:00"),
            DataFormat::Vector,
            DataType::Double,
            Writable::ReadOnly,
        );
        record.set_element(2, Some(Datum::Double(3.0)), None);
        record.set_element(0, Some(Datum::Double(1.0)), None);

        assert_eq!(record.len(), 3);
        assert_eq!(record.null_count(), 1);
        assert_eq!(record.to_f64_vec(), vec![Some(1.0), None, Some(3.0)]);
        assert!(record.write.is_empty());
    }

    #[test]
    fn test_quality_and_error() {
        let record = ValueRecord::scalar(
            "a",
            ts("2013-01-01 00:00:00"),
            DataType::Int,
            Writable::ReadOnly,
            None,
            None,
        )
        .with_quality(Quality::from_code(1))
        .with_error(Some(String::new()));

        assert!(record.is_null());
        assert!(record.error.is_none());
        assert!(!record.is_valid());
        assert_eq!(record.quality.code(), 1);
    }

    #[test]
    fn test_record_serializes() {
        let record = ValueRecord::scalar(
            "a",
            ts("2013-01-01 00:00:00"),
            DataType::Int,
            Writable::ReadOnly,
            Some(Datum::Int(7)),
            None,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"read_only\""));
        assert!(json.contains("\"scalar\""));
    }
}
