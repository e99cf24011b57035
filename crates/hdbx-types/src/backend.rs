use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported backend: {0}")]
pub struct ParseBackendError(pub String);

/// 历史数据库模式
///
/// 选择不同的查询策略，但不改变 `ValueRecord` 的形状。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// 旧版 HDB：每个属性一张 `att_NNNNN` 表
    Hdb,
    /// HDB++：按数据类型划分的规范化表
    Hdbpp,
}

impl Backend {
    /// 配置文件中 `dbname == "hdbpp"` 选择 HDB++，其它值都选择旧版 HDB
    pub fn from_db_name(db_name: &str) -> Self {
        if db_name == "hdbpp" {
            Backend::Hdbpp
        } else {
            Backend::Hdb
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Hdb => "hdb",
            Backend::Hdbpp => "hdbpp",
        }
    }
}

impl FromStr for Backend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hdb" => Ok(Backend::Hdb),
            "hdbpp" | "hdb++" => Ok(Backend::Hdbpp),
            _ => Err(ParseBackendError(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_db_name() {
        assert_eq!(Backend::from_db_name("hdbpp"), Backend::Hdbpp);
        assert_eq!(Backend::from_db_name("hdb"), Backend::Hdb);
        assert_eq!(Backend::from_db_name("archive"), Backend::Hdb);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("HDB++".parse::<Backend>().unwrap(), Backend::Hdbpp);
        assert_eq!("hdb".parse::<Backend>().unwrap(), Backend::Hdb);
        assert!("influx".parse::<Backend>().is_err());
    }
}
