use hdbx_types::Backend;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ParseError, Result};
use crate::settings::HdbxSettings;

/// MySQL 默认端口
pub const DEFAULT_PORT: u16 = 3306;

/// 数据库连接参数
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub backend: Backend,
    pub host: String,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub port: u16,
}

impl ConnectionSettings {
    /// 从 `dbuser`/`dbpass`/`dbhost`/`dbname`/`dbport` 读取
    ///
    /// `dbname == "hdbpp"` 选择 HDB++ 模式。
    pub fn from_settings(settings: &HdbxSettings) -> Result<Self> {
        let database = settings.require("dbname")?.to_string();

        let port = match settings.get_int("dbport")? {
            None => DEFAULT_PORT,
            Some(p) => u16::try_from(p).map_err(|_| ParseError::InvalidValue {
                key: "dbport".to_string(),
                value: p.to_string(),
                expected: "a port number",
            })?,
        };

        Ok(Self {
            backend: Backend::from_db_name(&database),
            host: settings.require("dbhost")?.to_string(),
            user: settings.require("dbuser")?.to_string(),
            password: settings.require("dbpass")?.to_string(),
            database,
            port,
        })
    }
}

// 不打印密码
impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}
