//! 历史数据库模式策略
//!
//! 每种模式负责把数据源名解析为表和类型信息，并生成取数语句；
//! 行到 `ValueRecord` 的组装由 `RecordAssembler` 完成。

mod assemble;
mod decode;
pub mod hdb;
pub mod hdbpp;

pub use assemble::{Columns, RecordAssembler, ScalarAssembler, SpectrumAssembler, TextVectorAssembler};
pub use decode::{decode_datum, decode_i64, decode_text_vector, decode_timestamp};
pub use hdb::HdbSchema;
pub use hdbpp::HdbppSchema;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use hdbx_core::{QueryError, SourceFetchError};
use hdbx_types::{Backend, DataFormat, DataType, TimeRange, ValueRecord, Writable};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement, Value};
use std::sync::Arc;

/// 数据源元数据
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    /// HDB 中的 `adt.ID`，HDB++ 中的 `att_conf_id`
    pub id: i64,
    /// 数据表名，已校验为合法标识符
    pub table: String,
    pub data_type: DataType,
    pub format: DataFormat,
    pub writable: Writable,
}

/// 取数计划：范围查询语句和对应的行组装器
pub struct FetchPlan {
    pub statement: Statement,
    pub assembler: Box<dyn RecordAssembler>,
}

/// 数据库模式策略
#[async_trait]
pub trait DbSchema: Send + Sync {
    fn backend(&self) -> Backend;

    /// 解析数据源
    ///
    /// # 错误
    /// * `UnknownSource` - 数据源不存在
    /// * `InvalidSourceType` - 类型、格式或读写属性无法识别
    async fn source_info(
        &self,
        db: &DatabaseConnection,
        source: &str,
    ) -> Result<SourceInfo, SourceFetchError>;

    /// `[start, stop]` 内按时间升序的取数计划
    fn range_plan(&self, db: &DatabaseConnection, info: &SourceInfo, range: &TimeRange) -> FetchPlan;

    /// 范围内第一个样本的时间戳
    async fn first_timestamp(
        &self,
        db: &DatabaseConnection,
        info: &SourceInfo,
        range: &TimeRange,
    ) -> Result<Option<NaiveDateTime>, SourceFetchError>;

    /// `at` 时刻或之前最近的一个样本
    async fn latest_before(
        &self,
        db: &DatabaseConnection,
        info: &SourceInfo,
        at: NaiveDateTime,
    ) -> Result<Option<ValueRecord>, SourceFetchError>;

    /// 名称包含 `substring` 的数据源；`None` 列出全部
    async fn sources_list(
        &self,
        db: &DatabaseConnection,
        substring: Option<&str>,
    ) -> Result<Vec<String>, QueryError>;

    /// 范围内的错误记录（质量为 Invalid 或带错误描述）
    async fn find_errors(
        &self,
        db: &DatabaseConnection,
        info: &SourceInfo,
        range: &TimeRange,
    ) -> Result<Vec<ValueRecord>, QueryError>;
}

/// 按后端选择模式策略
pub fn schema_for(backend: Backend) -> Arc<dyn DbSchema> {
    match backend {
        Backend::Hdb => Arc::new(HdbSchema::new()),
        Backend::Hdbpp => Arc::new(HdbppSchema::new()),
    }
}

/// 按连接的后端生成带 `?` 占位符的语句
pub(crate) fn statement(db: &DatabaseConnection, sql: String, values: Vec<Value>) -> Statement {
    Statement::from_sql_and_values(db.get_database_backend(), sql, values)
}

/// 表名只允许字母、数字和下划线，防止拼接进 SQL 时注入
pub(crate) fn validate_table_name(source: &str, table: &str) -> Result<(), SourceFetchError> {
    let valid = !table.is_empty()
        && table.len() <= 64
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SourceFetchError::InvalidSourceType {
            name: source.to_string(),
            detail: format!("bad table name \"{}\"", table),
        })
    }
}
