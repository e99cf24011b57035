use async_trait::async_trait;
use chrono::NaiveDateTime;
use hdbx_core::{QueryError, SourceFetchError};
use hdbx_types::{Backend, DataFormat, DataType, TimeRange, ValueRecord, Writable};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::debug;

use super::assemble::{Columns, RecordAssembler, ScalarAssembler, TextVectorAssembler};
use super::decode::{decode_i64, decode_string_opt, decode_timestamp_opt};
use super::{statement, validate_table_name, DbSchema, FetchPlan, SourceInfo};

const RO_COLUMNS: Columns = Columns {
    time: "time",
    read: "value",
    write: None,
    quality: None,
    error: None,
    index: None,
};

const RW_COLUMNS: Columns = Columns {
    time: "time",
    read: "read_value",
    write: Some("write_value"),
    quality: None,
    error: None,
    index: None,
};

/// 旧版 HDB 模式
///
/// 属性登记在 `adt` 表中，每个属性的数据存放在 `att_NNNNN` 表（`ID` 补零到 5 位）。
#[derive(Debug, Default)]
pub struct HdbSchema;

impl HdbSchema {
    pub fn new() -> Self {
        Self
    }

    fn columns(info: &SourceInfo) -> Columns {
        if info.writable == Writable::ReadWrite {
            RW_COLUMNS
        } else {
            RO_COLUMNS
        }
    }

    fn assembler(info: &SourceInfo) -> Box<dyn RecordAssembler> {
        let columns = Self::columns(info);
        match info.format {
            DataFormat::Scalar => Box::new(ScalarAssembler::new(info.clone(), columns)),
            DataFormat::Vector | DataFormat::Matrix => {
                Box::new(TextVectorAssembler::new(info.clone(), columns))
            }
        }
    }

    fn select_list(info: &SourceInfo) -> String {
        let c = Self::columns(info);
        match c.write {
            Some(write) => format!("{},{},{}", c.time, c.read, write),
            None => format!("{},{}", c.time, c.read),
        }
    }
}

/// Tango 属性数据类型代码
pub fn data_type_from_code(code: i64) -> Option<DataType> {
    match code {
        0 => Some(DataType::Boolean),
        1..=3 | 11 => Some(DataType::Int),
        4 | 5 => Some(DataType::Double),
        6..=9 => Some(DataType::UInt),
        10 => Some(DataType::String),
        _ => None,
    }
}

pub fn format_from_code(code: i64) -> Option<DataFormat> {
    match code {
        0 => Some(DataFormat::Scalar),
        1 => Some(DataFormat::Vector),
        2 => Some(DataFormat::Matrix),
        _ => None,
    }
}

pub fn writable_from_code(code: i64) -> Option<Writable> {
    match code {
        0 => Some(Writable::ReadOnly),
        1 => Some(Writable::ReadWithWrite),
        2 => Some(Writable::WriteOnly),
        3 => Some(Writable::ReadWrite),
        _ => None,
    }
}

/// `att_00042`
pub fn table_name(id: i64) -> String {
    format!("att_{:05}", id)
}

#[async_trait]
impl DbSchema for HdbSchema {
    fn backend(&self) -> Backend {
        Backend::Hdb
    }

    async fn source_info(
        &self,
        db: &DatabaseConnection,
        source: &str,
    ) -> Result<SourceInfo, SourceFetchError> {
        let stmt = statement(
            db,
            "SELECT ID, data_type, data_format, writable FROM adt WHERE full_name = ?".to_string(),
            vec![source.into()],
        );

        let row = db
            .query_one(stmt)
            .await
            .map_err(|e| SourceFetchError::database(source, e))?
            .ok_or_else(|| SourceFetchError::UnknownSource(source.to_string()))?;

        let code = |col: &str| {
            decode_i64(&row, col).map_err(|e| SourceFetchError::decode(source, e.to_string()))
        };
        let id = code("ID")?;
        let type_code = code("data_type")?;
        let format_code = code("data_format")?;
        let writable_code = code("writable")?;

        let (Some(data_type), Some(format), Some(writable)) = (
            data_type_from_code(type_code),
            format_from_code(format_code),
            writable_from_code(writable_code),
        ) else {
            return Err(SourceFetchError::InvalidSourceType {
                name: source.to_string(),
                detail: format!(
                    "type {}, format {}, writable {}",
                    type_code, format_code, writable_code
                ),
            });
        };

        let table = table_name(id);
        validate_table_name(source, &table)?;

        debug!(source = %source, table = %table, ?data_type, ?format, ?writable, "Resolved HDB source");

        Ok(SourceInfo {
            name: source.to_string(),
            id,
            table,
            data_type,
            format,
            writable,
        })
    }

    fn range_plan(&self, db: &DatabaseConnection, info: &SourceInfo, range: &TimeRange) -> FetchPlan {
        let sql = format!(
            "SELECT {} FROM {} WHERE time >= ? AND time <= ? ORDER BY time ASC",
            Self::select_list(info),
            info.table
        );
        FetchPlan {
            statement: statement(db, sql, vec![range.start().into(), range.stop().into()]),
            assembler: Self::assembler(info),
        }
    }

    async fn first_timestamp(
        &self,
        db: &DatabaseConnection,
        info: &SourceInfo,
        range: &TimeRange,
    ) -> Result<Option<NaiveDateTime>, SourceFetchError> {
        let sql = format!(
            "SELECT time FROM {} WHERE time >= ? AND time <= ? ORDER BY time ASC LIMIT 1",
            info.table
        );
        let stmt = statement(db, sql, vec![range.start().into(), range.stop().into()]);

        match db
            .query_one(stmt)
            .await
            .map_err(|e| SourceFetchError::database(&info.name, e))?
        {
            Some(row) => decode_timestamp_opt(&row, "time")
                .map_err(|e| SourceFetchError::decode(&info.name, e.to_string())),
            None => Ok(None),
        }
    }

    async fn latest_before(
        &self,
        db: &DatabaseConnection,
        info: &SourceInfo,
        at: NaiveDateTime,
    ) -> Result<Option<ValueRecord>, SourceFetchError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE time <= ? ORDER BY time DESC LIMIT 1",
            Self::select_list(info),
            info.table
        );
        let stmt = statement(db, sql, vec![at.into()]);

        let Some(row) = db
            .query_one(stmt)
            .await
            .map_err(|e| SourceFetchError::database(&info.name, e))?
        else {
            debug!(source = %info.name, before = %at, "No data before window");
            return Ok(None);
        };

        Self::assembler(info).push(&row)
    }

    async fn sources_list(
        &self,
        db: &DatabaseConnection,
        substring: Option<&str>,
    ) -> Result<Vec<String>, QueryError> {
        let stmt = match substring {
            Some(sub) => statement(
                db,
                "SELECT full_name FROM adt WHERE full_name LIKE ? ORDER BY full_name".to_string(),
                vec![format!("%{}%", sub).into()],
            ),
            None => statement(db, "SELECT full_name FROM adt ORDER BY full_name".to_string(), vec![]),
        };

        let rows = db.query_all(stmt).await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(name) = decode_string_opt(&row, "full_name")? {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn find_errors(
        &self,
        _db: &DatabaseConnection,
        _info: &SourceInfo,
        _range: &TimeRange,
    ) -> Result<Vec<ValueRecord>, QueryError> {
        Err(QueryError::Unsupported(
            "error search is not available on the legacy HDB schema".to_string(),
        ))
    }
}
