use async_trait::async_trait;
use chrono::NaiveDateTime;
use hdbx_core::{QueryError, SourceFetchError};
use hdbx_types::{Backend, DataFormat, DataType, Quality, TimeRange, ValueRecord, Writable};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::debug;

use super::assemble::{Columns, RecordAssembler, ScalarAssembler, SpectrumAssembler};
use super::decode::{
    decode_i64, decode_i64_opt, decode_string_opt, decode_timestamp, decode_timestamp_opt,
};
use super::{statement, validate_table_name, DbSchema, FetchPlan, SourceInfo};

/// HDB++ 模式
///
/// 属性登记在 `att_conf`，类型字符串（如 `scalar_devdouble_ro`）在
/// `att_conf_data_type` 中，数据存放在 `att_<类型字符串>` 表，按 `att_conf_id` 区分。
#[derive(Debug, Default)]
pub struct HdbppSchema;

/// 解析类型字符串 `<format>_<type>_<writable>`
pub fn parse_type_name(type_name: &str) -> Option<(DataFormat, DataType, Writable)> {
    let lower = type_name.trim().to_ascii_lowercase();
    let mut parts = lower.splitn(3, '_');
    let format = match parts.next()? {
        "scalar" => DataFormat::Scalar,
        "array" | "spectrum" => DataFormat::Vector,
        "image" => DataFormat::Matrix,
        _ => return None,
    };

    let type_part = parts.next()?;
    let data_type = match type_part.strip_prefix("dev").unwrap_or(type_part) {
        "double" | "float" => DataType::Double,
        "long" | "long64" | "short" | "int8" | "char" | "state" | "enum" => DataType::Int,
        "ulong" | "ulong64" | "ushort" | "uchar" => DataType::UInt,
        "boolean" | "bool" => DataType::Boolean,
        "string" => DataType::String,
        _ => return None,
    };

    let writable = match parts.next()? {
        "ro" => Writable::ReadOnly,
        "rw" => Writable::ReadWrite,
        "wo" => Writable::WriteOnly,
        _ => return None,
    };

    Some((format, data_type, writable))
}

impl HdbppSchema {
    pub fn new() -> Self {
        Self
    }

    fn columns(info: &SourceInfo) -> Columns {
        let (read, write) = match info.writable {
            Writable::ReadOnly => ("value_r", None),
            Writable::WriteOnly => ("value_w", None),
            Writable::ReadWrite | Writable::ReadWithWrite => ("value_r", Some("value_w")),
        };
        Columns {
            time: "data_time",
            read,
            write,
            quality: Some("quality"),
            error: Some("error_desc"),
            index: (info.format != DataFormat::Scalar).then_some("idx"),
        }
    }

    fn assembler(info: &SourceInfo) -> Box<dyn RecordAssembler> {
        let columns = Self::columns(info);
        match info.format {
            DataFormat::Scalar => Box::new(ScalarAssembler::new(info.clone(), columns)),
            DataFormat::Vector | DataFormat::Matrix => {
                Box::new(SpectrumAssembler::new(info.clone(), columns))
            }
        }
    }

    fn select_list(info: &SourceInfo) -> String {
        let c = Self::columns(info);
        let mut cols = vec![c.time, c.read];
        cols.extend(c.write);
        if info.format != DataFormat::Scalar {
            cols.extend(["dim_x", "idx"]);
        }
        cols.extend(["quality", "error_desc"]);
        cols.join(",")
    }

    fn order_by(info: &SourceInfo) -> &'static str {
        if info.format == DataFormat::Scalar {
            "data_time ASC"
        } else {
            "data_time ASC, idx ASC"
        }
    }
}

#[async_trait]
impl DbSchema for HdbppSchema {
    fn backend(&self) -> Backend {
        Backend::Hdbpp
    }

    async fn source_info(
        &self,
        db: &DatabaseConnection,
        source: &str,
    ) -> Result<SourceInfo, SourceFetchError> {
        // att_name 可能带有 tango://host:port/ 前缀
        let stmt = statement(
            db,
            "SELECT c.att_conf_id AS att_conf_id, c.att_name AS att_name, t.data_type AS data_type \
             FROM att_conf c JOIN att_conf_data_type t \
             ON c.att_conf_data_type_id = t.att_conf_data_type_id \
             WHERE c.att_name LIKE ? ORDER BY c.att_conf_id"
                .to_string(),
            vec![format!("%{}", source).into()],
        );

        let rows = db
            .query_all(stmt)
            .await
            .map_err(|e| SourceFetchError::database(source, e))?;

        let decode = |e: sea_orm::DbErr| SourceFetchError::decode(source, e.to_string());
        let mut chosen = None;
        for row in &rows {
            let name = decode_string_opt(row, "att_name").map_err(decode)?;
            let exact = name.as_deref() == Some(source);
            if chosen.is_none() || exact {
                chosen = Some(row);
            }
            if exact {
                break;
            }
        }
        let row = chosen.ok_or_else(|| SourceFetchError::UnknownSource(source.to_string()))?;

        let id = decode_i64(row, "att_conf_id").map_err(decode)?;
        let type_name = decode_string_opt(row, "data_type")
            .map_err(decode)?
            .unwrap_or_default();

        let (format, data_type, writable) =
            parse_type_name(&type_name).ok_or_else(|| SourceFetchError::InvalidSourceType {
                name: source.to_string(),
                detail: format!("data type \"{}\"", type_name),
            })?;

        let table = format!("att_{}", type_name.trim().to_ascii_lowercase());
        validate_table_name(source, &table)?;

        debug!(source = %source, id, table = %table, "Resolved HDB++ source");

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
            "SELECT {} FROM {} WHERE att_conf_id = ? AND data_time >= ? AND data_time <= ? ORDER BY {}",
            Self::select_list(info),
            info.table,
            Self::order_by(info)
        );
        FetchPlan {
            statement: statement(
                db,
                sql,
                vec![info.id.into(), range.start().into(), range.stop().into()],
            ),
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
            "SELECT data_time FROM {} WHERE att_conf_id = ? AND data_time >= ? AND data_time <= ? \
             ORDER BY data_time ASC LIMIT 1",
            info.table
        );
        let stmt = statement(
            db,
            sql,
            vec![info.id.into(), range.start().into(), range.stop().into()],
        );

        match db
            .query_one(stmt)
            .await
            .map_err(|e| SourceFetchError::database(&info.name, e))?
        {
            Some(row) => decode_timestamp_opt(&row, "data_time")
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
        let stmt = if info.format == DataFormat::Scalar {
            let sql = format!(
                "SELECT {} FROM {} WHERE att_conf_id = ? AND data_time <= ? \
                 ORDER BY data_time DESC LIMIT 1",
                Self::select_list(info),
                info.table
            );
            statement(db, sql, vec![info.id.into(), at.into()])
        } else {
            // spectrum 的所有元素共享同一个时间戳
            let sql = format!(
                "SELECT {cols} FROM {table} WHERE att_conf_id = ? AND data_time = \
                 (SELECT MAX(data_time) FROM {table} WHERE att_conf_id = ? AND data_time <= ?) \
                 ORDER BY idx ASC",
                cols = Self::select_list(info),
                table = info.table
            );
            statement(db, sql, vec![info.id.into(), info.id.into(), at.into()])
        };

        let rows = db
            .query_all(stmt)
            .await
            .map_err(|e| SourceFetchError::database(&info.name, e))?;
        if rows.is_empty() {
            debug!(source = %info.name, before = %at, "No data before window");
            return Ok(None);
        }

        let mut assembler = Self::assembler(info);
        let mut record = None;
        for row in &rows {
            if let Some(done) = assembler.push(row)? {
                record = Some(done);
            }
        }
        Ok(assembler.finish().or(record))
    }

    async fn sources_list(
        &self,
        db: &DatabaseConnection,
        substring: Option<&str>,
    ) -> Result<Vec<String>, QueryError> {
        let stmt = match substring {
            Some(sub) => statement(
                db,
                "SELECT att_name FROM att_conf WHERE att_name LIKE ? ORDER BY att_name".to_string(),
                vec![format!("%{}%", sub).into()],
            ),
            None => statement(
                db,
                "SELECT att_name FROM att_conf ORDER BY att_name".to_string(),
                vec![],
            ),
        };

        let rows = db.query_all(stmt).await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(name) = decode_string_opt(&row, "att_name")? {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn find_errors(
        &self,
        db: &DatabaseConnection,
        info: &SourceInfo,
        range: &TimeRange,
    ) -> Result<Vec<ValueRecord>, QueryError> {
        let sql = format!(
            "SELECT data_time, quality, error_desc FROM {} WHERE att_conf_id = ? \
             AND data_time >= ? AND data_time <= ? AND (quality = 1 OR error_desc IS NOT NULL) \
             ORDER BY data_time ASC",
            info.table
        );
        let stmt = statement(
            db,
            sql,
            vec![info.id.into(), range.start().into(), range.stop().into()],
        );

        let rows = db.query_all(stmt).await?;
        let mut records: Vec<ValueRecord> = Vec::with_capacity(rows.len());
        for row in rows {
            let ts = decode_timestamp(&row, "data_time")?;
            // spectrum 每个元素一行，同一时间戳只保留一条
            if records.last().map(|r| r.timestamp) == Some(ts) {
                continue;
            }
            let quality = decode_i64_opt(&row, "quality")?
                .map(Quality::from_code)
                .unwrap_or(Quality::Valid);
            let error = decode_string_opt(&row, "error_desc")?;

            records.push(
                ValueRecord::new(&info.name, ts, info.format, info.data_type, info.writable)
                    .with_quality(quality)
                    .with_error(error),
            );
        }

        debug!(source = %info.name, errors = records.len(), "Error records fetched");
        Ok(records)
    }
}
