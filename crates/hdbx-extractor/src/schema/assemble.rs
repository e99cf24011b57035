use hdbx_core::SourceFetchError;
use hdbx_types::{DataFormat, Quality, ValueRecord};
use sea_orm::{DbErr, QueryResult};

use super::decode::{
    decode_datum, decode_i64, decode_i64_opt, decode_string_opt, decode_text_vector,
    decode_timestamp,
};
use super::SourceInfo;

/// spectrum 下标上限，超出视为数据损坏
const MAX_SPECTRUM_LEN: i64 = 1 << 20;

/// 结果集的列名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub time: &'static str,
    pub read: &'static str,
    pub write: Option<&'static str>,
    pub quality: Option<&'static str>,
    pub error: Option<&'static str>,
    pub index: Option<&'static str>,
}

/// 把结果行组装为记录
///
/// 行必须按时间升序到达。一条记录可能由多行组成（HDB++ spectrum），
/// 因此 `push` 只在一条记录完整时返回它，最后一条由 `finish` 交出。
pub trait RecordAssembler: Send {
    fn push(&mut self, row: &QueryResult) -> Result<Option<ValueRecord>, SourceFetchError>;

    fn finish(&mut self) -> Option<ValueRecord>;
}

fn decode_err(info: &SourceInfo) -> impl Fn(DbErr) -> SourceFetchError + '_ {
    move |e| SourceFetchError::decode(&info.name, e.to_string())
}

fn apply_meta(
    record: &mut ValueRecord,
    row: &QueryResult,
    columns: &Columns,
) -> Result<(), DbErr> {
    if let Some(col) = columns.quality {
        if let Some(code) = decode_i64_opt(row, col)? {
            record.quality = Quality::from_code(code);
        }
    }
    if let Some(col) = columns.error {
        if let Some(desc) = decode_string_opt(row, col)?.filter(|d| !d.is_empty()) {
            record.error.get_or_insert(desc);
        }
    }
    Ok(())
}

/// 标量：一行一条记录
pub struct ScalarAssembler {
    info: SourceInfo,
    columns: Columns,
}

impl ScalarAssembler {
    pub fn new(info: SourceInfo, columns: Columns) -> Self {
        Self { info, columns }
    }
}

impl RecordAssembler for ScalarAssembler {
    fn push(&mut self, row: &QueryResult) -> Result<Option<ValueRecord>, SourceFetchError> {
        let info = &self.info;
        let err = decode_err(info);

        let ts = decode_timestamp(row, self.columns.time).map_err(&err)?;
        let read = decode_datum(row, self.columns.read, info.data_type).map_err(&err)?;
        let write = match self.columns.write {
            Some(col) => decode_datum(row, col, info.data_type).map_err(&err)?,
            None => None,
        };

        let mut record =
            ValueRecord::scalar(&info.name, ts, info.data_type, info.writable, read, write);
        apply_meta(&mut record, row, &self.columns).map_err(&err)?;
        Ok(Some(record))
    }

    fn finish(&mut self) -> Option<ValueRecord> {
        None
    }
}

/// 旧版 HDB spectrum：一行一条记录，值以文本形式存储
pub struct TextVectorAssembler {
    info: SourceInfo,
    columns: Columns,
}

impl TextVectorAssembler {
    pub fn new(info: SourceInfo, columns: Columns) -> Self {
        Self { info, columns }
    }

    fn parse_column(
        &self,
        row: &QueryResult,
        col: &str,
    ) -> Result<Vec<Option<hdbx_types::Datum>>, SourceFetchError> {
        let text = decode_string_opt(row, col).map_err(decode_err(&self.info))?;
        match text {
            None => Ok(Vec::new()),
            Some(text) => decode_text_vector(&text, self.info.data_type)
                .map_err(|e| SourceFetchError::decode(&self.info.name, e.to_string())),
        }
    }
}

impl RecordAssembler for TextVectorAssembler {
    fn push(&mut self, row: &QueryResult) -> Result<Option<ValueRecord>, SourceFetchError> {
        let info = &self.info;
        let ts = decode_timestamp(row, self.columns.time).map_err(decode_err(info))?;
        let read = self.parse_column(row, self.columns.read)?;

        let mut record = ValueRecord::vector(&info.name, ts, info.data_type, info.writable, read);
        if let Some(col) = self.columns.write {
            record.write = self.parse_column(row, col)?;
        }
        Ok(Some(record))
    }

    fn finish(&mut self) -> Option<ValueRecord> {
        None
    }
}

/// HDB++ spectrum：每个元素一行，按时间戳分组、按下标排序
pub struct SpectrumAssembler {
    info: SourceInfo,
    columns: Columns,
    current: Option<ValueRecord>,
}

impl SpectrumAssembler {
    pub fn new(info: SourceInfo, columns: Columns) -> Self {
        Self {
            info,
            columns,
            current: None,
        }
    }
}

impl RecordAssembler for SpectrumAssembler {
    fn push(&mut self, row: &QueryResult) -> Result<Option<ValueRecord>, SourceFetchError> {
        let info = &self.info;
        let err = decode_err(info);

        let ts = decode_timestamp(row, self.columns.time).map_err(&err)?;
        let idx = match self.columns.index {
            Some(col) => decode_i64(row, col).map_err(&err)?,
            None => 0,
        };
        if !(0..MAX_SPECTRUM_LEN).contains(&idx) {
            return Err(SourceFetchError::decode(
                &info.name,
                format!("spectrum index {} out of range", idx),
            ));
        }

        let read = decode_datum(row, self.columns.read, info.data_type).map_err(&err)?;
        let write = match self.columns.write {
            Some(col) => decode_datum(row, col, info.data_type).map_err(&err)?,
            None => None,
        };

        let completed = match &self.current {
            Some(current) if current.timestamp != ts => self.current.take(),
            _ => None,
        };

        let record = self.current.get_or_insert_with(|| {
            ValueRecord::new(
                &info.name,
                ts,
                DataFormat::Vector,
                info.data_type,
                info.writable,
            )
        });
        record.set_element(idx as usize, read, write);
        apply_meta(record, row, &self.columns).map_err(&err)?;

        Ok(completed)
    }

    fn finish(&mut self) -> Option<ValueRecord> {
        self.current.take()
    }
}
