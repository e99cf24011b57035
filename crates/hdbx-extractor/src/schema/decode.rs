use chrono::NaiveDateTime;
use hdbx_types::{parse_timestamp, DataType, Datum, ValueError};
use sea_orm::{DbErr, QueryResult};

// 不同驱动对同一列返回的类型不同（MySQL DATETIME、SQLite TEXT 等），
// 这里按顺序尝试几种解码方式。

/// 解码时间戳列
pub fn decode_timestamp(row: &QueryResult, col: &str) -> Result<NaiveDateTime, DbErr> {
    decode_timestamp_opt(row, col)?
        .ok_or_else(|| DbErr::Type(format!("column {} is NULL", col)))
}

pub fn decode_timestamp_opt(row: &QueryResult, col: &str) -> Result<Option<NaiveDateTime>, DbErr> {
    if let Ok(ts) = row.try_get::<Option<NaiveDateTime>>("", col) {
        return Ok(ts);
    }
    let text: Option<String> = row.try_get("", col)?;
    text.map(|t| parse_timestamp(&t).map_err(|e| DbErr::Type(e.to_string())))
        .transpose()
}

/// 解码整数列（ID、质量因子、下标等）
pub fn decode_i64(row: &QueryResult, col: &str) -> Result<i64, DbErr> {
    decode_i64_opt(row, col)?.ok_or_else(|| DbErr::Type(format!("column {} is NULL", col)))
}

pub fn decode_i64_opt(row: &QueryResult, col: &str) -> Result<Option<i64>, DbErr> {
    if let Ok(v) = row.try_get::<Option<i64>>("", col) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<Option<i32>>("", col) {
        return Ok(v.map(i64::from));
    }
    if let Ok(v) = row.try_get::<Option<u32>>("", col) {
        return Ok(v.map(i64::from));
    }
    let text: Option<String> = row.try_get("", col)?;
    text.map(|t| {
        t.trim()
            .parse::<i64>()
            .map_err(|_| DbErr::Type(format!("column {}: \"{}\" is not an integer", col, t)))
    })
    .transpose()
}

pub fn decode_string_opt(row: &QueryResult, col: &str) -> Result<Option<String>, DbErr> {
    row.try_get::<Option<String>>("", col)
}

/// 按数据类型解码一个值列；NULL 返回 `None`
pub fn decode_datum(
    row: &QueryResult,
    col: &str,
    data_type: DataType,
) -> Result<Option<Datum>, DbErr> {
    match data_type {
        DataType::Double => decode_f64(row, col).map(|v| v.map(Datum::Double)),
        DataType::Int => decode_i64_opt(row, col).map(|v| v.map(Datum::Int)),
        DataType::UInt => {
            if let Ok(v) = row.try_get::<Option<u64>>("", col) {
                return Ok(v.map(Datum::UInt));
            }
            match decode_i64_opt(row, col)? {
                None => Ok(None),
                Some(n) => u64::try_from(n)
                    .map(|v| Some(Datum::UInt(v)))
                    .map_err(|_| DbErr::Type(format!("column {}: {} is negative", col, n))),
            }
        }
        DataType::Boolean => {
            if let Ok(v) = row.try_get::<Option<bool>>("", col) {
                return Ok(v.map(Datum::Bool));
            }
            decode_i64_opt(row, col).map(|v| v.map(|n| Datum::Bool(n != 0)))
        }
        DataType::String => decode_string_opt(row, col).map(|v| v.map(Datum::Str)),
    }
}

fn decode_f64(row: &QueryResult, col: &str) -> Result<Option<f64>, DbErr> {
    if let Ok(v) = row.try_get::<Option<f64>>("", col) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<Option<f32>>("", col) {
        return Ok(v.map(f64::from));
    }
    if let Ok(v) = row.try_get::<Option<i64>>("", col) {
        return Ok(v.map(|n| n as f64));
    }
    let text: Option<String> = row.try_get("", col)?;
    text.map(|t| {
        t.trim()
            .parse::<f64>()
            .map_err(|_| DbErr::Type(format!("column {}: \"{}\" is not a number", col, t)))
    })
    .transpose()
}

/// 解析旧版 HDB 中以逗号或空格分隔的 spectrum 文本
///
/// `NULL`/`null` 元素解析为 `None`。
pub fn decode_text_vector(
    text: &str,
    data_type: DataType,
) -> Result<Vec<Option<Datum>>, ValueError> {
    text.split(|c| c == ',' || c == ' ')
        .filter(|token| !token.is_empty())
        .map(|token| {
            if token.eq_ignore_ascii_case("null") {
                Ok(None)
            } else {
                Datum::parse(token, data_type).map(Some)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_vector() {
        let values = decode_text_vector("1.5,2.5, 3", DataType::Double).unwrap();
        assert_eq!(
            values,
            vec![
                Some(Datum::Double(1.5)),
                Some(Datum::Double(2.5)),
                Some(Datum::Double(3.0))
            ]
        );

        let values = decode_text_vector("1,NULL,3", DataType::Int).unwrap();
        assert_eq!(values[1], None);
        assert_eq!(values.len(), 3);

        assert!(decode_text_vector("", DataType::Double).unwrap().is_empty());
        assert!(decode_text_vector("1.0,x", DataType::Double).is_err());
    }
}
