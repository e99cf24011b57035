use hdbx_types::{format_timestamp, DataFormat, Datum, ValueRecord};
use std::io::{self, Write};

/// 把记录以文本形式输出
#[derive(Debug, Clone, Copy)]
pub struct ValuePrinter {
    /// 每条 spectrum 记录最多输出的元素个数，0 表示全部
    pub max_vector_elements: usize,
}

impl Default for ValuePrinter {
    fn default() -> Self {
        Self {
            max_vector_elements: 2,
        }
    }
}

impl ValuePrinter {
    pub fn new(max_vector_elements: usize) -> Self {
        Self {
            max_vector_elements,
        }
    }

    /// 输出一条记录，`index` 从 1 开始
    pub fn print<W: Write>(&self, out: &mut W, index: usize, record: &ValueRecord) -> io::Result<()> {
        match record.format {
            DataFormat::Scalar => self.print_scalar(out, index, record),
            DataFormat::Vector | DataFormat::Matrix => self.print_vector(out, index, record),
        }
    }

    pub fn print_value_list<W: Write>(&self, out: &mut W, values: &[ValueRecord]) -> io::Result<()> {
        writeln!(out, "values: {}", values.len())?;
        for (i, record) in values.iter().enumerate() {
            self.print(out, i + 1, record)?;
        }
        writeln!(out)
    }

    fn print_scalar<W: Write>(&self, out: &mut W, index: usize, record: &ValueRecord) -> io::Result<()> {
        write!(
            out,
            "{}) \"{}\": {} -> {}",
            index,
            record.source,
            format_timestamp(&record.timestamp),
            scalar_text(record.read.first())
        )?;
        if record.writable.has_write_value() {
            write!(out, " [write: {}]", scalar_text(record.write.first()))?;
        }
        write_status(out, record)?;
        writeln!(out)
    }

    fn print_vector<W: Write>(&self, out: &mut W, index: usize, record: &ValueRecord) -> io::Result<()> {
        write!(
            out,
            "{}) [ \"{}\": {}",
            index,
            record.source,
            format_timestamp(&record.timestamp)
        )?;
        write_status(out, record)?;
        writeln!(out)?;

        let limit = match self.max_vector_elements {
            0 => record.read.len(),
            n => n.min(record.read.len()),
        };
        let elements: Vec<String> = record.read[..limit].iter().map(vector_text).collect();
        write!(out, "    {}", elements.join(", "))?;
        if limit < record.read.len() {
            write!(out, ", ... ({} more)", record.read.len() - limit)?;
        }
        writeln!(out, " ]")
    }
}

fn scalar_text(value: Option<&Option<Datum>>) -> String {
    match value.and_then(Option::as_ref) {
        None => "null".to_string(),
        Some(Datum::Str(s)) => format!("\"{}\"", s),
        Some(Datum::Bool(b)) => b.to_string(),
        Some(datum) => match datum.as_f64() {
            Some(v) => format!("{:.2}", v),
            None => datum.to_string(),
        },
    }
}

fn vector_text(value: &Option<Datum>) -> String {
    match value {
        None => "null".to_string(),
        Some(Datum::Str(s)) => format!("\"{}\"", s),
        Some(Datum::Bool(b)) => b.to_string(),
        Some(datum) => match datum.as_f64() {
            Some(v) => format!("{:.3}", v),
            None => datum.to_string(),
        },
    }
}

fn write_status<W: Write>(out: &mut W, record: &ValueRecord) -> io::Result<()> {
    if record.is_valid() {
        return Ok(());
    }
    write!(out, " (quality: {:?}", record.quality)?;
    if let Some(error) = &record.error {
        write!(out, ", error: \"{}\"", error)?;
    }
    write!(out, ")")
}
