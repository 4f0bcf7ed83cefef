//! SQL value rendering shared by the COPY and INSERT row formats.

use std::fmt::{self, Write as _};

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::options::Options;

/// One column value of a formatted row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        value.map_or(Self::Null, |v| Self::Text(v.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Value as it appears in a `COPY ... csv` line; NULL is an unquoted
    /// empty field.
    fn copy_field(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(text) => text.clone(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
        }
    }
}

/// Renders SQL literals: `'O''Brien'`, `42`, `NULL`.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Text(text) => write_quoted(f, text),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
        }
    }
}

fn write_quoted(out: &mut impl fmt::Write, text: &str) -> fmt::Result {
    out.write_char('\'')?;
    for part in text.split_inclusive('\'') {
        out.write_str(part)?;
        if part.ends_with('\'') {
            out.write_char('\'')?;
        }
    }
    out.write_char('\'')
}

/// `'text'` with embedded quotes doubled.
pub fn quote_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    let _ = write_quoted(&mut out, text);
    out
}

/// `"name"` with embedded double quotes doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TYPE ... AS ENUM (...)` for the given labels.
pub fn create_enum_type(opts: &Options, type_name: &str, labels: &[&str]) -> String {
    let mut sql = format!("CREATE TYPE {} AS ENUM (\n", opts.qualify(type_name));
    for (i, label) in labels.iter().enumerate() {
        let separator = if i == 0 { "\t" } else { "\t, " };
        let _ = writeln!(sql, "{separator}{}", quote_literal(label));
    }
    sql.push_str(");\n");
    sql
}

/// Encodes rows as PostgreSQL `COPY ... FROM STDIN csv` lines.
pub struct CopyEncoder {
    builder: WriterBuilder,
    buf: Vec<u8>,
}

impl Default for CopyEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CopyEncoder {
    pub fn new() -> Self {
        let mut builder = WriterBuilder::new();
        builder
            .has_headers(false)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'));
        Self {
            builder,
            buf: Vec::new(),
        }
    }

    /// One newline-terminated line.
    pub fn encode(&mut self, values: &[SqlValue]) -> Result<String, csv::Error> {
        // A lone empty field is written as `""`, which COPY reads as an empty
        // string instead of NULL.
        if let [SqlValue::Null] = values {
            return Ok(String::from("\n"));
        }
        self.buf.clear();
        {
            let mut writer = self.builder.from_writer(&mut self.buf);
            writer.write_record(values.iter().map(SqlValue::copy_field))?;
            writer.flush()?;
        }
        Ok(String::from_utf8_lossy(&self.buf).into_owned())
    }
}
