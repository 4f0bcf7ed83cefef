use std::io::Read;
use std::sync::Arc;

use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use rustc_hash::FxHashMap;

use crate::error::ReadError;

/// Column names of one file, shared by all of its rows.
#[derive(Debug, Default)]
pub struct Header {
    names: Vec<String>,
    index: FxHashMap<String, usize>,
}

impl Header {
    pub fn new<I, S>(names: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let name = name.as_ref();
                let name = if i == 0 {
                    name.trim_start_matches('\u{feff}')
                } else {
                    name
                };
                name.trim().to_string()
            })
            .collect();
        let mut index = FxHashMap::default();
        for (position, name) in names.iter().enumerate() {
            // The first occurrence wins for duplicated columns.
            index.entry(name.clone()).or_insert(position);
        }
        Arc::new(Self { names, index })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }
}

/// One data row: raw values looked up by column name.
#[derive(Debug, Clone)]
pub struct Row {
    header: Arc<Header>,
    record: StringRecord,
    line: Option<u64>,
}

impl Row {
    pub fn new(header: Arc<Header>, record: StringRecord, line: Option<u64>) -> Self {
        Self {
            header,
            record,
            line,
        }
    }

    /// Builds a row from `(field, value)` pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let header = Header::new(pairs.iter().map(|(name, _)| *name));
        let record = StringRecord::from(pairs.iter().map(|(_, value)| *value).collect::<Vec<_>>());
        Self::new(header, record, None)
    }

    /// Trimmed value of `field`; `None` if the column is missing or the
    /// value is blank.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.raw(field)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Untrimmed value, `None` only if the column is missing.
    pub fn raw(&self, field: &str) -> Option<&str> {
        self.header
            .position(field)
            .and_then(|position| self.record.get(position))
    }

    pub fn has_column(&self, field: &str) -> bool {
        self.header.position(field).is_some()
    }

    /// 1-based line in the source file.
    pub fn line(&self) -> Option<u64> {
        self.line
    }
}

/// A single forward pass over the rows of one file.
pub trait RowSource {
    fn next_row(&mut self) -> Option<Result<Row, ReadError>>;
}

impl<I> RowSource for I
where
    I: Iterator<Item = Result<Row, ReadError>>,
{
    fn next_row(&mut self) -> Option<Result<Row, ReadError>> {
        self.next()
    }
}

/// Rows of a GTFS CSV file. Holds one record at a time.
pub struct CsvRowSource<R: Read> {
    reader: Reader<R>,
    header: Arc<Header>,
}

impl<R: Read> CsvRowSource<R> {
    pub fn from_reader(reader: R) -> Result<Self, ReadError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::None)
            .from_reader(reader);
        let header = Header::new(reader.headers()?.iter());
        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }
}

impl<R: Read> RowSource for CsvRowSource<R> {
    fn next_row(&mut self) -> Option<Result<Row, ReadError>> {
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => {
                let line = record.position().map(|position| position.line());
                Some(Ok(Row::new(Arc::clone(&self.header), record, line)))
            }
            Ok(false) => None,
            Err(err) => Some(Err(err.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(csv: &str) -> Vec<Row> {
        let mut source = CsvRowSource::from_reader(csv.as_bytes()).unwrap();
        let mut rows = Vec::new();
        while let Some(row) = source.next_row() {
            rows.push(row.unwrap());
        }
        rows
    }

    #[test]
    fn looks_up_fields_by_name() {
        let rows = rows("stop_name, stop_id ,stop_lat\nMain St,S1,52.5\n\"Hbf, Nord\",S2,\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("stop_id"), Some("S1"));
        assert_eq!(rows[1].get("stop_name"), Some("Hbf, Nord"));
        assert_eq!(rows[1].get("stop_lat"), None);
        assert_eq!(rows[1].raw("stop_lat"), Some(""));
        assert_eq!(rows[0].get("stop_code"), None);
        assert_eq!(rows[1].line(), Some(3));
    }

    #[test]
    fn strips_byte_order_mark() {
        let rows = rows("\u{feff}agency_id,agency_name\nA,Agency\n");
        assert_eq!(rows[0].get("agency_id"), Some("A"));
    }

    #[test]
    fn tolerates_short_rows() {
        let rows = rows("trip_id,stop_id,timepoint\nT1,S1\n");
        assert_eq!(rows[0].get("stop_id"), Some("S1"));
        assert!(rows[0].has_column("timepoint"));
        assert_eq!(rows[0].get("timepoint"), None);
    }

    #[test]
    fn iterators_are_row_sources() {
        let header = Header::new(["a"]);
        let mut source = (0..3).map(move |i| {
            Ok::<_, ReadError>(Row::new(
                Arc::clone(&header),
                StringRecord::from(vec![i.to_string()]),
                None,
            ))
        });
        let mut count = 0;
        while let Some(row) = source.next_row() {
            assert!(row.unwrap().get("a").is_some());
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
