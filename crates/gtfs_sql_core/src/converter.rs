//! Streams one task's rows through its formatter.

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::error::{ConvertError, DataError, SinkError};
use crate::files::FileSource;
use crate::formatter::{FormatterDescriptor, RowFormatter, Template};
use crate::options::{Options, RowFormat};
use crate::resolve::Task;
use crate::row::RowSource;
use crate::sql::{CopyEncoder, SqlValue};
use crate::working_state::WorkingState;

/// Target table and columns shared by every row of an INSERT batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertHead {
    /// Schema-qualified table name.
    pub table: String,
    pub columns: &'static [&'static str],
}

impl InsertHead {
    /// `INSERT INTO "s".t (a, b)` followed by `VALUES`, without any row.
    pub fn statement_prefix(&self) -> String {
        format!(
            "INSERT INTO {} ({})\nVALUES\n",
            self.table,
            self.columns.join(", ")
        )
    }
}

/// One piece of the output stream. Concatenating the rendered fragments of a
/// run yields a SQL script.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// One or more complete statements.
    Sql(String),
    /// A psql meta-command; meaningless to a database connection.
    PsqlMeta(String),
    /// `COPY ... FROM STDIN csv;`
    CopyHead(String),
    /// One CSV line of a COPY block.
    CopyRow(String),
    /// The `\.` terminator of a COPY block.
    CopyEnd,
    InsertRow {
        head: Arc<InsertHead>,
        values: Vec<SqlValue>,
        /// Starts a new INSERT statement.
        first_in_batch: bool,
    },
    /// Closes the INSERT statement opened by the last `first_in_batch` row.
    EndInsert,
}

impl Fragment {
    pub fn is_row(&self) -> bool {
        matches!(self, Self::CopyRow(_) | Self::InsertRow { .. })
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(sql) | Self::PsqlMeta(sql) | Self::CopyHead(sql) | Self::CopyRow(sql) => {
                f.write_str(sql)
            }
            Self::CopyEnd => f.write_str("\\.\n"),
            Self::InsertRow {
                head,
                values,
                first_in_batch,
            } => {
                if *first_in_batch {
                    f.write_str(&head.statement_prefix())?;
                } else {
                    f.write_str(",\n")?;
                }
                f.write_str("(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str(")")
            }
            Self::EndInsert => f.write_str(";\n"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    BeforeAll,
    Head,
    Rows,
    AfterAll,
    Done,
}

/// Pull-based conversion of a single task. Each call to
/// [`TaskConverter::next_fragment`] reads at most one source row.
pub struct TaskConverter {
    name: String,
    descriptor: FormatterDescriptor,
    source: Option<FileSource>,
    rows: Option<Box<dyn RowSource>>,
    phase: Phase,
    copy: CopyEncoder,
    insert_head: Option<Arc<InsertHead>>,
    batch_len: usize,
    close_batch: bool,
}

impl TaskConverter {
    pub fn new(task: Task, descriptor: FormatterDescriptor) -> Self {
        Self {
            name: task.name,
            descriptor,
            source: task.source,
            rows: None,
            phase: Phase::Start,
            copy: CopyEncoder::new(),
            insert_head: None,
            batch_len: 0,
            close_batch: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task will produce anything at all. A task without source
    /// whose formatter does not run for missing files is skipped.
    pub fn will_run(&self) -> bool {
        self.source.is_some()
            || self.rows.is_some()
            || self.descriptor.run_despite_missing_src_file
    }

    pub fn next_fragment(
        &mut self,
        opts: &Options,
        state: &mut WorkingState,
    ) -> Option<Result<Fragment, ConvertError>> {
        match self.step(opts, state) {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => None,
            Err(err) => {
                self.phase = Phase::Done;
                self.rows = None;
                Some(Err(err))
            }
        }
    }

    fn step(
        &mut self,
        opts: &Options,
        state: &mut WorkingState,
    ) -> Result<Option<Fragment>, ConvertError> {
        loop {
            match self.phase {
                Phase::Start => {
                    if !self.will_run() {
                        self.phase = Phase::Done;
                        continue;
                    }
                    state.start_task(&self.name);
                    if let Some(source) = self.source.take() {
                        state.reset_row_count(&self.name);
                        self.rows = Some(source.open(&self.name)?);
                    }
                    self.phase = Phase::BeforeAll;
                }
                Phase::BeforeAll => {
                    self.phase = Phase::Head;
                    if let Some(sql) = render(self.descriptor.before_all, opts, state) {
                        return Ok(Some(Fragment::Sql(sql)));
                    }
                }
                Phase::Head => {
                    self.phase = Phase::Rows;
                    let Some(formatter) = self.row_formatter() else {
                        continue;
                    };
                    let table = opts.qualify(formatter.layout.table);
                    match opts.row_format {
                        RowFormat::Copy => {
                            return Ok(Some(Fragment::CopyHead(format!(
                                "COPY {table} ({}) FROM STDIN csv;\n",
                                formatter.layout.columns.join(", ")
                            ))));
                        }
                        RowFormat::Insert => {
                            self.insert_head = Some(Arc::new(InsertHead {
                                table,
                                columns: formatter.layout.columns,
                            }));
                        }
                    }
                }
                Phase::Rows => {
                    if self.close_batch {
                        self.close_batch = false;
                        return Ok(Some(Fragment::EndInsert));
                    }
                    let Some(formatter) = self.row_formatter() else {
                        self.phase = Phase::AfterAll;
                        continue;
                    };
                    if let Some(fragment) = self.next_row(formatter, opts, state)? {
                        return Ok(Some(fragment));
                    }
                    // source exhausted
                    self.rows = None;
                    self.phase = Phase::AfterAll;
                    match opts.row_format {
                        RowFormat::Copy => return Ok(Some(Fragment::CopyEnd)),
                        RowFormat::Insert if self.batch_len > 0 => {
                            self.batch_len = 0;
                            return Ok(Some(Fragment::EndInsert));
                        }
                        RowFormat::Insert => {}
                    }
                }
                Phase::AfterAll => {
                    self.phase = Phase::Done;
                    if let Some(sql) = render(self.descriptor.after_all, opts, state) {
                        return Ok(Some(Fragment::Sql(sql)));
                    }
                }
                Phase::Done => return Ok(None),
            }
        }
    }

    /// The row formatter, if this task has rows to read.
    fn row_formatter(&self) -> Option<RowFormatter> {
        self.rows.as_ref().and(self.descriptor.rows)
    }

    fn next_row(
        &mut self,
        formatter: RowFormatter,
        opts: &Options,
        state: &mut WorkingState,
    ) -> Result<Option<Fragment>, ConvertError> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };
        let row = match rows.next_row() {
            None => return Ok(None),
            Some(Ok(row)) => row,
            Some(Err(source)) => {
                return Err(ConvertError::Read {
                    file: self.name.clone(),
                    source,
                })
            }
        };
        let values = (formatter.format)(&row, opts, state)
            .map_err(|err| DataError::from_row_error(&self.name, row.line(), err))?;
        state.increment_row_count(&self.name);

        match (opts.row_format, &self.insert_head) {
            (RowFormat::Insert, Some(head)) => {
                let first_in_batch = self.batch_len == 0;
                self.batch_len += 1;
                if self.batch_len >= opts.insert_batch_size {
                    self.batch_len = 0;
                    self.close_batch = true;
                }
                Ok(Some(Fragment::InsertRow {
                    head: Arc::clone(head),
                    values,
                    first_in_batch,
                }))
            }
            _ => {
                let line = self
                    .copy
                    .encode(&values)
                    .map_err(|err| SinkError::Io(io::Error::from(err)))?;
                Ok(Some(Fragment::CopyRow(line)))
            }
        }
    }
}

fn render(template: Option<Template>, opts: &Options, state: &WorkingState) -> Option<String> {
    let sql = template?.resolve(opts, state);
    if sql.is_empty() {
        None
    } else {
        Some(sql.into_owned())
    }
}

/// Lazily converts one task, borrowing the run's options and working state.
pub fn convert<'a>(
    task: Task,
    descriptor: FormatterDescriptor,
    opts: &'a Options,
    state: &'a mut WorkingState,
) -> TaskFragments<'a> {
    TaskFragments {
        converter: TaskConverter::new(task, descriptor),
        opts,
        state,
    }
}

pub struct TaskFragments<'a> {
    converter: TaskConverter,
    opts: &'a Options,
    state: &'a mut WorkingState,
}

impl Iterator for TaskFragments<'_> {
    type Item = Result<Fragment, ConvertError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.converter.next_fragment(self.opts, self.state)
    }
}

impl std::iter::FusedIterator for TaskFragments<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReadError, RowError};
    use crate::formatter::TableLayout;
    use crate::formatters::test_support::{duckdb, options, postgres};
    use crate::formatters::{calendar_dates, text};
    use crate::options::OptionOverrides;
    use crate::row::{Header, Row};
    use csv::StringRecord;

    const THINGS: TableLayout = TableLayout {
        table: "things",
        columns: &["thing_id", "label"],
    };

    fn format_thing(
        row: &Row,
        _: &Options,
        _: &mut WorkingState,
    ) -> Result<Vec<SqlValue>, RowError> {
        if row.get("thing_id") == Some("bad") {
            return Err(RowError::invalid_value("thing_id", "bad"));
        }
        Ok(vec![text(row, "thing_id"), text(row, "label")])
    }

    fn things() -> FormatterDescriptor {
        FormatterDescriptor::gtfs_file(THINGS, format_thing)
            .before_all(Template::Static("CREATE TABLE things ();\n"))
            .after_all(Template::Static("CREATE INDEX ON things (thing_id);\n"))
    }

    fn task(name: &str, csv: &str) -> Task {
        Task {
            name: name.to_string(),
            source: Some(FileSource::Bytes(csv.as_bytes().to_vec())),
            dependencies: Vec::new(),
        }
    }

    fn render_all(
        task: Task,
        descriptor: FormatterDescriptor,
        opts: &Options,
        state: &mut WorkingState,
    ) -> Result<String, ConvertError> {
        convert(task, descriptor, opts, state)
            .map(|fragment| fragment.map(|f| f.to_string()))
            .collect()
    }

    #[test]
    fn copy_block_between_hooks() {
        let mut state = WorkingState::new();
        let sql = render_all(
            task("things", "thing_id,label\n1,one\n2,\"two, too\"\n"),
            things(),
            &postgres(),
            &mut state,
        )
        .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE things ();\n\
             COPY \"public\".things (thing_id, label) FROM STDIN csv;\n\
             1,one\n\
             2,\"two, too\"\n\
             \\.\n\
             CREATE INDEX ON things (thing_id);\n"
        );
        assert_eq!(state.row_count("things"), Some(2));
        assert!(state.has_run("things"));
    }

    #[test]
    fn insert_batches_are_bounded() {
        let opts = options(OptionOverrides {
            row_format: Some(RowFormat::Insert),
            insert_batch_size: Some(2),
            ..Default::default()
        });
        let mut state = WorkingState::new();
        let fragments: Vec<Fragment> = convert(
            task("things", "thing_id,label\n1,a\n2,b\n3,'c'\n"),
            FormatterDescriptor::gtfs_file(THINGS, format_thing),
            &opts,
            &mut state,
        )
        .collect::<Result<_, _>>()
        .unwrap();
        assert_eq!(fragments.len(), 5);
        assert_eq!(fragments[2], Fragment::EndInsert);
        assert_eq!(fragments[4], Fragment::EndInsert);

        let sql: String = fragments.iter().map(ToString::to_string).collect();
        assert_eq!(
            sql,
            "INSERT INTO \"public\".things (thing_id, label)\nVALUES\n('1', 'a'),\n('2', 'b');\n\
             INSERT INTO \"public\".things (thing_id, label)\nVALUES\n('3', '''c''');\n"
        );
    }

    #[test]
    fn full_last_batch_is_closed_once() {
        let mut state = WorkingState::new();
        let opts = options(OptionOverrides {
            row_format: Some(RowFormat::Insert),
            insert_batch_size: Some(2),
            ..Default::default()
        });
        let sql = render_all(
            task("things", "thing_id,label\n1,a\n2,b\n"),
            FormatterDescriptor::gtfs_file(THINGS, format_thing),
            &opts,
            &mut state,
        )
        .unwrap();
        assert_eq!(sql.matches(";\n").count(), 1);
    }

    #[test]
    fn empty_file_still_runs_hooks() {
        let mut state = WorkingState::new();
        let sql = render_all(task("things", "thing_id,label\n"), things(), &duckdb(), &mut state)
            .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE things ();\nCREATE INDEX ON things (thing_id);\n"
        );
        assert_eq!(state.row_count("things"), Some(0));
    }

    #[test]
    fn missing_source_skips_unless_forced() {
        let absent = Task {
            name: "things".into(),
            source: None,
            dependencies: Vec::new(),
        };
        let mut state = WorkingState::new();
        let sql = render_all(absent, things(), &postgres(), &mut state).unwrap();
        assert!(sql.is_empty());
        assert!(!state.has_run("things"));

        let absent = Task {
            name: "calendar_dates".into(),
            source: None,
            dependencies: Vec::new(),
        };
        let sql = render_all(absent, calendar_dates::descriptor(), &postgres(), &mut state).unwrap();
        assert!(sql.contains("CREATE TABLE \"public\".calendar_dates"));
        assert!(!sql.contains("COPY"));
        assert!(state.has_run("calendar_dates"));
        assert_eq!(state.row_count("calendar_dates"), None);
    }

    #[test]
    fn out_of_domain_value_stops_the_task() {
        let opts = postgres();
        let mut state = WorkingState::new();
        let mut fragments = convert(
            task(
                "calendar_dates",
                "service_id,date,exception_type\nS1,20240101,1\nS1,20240102,9\nS1,20240103,2\n",
            ),
            calendar_dates::descriptor(),
            &opts,
            &mut state,
        );
        let mut rows = 0;
        let err = loop {
            match fragments.next() {
                Some(Ok(fragment)) => rows += usize::from(fragment.is_row()),
                Some(Err(err)) => break err,
                None => panic!("expected a data error"),
            }
        };
        assert!(fragments.next().is_none());
        assert_eq!(rows, 1);
        assert_eq!(err.code(), "INVALID_GTFS_DATA");
        assert_eq!(err.gtfs_file(), Some("calendar_dates"));
        assert!(err.to_string().contains("exception_type = \"9\""));
        assert!(err.to_string().contains("at line 3"));
    }

    #[test]
    fn formatter_errors_carry_the_line() {
        let mut state = WorkingState::new();
        let err = render_all(
            task("things", "thing_id,label\nok,x\nbad,y\n"),
            things(),
            &postgres(),
            &mut state,
        )
        .unwrap_err();
        match err {
            ConvertError::Data(data) => {
                assert_eq!(data.line, Some(3));
                assert_eq!(data.field, Some("thing_id"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(state.row_count("things"), Some(1));
    }

    #[test]
    fn read_errors_name_the_file() {
        let header = Header::new(["thing_id", "label"]);
        let rows = vec![
            Ok(Row::new(
                Arc::clone(&header),
                StringRecord::from(vec!["1", "a"]),
                Some(2),
            )),
            Err(ReadError::Other("truncated".into())),
        ];
        let task = Task {
            name: "things".into(),
            source: Some(FileSource::Rows(Box::new(rows.into_iter()))),
            dependencies: Vec::new(),
        };
        let mut state = WorkingState::new();
        let err = render_all(task, things(), &postgres(), &mut state).unwrap_err();
        assert_eq!(err.to_string(), "things: truncated");
        assert_eq!(err.code(), "GTFS_READ_FAILED");
    }
}
