//! Destinations for the fragment stream.

use std::io::Write;
use std::sync::Arc;

use crate::converter::{Fragment, InsertHead};
use crate::error::SinkError;
use crate::sql::SqlValue;

pub trait OutputSink {
    fn write_fragment(&mut self, fragment: &Fragment) -> Result<(), SinkError>;

    /// Called once after the last fragment of a successful run.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn write_fragment(&mut self, fragment: &Fragment) -> Result<(), SinkError> {
        (**self).write_fragment(fragment)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// Writes the fragments as a SQL script, e.g. for `psql` or `duckdb` to read.
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for WriterSink<W> {
    fn write_fragment(&mut self, fragment: &Fragment) -> Result<(), SinkError> {
        write!(self.writer, "{fragment}")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// A live database session accepting one statement at a time.
pub trait SqlConnection {
    /// Executes `sql`; `$1`, `$2`, ... in `sql` refer to `params`.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<(), SinkError>;
}

impl<C: SqlConnection + ?Sized> SqlConnection for &mut C {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<(), SinkError> {
        (**self).execute(sql, params)
    }
}

struct PendingInsert {
    head: Arc<InsertHead>,
    rows: usize,
    params: Vec<SqlValue>,
}

impl PendingInsert {
    fn statement(&self) -> String {
        let width = self.head.columns.len();
        let mut sql = self.head.statement_prefix();
        for row in 0..self.rows {
            if row > 0 {
                sql.push_str(",\n");
            }
            let placeholders: Vec<String> = (1..=width)
                .map(|column| format!("${}", row * width + column))
                .collect();
            sql.push('(');
            sql.push_str(&placeholders.join(", "));
            sql.push(')');
        }
        sql.push(';');
        sql
    }
}

/// Issues discrete statements against a [`SqlConnection`]. INSERT batches are
/// sent as one parameterized statement each; COPY blocks cannot be executed
/// this way.
pub struct ConnectionSink<C: SqlConnection> {
    connection: C,
    pending: Option<PendingInsert>,
}

impl<C: SqlConnection> ConnectionSink<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            pending: None,
        }
    }

    pub fn into_inner(self) -> C {
        self.connection
    }

    fn flush_insert(&mut self) -> Result<(), SinkError> {
        if let Some(pending) = self.pending.take() {
            if pending.rows > 0 {
                self.connection
                    .execute(&pending.statement(), &pending.params)?;
            }
        }
        Ok(())
    }
}

impl<C: SqlConnection> OutputSink for ConnectionSink<C> {
    fn write_fragment(&mut self, fragment: &Fragment) -> Result<(), SinkError> {
        match fragment {
            Fragment::Sql(sql) => {
                self.flush_insert()?;
                self.connection.execute(sql, &[])
            }
            Fragment::PsqlMeta(_) => Ok(()),
            Fragment::CopyHead(_) | Fragment::CopyRow(_) | Fragment::CopyEnd => {
                Err(SinkError::Unsupported("COPY"))
            }
            Fragment::InsertRow {
                head,
                values,
                first_in_batch,
            } => {
                if *first_in_batch {
                    self.flush_insert()?;
                }
                let pending = self.pending.get_or_insert_with(|| PendingInsert {
                    head: Arc::clone(head),
                    rows: 0,
                    params: Vec::new(),
                });
                pending.rows += 1;
                pending.params.extend(values.iter().cloned());
                Ok(())
            }
            Fragment::EndInsert => self.flush_insert(),
        }
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.flush_insert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Default)]
    struct RecordingConnection {
        statements: Vec<(String, Vec<SqlValue>)>,
    }

    impl SqlConnection for RecordingConnection {
        fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<(), SinkError> {
            self.statements.push((sql.to_string(), params.to_vec()));
            Ok(())
        }
    }

    fn head() -> Arc<InsertHead> {
        Arc::new(InsertHead {
            table: "\"main\".levels".into(),
            columns: &["level_id", "level_index"],
        })
    }

    fn row(id: &str, index: f64, first_in_batch: bool) -> Fragment {
        Fragment::InsertRow {
            head: head(),
            values: vec![SqlValue::text(id), SqlValue::Float(index)],
            first_in_batch,
        }
    }

    #[test]
    fn binds_insert_batches() {
        let mut sink = ConnectionSink::new(RecordingConnection::default());
        for fragment in [
            Fragment::PsqlMeta("\\set ON_ERROR_STOP on\n".into()),
            Fragment::Sql("BEGIN TRANSACTION;\n".into()),
            row("L0", 0.0, true),
            row("L1", 1.0, false),
            Fragment::EndInsert,
            row("L2", 2.0, true),
            Fragment::EndInsert,
        ] {
            sink.write_fragment(&fragment).unwrap();
        }
        sink.finish().unwrap();

        let statements = sink.into_inner().statements;
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].0, "BEGIN TRANSACTION;\n");
        assert_eq!(
            statements[1].0,
            "INSERT INTO \"main\".levels (level_id, level_index)\nVALUES\n($1, $2),\n($3, $4);"
        );
        assert_eq!(statements[1].1.len(), 4);
        assert_eq!(statements[1].1[2], SqlValue::text("L1"));
        assert_eq!(statements[2].1, vec![SqlValue::text("L2"), SqlValue::Float(2.0)]);
    }

    #[test]
    fn rejects_copy() {
        let mut sink = ConnectionSink::new(RecordingConnection::default());
        let err = sink
            .write_fragment(&Fragment::CopyHead("COPY x FROM STDIN csv;\n".into()))
            .unwrap_err();
        assert_eq!(err.to_string(), "COPY is not supported by this sink");
    }

    #[test]
    fn writer_renders_script() {
        let mut sink = WriterSink::new(Vec::new());
        for fragment in [
            Fragment::CopyHead("COPY \"public\".levels (level_id) FROM STDIN csv;\n".into()),
            Fragment::CopyRow("L0\n".into()),
            Fragment::CopyEnd,
        ] {
            sink.write_fragment(&fragment).unwrap();
        }
        sink.finish().unwrap();
        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "COPY \"public\".levels (level_id) FROM STDIN csv;\nL0\n\\.\n"
        );
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_errors_surface() {
        let mut sink = WriterSink::new(BrokenPipe);
        let err = sink.write_fragment(&Fragment::EndInsert).unwrap_err();
        assert!(matches!(err, SinkError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }
}
