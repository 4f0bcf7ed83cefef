//! Drives a whole conversion run: options, task order, preamble, every task's
//! fragments, postamble.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::converter::{Fragment, TaskConverter};
use crate::deps::{default_dependencies, DeclareDependencies};
use crate::error::ConvertError;
use crate::files::GtfsFile;
use crate::formatter::FormatterRegistry;
use crate::formatters::{assert_no_rows, default_registry};
use crate::options::{Dialect, OptionOverrides, Options};
use crate::progress::{LoggingProgressHandler, ProgressHandler};
use crate::resolve::{resolve_tasks, select_supported_files, Task};
use crate::sink::OutputSink;
use crate::sql::{quote_ident, quote_literal};
use crate::working_state::WorkingState;

/// Table marking a schema as populated by this tool.
pub const IMPORT_MARKER_TABLE: &str = "gtfs_via_sql_import";

/// Resolved options and task order of a run, before anything is read.
#[derive(Debug)]
pub struct Plan {
    pub options: Options,
    pub tasks: Vec<Task>,
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks that produced output, in execution order.
    pub tasks: Vec<String>,
    pub row_counts: BTreeMap<String, u64>,
}

pub struct Converter {
    registry: FormatterRegistry,
    declare_dependencies: DeclareDependencies,
    progress: Arc<dyn ProgressHandler>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(default_registry())
    }
}

impl Converter {
    pub fn new(registry: FormatterRegistry) -> Self {
        Self {
            registry,
            declare_dependencies: default_dependencies,
            progress: Arc::new(LoggingProgressHandler),
        }
    }

    pub fn with_dependencies(mut self, declare_dependencies: DeclareDependencies) -> Self {
        self.declare_dependencies = declare_dependencies;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn registry(&self) -> &FormatterRegistry {
        &self.registry
    }

    /// Checks the file list, resolves options and orders the tasks. Every
    /// configuration and dependency error surfaces here, before any output.
    pub fn plan(
        &self,
        files: Vec<GtfsFile>,
        overrides: &OptionOverrides,
    ) -> Result<Plan, ConvertError> {
        let files = select_supported_files(
            files,
            &self.registry,
            overrides.ignore_unsupported_files.unwrap_or(false),
        )?;
        let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
        let options = Options::resolve(overrides, &names)?;
        let tasks = resolve_tasks(files, self.declare_dependencies, &options, &self.registry)?;
        debug!(
            "task order: {}",
            tasks
                .iter()
                .map(|task| task.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Plan { options, tasks })
    }

    /// Starts a run. The returned iterator yields fragments lazily; source
    /// rows are read only as fragments are pulled.
    pub fn run(
        &self,
        files: Vec<GtfsFile>,
        overrides: &OptionOverrides,
    ) -> Result<Conversion<'_>, ConvertError> {
        let plan = self.plan(files, overrides)?;
        Ok(self.start(plan))
    }

    /// Starts a run from a previously computed plan.
    pub fn start(&self, plan: Plan) -> Conversion<'_> {
        let progress = if plan.options.silent {
            None
        } else {
            Some(Arc::clone(&self.progress))
        };
        if let Some(progress) = &progress {
            progress.set_total_tasks(plan.tasks.len());
        }
        Conversion {
            registry: &self.registry,
            progress,
            pending: preamble(&plan.options).into(),
            opts: plan.options,
            state: WorkingState::new(),
            tasks: plan.tasks.into_iter(),
            current: None,
            ran: Vec::new(),
            stage: Stage::Preamble,
        }
    }

    /// Runs to completion, writing every fragment to `sink`. Stops at the
    /// first error, including a failing sink.
    pub fn convert_into<S: OutputSink>(
        &self,
        files: Vec<GtfsFile>,
        overrides: &OptionOverrides,
        mut sink: S,
    ) -> Result<RunSummary, ConvertError> {
        let mut conversion = self.run(files, overrides)?;
        for fragment in &mut conversion {
            sink.write_fragment(&fragment?)?;
        }
        sink.finish()?;
        Ok(conversion.summary())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Preamble,
    Tasks,
    Postamble,
    Done,
}

/// A running conversion; iterate it to pull fragments. After the first error
/// it yields nothing more.
pub struct Conversion<'a> {
    registry: &'a FormatterRegistry,
    progress: Option<Arc<dyn ProgressHandler>>,
    opts: Options,
    state: WorkingState,
    tasks: std::vec::IntoIter<Task>,
    current: Option<TaskConverter>,
    pending: VecDeque<Fragment>,
    ran: Vec<String>,
    stage: Stage,
}

impl Conversion<'_> {
    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn working_state(&self) -> &WorkingState {
        &self.state
    }

    /// Tasks started so far, in execution order.
    pub fn tasks_run(&self) -> &[String] {
        &self.ran
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            tasks: self.ran.clone(),
            row_counts: self.state.row_counts().clone(),
        }
    }

    fn fail(&mut self, err: ConvertError) -> Option<Result<Fragment, ConvertError>> {
        self.stage = Stage::Done;
        self.current = None;
        self.pending.clear();
        Some(Err(err))
    }

    fn next_task(&mut self) -> Result<bool, ConvertError> {
        let Some(task) = self.tasks.next() else {
            return Ok(false);
        };
        let descriptor = self
            .registry
            .get(&task.name)
            .cloned()
            .ok_or_else(|| ConvertError::UnknownTask(task.name.clone()))?;
        let converter = TaskConverter::new(task, descriptor);
        if converter.will_run() {
            if let Some(progress) = &self.progress {
                progress.on_start_task(converter.name());
            }
            self.ran.push(converter.name().to_string());
        } else {
            debug!("skipping {}, no source file", converter.name());
        }
        self.current = Some(converter);
        Ok(true)
    }
}

impl Iterator for Conversion<'_> {
    type Item = Result<Fragment, ConvertError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stage {
                Stage::Preamble | Stage::Postamble => {
                    if let Some(fragment) = self.pending.pop_front() {
                        return Some(Ok(fragment));
                    }
                    self.stage = match self.stage {
                        Stage::Preamble => Stage::Tasks,
                        _ => Stage::Done,
                    };
                }
                Stage::Tasks => {
                    if let Some(converter) = self.current.as_mut() {
                        match converter.next_fragment(&self.opts, &mut self.state) {
                            Some(Ok(fragment)) => return Some(Ok(fragment)),
                            Some(Err(err)) => return self.fail(err),
                            None => {
                                let finished = self.current.take();
                                if let (Some(progress), Some(finished)) = (&self.progress, finished)
                                {
                                    if self.state.has_run(finished.name()) {
                                        progress.on_finish_task(
                                            finished.name(),
                                            self.state.row_count(finished.name()),
                                        );
                                    }
                                }
                            }
                        }
                        continue;
                    }
                    match self.next_task() {
                        Ok(true) => {}
                        Ok(false) => {
                            self.pending = postamble(&self.opts).into();
                            self.stage = Stage::Postamble;
                        }
                        Err(err) => return self.fail(err),
                    }
                }
                Stage::Done => return None,
            }
        }
    }
}

impl std::iter::FusedIterator for Conversion<'_> {}

/// Session setup, schema creation and the guard against importing twice into
/// one schema.
pub fn preamble(opts: &Options) -> Vec<Fragment> {
    let schema = quote_ident(&opts.schema);
    let mut fragments = match opts.dialect {
        Dialect::Postgres => vec![
            Fragment::PsqlMeta("\\set ON_ERROR_STOP on\n".into()),
            Fragment::Sql("CREATE EXTENSION IF NOT EXISTS postgis;\n".into()),
            Fragment::Sql("BEGIN;\n".into()),
        ],
        Dialect::DuckDb => vec![
            Fragment::Sql("INSTALL spatial;\nLOAD spatial;\n".into()),
            Fragment::Sql("INSTALL icu;\nLOAD icu;\n".into()),
            Fragment::Sql("BEGIN TRANSACTION;\n".into()),
        ],
    };
    fragments.push(Fragment::Sql(format!(
        "CREATE SCHEMA IF NOT EXISTS {schema};\n"
    )));

    let marker = opts.qualify(IMPORT_MARKER_TABLE);
    let previous_import = format!(
        "\tSELECT 1 FROM information_schema.tables\n\tWHERE table_schema = {} AND table_name = '{IMPORT_MARKER_TABLE}'",
        quote_literal(&opts.schema),
    );
    let guard = assert_no_rows(
        opts,
        &previous_import,
        &format!(
            "schema {} already contains a GTFS import, drop it first",
            opts.schema
        ),
    );
    fragments.push(Fragment::Sql(format!(
        "{guard}CREATE TABLE {marker} (\n\tversion TEXT NOT NULL\n);\nINSERT INTO {marker} (version) VALUES ({});\n",
        quote_literal(env!("CARGO_PKG_VERSION")),
    )));
    fragments
}

/// Optional grants, then the end of the transaction.
pub fn postamble(opts: &Options) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    if opts.postgrest && opts.is_postgres() {
        let schema = quote_ident(&opts.schema);
        fragments.push(Fragment::Sql(format!(
            "DO $$
BEGIN
\tIF NOT EXISTS (SELECT FROM pg_catalog.pg_roles WHERE rolname = 'web_anon') THEN
\t\tCREATE ROLE web_anon NOLOGIN NOINHERIT;
\tEND IF;
END
$$;
GRANT USAGE ON SCHEMA {schema} TO web_anon;
GRANT SELECT ON ALL TABLES IN SCHEMA {schema} TO web_anon;
"
        )));
    }
    fragments.push(Fragment::Sql("COMMIT;\n".into()));
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::test_support::{duckdb, options, postgres};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressHandler for RecordingProgress {
        fn on_start_task(&self, task: &str) {
            self.events.lock().unwrap().push(format!("start {task}"));
        }

        fn on_finish_task(&self, task: &str, rows: Option<u64>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish {task} {rows:?}"));
        }
    }

    fn agency_file(rows: &str) -> GtfsFile {
        GtfsFile::from_bytes(
            "agency",
            format!("agency_id,agency_name,agency_url,agency_timezone\n{rows}"),
        )
    }

    #[test]
    fn wraps_tasks_in_preamble_and_postamble() {
        let converter = Converter::default();
        let fragments: Vec<Fragment> = converter
            .run(
                vec![agency_file("A,Agency,https://a.example,Europe/Berlin\n")],
                &OptionOverrides::default(),
            )
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            fragments.first(),
            Some(&Fragment::PsqlMeta("\\set ON_ERROR_STOP on\n".into()))
        );
        assert_eq!(fragments.last(), Some(&Fragment::Sql("COMMIT;\n".into())));
        assert_eq!(fragments.iter().filter(|f| f.is_row()).count(), 1);
    }

    #[test]
    fn reports_progress_unless_silent() {
        let progress = Arc::new(RecordingProgress::default());
        let converter = Converter::default().with_progress(progress.clone());
        converter
            .convert_into(
                vec![agency_file("A,Agency,https://a.example,Europe/Berlin\n")],
                &OptionOverrides::default(),
                crate::sink::WriterSink::new(std::io::sink()),
            )
            .unwrap();
        let events = progress.events.lock().unwrap().clone();
        assert!(events.contains(&"start agency".to_string()));
        assert!(events.contains(&"finish agency Some(1)".to_string()));

        let silent = Arc::new(RecordingProgress::default());
        Converter::default()
            .with_progress(silent.clone())
            .convert_into(
                vec![agency_file("")],
                &OptionOverrides {
                    silent: Some(true),
                    ..Default::default()
                },
                crate::sink::WriterSink::new(std::io::sink()),
            )
            .unwrap();
        assert!(silent.events.lock().unwrap().is_empty());
    }

    #[test]
    fn stops_after_first_error() {
        let converter = Converter::default();
        let mut conversion = converter
            .run(
                vec![agency_file(
                    ",One,https://a.example,Europe/Berlin\n,Two,https://b.example,Europe/Berlin\n",
                )],
                &OptionOverrides::default(),
            )
            .unwrap();
        let err = conversion
            .by_ref()
            .find_map(Result::err)
            .expect("a second agency without id must fail");
        assert_eq!(err.gtfs_file(), Some("agency"));
        assert!(conversion.next().is_none());
        assert_eq!(conversion.working_state().row_count("agency"), Some(1));
    }

    #[test]
    fn custom_dependencies_drive_the_order() {
        fn levels_after_agency(
            _: &Options,
            _: &[String],
        ) -> crate::deps::DependencyTable {
            [("levels".to_string(), vec!["agency".to_string()])].into()
        }
        let converter = Converter::default().with_dependencies(levels_after_agency);
        let plan = converter
            .plan(
                vec![
                    GtfsFile::from_bytes("levels", "level_id,level_index\nL0,0\n"),
                    agency_file("A,Agency,https://a.example,Europe/Berlin\n"),
                ],
                &OptionOverrides::default(),
            )
            .unwrap();
        let order: Vec<&str> = plan.tasks.iter().map(|t| t.name.as_str()).collect();
        let agency = order.iter().position(|&n| n == "agency").unwrap();
        let levels = order.iter().position(|&n| n == "levels").unwrap();
        assert!(agency < levels);

        fn cyclic(_: &Options, _: &[String]) -> crate::deps::DependencyTable {
            [
                ("levels".to_string(), vec!["agency".to_string()]),
                ("agency".to_string(), vec!["levels".to_string()]),
            ]
            .into()
        }
        let err = Converter::default()
            .with_dependencies(cyclic)
            .plan(
                vec![
                    GtfsFile::from_bytes("levels", "level_id,level_index\n"),
                    agency_file(""),
                ],
                &OptionOverrides::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TASK_GRAPH");
    }

    #[test]
    fn preamble_guards_against_reimport() {
        let sql: String = preamble(&postgres()).iter().map(ToString::to_string).collect();
        assert!(sql.contains("CREATE SCHEMA IF NOT EXISTS \"public\";\n"));
        assert!(sql.contains("WHERE table_schema = 'public' AND table_name = 'gtfs_via_sql_import'"));
        assert!(sql.contains("RAISE EXCEPTION"));
        assert!(sql.contains(&format!(
            "INSERT INTO \"public\".gtfs_via_sql_import (version) VALUES ('{}');",
            env!("CARGO_PKG_VERSION")
        )));

        let sql: String = preamble(&duckdb()).iter().map(ToString::to_string).collect();
        assert!(sql.starts_with("INSTALL spatial;"));
        assert!(sql.contains("THEN error('schema main already contains a GTFS import, drop it first')"));
    }

    #[test]
    fn postgrest_grants_select() {
        let opts = options(OptionOverrides {
            postgrest: Some(true),
            ..Default::default()
        });
        let sql: String = postamble(&opts).iter().map(ToString::to_string).collect();
        assert!(sql.contains("GRANT SELECT ON ALL TABLES IN SCHEMA \"public\" TO web_anon;"));
        assert!(sql.ends_with("COMMIT;\n"));
        assert_eq!(postamble(&postgres()), vec![Fragment::Sql("COMMIT;\n".into())]);
    }
}
