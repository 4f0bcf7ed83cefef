use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::RowError;
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

/// Turns one source row into column values, in [`TableLayout::columns`] order.
pub type FormatRow = fn(&Row, &Options, &mut WorkingState) -> Result<Vec<SqlValue>, RowError>;

/// SQL text emitted around a task's rows.
#[derive(Clone, Copy)]
pub enum Template {
    Static(&'static str),
    Computed(fn(&Options, &WorkingState) -> String),
}

impl Template {
    pub fn resolve(&self, opts: &Options, state: &WorkingState) -> Cow<'static, str> {
        match self {
            Self::Static(text) => Cow::Borrowed(text),
            Self::Computed(render) => Cow::Owned(render(opts, state)),
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Target table of a file's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Clone, Copy)]
pub struct RowFormatter {
    pub layout: TableLayout,
    pub format: FormatRow,
}

impl fmt::Debug for RowFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowFormatter")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// Everything needed to convert one task.
#[derive(Debug, Clone)]
pub struct FormatterDescriptor {
    pub before_all: Option<Template>,
    pub rows: Option<RowFormatter>,
    pub after_all: Option<Template>,
    pub run_despite_missing_src_file: bool,
    /// Whether callers may supply a file for this task.
    pub accepts_source_file: bool,
}

impl FormatterDescriptor {
    /// A GTFS file converted row by row into `layout.table`.
    pub fn gtfs_file(layout: TableLayout, format: FormatRow) -> Self {
        Self {
            before_all: None,
            rows: Some(RowFormatter { layout, format }),
            after_all: None,
            run_despite_missing_src_file: false,
            accepts_source_file: true,
        }
    }

    /// A task without source file, e.g. a lookup table or a derived view.
    pub fn synthetic() -> Self {
        Self {
            before_all: None,
            rows: None,
            after_all: None,
            run_despite_missing_src_file: true,
            accepts_source_file: false,
        }
    }

    pub fn before_all(mut self, template: Template) -> Self {
        self.before_all = Some(template);
        self
    }

    pub fn after_all(mut self, template: Template) -> Self {
        self.after_all = Some(template);
        self
    }

    pub fn run_despite_missing_src_file(mut self) -> Self {
        self.run_despite_missing_src_file = true;
        self
    }
}

/// File and task names mapped to their formatters. Built once and passed to
/// the converter; adding support for a file means registering one entry.
#[derive(Debug, Clone, Default)]
pub struct FormatterRegistry {
    formatters: BTreeMap<String, FormatterDescriptor>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `descriptor` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, descriptor: FormatterDescriptor) {
        self.formatters.insert(name.into(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&FormatterDescriptor> {
        self.formatters.get(name)
    }

    /// Whether a caller-supplied file called `name` can be converted.
    pub fn supports_file(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|descriptor| descriptor.accepts_source_file)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formatters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }
}
