//! Converts GTFS CSV files into SQL for PostgreSQL or DuckDB.
//!
//! Files are converted in dependency order, one task at a time, into a lazy
//! stream of [`Fragment`]s:
//!
//! ```no_run
//! use gtfs_via_sql_core::{Converter, GtfsFile, OptionOverrides, WriterSink};
//!
//! let files = vec![
//!     GtfsFile::from_path("gtfs/agency.txt"),
//!     GtfsFile::from_path("gtfs/routes.txt"),
//! ];
//! let summary = Converter::default()
//!     .convert_into(files, &OptionOverrides::default(), WriterSink::new(std::io::stdout()))?;
//! println!("{:?}", summary.row_counts);
//! # Ok::<(), gtfs_via_sql_core::ConvertError>(())
//! ```

pub mod converter;
pub mod deps;
pub mod error;
pub mod files;
pub mod formatter;
pub mod formatters;
pub mod options;
pub mod pipeline;
pub mod progress;
pub mod resolve;
pub mod row;
pub mod sink;
pub mod sql;
pub mod working_state;

pub use converter::{Fragment, InsertHead};
pub use deps::{default_dependencies, DeclareDependencies, DependencyTable};
pub use error::{ConfigError, ConvertError, DataError, ReadError, RowError, SinkError};
pub use files::{FileSource, GtfsFile};
pub use formatter::{FormatterDescriptor, FormatterRegistry, TableLayout, Template};
pub use formatters::default_registry;
pub use options::{Dialect, OptionOverrides, Options, RouteTypesScheme, RowFormat, StatsMode};
pub use pipeline::{Conversion, Converter, Plan, RunSummary};
pub use progress::{LoggingProgressHandler, NoOpProgressHandler, ProgressHandler};
pub use resolve::Task;
pub use row::{CsvRowSource, Header, Row, RowSource};
pub use sink::{ConnectionSink, OutputSink, SqlConnection, WriterSink};
pub use sql::SqlValue;
pub use working_state::WorkingState;
