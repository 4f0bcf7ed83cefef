use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use gtfs_via_sql_core::options::parse_route_types_scheme;
use gtfs_via_sql_core::{
    Converter, Dialect, GtfsFile, OptionOverrides, RouteTypesScheme, RowFormat, StatsMode,
    WriterSink,
};

#[derive(Debug, Parser)]
#[command(name = "gtfs-via-sql", version)]
#[command(about = "Convert GTFS files into SQL for PostgreSQL or DuckDB")]
#[command(after_help = "Examples:
    gtfs-via-sql some-gtfs/*.txt | psql -b
    gtfs-via-sql --dialect duckdb -o feed.sql some-gtfs/")]
struct Args {
    /// GTFS .txt files, or directories containing them
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Write the SQL to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// JSON file with options (camelCase keys); flags take precedence
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Target database: postgres or duckdb
    #[arg(long = "dialect")]
    dialect: Option<Dialect>,

    /// How rows are written: copy (postgres only) or insert
    #[arg(long = "row-format")]
    row_format: Option<RowFormat>,

    /// Rows per INSERT statement
    #[arg(long = "insert-batch-size")]
    insert_batch_size: Option<usize>,

    /// Don't show progress on stderr
    #[arg(short = 's', long = "silent")]
    silent: bool,

    /// Fail if a file's dependencies have not been passed
    #[arg(short = 'd', long = "require-dependencies")]
    require_dependencies: bool,

    /// Ignore files that cannot be converted
    #[arg(short = 'u', long = "ignore-unsupported")]
    ignore_unsupported: bool,

    /// Schema to create the tables in
    #[arg(long = "schema")]
    schema: Option<String>,

    /// Set of route_type values: basic, google-extended or tpeg-pti
    #[arg(long = "route-types-scheme", value_parser = parse_scheme)]
    route_types_scheme: Option<RouteTypesScheme>,

    /// Don't require trips.txt items to have a shape_id
    #[arg(long = "trips-without-shape-id")]
    trips_without_shape_id: bool,

    /// Don't require routes.txt items to have an agency_id
    #[arg(long = "routes-without-agency-id")]
    routes_without_agency_id: bool,

    /// Don't require stops.txt items to have a level_id
    #[arg(long = "stops-without-level-id")]
    stops_without_level_id: bool,

    /// Create a spatial index on stops.stop_loc
    #[arg(long = "stops-location-index")]
    stops_location_index: bool,

    /// Accept lower-case language codes
    #[arg(long = "lower-case-lang-codes")]
    lower_case_language_codes: bool,

    /// Statistics per route and date: none, view or materialized-view
    #[arg(long = "stats-by-route-date")]
    stats_by_route_id_and_date: Option<StatsMode>,

    /// Statistics per agency, route, stop and hour: none, view or materialized-view
    #[arg(long = "stats-by-agency-route-stop-hour")]
    stats_by_agency_id_and_route_id_and_stop_and_hour: Option<StatsMode>,

    /// Active trips per hour: none, view or materialized-view
    #[arg(long = "stats-active-trips-by-hour")]
    stats_active_trips_by_hour: Option<StatsMode>,

    /// Add PostGraphile smart comments
    #[arg(long = "postgraphile")]
    postgraphile: bool,

    /// Add a web_anon role with read access, for PostgREST
    #[arg(long = "postgrest")]
    postgrest: bool,

    /// Create functions describing the import
    #[arg(long = "import-metadata")]
    import_metadata: bool,

    /// Import timestamp recorded by --import-metadata (RFC 3339)
    #[arg(long = "import-start")]
    import_start: Option<DateTime<Utc>>,
}

fn parse_scheme(value: &str) -> Result<RouteTypesScheme, String> {
    parse_route_types_scheme(value).map_err(|err| err.to_string())
}

/// `Some(true)` for a given flag, otherwise leave the default alone.
fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

impl Args {
    fn overrides(&self) -> anyhow::Result<OptionOverrides> {
        let base = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                OptionOverrides::from_json(&json)
                    .with_context(|| format!("invalid options in {}", path.display()))?
            }
            None => OptionOverrides::default(),
        };
        Ok(base.merge(OptionOverrides {
            dialect: self.dialect,
            row_format: self.row_format,
            insert_batch_size: self.insert_batch_size,
            silent: flag(self.silent),
            require_dependencies: flag(self.require_dependencies),
            ignore_unsupported_files: flag(self.ignore_unsupported),
            schema: self.schema.clone(),
            route_types_scheme: self.route_types_scheme,
            trips_without_shape_id: flag(self.trips_without_shape_id),
            routes_without_agency_id: flag(self.routes_without_agency_id),
            stops_without_level_id: flag(self.stops_without_level_id),
            stops_location_index: flag(self.stops_location_index),
            lower_case_language_codes: flag(self.lower_case_language_codes),
            stats_by_route_id_and_date: self.stats_by_route_id_and_date,
            stats_by_agency_id_and_route_id_and_stop_and_hour: self
                .stats_by_agency_id_and_route_id_and_stop_and_hour,
            stats_active_trips_by_hour: self.stats_active_trips_by_hour,
            postgraphile: flag(self.postgraphile),
            postgrest: flag(self.postgrest),
            import_metadata: flag(self.import_metadata),
            import_start: self.import_start,
        }))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let overrides = args.overrides()?;
    let files = collect_files(&args.files)?;
    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    let started = Instant::now();
    let summary = Converter::default()
        .convert_into(files, &overrides, WriterSink::new(BufWriter::new(output)))
        .map_err(|err| {
            let code = err.code();
            anyhow::Error::new(err).context(format!("conversion failed ({code})"))
        })?;

    let rows: u64 = summary.row_counts.values().sum();
    info!(
        "converted {} tasks and {} rows in {:.2?}",
        summary.tasks.len(),
        rows,
        started.elapsed()
    );
    Ok(())
}

/// Expands directories into their `*.txt` files, sorted by name.
fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<GtfsFile>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(text_files_in(path)?.into_iter().map(GtfsFile::from_path));
        } else if path.exists() {
            files.push(GtfsFile::from_path(path));
        } else {
            bail!("{} does not exist", path.display());
        }
    }
    Ok(files)
}

fn text_files_in(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "gtfs-via-sql",
            "--dialect",
            "duckdb",
            "--stats-active-trips-by-hour",
            "materialized-view",
            "--route-types-scheme",
            "basic",
            "-s",
            "agency.txt",
        ]);
        let overrides = args.overrides().unwrap();
        assert_eq!(overrides.dialect, Some(Dialect::DuckDb));
        assert_eq!(
            overrides.stats_active_trips_by_hour,
            Some(StatsMode::MaterializedView)
        );
        assert_eq!(overrides.route_types_scheme, Some(RouteTypesScheme::Basic));
        assert_eq!(overrides.silent, Some(true));
        // unset flags leave file-dependent defaults to the core
        assert_eq!(overrides.trips_without_shape_id, None);
    }

    #[test]
    fn rejects_unknown_choices() {
        assert!(Args::try_parse_from(["gtfs-via-sql", "--dialect", "mysql", "a.txt"]).is_err());
        assert!(
            Args::try_parse_from(["gtfs-via-sql", "--route-types-scheme", "x", "a.txt"]).is_err()
        );
    }

    #[test]
    fn expands_directories_sorted() {
        let dir = std::env::temp_dir().join(format!("gtfs-via-sql-cli-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for name in ["stops.txt", "agency.txt", "README.md"] {
            fs::write(dir.join(name), "").unwrap();
        }
        let files = collect_files(&[dir.clone()]).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["agency", "stops"]);
        fs::remove_dir_all(&dir).unwrap();

        assert!(collect_files(&[dir]).is_err());
    }
}
