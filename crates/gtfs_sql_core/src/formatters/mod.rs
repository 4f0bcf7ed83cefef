//! Per-file formatters and the default registry.

use gtfs_via_sql_model::{CodedValue, GtfsDate, GtfsTime};

use crate::error::RowError;
use crate::files::*;
use crate::formatter::FormatterRegistry;
use crate::options::{Dialect, Options, StatsMode};
use crate::row::Row;
use crate::sql::{create_enum_type, quote_literal, SqlValue};
use crate::working_state::WorkingState;

pub mod agency;
pub mod calendar;
pub mod calendar_dates;
pub mod feed_info;
pub mod frequencies;
pub mod import_metadata;
pub mod levels;
pub mod pathways;
pub mod prerequisites;
pub mod routes;
pub mod service_days;
pub mod shapes;
pub mod stats;
pub mod stop_times;
pub mod stops;
pub mod transfers;
pub mod translations;
pub mod trips;

/// Registry with every supported GTFS file and synthetic task.
pub fn default_registry() -> FormatterRegistry {
    let mut registry = FormatterRegistry::new();
    registry.register(VALID_LANG_CODES_TASK, prerequisites::valid_lang_codes());
    registry.register(VALID_TIMEZONES_TASK, prerequisites::valid_timezones());
    registry.register(AGENCY_FILE, agency::descriptor());
    registry.register(CALENDAR_FILE, calendar::descriptor());
    registry.register(CALENDAR_DATES_FILE, calendar_dates::descriptor());
    registry.register(SERVICE_DAYS_TASK, service_days::descriptor());
    registry.register(FEED_INFO_FILE, feed_info::descriptor());
    registry.register(ROUTES_FILE, routes::descriptor());
    registry.register(SHAPES_FILE, shapes::descriptor());
    registry.register(TRIPS_FILE, trips::descriptor());
    registry.register(FREQUENCIES_FILE, frequencies::descriptor());
    registry.register(LEVELS_FILE, levels::descriptor());
    registry.register(STOPS_FILE, stops::descriptor());
    registry.register(STOP_TIMES_FILE, stop_times::descriptor());
    registry.register(TRANSFERS_FILE, transfers::descriptor());
    registry.register(PATHWAYS_FILE, pathways::descriptor());
    registry.register(TRANSLATIONS_FILE, translations::descriptor());
    registry.register(IMPORT_METADATA_TASK, import_metadata::descriptor());
    registry.register(STATS_BY_ROUTE_DATE_TASK, stats::by_route_date());
    registry.register(
        STATS_BY_AGENCY_ROUTE_STOP_HOUR_TASK,
        stats::by_agency_route_stop_hour(),
    );
    registry.register(STATS_ACTIVE_TRIPS_BY_HOUR_TASK, stats::active_trips_by_hour());
    registry
}

// Field coercions. Blank values become NULL unless noted.

pub fn text(row: &Row, field: &str) -> SqlValue {
    SqlValue::opt_text(row.get(field))
}

pub fn integer(row: &Row, field: &'static str) -> Result<SqlValue, RowError> {
    match row.get(field) {
        None => Ok(SqlValue::Null),
        Some(raw) => raw
            .parse::<i64>()
            .map(SqlValue::Int)
            .map_err(|_| RowError::invalid_value(field, raw)),
    }
}

pub fn float(row: &Row, field: &'static str) -> Result<SqlValue, RowError> {
    match row.get(field) {
        None => Ok(SqlValue::Null),
        Some(raw) => parse_float(field, raw).map(SqlValue::Float),
    }
}

fn parse_float(field: &'static str, raw: &str) -> Result<f64, RowError> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| RowError::invalid_value(field, raw))
}

/// `YYYYMMDD` as an ISO date.
pub fn date(row: &Row, field: &'static str) -> Result<SqlValue, RowError> {
    match row.get(field) {
        None => Ok(SqlValue::Null),
        Some(raw) => GtfsDate::parse(raw)
            .map(|date| SqlValue::Text(date.to_iso()))
            .map_err(|_| RowError::invalid_value(field, raw)),
    }
}

/// `H:MM:SS` as interval text; hours may exceed 23.
pub fn time(row: &Row, field: &'static str) -> Result<SqlValue, RowError> {
    match row.get(field) {
        None => Ok(SqlValue::Null),
        Some(raw) => GtfsTime::parse(raw)
            .map(|time| SqlValue::Text(time.to_string()))
            .map_err(|_| RowError::invalid_value(field, raw)),
    }
}

/// GTFS code as its SQL enum label. Out-of-domain codes are rejected.
pub fn coded<E: CodedValue>(row: &Row, field: &'static str) -> Result<SqlValue, RowError> {
    let raw = row.raw(field).unwrap_or("");
    let value = E::parse_field(field, raw)?;
    Ok(value.map_or(SqlValue::Null, |v| SqlValue::text(v.sql_label())))
}

/// `0`/`1` as boolean.
pub fn flag(row: &Row, field: &'static str) -> Result<SqlValue, RowError> {
    match row.get(field) {
        None => Ok(SqlValue::Null),
        Some("0") => Ok(SqlValue::Bool(false)),
        Some("1") => Ok(SqlValue::Bool(true)),
        Some(raw) => Err(RowError::invalid_value(field, raw)),
    }
}

/// WKT point from a longitude/latitude pair, NULL if both are blank.
pub fn point(row: &Row, lon_field: &'static str, lat_field: &'static str) -> Result<SqlValue, RowError> {
    match (row.get(lon_field), row.get(lat_field)) {
        (None, None) => Ok(SqlValue::Null),
        (Some(lon), Some(lat)) => {
            let lon = parse_float(lon_field, lon)?;
            let lat = parse_float(lat_field, lat)?;
            Ok(SqlValue::Text(format!("POINT({lon} {lat})")))
        }
        (None, Some(_)) => Err(RowError::new(format!("{lon_field} is missing")).with_field(lon_field)),
        (Some(_), None) => Err(RowError::new(format!("{lat_field} is missing")).with_field(lat_field)),
    }
}

/// Language code, lower-cased if configured.
pub fn lang_code(row: &Row, field: &str, opts: &Options) -> SqlValue {
    match row.get(field) {
        None => SqlValue::Null,
        Some(code) if opts.lower_case_language_codes => SqlValue::Text(code.to_lowercase()),
        Some(code) => SqlValue::text(code),
    }
}

// Dialect-specific SQL snippets shared by the templates.

pub(crate) fn enum_type<E: CodedValue>(opts: &Options) -> String {
    create_enum_type(opts, E::SQL_TYPE, &E::sql_labels())
}

/// Qualified name of an enum type, for column definitions.
pub(crate) fn enum_ref<E: CodedValue>(opts: &Options) -> String {
    opts.qualify(E::SQL_TYPE)
}

pub(crate) fn point_type(opts: &Options) -> &'static str {
    match opts.dialect {
        Dialect::Postgres => "geography(POINT)",
        Dialect::DuckDb => "GEOMETRY",
    }
}

/// `CREATE INDEX <table>_<columns> ON ...`. Both dialects require unique
/// index names per schema.
pub(crate) fn create_index(opts: &Options, table: &str, columns: &[&str]) -> String {
    let name = format!(
        "{table}_{}",
        columns
            .iter()
            .map(|column| column.trim_matches('"'))
            .collect::<Vec<_>>()
            .join("_")
    );
    format!(
        "CREATE INDEX {name} ON {} ({});\n",
        opts.qualify(table),
        columns.join(", ")
    )
}

/// Spatial index on a point column.
pub(crate) fn create_spatial_index(opts: &Options, table: &str, column: &str) -> String {
    let method = match opts.dialect {
        Dialect::Postgres => "GIST",
        Dialect::DuckDb => "RTREE",
    };
    format!(
        "CREATE INDEX {table}_{column} ON {} USING {method} ({column});\n",
        opts.qualify(table)
    )
}

/// `REFERENCES` clause if `task` has created its table.
pub(crate) fn references(
    opts: &Options,
    state: &WorkingState,
    task: &str,
    column: &str,
) -> String {
    if state.has_run(task) {
        format!(" REFERENCES {} ({column})", opts.qualify(task))
    } else {
        String::new()
    }
}

/// Statement creating a derived relation according to `mode`. DuckDB has no
/// materialized views, so those become tables.
pub(crate) fn create_relation(opts: &Options, mode: StatsMode, name: &str) -> String {
    let qualified = opts.qualify(name);
    match (mode, opts.dialect) {
        (StatsMode::MaterializedView, Dialect::Postgres) => {
            format!("CREATE MATERIALIZED VIEW {qualified} AS")
        }
        (StatsMode::MaterializedView, Dialect::DuckDb) => format!("CREATE TABLE {qualified} AS"),
        _ => format!("CREATE OR REPLACE VIEW {qualified} AS"),
    }
}

/// Base64 of a text expression.
pub(crate) fn base64(opts: &Options, expr: &str) -> String {
    match opts.dialect {
        Dialect::Postgres => format!("encode(convert_to({expr}, 'UTF8'), 'base64')"),
        Dialect::DuckDb => format!("to_base64(encode({expr}))"),
    }
}

/// Set-returning `generate_series` usable in a select list.
pub(crate) fn series(opts: &Options, start: &str, stop: &str, step: &str) -> String {
    match opts.dialect {
        Dialect::Postgres => format!("generate_series({start}, {stop}, {step})"),
        Dialect::DuckDb => format!("unnest(generate_series({start}, {stop}, {step}))"),
    }
}

/// Statement failing the import with `message` if `condition_query` returns rows.
pub(crate) fn assert_no_rows(opts: &Options, condition_query: &str, message: &str) -> String {
    let message = quote_literal(message);
    match opts.dialect {
        Dialect::Postgres => format!(
            "DO $$\nBEGIN\n\tIF EXISTS (\n{condition_query}\n\t) THEN\n\t\tRAISE EXCEPTION {message};\n\tEND IF;\nEND\n$$;\n"
        ),
        Dialect::DuckDb => format!(
            "SELECT CASE WHEN EXISTS (\n{condition_query}\n) THEN error({message}) END;\n"
        ),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use gtfs_via_sql_model::ExceptionType;

    #[test]
    fn coerces_field_types() {
        let row = Row::from_pairs(&[
            ("n", "42"),
            ("x", "13.5"),
            ("d", "20240301"),
            ("t", "24:05:00"),
            ("b", "1"),
            ("blank", "  "),
        ]);
        assert_eq!(integer(&row, "n").unwrap(), SqlValue::Int(42));
        assert_eq!(float(&row, "x").unwrap(), SqlValue::Float(13.5));
        assert_eq!(date(&row, "d").unwrap(), SqlValue::text("2024-03-01"));
        assert_eq!(time(&row, "t").unwrap(), SqlValue::text("24:05:00"));
        assert_eq!(flag(&row, "b").unwrap(), SqlValue::Bool(true));
        assert_eq!(integer(&row, "blank").unwrap(), SqlValue::Null);
        assert_eq!(text(&row, "missing"), SqlValue::Null);
    }

    #[test]
    fn rejects_malformed_numbers() {
        let row = Row::from_pairs(&[("n", "4x"), ("x", "NaN"), ("d", "2024-03-01")]);
        assert_eq!(
            integer(&row, "n").unwrap_err(),
            RowError::invalid_value("n", "4x")
        );
        assert!(float(&row, "x").is_err());
        assert!(date(&row, "d").is_err());
    }

    #[test]
    fn coded_values_reject_unknown_codes() {
        let row = Row::from_pairs(&[("exception_type", "9")]);
        let err = coded::<ExceptionType>(&row, "exception_type").unwrap_err();
        assert_eq!(err.field, Some("exception_type"));
        assert_eq!(err.value.as_deref(), Some("9"));
    }

    #[test]
    fn builds_points() {
        let row = Row::from_pairs(&[("lon", "13.4"), ("lat", "52.5")]);
        assert_eq!(point(&row, "lon", "lat").unwrap(), SqlValue::text("POINT(13.4 52.5)"));

        let half = Row::from_pairs(&[("lon", "13.4"), ("lat", "")]);
        assert!(point(&half, "lon", "lat").is_err());
    }

    #[test]
    fn dialect_snippets() {
        assert_eq!(
            create_index(&postgres(), "stops", &["parent_station"]),
            "CREATE INDEX stops_parent_station ON \"public\".stops (parent_station);\n"
        );
        assert_eq!(
            create_relation(&duckdb(), StatsMode::MaterializedView, "stats"),
            "CREATE TABLE \"main\".stats AS"
        );
        assert!(series(&duckdb(), "a", "b", "c").starts_with("unnest("));
    }

    #[test]
    fn default_registry_covers_all_tasks() {
        let registry = default_registry();
        for file in [
            AGENCY_FILE,
            STOPS_FILE,
            ROUTES_FILE,
            TRIPS_FILE,
            STOP_TIMES_FILE,
            CALENDAR_FILE,
            CALENDAR_DATES_FILE,
            SHAPES_FILE,
            FREQUENCIES_FILE,
            TRANSFERS_FILE,
            FEED_INFO_FILE,
            LEVELS_FILE,
            PATHWAYS_FILE,
            TRANSLATIONS_FILE,
        ] {
            assert!(registry.supports_file(file), "{file} should be supported");
        }
        for task in [
            VALID_LANG_CODES_TASK,
            VALID_TIMEZONES_TASK,
            SERVICE_DAYS_TASK,
            IMPORT_METADATA_TASK,
            STATS_BY_ROUTE_DATE_TASK,
            STATS_BY_AGENCY_ROUTE_STOP_HOUR_TASK,
            STATS_ACTIVE_TRIPS_BY_HOUR_TASK,
        ] {
            assert!(registry.get(task).is_some());
            assert!(!registry.supports_file(task), "{task} is synthetic");
        }
    }
}
