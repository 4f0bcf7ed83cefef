use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::files::{LEVELS_FILE, SHAPES_FILE};
pub use gtfs_via_sql_model::RouteTypesScheme;

pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    DuckDb,
}

impl Dialect {
    pub const NAMES: &'static [&'static str] = &["postgres", "duckdb"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::DuckDb => "duckdb",
        }
    }

    fn default_schema(self) -> &'static str {
        match self {
            Self::Postgres => "public",
            Self::DuckDb => "main",
        }
    }
}

/// How row data is carried in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowFormat {
    /// `COPY ... FROM STDIN csv` blocks terminated by `\.`.
    Copy,
    /// Batched multi-row `INSERT ... VALUES` statements.
    Insert,
}

impl RowFormat {
    pub const NAMES: &'static [&'static str] = &["copy", "insert"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Insert => "insert",
        }
    }
}

/// How a statistics task materializes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatsMode {
    #[default]
    None,
    View,
    MaterializedView,
}

impl StatsMode {
    pub const NAMES: &'static [&'static str] = &["none", "view", "materialized-view"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::View => "view",
            Self::MaterializedView => "materialized-view",
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Self::None
    }
}

macro_rules! impl_choice {
    ($ty:ty, $option:literal, { $($name:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($name => Ok($variant),)+
                    other => Err(ConfigError::InvalidOption {
                        option: $option,
                        value: other.to_string(),
                        allowed: <$ty>::NAMES,
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_choice!(Dialect, "dialect", {
    "postgres" => Dialect::Postgres,
    "duckdb" => Dialect::DuckDb,
});
impl_choice!(RowFormat, "rowFormat", {
    "copy" => RowFormat::Copy,
    "insert" => RowFormat::Insert,
});
impl_choice!(StatsMode, "stats mode", {
    "none" => StatsMode::None,
    "view" => StatsMode::View,
    "materialized-view" => StatsMode::MaterializedView,
});

/// Parses a `routeTypesScheme` value into a configuration error on failure.
pub fn parse_route_types_scheme(value: &str) -> Result<RouteTypesScheme, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidOption {
            option: "routeTypesScheme",
            value: value.to_string(),
            allowed: RouteTypesScheme::NAMES,
        })
}

/// Caller-supplied options. Unset fields fall back to defaults, some of
/// which depend on the set of files being converted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OptionOverrides {
    pub dialect: Option<Dialect>,
    pub row_format: Option<RowFormat>,
    pub insert_batch_size: Option<usize>,
    pub silent: Option<bool>,
    pub require_dependencies: Option<bool>,
    pub ignore_unsupported_files: Option<bool>,
    pub schema: Option<String>,
    pub route_types_scheme: Option<RouteTypesScheme>,
    pub trips_without_shape_id: Option<bool>,
    pub routes_without_agency_id: Option<bool>,
    pub stops_without_level_id: Option<bool>,
    pub stops_location_index: Option<bool>,
    pub lower_case_language_codes: Option<bool>,
    pub stats_by_route_id_and_date: Option<StatsMode>,
    pub stats_by_agency_id_and_route_id_and_stop_and_hour: Option<StatsMode>,
    pub stats_active_trips_by_hour: Option<StatsMode>,
    pub postgraphile: Option<bool>,
    pub postgrest: Option<bool>,
    pub import_metadata: Option<bool>,
    pub import_start: Option<DateTime<Utc>>,
}

impl OptionOverrides {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Overlays `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: OptionOverrides) -> Self {
        Self {
            dialect: other.dialect.or(self.dialect),
            row_format: other.row_format.or(self.row_format),
            insert_batch_size: other.insert_batch_size.or(self.insert_batch_size),
            silent: other.silent.or(self.silent),
            require_dependencies: other.require_dependencies.or(self.require_dependencies),
            ignore_unsupported_files: other
                .ignore_unsupported_files
                .or(self.ignore_unsupported_files),
            schema: other.schema.or(self.schema),
            route_types_scheme: other.route_types_scheme.or(self.route_types_scheme),
            trips_without_shape_id: other.trips_without_shape_id.or(self.trips_without_shape_id),
            routes_without_agency_id: other
                .routes_without_agency_id
                .or(self.routes_without_agency_id),
            stops_without_level_id: other.stops_without_level_id.or(self.stops_without_level_id),
            stops_location_index: other.stops_location_index.or(self.stops_location_index),
            lower_case_language_codes: other
                .lower_case_language_codes
                .or(self.lower_case_language_codes),
            stats_by_route_id_and_date: other
                .stats_by_route_id_and_date
                .or(self.stats_by_route_id_and_date),
            stats_by_agency_id_and_route_id_and_stop_and_hour: other
                .stats_by_agency_id_and_route_id_and_stop_and_hour
                .or(self.stats_by_agency_id_and_route_id_and_stop_and_hour),
            stats_active_trips_by_hour: other
                .stats_active_trips_by_hour
                .or(self.stats_active_trips_by_hour),
            postgraphile: other.postgraphile.or(self.postgraphile),
            postgrest: other.postgrest.or(self.postgrest),
            import_metadata: other.import_metadata.or(self.import_metadata),
            import_start: other.import_start.or(self.import_start),
        }
    }
}

/// Fully resolved, immutable configuration of one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    pub dialect: Dialect,
    pub row_format: RowFormat,
    pub insert_batch_size: usize,
    pub silent: bool,
    pub require_dependencies: bool,
    pub ignore_unsupported_files: bool,
    pub schema: String,
    pub route_types_scheme: RouteTypesScheme,
    pub trips_without_shape_id: bool,
    pub routes_without_agency_id: bool,
    pub stops_without_level_id: bool,
    pub stops_location_index: bool,
    pub lower_case_language_codes: bool,
    pub stats_by_route_id_and_date: StatsMode,
    pub stats_by_agency_id_and_route_id_and_stop_and_hour: StatsMode,
    pub stats_active_trips_by_hour: StatsMode,
    pub postgraphile: bool,
    pub postgrest: bool,
    pub import_metadata: bool,
    pub import_start: DateTime<Utc>,
}

impl Options {
    /// Applies defaults to `overrides`. `requested_files` are the GTFS file
    /// names that will be converted.
    pub fn resolve<S: AsRef<str>>(
        overrides: &OptionOverrides,
        requested_files: &[S],
    ) -> Result<Self, ConfigError> {
        let has_file = |name: &str| requested_files.iter().any(|f| f.as_ref() == name);
        let dialect = overrides.dialect.unwrap_or_default();

        let row_format = match (dialect, overrides.row_format) {
            (Dialect::DuckDb, Some(RowFormat::Copy)) => {
                return Err(ConfigError::Incompatible(
                    "rowFormat copy requires the postgres dialect".into(),
                ))
            }
            (_, Some(format)) => format,
            (Dialect::Postgres, None) => RowFormat::Copy,
            (Dialect::DuckDb, None) => RowFormat::Insert,
        };

        let insert_batch_size = overrides
            .insert_batch_size
            .unwrap_or(DEFAULT_INSERT_BATCH_SIZE);
        if insert_batch_size == 0 {
            return Err(ConfigError::Incompatible(
                "insertBatchSize must be at least 1".into(),
            ));
        }

        let schema = overrides
            .schema
            .clone()
            .unwrap_or_else(|| dialect.default_schema().to_string());
        if schema.is_empty() || schema.contains(['"', '\0']) {
            return Err(ConfigError::InvalidSchema(schema));
        }

        let postgraphile = overrides.postgraphile.unwrap_or(false);
        let postgrest = overrides.postgrest.unwrap_or(false);
        if dialect == Dialect::DuckDb && (postgraphile || postgrest) {
            return Err(ConfigError::Incompatible(
                "postgraphile and postgrest require the postgres dialect".into(),
            ));
        }

        Ok(Self {
            dialect,
            row_format,
            insert_batch_size,
            silent: overrides.silent.unwrap_or(false),
            require_dependencies: overrides.require_dependencies.unwrap_or(false),
            ignore_unsupported_files: overrides.ignore_unsupported_files.unwrap_or(false),
            schema,
            route_types_scheme: overrides.route_types_scheme.unwrap_or_default(),
            trips_without_shape_id: overrides
                .trips_without_shape_id
                .unwrap_or_else(|| !has_file(SHAPES_FILE)),
            routes_without_agency_id: overrides.routes_without_agency_id.unwrap_or(false),
            stops_without_level_id: overrides
                .stops_without_level_id
                .unwrap_or_else(|| !has_file(LEVELS_FILE)),
            stops_location_index: overrides.stops_location_index.unwrap_or(false),
            lower_case_language_codes: overrides.lower_case_language_codes.unwrap_or(false),
            stats_by_route_id_and_date: overrides.stats_by_route_id_and_date.unwrap_or_default(),
            stats_by_agency_id_and_route_id_and_stop_and_hour: overrides
                .stats_by_agency_id_and_route_id_and_stop_and_hour
                .unwrap_or_default(),
            stats_active_trips_by_hour: overrides.stats_active_trips_by_hour.unwrap_or_default(),
            postgraphile,
            postgrest,
            import_metadata: overrides.import_metadata.unwrap_or(false),
            import_start: overrides
                .import_start
                .unwrap_or_else(|| Utc::now().trunc_subsecs(0)),
        })
    }

    /// `"schema".name`
    pub fn qualify(&self, name: &str) -> String {
        format!("\"{}\".{}", self.schema, name)
    }

    pub fn is_postgres(&self) -> bool {
        self.dialect == Dialect::Postgres
    }

    /// Options as camelCase JSON, recorded by the import metadata task.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(overrides: OptionOverrides, files: &[&str]) -> Result<Options, ConfigError> {
        Options::resolve(&overrides, files)
    }

    #[test]
    fn derives_defaults_from_file_list() {
        let opts = resolve(OptionOverrides::default(), &["trips", "stops"]).unwrap();
        assert!(opts.trips_without_shape_id);
        assert!(opts.stops_without_level_id);
        assert!(!opts.routes_without_agency_id);
        assert_eq!(opts.route_types_scheme, RouteTypesScheme::GoogleExtended);
        assert_eq!(opts.row_format, RowFormat::Copy);
        assert_eq!(opts.schema, "public");

        let opts = resolve(OptionOverrides::default(), &["trips", "shapes", "levels"]).unwrap();
        assert!(!opts.trips_without_shape_id);
        assert!(!opts.stops_without_level_id);
    }

    #[test]
    fn explicit_values_beat_derived_defaults() {
        let overrides = OptionOverrides {
            trips_without_shape_id: Some(false),
            ..Default::default()
        };
        let opts = resolve(overrides, &["trips"]).unwrap();
        assert!(!opts.trips_without_shape_id);
    }

    #[test]
    fn duckdb_defaults_to_insert_rows() {
        let overrides = OptionOverrides {
            dialect: Some(Dialect::DuckDb),
            ..Default::default()
        };
        let opts = resolve(overrides, &[] as &[&str]).unwrap();
        assert_eq!(opts.row_format, RowFormat::Insert);
        assert_eq!(opts.schema, "main");
    }

    #[test]
    fn rejects_incompatible_combinations() {
        let copy_into_duckdb = OptionOverrides {
            dialect: Some(Dialect::DuckDb),
            row_format: Some(RowFormat::Copy),
            ..Default::default()
        };
        assert!(matches!(
            resolve(copy_into_duckdb, &[]),
            Err(ConfigError::Incompatible(_))
        ));

        let bad_schema = OptionOverrides {
            schema: Some("a\"b".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolve(bad_schema, &[]),
            Err(ConfigError::InvalidSchema(_))
        ));

        let zero_batch = OptionOverrides {
            insert_batch_size: Some(0),
            ..Default::default()
        };
        assert!(resolve(zero_batch, &[]).is_err());
    }

    #[test]
    fn parses_json_overrides() {
        let overrides = OptionOverrides::from_json(
            r#"{"routeTypesScheme": "basic", "statsActiveTripsByHour": "materialized-view", "schema": "gtfs"}"#,
        )
        .unwrap();
        assert_eq!(overrides.route_types_scheme, Some(RouteTypesScheme::Basic));
        assert_eq!(
            overrides.stats_active_trips_by_hour,
            Some(StatsMode::MaterializedView)
        );

        assert!(OptionOverrides::from_json(r#"{"routeTypesScheme": "fancy"}"#).is_err());
        assert!(OptionOverrides::from_json(r#"{"unknownOption": true}"#).is_err());
    }

    #[test]
    fn merge_prefers_later_values() {
        let base = OptionOverrides {
            schema: Some("a".into()),
            silent: Some(true),
            ..Default::default()
        };
        let top = OptionOverrides {
            schema: Some("b".into()),
            ..Default::default()
        };
        let merged = base.merge(top);
        assert_eq!(merged.schema.as_deref(), Some("b"));
        assert_eq!(merged.silent, Some(true));
    }

    #[test]
    fn unknown_choice_lists_allowed_values() {
        let err = "materialised".parse::<StatsMode>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid stats mode \"materialised\", must be one of: none, view, materialized-view"
        );
        assert!(parse_route_types_scheme("google-extended").is_ok());
        assert!(parse_route_types_scheme("google").is_err());
    }
}
