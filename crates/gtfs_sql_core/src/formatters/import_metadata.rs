//! Functions (PostgreSQL) or macros (DuckDB) describing the import itself.

use chrono::SecondsFormat;

use crate::formatter::{FormatterDescriptor, Template};
use crate::options::{Dialect, Options};
use crate::sql::quote_literal;
use crate::working_state::WorkingState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::synthetic().after_all(Template::Computed(after_all))
}

fn after_all(opts: &Options, _: &WorkingState) -> String {
    let imported_at = quote_literal(
        &opts
            .import_start
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    let version = quote_literal(VERSION);
    let options = quote_literal(&opts.to_json());

    let constants = [
        ("gtfs_data_imported_at", imported_at, "TIMESTAMP WITH TIME ZONE"),
        ("gtfs_via_sql_version", version, "TEXT"),
        ("gtfs_via_sql_options", options, json_type(opts)),
    ];
    constants
        .iter()
        .map(|(name, value, sql_type)| {
            let name = opts.qualify(name);
            match opts.dialect {
                Dialect::Postgres => format!(
                    "CREATE OR REPLACE FUNCTION {name} ()
RETURNS {sql_type}
AS $$
\tSELECT {value}::{sql_type}
$$ LANGUAGE SQL IMMUTABLE;
"
                ),
                Dialect::DuckDb => format!(
                    "CREATE OR REPLACE MACRO {name} () AS ({value}::{sql_type});\n"
                ),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn json_type(opts: &Options) -> &'static str {
    match opts.dialect {
        Dialect::Postgres => "JSONB",
        Dialect::DuckDb => "JSON",
    }
}
