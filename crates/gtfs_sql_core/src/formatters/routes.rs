use std::fmt::Write as _;

use crate::error::RowError;
use crate::files::AGENCY_FILE;
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::{quote_literal, SqlValue};
use crate::working_state::WorkingState;

use super::{create_index, integer, text};

pub const ROUTE_TYPE_ENUM: &str = "route_type_val";

const LAYOUT: TableLayout = TableLayout {
    table: "routes",
    columns: &[
        "route_id",
        "agency_id",
        "route_short_name",
        "route_long_name",
        "route_desc",
        "route_type",
        "route_url",
        "route_color",
        "route_text_color",
        "route_sort_order",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .after_all(Template::Computed(after_all))
}

fn references_agency(opts: &Options, state: &WorkingState) -> bool {
    !opts.routes_without_agency_id && state.has_run(AGENCY_FILE)
}

// https://gtfs.org/documentation/schedule/reference/#routestxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    let route_type = opts.qualify(ROUTE_TYPE_ENUM);
    let mut sql = format!("CREATE TYPE {route_type} AS ENUM (\n");
    for (i, info) in opts.route_types_scheme.route_types().enumerate() {
        let separator = if i == 0 { "\t" } else { "\t, " };
        let _ = writeln!(
            sql,
            "{separator}{} -- {}",
            quote_literal(info.code),
            info.description
        );
    }
    sql.push_str(");\n");
    if opts.postgraphile {
        let _ = writeln!(
            sql,
            "COMMENT ON TYPE {route_type} IS E'@enum\\n@enumName RouteType\\n';"
        );
    }

    let agency_fk = if references_agency(opts, state) {
        format!(
            "\tFOREIGN KEY (agency_id) REFERENCES {} (agency_id),\n",
            opts.qualify(AGENCY_FILE)
        )
    } else {
        String::new()
    };
    let _ = write!(
        sql,
        "
CREATE TABLE {table} (
\troute_id TEXT PRIMARY KEY,
\tagency_id TEXT,
{agency_fk}\troute_short_name TEXT,
\troute_long_name TEXT,
\troute_desc TEXT,
\troute_type {route_type} NOT NULL,
\troute_url TEXT,
\troute_color TEXT,
\troute_text_color TEXT,
\troute_sort_order INT
);
",
        table = opts.qualify(LAYOUT.table),
    );
    sql
}

fn format_row(
    row: &Row,
    opts: &Options,
    state: &mut WorkingState,
) -> Result<Vec<SqlValue>, RowError> {
    let agency_id = match row.get("agency_id") {
        Some(id) => SqlValue::text(id),
        None if opts.routes_without_agency_id => SqlValue::Null,
        None => implicit_agency_id(state)?,
    };

    let route_type = match row.get("route_type") {
        Some(code) if opts.route_types_scheme.accepts(code) => SqlValue::text(code),
        Some(code) => {
            return Err(
                RowError::invalid_value("route_type", code).with_explanation(format!(
                    "route_type must be a basic route type or a {} route type",
                    opts.route_types_scheme
                )),
            )
        }
        None => {
            return Err(RowError::new("route_type must not be empty").with_field("route_type"))
        }
    };

    Ok(vec![
        text(row, "route_id"),
        agency_id,
        text(row, "route_short_name"),
        text(row, "route_long_name"),
        text(row, "route_desc"),
        route_type,
        text(row, "route_url"),
        text(row, "route_color"),
        text(row, "route_text_color"),
        integer(row, "route_sort_order")?,
    ])
}

/// GTFS allows omitting `routes.agency_id` only if there is exactly one agency.
fn implicit_agency_id(state: &WorkingState) -> Result<SqlValue, RowError> {
    match (state.row_count(AGENCY_FILE), state.default_agency_id()) {
        (Some(1), Some(id)) => Ok(SqlValue::text(id)),
        (Some(count), _) if count > 1 => Err(RowError::new("agency_id must not be empty")
            .with_field("agency_id")
            .with_explanation(format!(
                "agency.txt contains {count} agencies, but routes.agency_id may only be omitted if there is exactly one"
            ))),
        _ => Ok(SqlValue::Null),
    }
}

fn after_all(opts: &Options, state: &WorkingState) -> String {
    let mut sql = create_index(opts, LAYOUT.table, &["route_short_name"]);
    if references_agency(opts, state) {
        sql.push_str(&create_index(opts, LAYOUT.table, &["agency_id"]));
    }
    sql
}
