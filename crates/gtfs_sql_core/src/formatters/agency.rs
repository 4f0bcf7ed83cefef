use crate::error::RowError;
use crate::files::{AGENCY_FILE, VALID_TIMEZONES_TASK};
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{lang_code, references, text};

/// Id given to the only agency of a feed that leaves `agency_id` blank.
pub const IMPLICIT_AGENCY_ID: &str = "default";

const LAYOUT: TableLayout = TableLayout {
    table: "agency",
    columns: &[
        "agency_id",
        "agency_name",
        "agency_url",
        "agency_timezone",
        "agency_lang",
        "agency_phone",
        "agency_fare_url",
        "agency_email",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row).before_all(Template::Computed(before_all))
}

// https://gtfs.org/documentation/schedule/reference/#agencytxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    format!(
        "CREATE TABLE {table} (
\tagency_id TEXT PRIMARY KEY,
\tagency_name TEXT NOT NULL,
\tagency_url TEXT NOT NULL,
\tagency_timezone TEXT NOT NULL{tz_ref},
\tagency_lang TEXT,
\tagency_phone TEXT,
\tagency_fare_url TEXT,
\tagency_email TEXT
);
",
        table = opts.qualify(LAYOUT.table),
        tz_ref = references(opts, state, VALID_TIMEZONES_TASK, "tz"),
    )
}

fn format_row(
    row: &Row,
    opts: &Options,
    state: &mut WorkingState,
) -> Result<Vec<SqlValue>, RowError> {
    let previous_agencies = state.row_count(AGENCY_FILE).unwrap_or(0);
    let implicit_id_taken = state.default_agency_id() == Some(IMPLICIT_AGENCY_ID);

    let agency_id = match row.get("agency_id") {
        Some(id) if previous_agencies > 0 && implicit_id_taken => {
            return Err(RowError::invalid_value("agency_id", id).with_explanation(
                "the first agency has no agency_id, which GTFS only allows for single-agency feeds",
            ))
        }
        Some(id) => id,
        None if previous_agencies == 0 => IMPLICIT_AGENCY_ID,
        None => {
            return Err(RowError::new("agency_id must not be empty")
                .with_field("agency_id")
                .with_explanation(
                    "agency_id may only be omitted if the feed contains exactly one agency",
                ))
        }
    };
    if previous_agencies == 0 {
        state.set_default_agency_id(agency_id);
    }

    Ok(vec![
        SqlValue::text(agency_id),
        text(row, "agency_name"),
        text(row, "agency_url"),
        text(row, "agency_timezone"),
        lang_code(row, "agency_lang", opts),
        text(row, "agency_phone"),
        text(row, "agency_fare_url"),
        text(row, "agency_email"),
    ])
}
