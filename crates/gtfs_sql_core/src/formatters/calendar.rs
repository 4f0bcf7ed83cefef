use gtfs_via_sql_model::Availability;

use crate::error::RowError;
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{coded, date, enum_ref, enum_type, text};

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

const LAYOUT: TableLayout = TableLayout {
    table: "calendar",
    columns: &[
        "service_id",
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
        "start_date",
        "end_date",
    ],
};

/// The table is created even without calendar.txt, since `service_days`
/// reads from it.
pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .run_despite_missing_src_file()
}

// https://gtfs.org/documentation/schedule/reference/#calendartxt
fn before_all(opts: &Options, _: &WorkingState) -> String {
    let availability = enum_ref::<Availability>(opts);
    let days: String = WEEKDAYS
        .iter()
        .map(|day| format!("\t{day} {availability} NOT NULL,\n"))
        .collect();
    format!(
        "{enum_type}
CREATE TABLE {table} (
\tservice_id TEXT PRIMARY KEY,
{days}\tstart_date DATE NOT NULL,
\tend_date DATE NOT NULL
);
",
        enum_type = enum_type::<Availability>(opts),
        table = opts.qualify(LAYOUT.table),
    )
}

fn format_row(row: &Row, _: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    let mut values = Vec::with_capacity(LAYOUT.columns.len());
    values.push(text(row, "service_id"));
    for day in WEEKDAYS {
        values.push(coded::<Availability>(row, day)?);
    }
    values.push(date(row, "start_date")?);
    values.push(date(row, "end_date")?);
    Ok(values)
}
