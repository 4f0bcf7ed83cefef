use gtfs_via_sql_model::ExceptionType;

use crate::error::RowError;
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{coded, create_index, date, enum_ref, enum_type, text};

const LAYOUT: TableLayout = TableLayout {
    table: "calendar_dates",
    columns: &["service_id", "\"date\"", "exception_type"],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .after_all(Template::Computed(after_all))
        .run_despite_missing_src_file()
}

// https://gtfs.org/documentation/schedule/reference/#calendar_datestxt
fn before_all(opts: &Options, _: &WorkingState) -> String {
    format!(
        "{enum_type}
CREATE TABLE {table} (
\tservice_id TEXT NOT NULL,
\t\"date\" DATE NOT NULL,
\tPRIMARY KEY (service_id, \"date\"),
\texception_type {exception_type} NOT NULL
);
",
        enum_type = enum_type::<ExceptionType>(opts),
        table = opts.qualify(LAYOUT.table),
        exception_type = enum_ref::<ExceptionType>(opts),
    )
}

fn format_row(row: &Row, _: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    Ok(vec![
        text(row, "service_id"),
        date(row, "date")?,
        coded::<ExceptionType>(row, "exception_type")?,
    ])
}

fn after_all(opts: &Options, _: &WorkingState) -> String {
    create_index(opts, LAYOUT.table, &["exception_type"])
}
