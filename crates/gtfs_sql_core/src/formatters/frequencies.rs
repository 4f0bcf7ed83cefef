use gtfs_via_sql_model::ExactTimes;

use crate::error::RowError;
use crate::files::{FREQUENCIES_FILE, TRIPS_FILE};
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{coded, create_index, enum_ref, enum_type, integer, references, text, time};

const LAYOUT: TableLayout = TableLayout {
    table: "frequencies",
    columns: &[
        "trip_id",
        "start_time",
        "end_time",
        "headway_secs",
        "exact_times",
        "frequencies_row",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .after_all(Template::Computed(after_all))
}

// https://gtfs.org/documentation/schedule/reference/#frequenciestxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    format!(
        "{exact_times_enum}
CREATE TABLE {table} (
\ttrip_id TEXT NOT NULL{trip_ref},
\tstart_time INTERVAL NOT NULL,
\tend_time INTERVAL NOT NULL,
\theadway_secs INT NOT NULL,
\texact_times {exact_times},
\tfrequencies_row INT NOT NULL,
\tPRIMARY KEY (trip_id, start_time)
);
",
        exact_times_enum = enum_type::<ExactTimes>(opts),
        table = opts.qualify(FREQUENCIES_FILE),
        trip_ref = references(opts, state, TRIPS_FILE, "trip_id"),
        exact_times = enum_ref::<ExactTimes>(opts),
    )
}

fn format_row(
    row: &Row,
    _: &Options,
    state: &mut WorkingState,
) -> Result<Vec<SqlValue>, RowError> {
    let headway_secs = integer(row, "headway_secs")?;
    if matches!(headway_secs, SqlValue::Int(secs) if secs <= 0) {
        return Err(RowError::new("headway_secs must be positive").with_field("headway_secs"));
    }
    // row counts are bumped after each successfully formatted row
    let frequencies_row = state.row_count(FREQUENCIES_FILE).unwrap_or(0) + 1;
    Ok(vec![
        text(row, "trip_id"),
        time(row, "start_time")?,
        time(row, "end_time")?,
        headway_secs,
        coded::<ExactTimes>(row, "exact_times")?,
        SqlValue::Int(frequencies_row as i64),
    ])
}

fn after_all(opts: &Options, _: &WorkingState) -> String {
    create_index(opts, FREQUENCIES_FILE, &["trip_id"])
}
