use crate::error::RowError;
use crate::files::LEVELS_FILE;
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{float, text};

const LAYOUT: TableLayout = TableLayout {
    table: "levels",
    columns: &["level_id", "level_index", "level_name"],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row).before_all(Template::Computed(before_all))
}

// https://gtfs.org/documentation/schedule/reference/#levelstxt
fn before_all(opts: &Options, _: &WorkingState) -> String {
    format!(
        "CREATE TABLE {} (
\tlevel_id TEXT PRIMARY KEY,
\tlevel_index REAL NOT NULL,
\tlevel_name TEXT
);
",
        opts.qualify(LEVELS_FILE)
    )
}

fn format_row(row: &Row, _: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    Ok(vec![
        text(row, "level_id"),
        float(row, "level_index")?,
        text(row, "level_name"),
    ])
}
