use gtfs_via_sql_model::PathwayMode;

use crate::error::RowError;
use crate::files::{PATHWAYS_FILE, STOPS_FILE};
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{coded, enum_ref, enum_type, flag, float, integer, references, text};

const LAYOUT: TableLayout = TableLayout {
    table: "pathways",
    columns: &[
        "pathway_id",
        "from_stop_id",
        "to_stop_id",
        "pathway_mode",
        "is_bidirectional",
        "length",
        "traversal_time",
        "stair_count",
        "max_slope",
        "min_width",
        "signposted_as",
        "reversed_signposted_as",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row).before_all(Template::Computed(before_all))
}

// https://gtfs.org/documentation/schedule/reference/#pathwaystxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    let stop_ref = references(opts, state, STOPS_FILE, "stop_id");
    format!(
        "{pathway_mode_enum}
CREATE TABLE {table} (
\tpathway_id TEXT PRIMARY KEY,
\tfrom_stop_id TEXT NOT NULL{stop_ref},
\tto_stop_id TEXT NOT NULL{stop_ref},
\tpathway_mode {pathway_mode} NOT NULL,
\tis_bidirectional BOOLEAN NOT NULL,
\tlength REAL,
\ttraversal_time INT,
\tstair_count INT,
\tmax_slope REAL,
\tmin_width REAL,
\tsignposted_as TEXT,
\treversed_signposted_as TEXT
);
",
        pathway_mode_enum = enum_type::<PathwayMode>(opts),
        table = opts.qualify(PATHWAYS_FILE),
        pathway_mode = enum_ref::<PathwayMode>(opts),
    )
}

fn format_row(row: &Row, _: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    Ok(vec![
        text(row, "pathway_id"),
        text(row, "from_stop_id"),
        text(row, "to_stop_id"),
        coded::<PathwayMode>(row, "pathway_mode")?,
        flag(row, "is_bidirectional")?,
        float(row, "length")?,
        integer(row, "traversal_time")?,
        integer(row, "stair_count")?,
        float(row, "max_slope")?,
        float(row, "min_width")?,
        text(row, "signposted_as"),
        text(row, "reversed_signposted_as"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::test_support::postgres;

    #[test]
    fn formats_an_escalator() {
        let row = Row::from_pairs(&[
            ("pathway_id", "P1"),
            ("from_stop_id", "S1"),
            ("to_stop_id", "S2"),
            ("pathway_mode", "4"),
            ("is_bidirectional", "0"),
            ("traversal_time", "30"),
        ]);
        let values = format_row(&row, &postgres(), &mut WorkingState::new()).unwrap();
        assert_eq!(values[3], SqlValue::text("escalator"));
        assert_eq!(values[4], SqlValue::Bool(false));
        assert_eq!(values[6], SqlValue::Int(30));
    }

    #[test]
    fn pathway_mode_has_no_blank_default() {
        let row = Row::from_pairs(&[("pathway_id", "P1"), ("pathway_mode", "0")]);
        assert!(format_row(&row, &postgres(), &mut WorkingState::new()).is_err());
    }
}
