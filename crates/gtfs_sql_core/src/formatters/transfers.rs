use gtfs_via_sql_model::{CodedValue, TransferType};

use crate::error::RowError;
use crate::files::{ROUTES_FILE, STOPS_FILE, TRANSFERS_FILE, TRIPS_FILE};
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{create_index, enum_ref, enum_type, integer, references, text};

const LAYOUT: TableLayout = TableLayout {
    table: "transfers",
    columns: &[
        "from_stop_id",
        "to_stop_id",
        "transfer_type",
        "min_transfer_time",
        "from_route_id",
        "to_route_id",
        "from_trip_id",
        "to_trip_id",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .after_all(Template::Computed(after_all))
}

// https://gtfs.org/documentation/schedule/reference/#transferstxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    let stop_ref = references(opts, state, STOPS_FILE, "stop_id");
    let route_ref = references(opts, state, ROUTES_FILE, "route_id");
    let trip_ref = references(opts, state, TRIPS_FILE, "trip_id");
    format!(
        "{transfer_type_enum}
CREATE TABLE {table} (
\tfrom_stop_id TEXT{stop_ref},
\tto_stop_id TEXT{stop_ref},
\ttransfer_type {transfer_type},
\tmin_transfer_time INT,
\tfrom_route_id TEXT{route_ref},
\tto_route_id TEXT{route_ref},
\tfrom_trip_id TEXT{trip_ref},
\tto_trip_id TEXT{trip_ref}
);
",
        transfer_type_enum = enum_type::<TransferType>(opts),
        table = opts.qualify(TRANSFERS_FILE),
        transfer_type = enum_ref::<TransferType>(opts),
    )
}

fn format_row(row: &Row, _: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    let transfer_type =
        TransferType::parse_field("transfer_type", row.raw("transfer_type").unwrap_or(""))?;
    let min_transfer_time = integer(row, "min_transfer_time")?;
    if transfer_type == Some(TransferType::MinimumTime) && min_transfer_time.is_null() {
        return Err(RowError::new("min_transfer_time is missing")
            .with_field("min_transfer_time")
            .with_explanation("transfer_type 2 requires min_transfer_time"));
    }
    Ok(vec![
        text(row, "from_stop_id"),
        text(row, "to_stop_id"),
        transfer_type.map_or(SqlValue::Null, |t| SqlValue::text(t.sql_label())),
        min_transfer_time,
        text(row, "from_route_id"),
        text(row, "to_route_id"),
        text(row, "from_trip_id"),
        text(row, "to_trip_id"),
    ])
}

fn after_all(opts: &Options, _: &WorkingState) -> String {
    let mut sql = create_index(opts, TRANSFERS_FILE, &["from_stop_id"]);
    sql.push_str(&create_index(opts, TRANSFERS_FILE, &["to_stop_id"]));
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::test_support::postgres;

    #[test]
    fn minimum_time_transfers_need_a_time() {
        let row = Row::from_pairs(&[
            ("from_stop_id", "S1"),
            ("to_stop_id", "S2"),
            ("transfer_type", "2"),
        ]);
        let err = format_row(&row, &postgres(), &mut WorkingState::new()).unwrap_err();
        assert_eq!(err.field, Some("min_transfer_time"));

        let row = Row::from_pairs(&[
            ("from_stop_id", "S1"),
            ("to_stop_id", "S2"),
            ("transfer_type", "2"),
            ("min_transfer_time", "180"),
        ]);
        let values = format_row(&row, &postgres(), &mut WorkingState::new()).unwrap();
        assert_eq!(values[2], SqlValue::text("minimum_time"));
        assert_eq!(values[3], SqlValue::Int(180));
    }

    #[test]
    fn references_only_tables_that_exist() {
        let mut state = WorkingState::new();
        state.start_task(STOPS_FILE);
        let sql = before_all(&postgres(), &state);
        assert!(sql.contains("from_stop_id TEXT REFERENCES \"public\".stops (stop_id)"));
        assert!(sql.contains("from_trip_id TEXT,\n"));
    }
}
