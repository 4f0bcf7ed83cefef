use gtfs_via_sql_model::{BikesAllowed, WheelchairAccessible};

use crate::error::RowError;
use crate::files::{ROUTES_FILE, SHAPES_FILE, TRIPS_FILE};
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{assert_no_rows, coded, create_index, enum_ref, enum_type, integer, references, text};

const LAYOUT: TableLayout = TableLayout {
    table: "trips",
    columns: &[
        "trip_id",
        "route_id",
        "service_id",
        "trip_headsign",
        "trip_short_name",
        "direction_id",
        "block_id",
        "shape_id",
        "wheelchair_accessible",
        "bikes_allowed",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .after_all(Template::Computed(after_all))
}

// https://gtfs.org/documentation/schedule/reference/#tripstxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    format!(
        "{wheelchair_enum}{bikes_enum}
CREATE TABLE {table} (
\ttrip_id TEXT PRIMARY KEY,
\troute_id TEXT NOT NULL{route_ref},
\tservice_id TEXT NOT NULL,
\ttrip_headsign TEXT,
\ttrip_short_name TEXT,
\tdirection_id INT,
\tblock_id TEXT,
\tshape_id TEXT,
\twheelchair_accessible {wheelchair_accessible},
\tbikes_allowed {bikes_allowed}
);
",
        wheelchair_enum = enum_type::<WheelchairAccessible>(opts),
        bikes_enum = enum_type::<BikesAllowed>(opts),
        table = opts.qualify(TRIPS_FILE),
        route_ref = references(opts, state, ROUTES_FILE, "route_id"),
        wheelchair_accessible = enum_ref::<WheelchairAccessible>(opts),
        bikes_allowed = enum_ref::<BikesAllowed>(opts),
    )
}

fn format_row(row: &Row, _: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    let direction_id = integer(row, "direction_id")?;
    if let SqlValue::Int(direction) = direction_id {
        if !(0..=1).contains(&direction) {
            return Err(RowError::invalid_value(
                "direction_id",
                &direction.to_string(),
            ));
        }
    }
    Ok(vec![
        text(row, "trip_id"),
        text(row, "route_id"),
        text(row, "service_id"),
        text(row, "trip_headsign"),
        text(row, "trip_short_name"),
        direction_id,
        text(row, "block_id"),
        text(row, "shape_id"),
        coded::<WheelchairAccessible>(row, "wheelchair_accessible")?,
        coded::<BikesAllowed>(row, "bikes_allowed")?,
    ])
}

fn after_all(opts: &Options, state: &WorkingState) -> String {
    let mut sql = create_index(opts, TRIPS_FILE, &["route_id"]);
    sql.push_str(&create_index(opts, TRIPS_FILE, &["service_id"]));
    if state.has_run(SHAPES_FILE) && !opts.trips_without_shape_id {
        let check = format!(
            "\t\tSELECT trip_id
\t\tFROM {trips}
\t\tWHERE shape_id IS NOT NULL
\t\tAND NOT EXISTS (
\t\t\tSELECT 1 FROM {shapes} WHERE {shapes}.shape_id = {trips}.shape_id
\t\t)",
            trips = opts.qualify(TRIPS_FILE),
            shapes = opts.qualify(SHAPES_FILE),
        );
        sql.push_str(&assert_no_rows(
            opts,
            &check,
            "trips.shape_id references a shape that is missing in shapes.txt",
        ));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::test_support::{duckdb, options, postgres};
    use crate::options::OptionOverrides;

    fn trip(direction: &str, bikes: &str) -> Row {
        Row::from_pairs(&[
            ("route_id", "R1"),
            ("service_id", "weekdays"),
            ("trip_id", "T1"),
            ("direction_id", direction),
            ("bikes_allowed", bikes),
        ])
    }

    #[test]
    fn formats_trip() {
        let values = format_row(&trip("1", "2"), &postgres(), &mut WorkingState::new()).unwrap();
        assert_eq!(values[0], SqlValue::text("T1"));
        assert_eq!(values[5], SqlValue::Int(1));
        assert_eq!(values[8], SqlValue::text("unknown"));
        assert_eq!(values[9], SqlValue::text("not_allowed"));
    }

    #[test]
    fn rejects_out_of_range_direction() {
        let err = format_row(&trip("2", ""), &postgres(), &mut WorkingState::new()).unwrap_err();
        assert_eq!(err.field, Some("direction_id"));
    }

    #[test]
    fn checks_shape_references_only_when_shapes_ran() {
        let with_shapes = options(OptionOverrides {
            trips_without_shape_id: Some(false),
            ..Default::default()
        });
        assert!(!after_all(&with_shapes, &WorkingState::new()).contains("RAISE EXCEPTION"));

        let mut state = WorkingState::new();
        state.start_task(SHAPES_FILE);
        let sql = after_all(&with_shapes, &state);
        assert!(sql.contains("RAISE EXCEPTION"));
        assert!(sql.contains("\"public\".shapes.shape_id = \"public\".trips.shape_id"));

        let duck = options(OptionOverrides {
            trips_without_shape_id: Some(false),
            ..duckdb_overrides()
        });
        assert!(after_all(&duck, &state).contains("THEN error("));
        assert!(!after_all(&duckdb(), &state).contains("error("));
    }

    fn duckdb_overrides() -> OptionOverrides {
        OptionOverrides {
            dialect: Some(crate::options::Dialect::DuckDb),
            ..Default::default()
        }
    }
}
