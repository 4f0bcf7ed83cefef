use gtfs_via_sql_model::{LocationType, WheelchairBoarding};

use crate::error::RowError;
use crate::files::{LEVELS_FILE, STOPS_FILE, VALID_TIMEZONES_TASK};
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{
    coded, create_index, create_spatial_index, enum_ref, enum_type, point, point_type,
    references, text,
};

const LAYOUT: TableLayout = TableLayout {
    table: "stops",
    columns: &[
        "stop_id",
        "stop_code",
        "stop_name",
        "tts_stop_name",
        "stop_desc",
        "stop_loc",
        "zone_id",
        "stop_url",
        "location_type",
        "parent_station",
        "stop_timezone",
        "wheelchair_boarding",
        "level_id",
        "platform_code",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .after_all(Template::Computed(after_all))
}

fn level_ref(opts: &Options, state: &WorkingState) -> String {
    if opts.stops_without_level_id {
        String::new()
    } else {
        references(opts, state, LEVELS_FILE, "level_id")
    }
}

// https://gtfs.org/documentation/schedule/reference/#stopstxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    format!(
        "{location_type_enum}{wheelchair_enum}
CREATE TABLE {table} (
\tstop_id TEXT PRIMARY KEY,
\tstop_code TEXT,
\tstop_name TEXT,
\ttts_stop_name TEXT,
\tstop_desc TEXT,
\tstop_loc {point},
\tzone_id TEXT,
\tstop_url TEXT,
\tlocation_type {location_type},
\tparent_station TEXT,
\tstop_timezone TEXT{tz_ref},
\twheelchair_boarding {wheelchair_boarding},
\tlevel_id TEXT{level_ref},
\tplatform_code TEXT
);
",
        location_type_enum = enum_type::<LocationType>(opts),
        wheelchair_enum = enum_type::<WheelchairBoarding>(opts),
        table = opts.qualify(STOPS_FILE),
        point = point_type(opts),
        location_type = enum_ref::<LocationType>(opts),
        tz_ref = references(opts, state, VALID_TIMEZONES_TASK, "tz"),
        wheelchair_boarding = enum_ref::<WheelchairBoarding>(opts),
        level_ref = level_ref(opts, state),
    )
}

fn format_row(row: &Row, _: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    Ok(vec![
        text(row, "stop_id"),
        text(row, "stop_code"),
        text(row, "stop_name"),
        text(row, "tts_stop_name"),
        text(row, "stop_desc"),
        point(row, "stop_lon", "stop_lat")?,
        text(row, "zone_id"),
        text(row, "stop_url"),
        coded::<LocationType>(row, "location_type")?,
        text(row, "parent_station"),
        text(row, "stop_timezone"),
        coded::<WheelchairBoarding>(row, "wheelchair_boarding")?,
        text(row, "level_id"),
        text(row, "platform_code"),
    ])
}

fn after_all(opts: &Options, _: &WorkingState) -> String {
    let table = opts.qualify(STOPS_FILE);
    let mut sql = String::new();
    // DuckDB cannot add constraints to existing tables.
    if opts.is_postgres() {
        sql.push_str(&format!(
            "ALTER TABLE {table}
ADD CONSTRAINT stops_parent_station_fkey
FOREIGN KEY (parent_station) REFERENCES {table} (stop_id);
"
        ));
    }
    sql.push_str(&create_index(opts, STOPS_FILE, &["parent_station"]));
    if opts.stops_location_index {
        sql.push_str(&create_spatial_index(opts, STOPS_FILE, "stop_loc"));
    }
    if opts.postgraphile {
        sql.push_str(&format!(
            "COMMENT ON COLUMN {table}.parent_station IS E'@name parentStation';\n"
        ));
    }
    sql
}
