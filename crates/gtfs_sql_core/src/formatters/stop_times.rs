use gtfs_via_sql_model::{PickupDropOffType, Timepoint};

use crate::error::RowError;
use crate::files::*;
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::{Dialect, Options};
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{
    base64, coded, create_index, enum_ref, enum_type, float, integer, references, series, text,
    time,
};

const LAYOUT: TableLayout = TableLayout {
    table: "stop_times",
    columns: &[
        "trip_id",
        "arrival_time",
        "departure_time",
        "stop_id",
        "stop_sequence",
        "stop_headsign",
        "pickup_type",
        "drop_off_type",
        "shape_dist_traveled",
        "timepoint",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .after_all(Template::Computed(after_all))
}

// https://gtfs.org/documentation/schedule/reference/#stop_timestxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    format!(
        "{pickup_drop_off_enum}{timepoint_enum}
CREATE TABLE {table} (
\ttrip_id TEXT NOT NULL{trip_ref},
\tarrival_time INTERVAL,
\tdeparture_time INTERVAL,
\tstop_id TEXT NOT NULL{stop_ref},
\tstop_sequence INT NOT NULL,
\tstop_sequence_consec INT,
\tstop_headsign TEXT,
\tpickup_type {pickup_drop_off},
\tdrop_off_type {pickup_drop_off},
\tshape_dist_traveled REAL,
\ttimepoint {timepoint},
\ttrip_start_time INTERVAL,
\tPRIMARY KEY (trip_id, stop_sequence)
);
",
        pickup_drop_off_enum = enum_type::<PickupDropOffType>(opts),
        timepoint_enum = enum_type::<Timepoint>(opts),
        table = opts.qualify(STOP_TIMES_FILE),
        trip_ref = references(opts, state, TRIPS_FILE, "trip_id"),
        stop_ref = references(opts, state, STOPS_FILE, "stop_id"),
        pickup_drop_off = enum_ref::<PickupDropOffType>(opts),
        timepoint = enum_ref::<Timepoint>(opts),
    )
}

fn format_row(row: &Row, _: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    Ok(vec![
        text(row, "trip_id"),
        time(row, "arrival_time")?,
        time(row, "departure_time")?,
        text(row, "stop_id"),
        integer(row, "stop_sequence")?,
        text(row, "stop_headsign"),
        coded::<PickupDropOffType>(row, "pickup_type")?,
        coded::<PickupDropOffType>(row, "drop_off_type")?,
        float(row, "shape_dist_traveled")?,
        coded::<Timepoint>(row, "timepoint")?,
    ])
}

fn after_all(opts: &Options, state: &WorkingState) -> String {
    let table = opts.qualify(STOP_TIMES_FILE);
    // stop_sequence_consec starts at 0, like PostgreSQL's row_number() - 1
    let mut sql = format!(
        "UPDATE {table}
SET
\tstop_sequence_consec = derived.stop_sequence_consec,
\ttrip_start_time = derived.trip_start_time
FROM (
\tSELECT
\t\ttrip_id,
\t\tstop_sequence,
\t\trow_number() OVER (PARTITION BY trip_id ORDER BY stop_sequence ASC) - 1 AS stop_sequence_consec,
\t\tcoalesce(
\t\t\tfirst_value(departure_time) OVER (PARTITION BY trip_id ORDER BY stop_sequence ASC),
\t\t\tfirst_value(arrival_time) OVER (PARTITION BY trip_id ORDER BY stop_sequence ASC)
\t\t) AS trip_start_time
\tFROM {table}
) derived
WHERE {table}.trip_id = derived.trip_id
AND {table}.stop_sequence = derived.stop_sequence;

"
    );
    sql.push_str(&create_index(opts, STOP_TIMES_FILE, &["trip_id"]));
    sql.push_str(&create_index(opts, STOP_TIMES_FILE, &["stop_id"]));
    sql.push_str(&create_index(opts, STOP_TIMES_FILE, &["stop_sequence_consec"]));
    sql.push_str(&create_index(
        opts,
        STOP_TIMES_FILE,
        &["trip_id", "stop_sequence_consec"],
    ));
    // DuckDB cannot index INTERVAL columns.
    if opts.is_postgres() {
        sql.push_str(&create_index(opts, STOP_TIMES_FILE, &["arrival_time"]));
        sql.push_str(&create_index(opts, STOP_TIMES_FILE, &["departure_time"]));
    }

    let view_dependencies = [TRIPS_FILE, STOPS_FILE, ROUTES_FILE, AGENCY_FILE, SERVICE_DAYS_TASK];
    if view_dependencies.iter().all(|task| state.has_run(task)) {
        sql.push('\n');
        sql.push_str(&arrivals_departures_view(opts, state));
        sql.push('\n');
        sql.push_str(&connections_view(opts, state));
    }
    sql
}

/// Absolute point in time of a scheduled time on a service date.
///
/// GTFS times count from "noon minus 12h" in the agency timezone, which
/// differs from midnight on days with a DST change.
fn service_day_base(date: &str, tz: &str) -> String {
    format!(
        "make_timestamptz(
\t\t\tdate_part('year', {date})::INT,
\t\t\tdate_part('month', {date})::INT,
\t\t\tdate_part('day', {date})::INT,
\t\t\t12, 0, 0,
\t\t\t{tz}
\t\t) - INTERVAL '12 hours'"
    )
}

fn interval_seconds(opts: &Options, expr: &str) -> String {
    match opts.dialect {
        Dialect::Postgres => format!("EXTRACT(EPOCH FROM {expr})::INT"),
        Dialect::DuckDb => format!("epoch({expr})::INTEGER"),
    }
}

fn cte_keyword(opts: &Options) -> &'static str {
    match opts.dialect {
        Dialect::Postgres => "AS NOT MATERIALIZED",
        Dialect::DuckDb => "AS",
    }
}

/// Row id `trip:date:sequence:frequencies_row:frequencies_it`, each part base64.
fn instance_id(opts: &Options, sequence: &str, frequencies_row: &str, frequencies_it: &str) -> String {
    [
        "trip_id".to_string(),
        "CAST(\"date\" AS TEXT)".to_string(),
        format!("CAST({sequence} AS TEXT)"),
        frequencies_row.to_string(),
        frequencies_it.to_string(),
    ]
    .iter()
    .map(|part| base64(opts, part))
    .collect::<Vec<_>>()
    .join("\n\t\t|| ':' || ")
}

/// Shape of a view listing one row per trip instance and stop (or stop pair).
struct TripInstanceView {
    name: &'static str,
    id_column: &'static str,
    sequence_column: &'static str,
    /// Columns of the based CTE copied verbatim.
    passthrough: &'static [&'static str],
    /// Schedule time column and its absolute counterpart.
    times: &'static [(&'static str, &'static str)],
}

/// Builds the view as the union of plain stop_times trips and, if
/// frequencies were imported, one copy per headway-based departure.
fn trip_instance_view(
    opts: &Options,
    state: &WorkingState,
    view: &TripInstanceView,
    based_query: &str,
) -> String {
    let has_frequencies = state.has_run(FREQUENCIES_FILE);
    let frequencies = opts.qualify(FREQUENCIES_FILE);
    let passthrough = view.passthrough.join(",\n\t");
    let plain_times = view
        .times
        .iter()
        .map(|(time, absolute)| format!("{time},\n\tt_base + {time} AS {absolute}"))
        .collect::<Vec<_>>()
        .join(",\n\t");

    let mut sql = format!(
        "CREATE OR REPLACE VIEW {name} AS
WITH based {cte} (
{based_query}
)
SELECT
\t{id} AS {id_column},
\t-1 AS frequencies_row,
\t-1 AS frequencies_it,
\t{passthrough},
\t{plain_times},
\ttrip_start_time
FROM based",
        name = opts.qualify(view.name),
        cte = cte_keyword(opts),
        id = instance_id(opts, view.sequence_column, "'-1'", "'-1'"),
        id_column = view.id_column,
    );
    if !has_frequencies {
        sql.push_str(";\n");
        return sql;
    }

    let shifted_times = view
        .times
        .iter()
        .map(|(time, absolute)| {
            format!(
                "{time} - trip_start_time + instance_start AS {time},\n\tt_base + ({time} - trip_start_time + instance_start) AS {absolute}"
            )
        })
        .collect::<Vec<_>>()
        .join(",\n\t");
    // instances depart every headway_secs from start_time until before end_time
    let offsets = series(
        opts,
        "0",
        &format!(
            "{} - 1",
            interval_seconds(opts, "(frequencies.end_time - frequencies.start_time)")
        ),
        "frequencies.headway_secs",
    );
    sql.push_str(&format!(
        "
WHERE NOT EXISTS (
\tSELECT 1 FROM {frequencies} WHERE {frequencies}.trip_id = based.trip_id
)
UNION ALL
SELECT
\t{id} AS {id_column},
\tfrequencies_row,
\tfrequencies_it,
\t{passthrough},
\t{shifted_times},
\tinstance_start AS trip_start_time
FROM (
\tSELECT
\t\t*,
\t\trow_number() OVER (PARTITION BY trip_id, \"date\", frequencies_row, {sequence} ORDER BY offset_secs) AS frequencies_it,
\t\tstart_time + offset_secs * INTERVAL '1 second' AS instance_start
\tFROM (
\t\tSELECT
\t\t\tbased.*,
\t\t\tfrequencies.frequencies_row,
\t\t\tfrequencies.start_time,
\t\t\t{offsets} AS offset_secs
\t\tFROM based
\t\tJOIN {frequencies} frequencies ON frequencies.trip_id = based.trip_id
\t) frequencies_based
) frequencies_instances;
",
        id = instance_id(
            opts,
            view.sequence_column,
            "CAST(frequencies_row AS TEXT)",
            "CAST(frequencies_it AS TEXT)"
        ),
        id_column = view.id_column,
        sequence = view.sequence_column,
    ));
    sql
}

fn wheelchair_boarding(stop: &str, station: &str) -> String {
    format!(
        "coalesce(
\t\tnullif({stop}.wheelchair_boarding, 'no_info_or_inherit'),
\t\tnullif({station}.wheelchair_boarding, 'no_info_or_inherit'),
\t\t'no_info_or_inherit'
\t)"
    )
}

fn arrivals_departures_view(opts: &Options, state: &WorkingState) -> String {
    let based = format!(
        "\tSELECT
\t\tagency.agency_id,
\t\ttrips.route_id,
\t\troutes.route_short_name,
\t\troutes.route_long_name,
\t\troutes.route_type,
\t\ts.trip_id,
\t\ttrips.direction_id,
\t\ttrips.trip_headsign,
\t\ttrips.wheelchair_accessible,
\t\ttrips.bikes_allowed,
\t\tservice_days.service_id,
\t\ttrips.shape_id,
\t\tservice_days.\"date\",
\t\ts.stop_sequence,
\t\ts.stop_sequence_consec,
\t\ts.stop_headsign,
\t\ts.pickup_type,
\t\ts.drop_off_type,
\t\ts.shape_dist_traveled,
\t\ts.timepoint,
\t\tagency.agency_timezone AS tz,
\t\ts.arrival_time,
\t\ts.departure_time,
\t\ts.trip_start_time,
\t\t{t_base} AS t_base,
\t\ts.stop_id,
\t\tstops.stop_name,
\t\tstations.stop_id AS station_id,
\t\tstations.stop_name AS station_name,
\t\t{wheelchair_boarding} AS wheelchair_boarding
\tFROM {stop_times} s
\tJOIN {stops} stops ON s.stop_id = stops.stop_id
\tLEFT JOIN {stops} stations ON stops.parent_station = stations.stop_id
\tJOIN {trips} trips ON s.trip_id = trips.trip_id
\tJOIN {routes} routes ON trips.route_id = routes.route_id
\t-- routes.agency_id may be NULL in single-agency feeds
\tLEFT JOIN {agency} agency ON (
\t\troutes.agency_id IS NULL
\t\tOR routes.agency_id = agency.agency_id
\t)
\tJOIN {service_days} service_days ON trips.service_id = service_days.service_id",
        t_base = service_day_base("service_days.\"date\"", "agency.agency_timezone"),
        wheelchair_boarding = wheelchair_boarding("stops", "stations"),
        stop_times = opts.qualify(STOP_TIMES_FILE),
        stops = opts.qualify(STOPS_FILE),
        trips = opts.qualify(TRIPS_FILE),
        routes = opts.qualify(ROUTES_FILE),
        agency = opts.qualify(AGENCY_FILE),
        service_days = opts.qualify(SERVICE_DAYS_TASK),
    );
    trip_instance_view(
        opts,
        state,
        &TripInstanceView {
            name: "arrivals_departures",
            id_column: "arrival_departure_id",
            sequence_column: "stop_sequence",
            passthrough: &[
                "agency_id",
                "route_id",
                "route_short_name",
                "route_long_name",
                "route_type",
                "trip_id",
                "direction_id",
                "trip_headsign",
                "wheelchair_accessible",
                "bikes_allowed",
                "service_id",
                "shape_id",
                "\"date\"",
                "stop_sequence",
                "stop_sequence_consec",
                "stop_headsign",
                "pickup_type",
                "drop_off_type",
                "shape_dist_traveled",
                "timepoint",
                "tz",
                "stop_id",
                "stop_name",
                "station_id",
                "station_name",
                "wheelchair_boarding",
            ],
            times: &[("arrival_time", "t_arrival"), ("departure_time", "t_departure")],
        },
        &based,
    )
}

fn connections_view(opts: &Options, state: &WorkingState) -> String {
    let based = format!(
        "\tSELECT
\t\tagency.agency_id,
\t\ttrips.route_id,
\t\troutes.route_short_name,
\t\troutes.route_long_name,
\t\troutes.route_type,
\t\tfrom_st.trip_id,
\t\ttrips.direction_id,
\t\ttrips.trip_headsign,
\t\ttrips.wheelchair_accessible,
\t\ttrips.bikes_allowed,
\t\tservice_days.service_id,
\t\tservice_days.\"date\",
\t\tagency.agency_timezone AS tz,
\t\tfrom_st.trip_start_time,
\t\t{t_base} AS t_base,

\t\tfrom_st.stop_id AS from_stop_id,
\t\tfrom_stops.stop_name AS from_stop_name,
\t\tfrom_stations.stop_id AS from_station_id,
\t\tfrom_stations.stop_name AS from_station_name,
\t\t{from_wheelchair_boarding} AS from_wheelchair_boarding,
\t\tfrom_st.stop_headsign AS from_stop_headsign,
\t\tfrom_st.pickup_type AS from_pickup_type,
\t\tfrom_st.departure_time,
\t\tfrom_st.stop_sequence AS from_stop_sequence,
\t\tfrom_st.stop_sequence_consec AS from_stop_sequence_consec,
\t\tfrom_st.timepoint AS from_timepoint,

\t\tto_st.timepoint AS to_timepoint,
\t\tto_st.stop_sequence AS to_stop_sequence,
\t\tto_st.stop_sequence_consec AS to_stop_sequence_consec,
\t\tto_st.arrival_time,
\t\tto_st.drop_off_type AS to_drop_off_type,
\t\tto_st.stop_headsign AS to_stop_headsign,
\t\tto_st.stop_id AS to_stop_id,
\t\tto_stops.stop_name AS to_stop_name,
\t\tto_stations.stop_id AS to_station_id,
\t\tto_stations.stop_name AS to_station_name,
\t\t{to_wheelchair_boarding} AS to_wheelchair_boarding
\tFROM {stop_times} from_st
\tJOIN {stop_times} to_st ON (
\t\tfrom_st.trip_id = to_st.trip_id
\t\tAND from_st.stop_sequence_consec + 1 = to_st.stop_sequence_consec
\t)
\tJOIN {stops} from_stops ON from_st.stop_id = from_stops.stop_id
\tLEFT JOIN {stops} from_stations ON from_stops.parent_station = from_stations.stop_id
\tJOIN {stops} to_stops ON to_st.stop_id = to_stops.stop_id
\tLEFT JOIN {stops} to_stations ON to_stops.parent_station = to_stations.stop_id
\tJOIN {trips} trips ON from_st.trip_id = trips.trip_id
\tJOIN {routes} routes ON trips.route_id = routes.route_id
\tLEFT JOIN {agency} agency ON (
\t\troutes.agency_id IS NULL
\t\tOR routes.agency_id = agency.agency_id
\t)
\tJOIN {service_days} service_days ON trips.service_id = service_days.service_id",
        t_base = service_day_base("service_days.\"date\"", "agency.agency_timezone"),
        from_wheelchair_boarding = wheelchair_boarding("from_stops", "from_stations"),
        to_wheelchair_boarding = wheelchair_boarding("to_stops", "to_stations"),
        stop_times = opts.qualify(STOP_TIMES_FILE),
        stops = opts.qualify(STOPS_FILE),
        trips = opts.qualify(TRIPS_FILE),
        routes = opts.qualify(ROUTES_FILE),
        agency = opts.qualify(AGENCY_FILE),
        service_days = opts.qualify(SERVICE_DAYS_TASK),
    );
    trip_instance_view(
        opts,
        state,
        &TripInstanceView {
            name: "connections",
            id_column: "connection_id",
            sequence_column: "from_stop_sequence",
            passthrough: &[
                "agency_id",
                "route_id",
                "route_short_name",
                "route_long_name",
                "route_type",
                "trip_id",
                "direction_id",
                "trip_headsign",
                "wheelchair_accessible",
                "bikes_allowed",
                "service_id",
                "\"date\"",
                "tz",
                "from_stop_id",
                "from_stop_name",
                "from_station_id",
                "from_station_name",
                "from_wheelchair_boarding",
                "from_stop_headsign",
                "from_pickup_type",
                "from_stop_sequence",
                "from_stop_sequence_consec",
                "from_timepoint",
                "to_timepoint",
                "to_stop_sequence",
                "to_stop_sequence_consec",
                "to_drop_off_type",
                "to_stop_headsign",
                "to_stop_id",
                "to_stop_name",
                "to_station_id",
                "to_station_name",
                "to_wheelchair_boarding",
            ],
            times: &[("departure_time", "t_departure"), ("arrival_time", "t_arrival")],
        },
        &based,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::test_support::{duckdb, postgres};

    fn state_with(tasks: &[&str]) -> WorkingState {
        let mut state = WorkingState::new();
        for task in tasks {
            state.start_task(task);
        }
        state
    }

    const VIEW_DEPENDENCIES: &[&str] = &[
        AGENCY_FILE,
        STOPS_FILE,
        ROUTES_FILE,
        TRIPS_FILE,
        SERVICE_DAYS_TASK,
        STOP_TIMES_FILE,
    ];

    #[test]
    fn formats_stop_time_with_defaults() {
        let row = Row::from_pairs(&[
            ("trip_id", "T1"),
            ("arrival_time", "25:10:00"),
            ("departure_time", ""),
            ("stop_id", "S1"),
            ("stop_sequence", "4"),
        ]);
        let values = format_row(&row, &postgres(), &mut WorkingState::new()).unwrap();
        assert_eq!(values.len(), LAYOUT.columns.len());
        assert_eq!(values[1], SqlValue::text("25:10:00"));
        assert_eq!(values[2], SqlValue::Null);
        assert_eq!(values[4], SqlValue::Int(4));
        assert_eq!(values[6], SqlValue::text("regular"));
        assert_eq!(values[9], SqlValue::text("exact"));
    }

    #[test]
    fn rejects_malformed_times() {
        let row = Row::from_pairs(&[("trip_id", "T1"), ("arrival_time", "8:5:00")]);
        let err = format_row(&row, &postgres(), &mut WorkingState::new()).unwrap_err();
        assert_eq!(err.field, Some("arrival_time"));
    }

    #[test]
    fn derives_consecutive_sequence_and_trip_start() {
        let sql = after_all(&postgres(), &state_with(&[STOP_TIMES_FILE]));
        assert!(sql.starts_with("UPDATE \"public\".stop_times\nSET"));
        assert!(sql.contains("row_number() OVER (PARTITION BY trip_id ORDER BY stop_sequence ASC) - 1"));
        assert!(sql.contains("CREATE INDEX stop_times_arrival_time"));
        assert!(!sql.contains("CREATE OR REPLACE VIEW"));

        let duck = after_all(&duckdb(), &state_with(&[STOP_TIMES_FILE]));
        assert!(!duck.contains("stop_times_arrival_time"));
    }

    #[test]
    fn views_skip_frequencies_unless_imported() {
        let sql = after_all(&postgres(), &state_with(VIEW_DEPENDENCIES));
        assert!(sql.contains("CREATE OR REPLACE VIEW \"public\".arrivals_departures AS"));
        assert!(sql.contains("CREATE OR REPLACE VIEW \"public\".connections AS"));
        assert!(sql.contains("WITH based AS NOT MATERIALIZED ("));
        assert!(!sql.contains("frequencies_instances"));

        let mut tasks = VIEW_DEPENDENCIES.to_vec();
        tasks.push(FREQUENCIES_FILE);
        let sql = after_all(&postgres(), &state_with(&tasks));
        assert_eq!(sql.matches("frequencies_instances;").count(), 2);
        assert!(sql.contains("WHERE NOT EXISTS ("));
        assert!(sql.contains(
            "generate_series(0, EXTRACT(EPOCH FROM (frequencies.end_time - frequencies.start_time))::INT - 1, frequencies.headway_secs)"
        ));
    }

    #[test]
    fn duckdb_views_unnest_series() {
        let mut tasks = VIEW_DEPENDENCIES.to_vec();
        tasks.push(FREQUENCIES_FILE);
        let sql = after_all(&duckdb(), &state_with(&tasks));
        assert!(sql.contains("WITH based AS ("));
        assert!(sql.contains("unnest(generate_series(0, epoch("));
        assert!(sql.contains("to_base64(encode(trip_id))"));
    }
}
