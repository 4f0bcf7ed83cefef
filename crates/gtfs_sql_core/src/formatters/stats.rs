//! Optional statistics derived from the `arrivals_departures` and
//! `connections` views. Each is a view, a materialized view or (DuckDB) a
//! table, depending on its [`StatsMode`].

use crate::files::{
    STATS_ACTIVE_TRIPS_BY_HOUR_TASK, STATS_BY_AGENCY_ROUTE_STOP_HOUR_TASK,
    STATS_BY_ROUTE_DATE_TASK,
};
use crate::formatter::{FormatterDescriptor, Template};
use crate::options::{Dialect, Options, StatsMode};
use crate::working_state::WorkingState;

use super::{create_index, create_relation, series};

pub fn by_route_date() -> FormatterDescriptor {
    FormatterDescriptor::synthetic().after_all(Template::Computed(by_route_date_sql))
}

pub fn by_agency_route_stop_hour() -> FormatterDescriptor {
    FormatterDescriptor::synthetic().after_all(Template::Computed(by_agency_route_stop_hour_sql))
}

pub fn active_trips_by_hour() -> FormatterDescriptor {
    FormatterDescriptor::synthetic().after_all(Template::Computed(active_trips_by_hour_sql))
}

/// Indexes (materialized only) and the PostGraphile smart comment.
fn finish(
    opts: &Options,
    mode: StatsMode,
    name: &str,
    indexes: &[&[&str]],
    smart_comment: &str,
) -> String {
    let mut sql = String::new();
    if mode == StatsMode::MaterializedView {
        for columns in indexes {
            sql.push_str(&create_index(opts, name, columns));
        }
    }
    if opts.postgraphile {
        let kind = match mode {
            StatsMode::MaterializedView => "MATERIALIZED VIEW",
            _ => "VIEW",
        };
        sql.push_str(&format!(
            "COMMENT ON {kind} {} IS E'{smart_comment}';\n",
            opts.qualify(name)
        ));
    }
    sql
}

fn by_route_date_sql(opts: &Options, _: &WorkingState) -> String {
    let mode = opts.stats_by_route_id_and_date;
    if !mode.is_enabled() {
        return String::new();
    }
    let arrivals_departures = opts.qualify("arrivals_departures");
    let mut sql = format!(
        "{create}
WITH
\tby_svc_date AS (
\t\tSELECT
\t\t\troute_id,
\t\t\t\"date\",
\t\t\tEXTRACT(DOW FROM \"date\") AS dow,
\t\t\tcount(*) FILTER (WHERE stop_sequence_consec = 0) AS nr_of_trips,
\t\t\tcount(*) AS nr_of_arrs_deps
\t\tFROM {arrivals_departures}
\t\tGROUP BY route_id, \"date\"
\t),
\tby_effective_date AS (
\t\tSELECT
\t\t\troute_id,
\t\t\teffective_date AS \"date\",
\t\t\tEXTRACT(DOW FROM effective_date) AS dow,
\t\t\tcount(*) FILTER (WHERE stop_sequence_consec = 0) AS nr_of_trips,
\t\t\tcount(*) AS nr_of_arrs_deps
\t\tFROM (
\t\t\tSELECT
\t\t\t\troute_id,
\t\t\t\tstop_sequence_consec,
\t\t\t\tCAST(coalesce(t_departure, t_arrival) AS DATE) AS effective_date
\t\t\tFROM {arrivals_departures}
\t\t) effective
\t\tGROUP BY route_id, effective_date
\t)
SELECT *, TRUE AS is_effective
FROM by_effective_date
UNION ALL
SELECT *, FALSE AS is_effective
FROM by_svc_date;
",
        create = create_relation(opts, mode, STATS_BY_ROUTE_DATE_TASK),
    );
    sql.push_str(&finish(
        opts,
        mode,
        STATS_BY_ROUTE_DATE_TASK,
        &[
            &["route_id"],
            &["\"date\""],
            &["route_id", "\"date\"", "is_effective"],
            &["route_id", "dow", "is_effective"],
        ],
        "@name routeStats\\n@primaryKey route_id,date,is_effective\\n@foreignKey (route_id) references routes|@fieldName route|@foreignFieldName statsByDate",
    ));
    sql
}

fn by_agency_route_stop_hour_sql(opts: &Options, _: &WorkingState) -> String {
    let mode = opts.stats_by_agency_id_and_route_id_and_stop_and_hour;
    if !mode.is_enabled() {
        return String::new();
    }
    let mut sql = format!(
        "{create}
SELECT
\tagency_id,
\troute_id,
\tstop_id,
\tstation_id,
\tdate_trunc('hour', t_arrival) AS effective_hour,
\tcount(*) AS nr_of_arrs
FROM {arrivals_departures}
GROUP BY agency_id, route_id, stop_id, station_id, date_trunc('hour', t_arrival);
",
        create = create_relation(opts, mode, STATS_BY_AGENCY_ROUTE_STOP_HOUR_TASK),
        arrivals_departures = opts.qualify("arrivals_departures"),
    );
    sql.push_str(&finish(
        opts,
        mode,
        STATS_BY_AGENCY_ROUTE_STOP_HOUR_TASK,
        &[&["route_id"], &["stop_id"], &["station_id"], &["effective_hour"]],
        "@name hourlyStats\\n@primaryKey route_id,stop_id,effective_hour\\n@foreignKey (route_id) references routes|@fieldName route|@foreignFieldName statsByStopIdAndHour\\n@foreignKey (stop_id) references stops|@fieldName stop|@foreignFieldName statsByRouteIdAndHour",
    ));
    sql
}

fn active_trips_by_hour_sql(opts: &Options, _: &WorkingState) -> String {
    let mode = opts.stats_active_trips_by_hour;
    if !mode.is_enabled() {
        return String::new();
    }
    let feed_time_frame = opts.qualify("feed_time_frame");
    let hours = series(
        opts,
        "date_trunc('hour', min)",
        "date_trunc('hour', max)",
        "INTERVAL '1 hour'",
    );
    // trip instances are unique by trip, service date and frequency instance
    let trip_instance = match opts.dialect {
        Dialect::Postgres => "(c.trip_id, c.\"date\", c.frequencies_row, c.frequencies_it)",
        Dialect::DuckDb => "struct_pack(c.trip_id, c.\"date\", c.frequencies_row, c.frequencies_it)",
    };
    let mut sql = format!(
        "{create_time_frame}
SELECT
\tmin(coalesce(t_departure, t_arrival)) AS min,
\tmax(coalesce(t_arrival, t_departure)) AS max
FROM {arrivals_departures};

{create}
WITH all_hours AS (
\tSELECT {hours} AS \"hour\"
\tFROM {feed_time_frame}
)
SELECT
\tall_hours.\"hour\",
\tcount(DISTINCT {trip_instance}) FILTER (WHERE c.trip_id IS NOT NULL) AS nr_of_active_trips
FROM all_hours
LEFT JOIN {connections} c ON (
\tdate_trunc('hour', c.t_departure) <= all_hours.\"hour\"
\tAND date_trunc('hour', c.t_arrival) >= all_hours.\"hour\"
)
GROUP BY all_hours.\"hour\";
",
        create_time_frame = create_relation(opts, mode, "feed_time_frame"),
        arrivals_departures = opts.qualify("arrivals_departures"),
        create = create_relation(opts, mode, STATS_ACTIVE_TRIPS_BY_HOUR_TASK),
        connections = opts.qualify("connections"),
    );
    sql.push_str(&finish(
        opts,
        mode,
        STATS_ACTIVE_TRIPS_BY_HOUR_TASK,
        &[&["\"hour\""]],
        "@name hourlyActiveTripsStats\\n@primaryKey hour",
    ));
    sql
}
