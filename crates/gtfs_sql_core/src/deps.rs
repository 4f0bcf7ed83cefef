//! Static dependency table between GTFS files and synthetic tasks.

use std::collections::BTreeMap;

use crate::files::*;
use crate::options::Options;

/// Task name to the names of the tasks that must run before it.
pub type DependencyTable = BTreeMap<String, Vec<String>>;

/// Produces the dependency table for a run. Receives the resolved options
/// and the requested file names.
pub type DeclareDependencies = fn(&Options, &[String]) -> DependencyTable;

/// Tasks present in every run, whether or not a file was supplied. calendar
/// and calendar_dates always exist because service_days reads both.
pub const ALWAYS_PRESENT_TASKS: &[&str] = &[
    VALID_LANG_CODES_TASK,
    VALID_TIMEZONES_TASK,
    CALENDAR_FILE,
    CALENDAR_DATES_FILE,
    SERVICE_DAYS_TASK,
];

/// Synthetic tasks enabled by options, in declaration order.
pub fn optional_tasks(opts: &Options) -> Vec<&'static str> {
    let mut tasks = Vec::new();
    if opts.import_metadata {
        tasks.push(IMPORT_METADATA_TASK);
    }
    if opts.stats_by_route_id_and_date.is_enabled() {
        tasks.push(STATS_BY_ROUTE_DATE_TASK);
    }
    if opts.stats_by_agency_id_and_route_id_and_stop_and_hour.is_enabled() {
        tasks.push(STATS_BY_AGENCY_ROUTE_STOP_HOUR_TASK);
    }
    if opts.stats_active_trips_by_hour.is_enabled() {
        tasks.push(STATS_ACTIVE_TRIPS_BY_HOUR_TASK);
    }
    tasks
}

pub fn default_dependencies(opts: &Options, requested: &[String]) -> DependencyTable {
    let is_requested = |name: &str| requested.iter().any(|r| r == name);
    let mut table = DependencyTable::new();
    let mut declare = |task: &str, deps: Vec<&str>| {
        table.insert(
            task.to_string(),
            deps.into_iter().map(str::to_string).collect(),
        );
    };

    declare(AGENCY_FILE, vec![VALID_TIMEZONES_TASK]);

    let mut stops = vec![VALID_TIMEZONES_TASK];
    if !opts.stops_without_level_id {
        stops.push(LEVELS_FILE);
    }
    declare(STOPS_FILE, stops);
    declare(TRANSFERS_FILE, vec![STOPS_FILE]);
    declare(PATHWAYS_FILE, vec![STOPS_FILE]);

    declare(
        ROUTES_FILE,
        if opts.routes_without_agency_id {
            vec![]
        } else {
            vec![AGENCY_FILE]
        },
    );

    let mut trips = vec![ROUTES_FILE, SERVICE_DAYS_TASK];
    if !opts.trips_without_shape_id {
        trips.push(SHAPES_FILE);
    }
    declare(TRIPS_FILE, trips);
    declare(FREQUENCIES_FILE, vec![TRIPS_FILE]);

    // the arrivals/departures views expand frequencies if they exist
    let mut stop_times = vec![TRIPS_FILE, STOPS_FILE, SERVICE_DAYS_TASK];
    if is_requested(FREQUENCIES_FILE) {
        stop_times.push(FREQUENCIES_FILE);
    }
    declare(STOP_TIMES_FILE, stop_times);

    declare(FEED_INFO_FILE, vec![VALID_LANG_CODES_TASK]);

    let mut translations = vec![VALID_LANG_CODES_TASK];
    translations.extend(
        TRANSLATABLE_FILES
            .iter()
            .copied()
            .filter(|file| is_requested(*file)),
    );
    declare(TRANSLATIONS_FILE, translations);

    declare(SERVICE_DAYS_TASK, vec![CALENDAR_FILE, CALENDAR_DATES_FILE]);

    declare(STATS_BY_ROUTE_DATE_TASK, vec![STOP_TIMES_FILE]);
    declare(STATS_BY_AGENCY_ROUTE_STOP_HOUR_TASK, vec![STOP_TIMES_FILE]);
    declare(STATS_ACTIVE_TRIPS_BY_HOUR_TASK, vec![STOP_TIMES_FILE]);
    declare(IMPORT_METADATA_TASK, vec![]);

    table
}
