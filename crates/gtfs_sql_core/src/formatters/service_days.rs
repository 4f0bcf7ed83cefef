use crate::formatter::{FormatterDescriptor, Template};
use crate::options::{Dialect, Options, StatsMode};
use crate::working_state::WorkingState;

use super::{create_index, create_relation, series};

/// Expands calendar and calendar_dates into one row per (service_id, date).
pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::synthetic().after_all(Template::Computed(after_all))
}

fn after_all(opts: &Options, _: &WorkingState) -> String {
    let calendar = opts.qualify("calendar");
    let calendar_dates = opts.qualify("calendar_dates");
    let all_days = series(
        opts,
        "start_date::TIMESTAMP",
        "end_date::TIMESTAMP",
        "'1 day'::INTERVAL",
    );
    let weekday_filter = [
        "sunday",
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
    ]
    .iter()
    .enumerate()
    .map(|(dow, day)| format!("({day} = 'available' AND dow = {dow})"))
    .collect::<Vec<_>>()
    .join("\n\t\tOR ");

    let mut sql = format!(
        "{create}
SELECT
\tbase_days.service_id,
\tbase_days.\"date\"
FROM (
\tSELECT service_id, \"date\"
\tFROM (
\t\tSELECT
\t\t\tservice_id,
\t\t\t\"date\"::DATE AS \"date\",
\t\t\tdate_part('dow', \"date\") AS dow,
\t\t\tsunday, monday, tuesday, wednesday, thursday, friday, saturday
\t\tFROM (
\t\t\tSELECT *, {all_days} AS \"date\"
\t\t\tFROM {calendar}
\t\t) all_days_raw
\t) all_days
\tWHERE {weekday_filter}
) base_days
LEFT JOIN (
\tSELECT service_id, \"date\"
\tFROM {calendar_dates}
\tWHERE exception_type = 'removed'
) removed
ON base_days.service_id = removed.service_id
AND base_days.\"date\" = removed.\"date\"
WHERE removed.\"date\" IS NULL
UNION
SELECT service_id, \"date\"
FROM {calendar_dates}
WHERE exception_type = 'added'
ORDER BY service_id, \"date\";

",
        create = create_relation(opts, StatsMode::MaterializedView, "service_days"),
    );
    sql.push_str(&format!(
        "CREATE UNIQUE INDEX service_days_unique_service_id_date ON {} (service_id, \"date\");\n",
        opts.qualify("service_days")
    ));
    sql.push_str(&create_index(opts, "service_days", &["service_id"]));
    sql.push_str(&create_index(opts, "service_days", &["\"date\""]));
    if opts.dialect == Dialect::Postgres && opts.postgraphile {
        sql.push_str(&format!(
            "COMMENT ON MATERIALIZED VIEW {} IS E'@name serviceDates\\n@primaryKey service_id,date';\n",
            opts.qualify("service_days")
        ));
    }
    sql
}
