//! Lookup tables other tables reference instead of validating values
//! themselves.

use crate::formatter::{FormatterDescriptor, Template};
use crate::options::{Dialect, Options};
use crate::working_state::WorkingState;

pub fn valid_timezones() -> FormatterDescriptor {
    FormatterDescriptor::synthetic().after_all(Template::Computed(timezones_sql))
}

pub fn valid_lang_codes() -> FormatterDescriptor {
    FormatterDescriptor::synthetic().after_all(Template::Computed(lang_codes_sql))
}

fn timezones_sql(opts: &Options, _: &WorkingState) -> String {
    let table = opts.qualify("valid_timezones");
    let source = match opts.dialect {
        Dialect::Postgres => "pg_timezone_names",
        // provided by the icu extension
        Dialect::DuckDb => "pg_timezone_names()",
    };
    format!(
        "CREATE TABLE {table} (
\ttz TEXT PRIMARY KEY
);
INSERT INTO {table} (tz)
SELECT DISTINCT name
FROM {source};
"
    )
}

// Collation names approximate the set of BCP 47 tags the database knows.
// Each tag is added verbatim, lower-cased, with an upper-cased region
// (`de-DE`) and as its bare language subtag.
fn lang_codes_sql(opts: &Options, _: &WorkingState) -> String {
    let table = opts.qualify("valid_lang_codes");
    let (tags, variants) = match opts.dialect {
        Dialect::Postgres => (
            "SELECT replace(split_part(collname, '-x-', 1), '_', '-') AS tag FROM pg_collation",
            "unnest(ARRAY[
\t\ttag,
\t\tlower(tag),
\t\tCASE WHEN tag LIKE '%-%' THEN lower(split_part(tag, '-', 1)) || '-' || upper(split_part(tag, '-', 2)) ELSE lower(tag) END,
\t\tlower(split_part(tag, '-', 1))
\t]) AS variants(code)",
        ),
        Dialect::DuckDb => (
            "SELECT replace(collname, '_', '-') AS tag FROM pragma_collations()",
            "unnest([
\t\ttag,
\t\tlower(tag),
\t\tCASE WHEN tag LIKE '%-%' THEN lower(split_part(tag, '-', 1)) || '-' || upper(split_part(tag, '-', 2)) ELSE lower(tag) END,
\t\tlower(split_part(tag, '-', 1))
\t]) AS variants(code)",
        ),
    };
    format!(
        "CREATE TABLE {table} (
\tlang_code TEXT PRIMARY KEY
);
INSERT INTO {table} (lang_code)
SELECT DISTINCT code
FROM (
\t{tags}
) collations,
{variants}
WHERE code <> ''
UNION
-- multilingual feeds
SELECT 'mul';
"
    )
}
