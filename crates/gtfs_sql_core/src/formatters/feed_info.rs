use crate::error::RowError;
use crate::files::VALID_LANG_CODES_TASK;
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{date, lang_code, references, text};

const LAYOUT: TableLayout = TableLayout {
    table: "feed_info",
    columns: &[
        "feed_publisher_name",
        "feed_publisher_url",
        "feed_lang",
        "default_lang",
        "feed_start_date",
        "feed_end_date",
        "feed_version",
        "feed_contact_email",
        "feed_contact_url",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row).before_all(Template::Computed(before_all))
}

// https://gtfs.org/documentation/schedule/reference/#feed_infotxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    let lang_ref = references(opts, state, VALID_LANG_CODES_TASK, "lang_code");
    format!(
        "CREATE TABLE {table} (
\tfeed_publisher_name TEXT PRIMARY KEY,
\tfeed_publisher_url TEXT NOT NULL,
\tfeed_lang TEXT NOT NULL{lang_ref},
\tdefault_lang TEXT{lang_ref},
\tfeed_start_date DATE,
\tfeed_end_date DATE,
\tfeed_version TEXT,
\tfeed_contact_email TEXT,
\tfeed_contact_url TEXT
);
",
        table = opts.qualify(LAYOUT.table),
    )
}

fn format_row(row: &Row, opts: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    Ok(vec![
        text(row, "feed_publisher_name"),
        text(row, "feed_publisher_url"),
        lang_code(row, "feed_lang", opts),
        lang_code(row, "default_lang", opts),
        date(row, "feed_start_date")?,
        date(row, "feed_end_date")?,
        text(row, "feed_version"),
        text(row, "feed_contact_email"),
        text(row, "feed_contact_url"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::test_support::options;
    use crate::options::OptionOverrides;

    #[test]
    fn lower_cases_language_codes_on_request() {
        let row = Row::from_pairs(&[
            ("feed_publisher_name", "Publisher"),
            ("feed_publisher_url", "https://example.org"),
            ("feed_lang", "de-DE"),
            ("feed_start_date", "20240101"),
        ]);
        let opts = options(OptionOverrides {
            lower_case_language_codes: Some(true),
            ..Default::default()
        });
        let values = format_row(&row, &opts, &mut WorkingState::new()).unwrap();
        assert_eq!(values[2], SqlValue::text("de-de"));
        assert_eq!(values[3], SqlValue::Null);
        assert_eq!(values[4], SqlValue::text("2024-01-01"));
    }
}
