use crate::error::RowError;
use crate::files::{TRANSLATABLE_FILES, TRANSLATIONS_FILE, VALID_LANG_CODES_TASK};
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::Options;
use crate::row::Row;
use crate::sql::{quote_literal, SqlValue};
use crate::working_state::WorkingState;

use super::{create_index, lang_code, references, text};

const LAYOUT: TableLayout = TableLayout {
    table: "translations",
    columns: &[
        "table_name",
        "field_name",
        "language",
        "translation",
        "record_id",
        "record_sub_id",
        "field_value",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .after_all(Template::Computed(after_all))
}

// https://gtfs.org/documentation/schedule/reference/#translationstxt
fn before_all(opts: &Options, state: &WorkingState) -> String {
    let table_names = TRANSLATABLE_FILES
        .iter()
        .map(|name| quote_literal(name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE {table} (
\ttable_name TEXT NOT NULL CHECK (table_name IN ({table_names})),
\tfield_name TEXT NOT NULL,
\tlanguage TEXT NOT NULL{lang_ref},
\ttranslation TEXT NOT NULL,
\trecord_id TEXT,
\trecord_sub_id TEXT,
\tfield_value TEXT,
\tCONSTRAINT field_value_or_record_id CHECK (field_value IS NULL OR record_id IS NULL),
\tCONSTRAINT not_with_feed_info CHECK (field_value IS NULL OR table_name != 'feed_info'),
\tUNIQUE (table_name, field_name, language, record_id, record_sub_id, field_value)
);
",
        table = opts.qualify(TRANSLATIONS_FILE),
        lang_ref = references(opts, state, VALID_LANG_CODES_TASK, "lang_code"),
    )
}

fn format_row(row: &Row, opts: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    let table_name = row.get("table_name").unwrap_or_default();
    if !TRANSLATABLE_FILES.contains(&table_name) {
        return Err(
            RowError::invalid_value("table_name", table_name).with_explanation(format!(
                "table_name must be one of {}",
                TRANSLATABLE_FILES.join(", ")
            )),
        );
    }
    if row.get("field_value").is_some() {
        if row.get("record_id").is_some() {
            return Err(RowError::new("record_id is forbidden when field_value is set")
                .with_field("record_id"));
        }
        if table_name == "feed_info" {
            return Err(RowError::new("field_value is forbidden for feed_info")
                .with_field("field_value"));
        }
    }
    Ok(vec![
        SqlValue::text(table_name),
        text(row, "field_name"),
        lang_code(row, "language", opts),
        text(row, "translation"),
        text(row, "record_id"),
        text(row, "record_sub_id"),
        text(row, "field_value"),
    ])
}

fn after_all(opts: &Options, _: &WorkingState) -> String {
    create_index(
        opts,
        TRANSLATIONS_FILE,
        &["table_name", "field_name", "language", "record_id"],
    )
}
