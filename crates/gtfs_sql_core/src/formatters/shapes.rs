use crate::error::RowError;
use crate::files::SHAPES_FILE;
use crate::formatter::{FormatterDescriptor, TableLayout, Template};
use crate::options::{Dialect, Options};
use crate::row::Row;
use crate::sql::SqlValue;
use crate::working_state::WorkingState;

use super::{create_index, float, integer, point, point_type, text};

const LAYOUT: TableLayout = TableLayout {
    table: "shapes",
    columns: &[
        "shape_id",
        "shape_pt_sequence",
        "shape_pt_loc",
        "shape_dist_traveled",
    ],
};

pub fn descriptor() -> FormatterDescriptor {
    FormatterDescriptor::gtfs_file(LAYOUT, format_row)
        .before_all(Template::Computed(before_all))
        .after_all(Template::Computed(after_all))
}

// https://gtfs.org/documentation/schedule/reference/#shapestxt
fn before_all(opts: &Options, _: &WorkingState) -> String {
    format!(
        "CREATE TABLE {table} (
\tshape_id TEXT NOT NULL,
\tshape_pt_sequence INT NOT NULL,
\tPRIMARY KEY (shape_id, shape_pt_sequence),
\tshape_pt_loc {point} NOT NULL,
\tshape_dist_traveled REAL
);
",
        table = opts.qualify(SHAPES_FILE),
        point = point_type(opts),
    )
}

fn format_row(row: &Row, _: &Options, _: &mut WorkingState) -> Result<Vec<SqlValue>, RowError> {
    Ok(vec![
        text(row, "shape_id"),
        integer(row, "shape_pt_sequence")?,
        point(row, "shape_pt_lon", "shape_pt_lat")?,
        float(row, "shape_dist_traveled")?,
    ])
}

/// One line geometry per shape, points in sequence order.
fn after_all(opts: &Options, _: &WorkingState) -> String {
    let shapes = opts.qualify(SHAPES_FILE);
    let (line, distances) = match opts.dialect {
        Dialect::Postgres => (
            "ST_MakeLine(array_agg(shape_pt_loc::geometry ORDER BY shape_pt_sequence))::geography",
            "array_agg(shape_dist_traveled ORDER BY shape_pt_sequence)",
        ),
        Dialect::DuckDb => (
            "ST_MakeLine(list(shape_pt_loc ORDER BY shape_pt_sequence))",
            "list(shape_dist_traveled ORDER BY shape_pt_sequence)",
        ),
    };
    let mut sql = create_index(opts, SHAPES_FILE, &["shape_id"]);
    sql.push_str(&format!(
        "
CREATE OR REPLACE VIEW {view} AS
SELECT
\tshape_id,
\t{distances} AS distances_travelled,
\t{line} AS shape
FROM {shapes}
GROUP BY shape_id;
",
        view = opts.qualify("shapes_aggregated"),
    ));
    sql
}
