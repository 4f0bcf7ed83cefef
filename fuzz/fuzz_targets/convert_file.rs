#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

use gtfs_via_sql_core::{
    Converter, Dialect, GtfsFile, NoOpProgressHandler, OptionOverrides, WriterSink,
};

const FILES: &[&str] = &[
    "agency",
    "calendar",
    "calendar_dates",
    "frequencies",
    "levels",
    "pathways",
    "routes",
    "shapes",
    "stop_times",
    "stops",
    "transfers",
    "translations",
    "trips",
    "feed_info",
];

#[derive(Debug, Arbitrary)]
struct FuzzData {
    file: u8,
    duckdb: bool,
    contents: Vec<u8>,
}

fuzz_target!(|data: FuzzData| {
    let name = FILES[usize::from(data.file) % FILES.len()];
    let overrides = OptionOverrides {
        dialect: Some(if data.duckdb {
            Dialect::DuckDb
        } else {
            Dialect::Postgres
        }),
        silent: Some(true),
        ..Default::default()
    };
    let converter = Converter::default().with_progress(Arc::new(NoOpProgressHandler));
    // Malformed input must surface as an error, never as a panic.
    let _ = converter.convert_into(
        vec![GtfsFile::from_bytes(name, data.contents)],
        &overrides,
        WriterSink::new(std::io::sink()),
    );
});
