use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};

use crate::error::ConvertError;
use crate::row::{CsvRowSource, RowSource};

pub const AGENCY_FILE: &str = "agency";
pub const STOPS_FILE: &str = "stops";
pub const ROUTES_FILE: &str = "routes";
pub const TRIPS_FILE: &str = "trips";
pub const STOP_TIMES_FILE: &str = "stop_times";
pub const CALENDAR_FILE: &str = "calendar";
pub const CALENDAR_DATES_FILE: &str = "calendar_dates";
pub const SHAPES_FILE: &str = "shapes";
pub const FREQUENCIES_FILE: &str = "frequencies";
pub const TRANSFERS_FILE: &str = "transfers";
pub const FEED_INFO_FILE: &str = "feed_info";
pub const LEVELS_FILE: &str = "levels";
pub const PATHWAYS_FILE: &str = "pathways";
pub const TRANSLATIONS_FILE: &str = "translations";

pub const VALID_LANG_CODES_TASK: &str = "valid_lang_codes";
pub const VALID_TIMEZONES_TASK: &str = "valid_timezones";
pub const SERVICE_DAYS_TASK: &str = "service_days";
pub const IMPORT_METADATA_TASK: &str = "import_metadata";
pub const STATS_BY_ROUTE_DATE_TASK: &str = "stats_by_route_date";
pub const STATS_BY_AGENCY_ROUTE_STOP_HOUR_TASK: &str = "stats_by_agency_route_stop_hour";
pub const STATS_ACTIVE_TRIPS_BY_HOUR_TASK: &str = "stats_active_trips_by_hour";

/// Files whose values may be referenced from translations.txt.
pub const TRANSLATABLE_FILES: &[&str] = &[
    AGENCY_FILE,
    STOPS_FILE,
    ROUTES_FILE,
    TRIPS_FILE,
    STOP_TIMES_FILE,
    PATHWAYS_FILE,
    LEVELS_FILE,
    FEED_INFO_FILE,
];

/// Where the rows of one GTFS file come from.
pub enum FileSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Rows(Box<dyn RowSource>),
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Rows(_) => f.write_str("Rows(..)"),
        }
    }
}

impl FileSource {
    /// Opens the source and reads its header row.
    pub fn open(self, file: &str) -> Result<Box<dyn RowSource>, ConvertError> {
        match self {
            Self::Path(path) => {
                let handle = File::open(&path).map_err(|source| ConvertError::Open {
                    file: file.to_string(),
                    path: path.clone(),
                    source,
                })?;
                let rows = CsvRowSource::from_reader(BufReader::new(handle)).map_err(|source| {
                    ConvertError::Read {
                        file: file.to_string(),
                        source,
                    }
                })?;
                Ok(Box::new(rows))
            }
            Self::Bytes(bytes) => {
                let rows = CsvRowSource::from_reader(Cursor::new(bytes)).map_err(|source| {
                    ConvertError::Read {
                        file: file.to_string(),
                        source,
                    }
                })?;
                Ok(Box::new(rows))
            }
            Self::Rows(rows) => Ok(rows),
        }
    }
}

/// One caller-supplied GTFS file.
#[derive(Debug)]
pub struct GtfsFile {
    pub name: String,
    pub source: FileSource,
}

impl GtfsFile {
    /// Names the file after its basename without extension,
    /// e.g. `/feed/stop_times.txt` becomes `stop_times`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            source: FileSource::Path(path.to_path_buf()),
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Bytes(bytes.into()),
        }
    }

    pub fn from_rows(name: impl Into<String>, rows: impl RowSource + 'static) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Rows(Box::new(rows)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_files_after_their_stem() {
        let file = GtfsFile::from_path("/data/feed/stop_times.txt");
        assert_eq!(file.name, "stop_times");
        assert!(matches!(file.source, FileSource::Path(_)));

        assert_eq!(GtfsFile::from_path("agency").name, "agency");
    }

    #[test]
    fn missing_path_reports_file_name() {
        let file = GtfsFile::from_path("/nonexistent/gtfs/stops.txt");
        let err = match file.source.open(&file.name) {
            Err(err) => err,
            Ok(_) => panic!("opening a missing file must fail"),
        };
        assert_eq!(err.gtfs_file(), Some("stops"));
        assert_eq!(err.code(), "GTFS_READ_FAILED");
    }
}
