use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::GtfsParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTypeInfo {
    pub code: &'static str,
    pub description: &'static str,
}

const fn rt(code: &'static str, description: &'static str) -> RouteTypeInfo {
    RouteTypeInfo { code, description }
}

/// Route types every scheme accepts.
/// https://gtfs.org/documentation/schedule/reference/#routestxt
pub const BASIC_ROUTE_TYPES: &[RouteTypeInfo] = &[
    rt("0", "Tram, Streetcar, Light rail"),
    rt("1", "Subway, Metro"),
    rt("2", "Rail"),
    rt("3", "Bus"),
    rt("4", "Ferry"),
    rt("5", "Cable tram"),
    rt("6", "Aerial lift, suspended cable car"),
    rt("7", "Funicular"),
    rt("11", "Trolleybus"),
    rt("12", "Monorail"),
];

// https://developers.google.com/transit/gtfs/reference/extended-route-types
const GOOGLE_EXTENDED_ROUTE_TYPES: &[RouteTypeInfo] = &[
    rt("100", "Railway Service"),
    rt("101", "High Speed Rail Service"),
    rt("102", "Long Distance Trains"),
    rt("103", "Inter Regional Rail Service"),
    rt("104", "Car Transport Rail Service"),
    rt("105", "Sleeper Rail Service"),
    rt("106", "Regional Rail Service"),
    rt("107", "Tourist Railway Service"),
    rt("108", "Rail Shuttle (Within Complex)"),
    rt("109", "Suburban Railway"),
    rt("110", "Replacement Rail Service"),
    rt("111", "Special Rail Service"),
    rt("112", "Lorry Transport Rail Service"),
    rt("113", "All Rail Services"),
    rt("114", "Cross-Country Rail Service"),
    rt("115", "Vehicle Transport Rail Service"),
    rt("116", "Rack and Pinion Railway"),
    rt("117", "Additional Rail Service"),
    rt("200", "Coach Service"),
    rt("201", "International Coach Service"),
    rt("202", "National Coach Service"),
    rt("203", "Shuttle Coach Service"),
    rt("204", "Regional Coach Service"),
    rt("205", "Special Coach Service"),
    rt("206", "Sightseeing Coach Service"),
    rt("207", "Tourist Coach Service"),
    rt("208", "Commuter Coach Service"),
    rt("209", "All Coach Services"),
    rt("400", "Urban Railway Service"),
    rt("401", "Metro Service"),
    rt("402", "Underground Service"),
    rt("403", "Urban Railway Service"),
    rt("404", "All Urban Railway Services"),
    rt("405", "Monorail"),
    rt("700", "Bus Service"),
    rt("701", "Regional Bus Service"),
    rt("702", "Express Bus Service"),
    rt("703", "Stopping Bus Service"),
    rt("704", "Local Bus Service"),
    rt("705", "Night Bus Service"),
    rt("706", "Post Bus Service"),
    rt("707", "Special Needs Bus"),
    rt("708", "Mobility Bus Service"),
    rt("709", "Mobility Bus for Registered Disabled"),
    rt("710", "Sightseeing Bus"),
    rt("711", "Shuttle Bus"),
    rt("712", "School Bus"),
    rt("713", "School and Public Service Bus"),
    rt("714", "Rail Replacement Bus Service"),
    rt("715", "Demand and Response Bus Service"),
    rt("716", "All Bus Services"),
    rt("800", "Trolleybus Service"),
    rt("900", "Tram Service"),
    rt("901", "City Tram Service"),
    rt("902", "Local Tram Service"),
    rt("903", "Regional Tram Service"),
    rt("904", "Sightseeing Tram Service"),
    rt("905", "Shuttle Tram Service"),
    rt("906", "All Tram Services"),
    rt("1000", "Water Transport Service"),
    rt("1100", "Air Service"),
    rt("1200", "Ferry Service"),
    rt("1300", "Aerial Lift Service"),
    rt("1400", "Funicular Service"),
    rt("1500", "Taxi Service"),
    rt("1501", "Communal Taxi Service"),
    rt("1502", "Water Taxi Service"),
    rt("1503", "Rail Taxi Service"),
    rt("1504", "Bike Taxi Service"),
    rt("1505", "Licensed Taxi Service"),
    rt("1506", "Private Hire Service Vehicle"),
    rt("1507", "All Taxi Services"),
    rt("1700", "Miscellaneous Service"),
    rt("1702", "Horse-drawn Carriage"),
];

// Hierarchical Vehicle Types from the TPEG pti_table_01 that are not part of
// the Google subset above.
const TPEG_PTI_ADDITIONAL_ROUTE_TYPES: &[RouteTypeInfo] = &[
    rt("300", "Suburban Railway Service"),
    rt("500", "Metro Service"),
    rt("600", "Underground Service"),
    rt("1001", "International Car Ferry Service"),
    rt("1002", "National Car Ferry Service"),
    rt("1003", "Regional Car Ferry Service"),
    rt("1004", "Local Car Ferry Service"),
    rt("1005", "International Passenger Ferry Service"),
    rt("1006", "National Passenger Ferry Service"),
    rt("1007", "Regional Passenger Ferry Service"),
    rt("1008", "Local Passenger Ferry Service"),
    rt("1009", "Post Boat Service"),
    rt("1010", "Train Ferry Service"),
    rt("1011", "Road-Link Ferry Service"),
    rt("1012", "Airport-Link Ferry Service"),
    rt("1013", "Car High-Speed Ferry Service"),
    rt("1014", "Passenger High-Speed Ferry Service"),
    rt("1015", "Sightseeing Boat Service"),
    rt("1016", "School Boat"),
    rt("1017", "Cable-Drawn Boat Service"),
    rt("1018", "River Bus Service"),
    rt("1019", "Scheduled Ferry Service"),
    rt("1020", "Shuttle Ferry Service"),
    rt("1021", "All Water Transport Services"),
    rt("1101", "International Air Service"),
    rt("1102", "Domestic Air Service"),
    rt("1103", "Intercontinental Air Service"),
    rt("1104", "Domestic Scheduled Air Service"),
    rt("1105", "Shuttle Air Service"),
    rt("1106", "Intercontinental Charter Air Service"),
    rt("1107", "International Charter Air Service"),
    rt("1108", "Round-Trip Charter Air Service"),
    rt("1109", "Sightseeing Air Service"),
    rt("1110", "Helicopter Air Service"),
    rt("1111", "Domestic Charter Air Service"),
    rt("1112", "Schengen-Area Air Service"),
    rt("1113", "Airship Service"),
    rt("1114", "All Air Services"),
    rt("1301", "Telecabin Service"),
    rt("1302", "Cable Car Service"),
    rt("1303", "Elevator Service"),
    rt("1304", "Chair Lift Service"),
    rt("1305", "Drag Lift Service"),
    rt("1306", "Small Telecabin Service"),
    rt("1307", "All Telecabin Services"),
    rt("1401", "Funicular Service"),
    rt("1402", "All Funicular Service"),
    rt("1600", "Self Drive"),
    rt("1601", "Hire Car"),
    rt("1602", "Hire Van"),
    rt("1603", "Hire Motorbike"),
    rt("1604", "Hire Cycle"),
    rt("1701", "Cable Car"),
];

/// Which `route_type` codes beyond the basic ones are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteTypesScheme {
    Basic,
    #[default]
    GoogleExtended,
    TpegPti,
}

impl RouteTypesScheme {
    pub const NAMES: &'static [&'static str] = &["basic", "google-extended", "tpeg-pti"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::GoogleExtended => "google-extended",
            Self::TpegPti => "tpeg-pti",
        }
    }

    /// Basic route types followed by the scheme's extended ones, in the
    /// order they appear in the generated SQL enum.
    pub fn route_types(self) -> impl Iterator<Item = &'static RouteTypeInfo> {
        let (google, tpeg): (&[RouteTypeInfo], &[RouteTypeInfo]) = match self {
            Self::Basic => (&[], &[]),
            Self::GoogleExtended => (GOOGLE_EXTENDED_ROUTE_TYPES, &[]),
            Self::TpegPti => (GOOGLE_EXTENDED_ROUTE_TYPES, TPEG_PTI_ADDITIONAL_ROUTE_TYPES),
        };
        BASIC_ROUTE_TYPES.iter().chain(google).chain(tpeg)
    }

    pub fn accepts(self, code: &str) -> bool {
        self.route_types().any(|info| info.code == code)
    }
}

impl fmt::Display for RouteTypesScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteTypesScheme {
    type Err = GtfsParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "basic" => Ok(Self::Basic),
            "google-extended" => Ok(Self::GoogleExtended),
            "tpeg-pti" => Ok(Self::TpegPti),
            other => Err(GtfsParseError::UnknownCode {
                field: "routeTypesScheme",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_codes_depend_on_scheme() {
        assert!(RouteTypesScheme::GoogleExtended.accepts("200"));
        assert!(!RouteTypesScheme::Basic.accepts("200"));
        assert!(RouteTypesScheme::Basic.accepts("3"));
        assert!(RouteTypesScheme::TpegPti.accepts("1010"));
        assert!(!RouteTypesScheme::GoogleExtended.accepts("1010"));
    }

    #[test]
    fn codes_are_unique_within_a_scheme() {
        let mut codes: Vec<_> = RouteTypesScheme::TpegPti
            .route_types()
            .map(|info| info.code)
            .collect();
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }

    #[test]
    fn parses_scheme_names() {
        assert_eq!(
            "tpeg-pti".parse::<RouteTypesScheme>().unwrap(),
            RouteTypesScheme::TpegPti
        );
        assert!("extended".parse::<RouteTypesScheme>().is_err());
        let json = serde_json::to_string(&RouteTypesScheme::GoogleExtended).unwrap();
        assert_eq!(json, "\"google-extended\"");
    }
}
