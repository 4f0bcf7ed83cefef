//! GTFS enumerations stored as numeric codes in the CSV files and as
//! named SQL enum labels in the generated schema.

use crate::GtfsParseError;

pub trait CodedValue: Sized + Copy + 'static {
    /// Name of the SQL enum type holding the labels.
    const SQL_TYPE: &'static str;
    const VARIANTS: &'static [Self];

    fn from_code(code: &str) -> Option<Self>;
    fn code(self) -> &'static str;
    fn sql_label(self) -> &'static str;

    /// Value GTFS assigns to an empty field, if any.
    fn default_for_blank() -> Option<Self> {
        None
    }

    fn sql_labels() -> Vec<&'static str> {
        Self::VARIANTS.iter().map(|v| v.sql_label()).collect()
    }

    /// Parses a raw field. `Ok(None)` means blank without a GTFS default.
    fn parse_field(field: &'static str, raw: &str) -> Result<Option<Self>, GtfsParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default_for_blank());
        }
        Self::from_code(trimmed)
            .map(Some)
            .ok_or_else(|| GtfsParseError::UnknownCode {
                field,
                value: trimmed.to_string(),
            })
    }
}

macro_rules! coded_enum {
    (@blank) => { None };
    (@blank $variant:ident) => { Some(Self::$variant) };
    (
        $(#[$meta:meta])*
        pub enum $name:ident as $sql_type:literal $(, blank = $blank:ident)? {
            $($variant:ident = $code:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl CodedValue for $name {
            const SQL_TYPE: &'static str = $sql_type;
            const VARIANTS: &'static [Self] = &[$(Self::$variant),+];

            fn from_code(code: &str) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            fn sql_label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }

            fn default_for_blank() -> Option<Self> {
                coded_enum!(@blank $($blank)?)
            }
        }
    };
}

coded_enum! {
    /// Day-of-week flags in calendar.txt.
    pub enum Availability as "availability" {
        NotAvailable = "0" => "not_available",
        Available = "1" => "available",
    }
}

coded_enum! {
    pub enum ExceptionType as "exception_type_v" {
        Added = "1" => "added",
        Removed = "2" => "removed",
    }
}

coded_enum! {
    pub enum LocationType as "location_type_val", blank = Stop {
        Stop = "0" => "stop",
        Station = "1" => "station",
        EntranceExit = "2" => "entrance_exit",
        Node = "3" => "node",
        BoardingArea = "4" => "boarding_area",
    }
}

coded_enum! {
    pub enum WheelchairBoarding as "wheelchair_boarding_val", blank = NoInfoOrInherit {
        NoInfoOrInherit = "0" => "no_info_or_inherit",
        Accessible = "1" => "accessible",
        NotAccessible = "2" => "not_accessible",
    }
}

coded_enum! {
    pub enum WheelchairAccessible as "wheelchair_accessibility", blank = Unknown {
        Unknown = "0" => "unknown",
        Accessible = "1" => "accessible",
        NotAccessible = "2" => "not_accessible",
    }
}

coded_enum! {
    pub enum BikesAllowed as "bikes_allowance", blank = Unknown {
        Unknown = "0" => "unknown",
        Allowed = "1" => "allowed",
        NotAllowed = "2" => "not_allowed",
    }
}

coded_enum! {
    /// Shared by `pickup_type` and `drop_off_type` in stop_times.txt.
    pub enum PickupDropOffType as "pickup_drop_off_type", blank = Regular {
        Regular = "0" => "regular",
        NotAvailable = "1" => "not_available",
        Call = "2" => "call",
        Driver = "3" => "driver",
    }
}

coded_enum! {
    pub enum Timepoint as "timepoint_v", blank = Exact {
        Approximate = "0" => "approximate",
        Exact = "1" => "exact",
    }
}

coded_enum! {
    pub enum ExactTimes as "exact_times_v", blank = FrequencyBased {
        FrequencyBased = "0" => "frequency_based",
        ScheduleBased = "1" => "schedule_based",
    }
}

coded_enum! {
    pub enum TransferType as "transfer_type_v", blank = Recommended {
        Recommended = "0" => "recommended",
        Timed = "1" => "timed",
        MinimumTime = "2" => "minimum_time",
        Impossible = "3" => "impossible",
    }
}

coded_enum! {
    pub enum PathwayMode as "pathway_mode_v" {
        Walkway = "1" => "walkway",
        Stairs = "2" => "stairs",
        MovingSidewalkTravelator = "3" => "moving_sidewalk_travelator",
        Escalator = "4" => "escalator",
        Elevator = "5" => "elevator",
        FareGate = "6" => "fare_gate",
        ExitGate = "7" => "exit_gate",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_codes_to_labels() {
        assert_eq!(ExceptionType::from_code("2"), Some(ExceptionType::Removed));
        assert_eq!(ExceptionType::Removed.sql_label(), "removed");
        assert_eq!(PathwayMode::FareGate.code(), "6");
        assert_eq!(
            LocationType::sql_labels(),
            vec!["stop", "station", "entrance_exit", "node", "boarding_area"]
        );
    }

    #[test]
    fn blank_uses_gtfs_default() {
        assert_eq!(
            Timepoint::parse_field("timepoint", "").unwrap(),
            Some(Timepoint::Exact)
        );
        assert_eq!(
            PickupDropOffType::parse_field("pickup_type", "  ").unwrap(),
            Some(PickupDropOffType::Regular)
        );
        assert_eq!(ExceptionType::parse_field("exception_type", "").unwrap(), None);
    }

    #[test]
    fn rejects_out_of_domain_code() {
        let err = ExceptionType::parse_field("exception_type", "9").unwrap_err();
        assert_eq!(
            err,
            GtfsParseError::UnknownCode {
                field: "exception_type",
                value: "9".into()
            }
        );
        assert!(Availability::parse_field("monday", "yes").is_err());
    }
}
