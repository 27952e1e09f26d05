//! Core scheduling vocabulary: days, locations, grid keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A duty day. `Day3` is the night duty (21:00 through 06:30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Day {
    Day1,
    Day2,
    Day3,
}

impl Day {
    pub const ALL: [Day; 3] = [Day::Day1, Day::Day2, Day::Day3];

    /// 1-based day number as used in titles and persisted metadata.
    pub fn number(self) -> u8 {
        match self {
            Day::Day1 => 1,
            Day::Day2 => 2,
            Day::Day3 => 3,
        }
    }

    /// 0-based index, for day-keyed arrays.
    pub fn index(self) -> usize {
        self.number() as usize - 1
    }

    pub fn from_number(n: u8) -> Option<Day> {
        match n {
            1 => Some(Day::Day1),
            2 => Some(Day::Day2),
            3 => Some(Day::Day3),
            _ => None,
        }
    }

    /// Whether this is the night duty.
    pub fn is_night(self) -> bool {
        matches!(self, Day::Day3)
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DAY{}", self.number())
    }
}

/// A duty location. The night duty is staffed at `Mcc` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    Mcc,
    Hcc1,
    Hcc2,
}

impl Location {
    pub const ALL: [Location; 3] = [Location::Mcc, Location::Hcc1, Location::Hcc2];

    pub fn as_str(self) -> &'static str {
        match self {
            Location::Mcc => "MCC",
            Location::Hcc1 => "HCC1",
            Location::Hcc2 => "HCC2",
        }
    }

    pub fn parse(s: &str) -> Option<Location> {
        match s {
            "MCC" => Some(Location::Mcc),
            "HCC1" => Some(Location::Hcc1),
            "HCC2" => Some(Location::Hcc2),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one of the seven grids of a session: three locations on each
/// of days 1 and 2, `Mcc` only on the night duty.
///
/// Construction is checked, so a `GridKey` in hand is always one of
/// [`GridKey::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridKey {
    day: Day,
    location: Location,
}

impl GridKey {
    /// Every valid grid key, in day-major order.
    pub const ALL: [GridKey; 7] = [
        GridKey { day: Day::Day1, location: Location::Mcc },
        GridKey { day: Day::Day1, location: Location::Hcc1 },
        GridKey { day: Day::Day1, location: Location::Hcc2 },
        GridKey { day: Day::Day2, location: Location::Mcc },
        GridKey { day: Day::Day2, location: Location::Hcc1 },
        GridKey { day: Day::Day2, location: Location::Hcc2 },
        GridKey { day: Day::Day3, location: Location::Mcc },
    ];

    /// Build a key, rejecting night-duty locations other than `Mcc`.
    pub fn new(day: Day, location: Location) -> Option<GridKey> {
        if day.is_night() && location != Location::Mcc {
            return None;
        }
        Some(GridKey { day, location })
    }

    pub fn day(self) -> Day {
        self.day
    }

    pub fn location(self) -> Location {
        self.location
    }

    /// Position within [`GridKey::ALL`].
    pub(crate) fn index(self) -> usize {
        match (self.day, self.location) {
            (Day::Day1, Location::Mcc) => 0,
            (Day::Day1, Location::Hcc1) => 1,
            (Day::Day1, Location::Hcc2) => 2,
            (Day::Day2, Location::Mcc) => 3,
            (Day::Day2, Location::Hcc1) => 4,
            (Day::Day2, Location::Hcc2) => 5,
            (Day::Day3, _) => 6,
        }
    }

    /// Range of [`GridKey::ALL`] indices belonging to a day.
    pub(crate) fn day_range(day: Day) -> std::ops::Range<usize> {
        match day {
            Day::Day1 => 0..3,
            Day::Day2 => 3..6,
            Day::Day3 => 6..7,
        }
    }

    /// Parse the `DAYn:LOCATION` form produced by `Display`.
    pub fn parse(s: &str) -> Option<GridKey> {
        let (day_part, loc_part) = s.split_once(':')?;
        let n = day_part.strip_prefix("DAY")?.parse::<u8>().ok()?;
        let day = Day::from_number(n)?;
        let location = Location::parse(loc_part)?;
        GridKey::new(day, location)
    }

    /// Presentation title: the key itself, except the night duty reads
    /// `NIGHT DUTY`.
    pub fn title(self) -> String {
        if self.day.is_night() {
            "NIGHT DUTY".to_string()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.day, self.location)
    }
}

/// Presentation-ready table: a header row and data rows of equal width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_display_and_number() {
        assert_eq!(Day::Day1.to_string(), "DAY1");
        assert_eq!(Day::Day3.number(), 3);
        assert_eq!(Day::from_number(2), Some(Day::Day2));
        assert_eq!(Day::from_number(4), None);
    }

    #[test]
    fn test_location_round_trip() {
        for loc in Location::ALL {
            assert_eq!(Location::parse(loc.as_str()), Some(loc));
        }
        assert_eq!(Location::parse("mcc"), None);
    }

    #[test]
    fn test_grid_key_rejects_night_satellites() {
        assert!(GridKey::new(Day::Day3, Location::Hcc1).is_none());
        assert!(GridKey::new(Day::Day3, Location::Hcc2).is_none());
        assert!(GridKey::new(Day::Day3, Location::Mcc).is_some());
    }

    #[test]
    fn test_grid_key_parse_display_symmetry() {
        for key in GridKey::ALL {
            assert_eq!(GridKey::parse(&key.to_string()), Some(key));
        }
        assert_eq!(GridKey::parse("DAY3:HCC1"), None);
        assert_eq!(GridKey::parse("DAY4:MCC"), None);
        assert_eq!(GridKey::parse("DAY1-MCC"), None);
    }

    #[test]
    fn test_grid_key_index_matches_all_order() {
        for (i, key) in GridKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
    }

    #[test]
    fn test_render_table_serializes_as_plain_arrays() {
        let table = RenderTable {
            headers: vec!["DAY1:MCC".to_string(), "07:00".to_string()],
            rows: vec![vec!["ALICE".to_string(), "MCC".to_string()]],
        };
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "headers": ["DAY1:MCC", "07:00"],
                "rows": [["ALICE", "MCC"]],
            })
        );
        let back: RenderTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_night_title() {
        let night = GridKey::new(Day::Day3, Location::Mcc).unwrap();
        assert_eq!(night.title(), "NIGHT DUTY");
        let day1 = GridKey::new(Day::Day1, Location::Hcc2).unwrap();
        assert_eq!(day1.title(), "DAY1:HCC2");
    }
}
