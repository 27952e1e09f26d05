//! The schedulable time domain.
//!
//! Every day has a fixed, closed table of half-hour slot labels. Slots are
//! addressed positionally; labels are presentation only. Day 3 (night duty)
//! wraps midnight, so lexicographic label order is meaningless there —
//! callers must never sort labels.
//!
//! Slot `2k` and `2k+1` of a day form hour pair `k`. Every table has an even
//! length, so pairing is total.

use crate::types::Day;

/// Day 1 duty: 07:00 through 20:30.
pub const DAY1_SLOTS: &[&str] = &[
    "07:00", "07:30", "08:00", "08:30", "09:00", "09:30", "10:00", "10:30",
    "11:00", "11:30", "12:00", "12:30", "13:00", "13:30", "14:00", "14:30",
    "15:00", "15:30", "16:00", "16:30", "17:00", "17:30", "18:00", "18:30",
    "19:00", "19:30", "20:00", "20:30",
];

/// Day 2 duty: 06:00 through 20:30.
pub const DAY2_SLOTS: &[&str] = &[
    "06:00", "06:30", "07:00", "07:30", "08:00", "08:30", "09:00", "09:30",
    "10:00", "10:30", "11:00", "11:30", "12:00", "12:30", "13:00", "13:30",
    "14:00", "14:30", "15:00", "15:30", "16:00", "16:30", "17:00", "17:30",
    "18:00", "18:30", "19:00", "19:30", "20:00", "20:30",
];

/// Night duty: 21:00 through 06:30 the next morning, in duty order.
pub const DAY3_SLOTS: &[&str] = &[
    "21:00", "21:30", "22:00", "22:30", "23:00", "23:30", "00:00", "00:30",
    "01:00", "01:30", "02:00", "02:30", "03:00", "03:30", "04:00", "04:30",
    "05:00", "05:30", "06:00", "06:30",
];

/// Ordered slot labels for a day.
pub fn slots(day: Day) -> &'static [&'static str] {
    match day {
        Day::Day1 => DAY1_SLOTS,
        Day::Day2 => DAY2_SLOTS,
        Day::Day3 => DAY3_SLOTS,
    }
}

/// Positional index of a slot label within the day, if the label exists.
pub fn slot_index(day: Day, label: &str) -> Option<usize> {
    slots(day).iter().position(|s| *s == label)
}

/// Number of hour pairs in the day.
pub fn pair_count(day: Day) -> usize {
    slots(day).len() / 2
}

/// The `:00` and `:30` labels of hour pair `pair`.
///
/// Returns `None` when `pair` is out of range.
pub fn pair_slots(day: Day, pair: usize) -> Option<(&'static str, &'static str)> {
    let table = slots(day);
    let first = pair.checked_mul(2)?;
    Some((*table.get(first)?, *table.get(first + 1)?))
}

/// Contiguous index range covering the inclusive label span `from..=to`.
///
/// Returns `None` when either label is absent from the day, which is how
/// day-bound windows (the meal windows) come out empty on the night duty.
pub fn label_range(day: Day, from: &str, to: &str) -> Option<std::ops::Range<usize>> {
    let start = slot_index(day, from)?;
    let end = slot_index(day, to)?;
    if start > end {
        return None;
    }
    Some(start..end + 1)
}
