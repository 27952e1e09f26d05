//! A single allocation table: one day at one location.
//!
//! Columns are people, rows are the day's slots. A cell is either
//! unallocated (`None`, rendered `"0"`) or a [`Location`]. Writes go through
//! [`Grid::allocate`], which is a toggle: re-requesting the value a cell
//! already holds clears it.
//!
//! # Invariants
//!
//! - `hours[name]` equals 0.5 x the allocated-cell count of that column.
//!   Deltas are halves only, which f64 represents exactly.
//! - Mask bit `k` is set iff every column holds equal values in slots `2k`
//!   and `2k+1`.
//! - Names are stored upper-cased and trimmed; lookups canonicalize first.
//!
//! Bad user input (unknown name, unknown slot, duplicate name) is reported
//! with a warn log and a sentinel return, never an error.

use std::collections::BTreeMap;

use tracing::warn;

use crate::calendar;
use crate::mask::MergeMask;
use crate::types::{GridKey, Location, RenderTable};

/// Lunch window slot labels, inclusive: coverage means no free half hour
/// between 11:00 and 13:30.
const LUNCH_WINDOW: (&str, &str) = ("11:00", "13:00");

/// Dinner window slot labels, inclusive: coverage means no free half hour
/// between 17:00 and 18:30.
const DINNER_WINDOW: (&str, &str) = ("17:00", "18:00");

/// Canonical form of a person name.
pub(crate) fn canonical_name(name: &str) -> String {
    name.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq)]
struct PersonColumn {
    name: String,
    cells: Vec<Option<Location>>,
}

/// A removed person column, returned so callers can revert the removal.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedPerson {
    pub name: String,
    pub cells: Vec<Option<Location>>,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    key: GridKey,
    people: Vec<PersonColumn>,
    hours: BTreeMap<String, f64>,
    mask: MergeMask,
}

impl Grid {
    /// An empty grid for `key`: no people, every pair joinable.
    pub fn new(key: GridKey) -> Grid {
        Grid {
            key,
            people: Vec::new(),
            hours: BTreeMap::new(),
            mask: MergeMask::filled(calendar::pair_count(key.day())),
        }
    }

    pub fn key(&self) -> GridKey {
        self.key
    }

    pub fn mask(&self) -> &MergeMask {
        &self.mask
    }

    /// Person names in column order.
    pub fn names(&self) -> Vec<&str> {
        self.people.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn person_count(&self) -> usize {
        self.people.len()
    }

    pub fn has_person(&self, name: &str) -> bool {
        self.col_index(&canonical_name(name)).is_some()
    }

    /// Accumulated hours for a person, if present.
    pub fn hours_of(&self, name: &str) -> Option<f64> {
        self.hours.get(&canonical_name(name)).copied()
    }

    /// Hours keyed by name, for ledger and persistence use.
    pub fn hours_map(&self) -> &BTreeMap<String, f64> {
        &self.hours
    }

    /// A person's cells in slot order, if present.
    pub fn cells_of(&self, name: &str) -> Option<&[Option<Location>]> {
        let idx = self.col_index(&canonical_name(name))?;
        Some(&self.people[idx].cells)
    }

    /// Add a person with an empty column. `false` + warn if already present.
    pub fn add_person(&mut self, name: &str) -> bool {
        let name = canonical_name(name);
        if self.col_index(&name).is_some() {
            warn!(grid = %self.key, person = %name, "Person already on grid");
            return false;
        }
        let cells = vec![None; calendar::slots(self.key.day()).len()];
        self.hours.insert(name.clone(), 0.0);
        self.people.push(PersonColumn { name, cells });
        // An empty column satisfies every pair equality, so the mask stands.
        true
    }

    /// Add a person with pre-existing cells (restore and revert paths).
    /// Hours are computed from the cells; the whole mask is recomputed.
    pub fn add_person_with_cells(&mut self, name: &str, cells: Vec<Option<Location>>) -> bool {
        let name = canonical_name(name);
        if self.col_index(&name).is_some() {
            warn!(grid = %self.key, person = %name, "Person already on grid");
            return false;
        }
        let expected = calendar::slots(self.key.day()).len();
        if cells.len() != expected {
            warn!(
                grid = %self.key,
                person = %name,
                got = cells.len(),
                expected,
                "Cell column has wrong length"
            );
            return false;
        }
        let allocated = cells.iter().filter(|c| c.is_some()).count();
        self.hours.insert(name.clone(), allocated as f64 * 0.5);
        self.people.push(PersonColumn { name, cells });
        self.recompute_mask();
        true
    }

    /// Remove a person, returning the column for callers that revert.
    pub fn remove_person(&mut self, name: &str) -> Option<RemovedPerson> {
        let name = canonical_name(name);
        let Some(idx) = self.col_index(&name) else {
            warn!(grid = %self.key, person = %name, "Person not on grid");
            return None;
        };
        let column = self.people.remove(idx);
        let hours = self.hours.remove(&name).unwrap_or(0.0);
        self.recompute_mask();
        Some(RemovedPerson {
            name: column.name,
            cells: column.cells,
            hours,
        })
    }

    /// Rename a person in place. Cells and hours follow the new name.
    pub fn rename_person(&mut self, old: &str, new: &str) -> bool {
        let old = canonical_name(old);
        let new = canonical_name(new);
        let Some(idx) = self.col_index(&old) else {
            warn!(grid = %self.key, person = %old, "Person not on grid");
            return false;
        };
        if self.col_index(&new).is_some() {
            warn!(grid = %self.key, person = %new, "Person already on grid");
            return false;
        }
        self.people[idx].name = new.clone();
        if let Some(h) = self.hours.remove(&old) {
            self.hours.insert(new, h);
        }
        true
    }

    /// Exchange two people's cells and hours. The mask quantifies over the
    /// multiset of columns, so it is unchanged by a swap.
    pub fn swap_people(&mut self, a: &str, b: &str) -> bool {
        let a = canonical_name(a);
        let b = canonical_name(b);
        let (Some(ia), Some(ib)) = (self.col_index(&a), self.col_index(&b)) else {
            warn!(grid = %self.key, first = %a, second = %b, "Cannot swap unknown person");
            return false;
        };
        if ia == ib {
            return true;
        }
        // Split to borrow both columns mutably.
        let (lo, hi) = if ia < ib { (ia, ib) } else { (ib, ia) };
        let (head, tail) = self.people.split_at_mut(hi);
        std::mem::swap(&mut head[lo].cells, &mut tail[0].cells);
        let ha = self.hours.get(&a).copied().unwrap_or(0.0);
        let hb = self.hours.get(&b).copied().unwrap_or(0.0);
        self.hours.insert(a, hb);
        self.hours.insert(b, ha);
        true
    }

    /// Whether a cell is allocated. `None` + warn on unknown name or slot.
    pub fn is_allocated(&self, slot: &str, name: &str) -> Option<bool> {
        let name = canonical_name(name);
        let Some(col) = self.col_index(&name) else {
            warn!(grid = %self.key, person = %name, "Person not on grid");
            return None;
        };
        let Some(row) = calendar::slot_index(self.key.day(), slot) else {
            warn!(grid = %self.key, slot = %slot, "Unknown slot label");
            return None;
        };
        Some(self.people[col].cells[row].is_some())
    }

    /// The cell value. Outer `None` + warn on unknown name or slot.
    pub fn location_at(&self, slot: &str, name: &str) -> Option<Option<Location>> {
        let name = canonical_name(name);
        let Some(col) = self.col_index(&name) else {
            warn!(grid = %self.key, person = %name, "Person not on grid");
            return None;
        };
        let row = match calendar::slot_index(self.key.day(), slot) {
            Some(row) => row,
            None => {
                warn!(grid = %self.key, slot = %slot, "Unknown slot label");
                return None;
            }
        };
        Some(self.people[col].cells[row])
    }

    /// Toggle-write one cell.
    ///
    /// On the night duty every requested location is coerced to `Mcc`
    /// before the toggle comparison, so a satellite request over an `Mcc`
    /// cell clears it. Returns `false` (after a warn from the lookup) when
    /// the name or slot is unknown.
    pub fn allocate(&mut self, location: Location, slot: &str, name: &str) -> bool {
        let name = canonical_name(name);
        let resolved = if self.key.day().is_night() {
            Location::Mcc
        } else {
            location
        };
        self.write_cell(slot, &name, Some(resolved), true)
    }

    /// Clear one cell. No-op (but `true`) when the cell is already empty.
    pub fn remove_shift(&mut self, slot: &str, name: &str) -> bool {
        let name = canonical_name(name);
        self.write_cell(slot, &name, None, false)
    }

    /// Shared write path. `toggle` applies the equal-value-clears rule.
    fn write_cell(
        &mut self,
        slot: &str,
        name: &str,
        value: Option<Location>,
        toggle: bool,
    ) -> bool {
        let Some(col) = self.col_index(name) else {
            warn!(grid = %self.key, person = %name, "Person not on grid");
            return false;
        };
        let Some(row) = calendar::slot_index(self.key.day(), slot) else {
            warn!(grid = %self.key, slot = %slot, "Unknown slot label");
            return false;
        };
        let current = self.people[col].cells[row];
        let target = if toggle && current == value { None } else { value };
        let delta = match (current.is_some(), target.is_some()) {
            (false, true) => 0.5,
            (true, false) => -0.5,
            _ => 0.0,
        };
        if delta != 0.0 {
            if let Some(h) = self.hours.get_mut(name) {
                *h += delta;
            }
        }
        self.people[col].cells[row] = target;
        self.recompute_mask_bit(row / 2);
        true
    }

    /// Names allocated in every slot of the lunch or dinner window, in
    /// column order. Days without those labels (the night duty) report none.
    pub fn meal_violations(&self) -> Vec<String> {
        let day = self.key.day();
        let windows = [LUNCH_WINDOW, DINNER_WINDOW];
        let ranges: Vec<_> = windows
            .iter()
            .filter_map(|(from, to)| calendar::label_range(day, from, to))
            .collect();
        if ranges.is_empty() {
            return Vec::new();
        }
        self.people
            .iter()
            .filter(|p| {
                ranges
                    .iter()
                    .any(|r| r.clone().all(|i| p.cells[i].is_some()))
            })
            .map(|p| p.name.clone())
            .collect()
    }

    /// Transposed presentation table. The first header is the grid title,
    /// the rest are the day's slot labels minus `hidden` (merged `:30`
    /// subslots). One row per person: name, then `"0"` or the location.
    pub fn render(&self, hidden: &[&str]) -> RenderTable {
        let day = self.key.day();
        let kept: Vec<usize> = calendar::slots(day)
            .iter()
            .enumerate()
            .filter(|(_, label)| !hidden.contains(label))
            .map(|(i, _)| i)
            .collect();
        let mut headers = Vec::with_capacity(kept.len() + 1);
        headers.push(self.key.title());
        headers.extend(kept.iter().map(|i| calendar::slots(day)[*i].to_string()));
        let rows = self
            .people
            .iter()
            .map(|p| {
                let mut row = Vec::with_capacity(kept.len() + 1);
                row.push(p.name.clone());
                row.extend(kept.iter().map(|i| cell_str(p.cells[*i]).to_string()));
                row
            })
            .collect();
        RenderTable { headers, rows }
    }

    /// Compact night-duty view: per slot, just the allocated names stacked
    /// top-down. No name column; rows are padded to the deepest slot.
    pub fn render_compact(&self) -> RenderTable {
        let slots = calendar::slots(self.key.day());
        let mut headers = Vec::with_capacity(slots.len() + 1);
        headers.push(self.key.title());
        headers.extend(slots.iter().map(|s| s.to_string()));

        let per_slot: Vec<Vec<&str>> = (0..slots.len())
            .map(|row| {
                self.people
                    .iter()
                    .filter(|p| p.cells[row].is_some())
                    .map(|p| p.name.as_str())
                    .collect()
            })
            .collect();
        let depth = per_slot.iter().map(Vec::len).max().unwrap_or(0);
        let rows = (0..depth)
            .map(|r| {
                let mut row = Vec::with_capacity(slots.len() + 1);
                row.push(String::new());
                row.extend(
                    per_slot
                        .iter()
                        .map(|names| names.get(r).copied().unwrap_or("").to_string()),
                );
                row
            })
            .collect();
        RenderTable { headers, rows }
    }

    fn col_index(&self, canonical: &str) -> Option<usize> {
        self.people.iter().position(|p| p.name == canonical)
    }

    fn recompute_mask_bit(&mut self, pair: usize) {
        let joinable = self
            .people
            .iter()
            .all(|p| p.cells[pair * 2] == p.cells[pair * 2 + 1]);
        self.mask.set(pair, joinable);
    }

    fn recompute_mask(&mut self) {
        for pair in 0..self.mask.len() {
            self.recompute_mask_bit(pair);
        }
    }
}

fn cell_str(cell: Option<Location>) -> &'static str {
    match cell {
        None => "0",
        Some(loc) => loc.as_str(),
    }
}
