//! The per-session aggregate: all seven grids plus cross-grid state.
//!
//! `GridSet` owns one [`Grid`] per [`GridKey`] and keeps three derived
//! structures coherent across every mutation:
//!
//! - per-day name sets enforcing that a person is rostered on at most one
//!   grid per day,
//! - an hour ledger with one row per person plus a running total,
//! - a dirty flag consumed by the persistence layer.
//!
//! Mutations must go through `GridSet`, not the contained grids, or the
//! derived state goes stale.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use tracing::warn;

use crate::calendar;
use crate::grid::canonical_name;
use crate::grid::Grid;
use crate::mask::MergeMask;
use crate::types::{Day, GridKey, Location, RenderTable};

/// Result of [`GridSet::add_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddNameOutcome {
    Added,
    /// The name is already rostered somewhere on that day.
    DuplicateName,
}

impl AddNameOutcome {
    pub fn is_added(self) -> bool {
        matches!(self, AddNameOutcome::Added)
    }
}

/// One person's hours, split by day.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LedgerRow {
    pub day1: f64,
    pub day2: f64,
    pub day3: f64,
    pub total: f64,
}

impl LedgerRow {
    fn add(&mut self, other: &LedgerRow) {
        self.day1 += other.day1;
        self.day2 += other.day2;
        self.day3 += other.day3;
        self.total += other.total;
    }

    fn sub(&mut self, other: &LedgerRow) {
        self.day1 -= other.day1;
        self.day2 -= other.day2;
        self.day3 -= other.day3;
        self.total -= other.total;
    }
}

/// Hour ledger: a row per person and a maintained grand total.
///
/// All values move in exact 0.5 steps, so the incremental arithmetic never
/// drifts from a full recompute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ledger {
    rows: BTreeMap<String, LedgerRow>,
    total: LedgerRow,
}

impl Ledger {
    pub fn rows(&self) -> &BTreeMap<String, LedgerRow> {
        &self.rows
    }

    pub fn row(&self, name: &str) -> Option<&LedgerRow> {
        self.rows.get(&canonical_name(name))
    }

    /// The synthetic TOTAL row.
    pub fn total(&self) -> &LedgerRow {
        &self.total
    }

    fn upsert(&mut self, name: &str, row: LedgerRow) {
        if let Some(old) = self.rows.insert(name.to_string(), row) {
            self.total.sub(&old);
        }
        self.total.add(&row);
    }

    fn remove(&mut self, name: &str) {
        if let Some(old) = self.rows.remove(name) {
            self.total.sub(&old);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSet {
    grids: [Grid; 7],
    existing: [BTreeSet<String>; 3],
    ledger: Ledger,
    dirty: bool,
}

impl Default for GridSet {
    fn default() -> Self {
        Self::new()
    }
}

impl GridSet {
    /// Seven empty grids, empty ledger, clean.
    pub fn new() -> GridSet {
        GridSet {
            grids: GridKey::ALL.map(Grid::new),
            existing: Default::default(),
            ledger: Ledger::default(),
            dirty: false,
        }
    }

    /// Rebuild a set from restored grids. Returns `None` when the grids do
    /// not cover every key exactly once, or when a name appears on two
    /// grids of the same day. Name sets and the ledger are recomputed from
    /// the grids; the result is clean.
    pub fn from_grids(grids: Vec<Grid>) -> Option<GridSet> {
        let mut slots: [Option<Grid>; 7] = Default::default();
        for grid in grids {
            let idx = grid.key().index();
            if slots[idx].is_some() {
                return None;
            }
            slots[idx] = Some(grid);
        }
        let [g0, g1, g2, g3, g4, g5, g6] = slots;
        let grids = match (g0, g1, g2, g3, g4, g5, g6) {
            (Some(g0), Some(g1), Some(g2), Some(g3), Some(g4), Some(g5), Some(g6)) => {
                [g0, g1, g2, g3, g4, g5, g6]
            }
            _ => return None,
        };

        let mut set = GridSet {
            grids,
            existing: Default::default(),
            ledger: Ledger::default(),
            dirty: false,
        };
        for day in Day::ALL {
            let names: Vec<String> = set
                .day_grids(day)
                .iter()
                .flat_map(|g| g.names().into_iter().map(str::to_string))
                .collect();
            let unique: BTreeSet<String> = names.iter().cloned().collect();
            if unique.len() != names.len() {
                return None;
            }
            set.existing[day.index()] = unique;
        }
        let all_names: BTreeSet<String> = set
            .existing
            .iter()
            .flat_map(|s| s.iter().cloned())
            .collect();
        for name in &all_names {
            set.refresh_ledger_row(name);
        }
        Some(set)
    }

    pub fn grid(&self, key: GridKey) -> &Grid {
        &self.grids[key.index()]
    }

    /// Grids of one day, in key order.
    pub fn day_grids(&self, day: Day) -> &[Grid] {
        &self.grids[GridKey::day_range(day)]
    }

    /// All seven grids, in key order.
    pub fn grids(&self) -> impl Iterator<Item = &Grid> {
        self.grids.iter()
    }

    /// Names rostered anywhere on a day.
    pub fn existing_names(&self, day: Day) -> &BTreeSet<String> {
        &self.existing[day.index()]
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Roster a name onto a grid, enforcing per-day uniqueness.
    pub fn add_name(&mut self, key: GridKey, name: &str) -> AddNameOutcome {
        let name = canonical_name(name);
        if self.existing[key.day().index()].contains(&name) {
            warn!(day = %key.day(), person = %name, "Name already rostered on this day");
            return AddNameOutcome::DuplicateName;
        }
        if !self.grids[key.index()].add_person(&name) {
            return AddNameOutcome::DuplicateName;
        }
        self.refresh_existing(key.day());
        self.refresh_ledger_row(&name);
        self.dirty = true;
        AddNameOutcome::Added
    }

    /// Remove a name from a grid. The ledger row disappears when the name
    /// leaves its last day.
    pub fn remove_name(&mut self, key: GridKey, name: &str) -> bool {
        let name = canonical_name(name);
        if self.grids[key.index()].remove_person(&name).is_none() {
            return false;
        }
        self.refresh_existing(key.day());
        self.refresh_ledger_row(&name);
        self.dirty = true;
        true
    }

    /// Rename within a grid, enforcing per-day uniqueness of the new name.
    pub fn rename_name(&mut self, key: GridKey, old: &str, new: &str) -> bool {
        let old = canonical_name(old);
        let new = canonical_name(new);
        if self.existing[key.day().index()].contains(&new) {
            warn!(day = %key.day(), person = %new, "Name already rostered on this day");
            return false;
        }
        if !self.grids[key.index()].rename_person(&old, &new) {
            return false;
        }
        self.refresh_existing(key.day());
        self.refresh_ledger_row(&old);
        self.refresh_ledger_row(&new);
        self.dirty = true;
        true
    }

    /// Exchange two people's shifts within one grid.
    pub fn swap_names(&mut self, key: GridKey, a: &str, b: &str) -> bool {
        let a = canonical_name(a);
        let b = canonical_name(b);
        if !self.grids[key.index()].swap_people(&a, &b) {
            return false;
        }
        self.refresh_ledger_row(&a);
        self.refresh_ledger_row(&b);
        self.dirty = true;
        true
    }

    /// Toggle-write one cell. See [`Grid::allocate`].
    pub fn allocate(&mut self, key: GridKey, location: Location, slot: &str, name: &str) -> bool {
        let name = canonical_name(name);
        if !self.grids[key.index()].allocate(location, slot, &name) {
            return false;
        }
        self.refresh_ledger_row(&name);
        self.dirty = true;
        true
    }

    /// Clear one cell. See [`Grid::remove_shift`].
    pub fn remove_shift(&mut self, key: GridKey, slot: &str, name: &str) -> bool {
        let name = canonical_name(name);
        if !self.grids[key.index()].remove_shift(slot, &name) {
            return false;
        }
        self.refresh_ledger_row(&name);
        self.dirty = true;
        true
    }

    pub fn is_allocated(&self, key: GridKey, slot: &str, name: &str) -> Option<bool> {
        self.grid(key).is_allocated(slot, name)
    }

    pub fn location_at(&self, key: GridKey, slot: &str, name: &str) -> Option<Option<Location>> {
        self.grid(key).location_at(slot, name)
    }

    /// Names covering a full meal window anywhere on the day. Per-day
    /// uniqueness means no name can repeat across the day's grids.
    pub fn meal_violations(&self, day: Day) -> Vec<String> {
        self.day_grids(day)
            .iter()
            .flat_map(|g| g.meal_violations())
            .collect()
    }

    /// The `:30` labels of hour pairs joinable in every grid of the day —
    /// the columns hidden by [`render_day`](Self::render_day).
    pub fn merge_keys(&self, day: Day) -> Vec<&'static str> {
        let mut combined = MergeMask::filled(calendar::pair_count(day));
        for grid in self.day_grids(day) {
            combined = combined.and(grid.mask());
        }
        combined
            .ones()
            .filter_map(|pair| calendar::pair_slots(day, pair))
            .map(|(_, second)| second)
            .collect()
    }

    /// Every grid of a day rendered with the day's merge keys hidden.
    pub fn render_day(&self, day: Day) -> Vec<RenderTable> {
        let hidden = self.merge_keys(day);
        self.day_grids(day)
            .iter()
            .map(|g| g.render(&hidden))
            .collect()
    }

    /// Compact night-duty view (names stacked under slot columns).
    pub fn render_night_compact(&self) -> RenderTable {
        self.day_grids(Day::Day3)[0].render_compact()
    }

    /// The ledger as a presentation table, sorted by name, with the TOTAL
    /// row last.
    pub fn ledger_table(&self) -> RenderTable {
        let headers = ["Name", "Day 1", "Day 2", "Day 3", "Total"]
            .map(String::from)
            .to_vec();
        let mut rows: Vec<Vec<String>> = self
            .ledger
            .rows()
            .iter()
            .map(|(name, row)| ledger_render_row(name, row))
            .collect();
        rows.push(ledger_render_row("TOTAL", self.ledger.total()));
        RenderTable { headers, rows }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn refresh_existing(&mut self, day: Day) {
        self.existing[day.index()] = self
            .day_grids(day)
            .iter()
            .flat_map(|g| g.names().into_iter().map(str::to_string))
            .collect();
    }

    /// Recompute one name's ledger row from the grids. Constant work: at
    /// most one grid per day can hold the name.
    fn refresh_ledger_row(&mut self, name: &str) {
        let on_roster = Day::ALL
            .iter()
            .any(|d| self.existing[d.index()].contains(name));
        if !on_roster {
            self.ledger.remove(name);
            return;
        }
        let day1 = self.day_hours(Day::Day1, name);
        let day2 = self.day_hours(Day::Day2, name);
        let day3 = self.day_hours(Day::Day3, name);
        let row = LedgerRow {
            day1,
            day2,
            day3,
            total: day1 + day2 + day3,
        };
        self.ledger.upsert(name, row);
    }

    fn day_hours(&self, day: Day, name: &str) -> f64 {
        self.day_grids(day)
            .iter()
            .find_map(|g| g.hours_map().get(name))
            .copied()
            .unwrap_or(0.0)
    }
}

fn ledger_render_row(name: &str, row: &LedgerRow) -> Vec<String> {
    vec![
        name.to_string(),
        row.day1.to_string(),
        row.day2.to_string(),
        row.day3.to_string(),
        row.total.to_string(),
    ]
}
