//! # roster-grid
//!
//! Shift grid engine for control-centre duty rosters.
//!
//! ## Model
//!
//! A roster session covers three duties: day 1 (07:00-20:30), day 2
//! (06:00-20:30) and the night duty (21:00-06:30, wrapping midnight). Days
//! 1 and 2 are staffed at three locations (MCC, HCC1, HCC2); the night duty
//! runs at MCC only — seven grids in total, identified by [`GridKey`].
//!
//! ## Pieces
//!
//! - [`calendar`] — the fixed half-hour slot tables and pair arithmetic
//! - [`Grid`] — one allocation table with toggle writes, per-person hours
//!   and a merge mask over hour pairs
//! - [`GridSet`] — the session aggregate: per-day name uniqueness, the hour
//!   ledger with its TOTAL row, merge keys shared across a day's grids, and
//!   the dirty flag the persistence layer consumes
//!
//! ## Error posture
//!
//! Bad user input (unknown names, unknown slots, duplicates) never raises:
//! operations log a warning and return a sentinel (`bool`, `Option`, or
//! [`AddNameOutcome`]). Hard errors are reserved for the persistence and
//! codec layers above this crate.

pub mod calendar;
mod grid;
mod gridset;
mod mask;
mod types;

pub use grid::{Grid, RemovedPerson};
pub use gridset::{AddNameOutcome, GridSet, Ledger, LedgerRow};
pub use mask::MergeMask;
pub use types::{Day, GridKey, Location, RenderTable};
