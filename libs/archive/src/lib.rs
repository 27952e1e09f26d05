//! Session bundle codec.
//!
//! Serializes a [`GridSet`] to a self-describing gzipped tar bundle — the
//! only at-rest format — and restores it, treating every inconsistency as a
//! hard error. Sentinel returns are for user input; a bundle that does not
//! decode is corruption and must fail loudly.
//!
//! # Format (v1)
//!
//! ```text
//! manifest.json              { "format": "roster-session v1",
//!                              "grid_keys": ["DAY1:MCC", ...] }
//! grids/DAY1_MCC/metadata.json
//!                            { "key", "day", "location", "names",
//!                              "hours", "merge_mask" }
//! grids/DAY1_MCC/table.json  { "slots": [...],
//!                              "cells": { name: ["0" | location, ...] } }
//! ```
//!
//! All seven grids are always present, written in key order. Person hours
//! and the merge mask are persisted for inspection but re-derived on
//! decode; a bundle whose persisted values disagree with its cells is
//! rejected.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use roster_grid::{calendar, Grid, GridKey, GridSet, Location};

/// Format line carried in the manifest; bump on breaking layout changes.
pub const FORMAT_LINE: &str = "roster-session v1";

const MANIFEST_PATH: &str = "manifest.json";

/// Bundle encode/decode errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data is not a gzip stream or carries an unknown format line.
    #[error("unsupported bundle format: {0}")]
    UnsupportedFormat(String),

    #[error("missing bundle entry: {0}")]
    MissingEntry(String),

    #[error("malformed bundle entry {entry}: {reason}")]
    Malformed { entry: String, reason: String },
}

impl ArchiveError {
    fn malformed(entry: impl Into<String>, reason: impl Into<String>) -> ArchiveError {
        ArchiveError::Malformed {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format: String,
    grid_keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GridMetadata {
    key: String,
    day: u8,
    location: String,
    names: Vec<String>,
    hours: BTreeMap<String, f64>,
    merge_mask: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GridTable {
    slots: Vec<String>,
    cells: BTreeMap<String, Vec<String>>,
}

/// Path token for a grid key (`DAY1:MCC` -> `DAY1_MCC`).
fn key_token(key: GridKey) -> String {
    key.to_string().replace(':', "_")
}

fn cell_token(cell: Option<Location>) -> String {
    match cell {
        None => "0".to_string(),
        Some(loc) => loc.as_str().to_string(),
    }
}

fn parse_cell(token: &str) -> Option<Option<Location>> {
    if token == "0" {
        return Some(None);
    }
    Location::parse(token).map(Some)
}

/// Encode a grid set into a gzipped tar bundle.
pub fn encode(set: &GridSet) -> Result<Vec<u8>, ArchiveError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let manifest = Manifest {
        format: FORMAT_LINE.to_string(),
        grid_keys: GridKey::ALL.iter().map(|k| k.to_string()).collect(),
    };
    append_json(&mut builder, MANIFEST_PATH, &manifest)?;

    for grid in set.grids() {
        let key = grid.key();
        let token = key_token(key);
        let names: Vec<String> = grid.names().iter().map(|n| n.to_string()).collect();

        let metadata = GridMetadata {
            key: key.to_string(),
            day: key.day().number(),
            location: key.location().as_str().to_string(),
            names: names.clone(),
            hours: grid.hours_map().clone(),
            merge_mask: grid.mask().to_bit_string(),
        };
        append_json(&mut builder, &format!("grids/{token}/metadata.json"), &metadata)?;

        let mut cells = BTreeMap::new();
        for name in &names {
            let column = grid
                .cells_of(name)
                .map(|c| c.iter().map(|cell| cell_token(*cell)).collect::<Vec<_>>())
                .unwrap_or_default();
            cells.insert(name.clone(), column);
        }
        let table = GridTable {
            slots: calendar::slots(key.day()).iter().map(|s| s.to_string()).collect(),
            cells,
        };
        append_json(&mut builder, &format!("grids/{token}/table.json"), &table)?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

fn append_json<W: Write, T: Serialize>(
    builder: &mut tar::Builder<W>,
    path: &str,
    value: &T,
) -> Result<(), ArchiveError> {
    let data = serde_json::to_vec_pretty(value)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, data.as_slice())?;
    Ok(())
}

fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Decode a bundle back into a [`GridSet`].
///
/// The returned set is clean (not dirty); name sets and the ledger are
/// rebuilt from the grids rather than trusted from the bundle.
pub fn decode(bytes: &[u8]) -> Result<GridSet, ArchiveError> {
    if !is_gzip(bytes) {
        return Err(ArchiveError::UnsupportedFormat("not a gzip stream".to_string()));
    }
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));

    let mut manifest: Option<Manifest> = None;
    let mut metadata: BTreeMap<String, GridMetadata> = BTreeMap::new();
    let mut tables: BTreeMap<String, GridTable> = BTreeMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;

        if path == MANIFEST_PATH {
            if manifest.is_some() {
                return Err(ArchiveError::malformed(path, "duplicate manifest"));
            }
            manifest = Some(serde_json::from_slice(&data)?);
            continue;
        }
        let Some(rest) = path.strip_prefix("grids/") else {
            return Err(ArchiveError::malformed(path, "unexpected entry"));
        };
        let Some((token, file)) = rest.split_once('/') else {
            return Err(ArchiveError::malformed(path, "unexpected entry"));
        };
        match file {
            "metadata.json" => {
                if metadata
                    .insert(token.to_string(), serde_json::from_slice(&data)?)
                    .is_some()
                {
                    return Err(ArchiveError::malformed(path, "duplicate entry"));
                }
            }
            "table.json" => {
                if tables
                    .insert(token.to_string(), serde_json::from_slice(&data)?)
                    .is_some()
                {
                    return Err(ArchiveError::malformed(path, "duplicate entry"));
                }
            }
            _ => return Err(ArchiveError::malformed(path, "unexpected entry")),
        }
    }

    let manifest = manifest.ok_or_else(|| ArchiveError::MissingEntry(MANIFEST_PATH.to_string()))?;
    if manifest.format != FORMAT_LINE {
        return Err(ArchiveError::UnsupportedFormat(manifest.format));
    }
    let expected_keys: Vec<String> = GridKey::ALL.iter().map(|k| k.to_string()).collect();
    if manifest.grid_keys != expected_keys {
        return Err(ArchiveError::malformed(MANIFEST_PATH, "grid key list mismatch"));
    }

    let mut grids = Vec::with_capacity(GridKey::ALL.len());
    for key in GridKey::ALL {
        let token = key_token(key);
        let meta = metadata
            .remove(&token)
            .ok_or_else(|| ArchiveError::MissingEntry(format!("grids/{token}/metadata.json")))?;
        let table = tables
            .remove(&token)
            .ok_or_else(|| ArchiveError::MissingEntry(format!("grids/{token}/table.json")))?;
        grids.push(decode_grid(key, &token, meta, table)?);
    }
    if let Some(token) = metadata.keys().chain(tables.keys()).next() {
        return Err(ArchiveError::malformed(
            format!("grids/{token}"),
            "unknown grid key",
        ));
    }

    GridSet::from_grids(grids).ok_or_else(|| {
        ArchiveError::malformed("bundle", "name appears on two grids of the same day")
    })
}

fn decode_grid(
    key: GridKey,
    token: &str,
    meta: GridMetadata,
    table: GridTable,
) -> Result<Grid, ArchiveError> {
    let meta_entry = format!("grids/{token}/metadata.json");
    let table_entry = format!("grids/{token}/table.json");

    if meta.key != key.to_string()
        || meta.day != key.day().number()
        || Location::parse(&meta.location) != Some(key.location())
    {
        return Err(ArchiveError::malformed(meta_entry, "key fields disagree"));
    }
    let expected_slots: Vec<&str> = calendar::slots(key.day()).to_vec();
    if table.slots != expected_slots {
        return Err(ArchiveError::malformed(table_entry, "slot list mismatch"));
    }
    if table.cells.len() != meta.names.len() {
        return Err(ArchiveError::malformed(table_entry, "cell column count mismatch"));
    }

    let mut grid = Grid::new(key);
    for name in &meta.names {
        let column = table
            .cells
            .get(name)
            .ok_or_else(|| ArchiveError::malformed(&table_entry, format!("no cells for {name}")))?;
        let cells = column
            .iter()
            .map(|token| parse_cell(token))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ArchiveError::malformed(&table_entry, "unparseable cell value"))?;
        if !grid.add_person_with_cells(name, cells) {
            return Err(ArchiveError::malformed(
                &table_entry,
                format!("rejected column for {name}"),
            ));
        }
        // Persisted hours are informational; disagreement means the bundle
        // was hand-edited or truncated.
        let derived = grid.hours_of(name);
        if meta.hours.get(name.as_str()).copied() != derived {
            return Err(ArchiveError::malformed(
                &meta_entry,
                format!("hours disagree with cells for {name}"),
            ));
        }
    }
    if grid.mask().to_bit_string() != meta.merge_mask {
        return Err(ArchiveError::malformed(meta_entry, "merge mask disagrees with cells"));
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_grid::Day;

    fn sample_set() -> GridSet {
        let mut set = GridSet::new();
        let d1 = GridKey::new(Day::Day1, Location::Mcc).unwrap();
        let d1h = GridKey::new(Day::Day1, Location::Hcc1).unwrap();
        let d2 = GridKey::new(Day::Day2, Location::Hcc2).unwrap();
        let d3 = GridKey::new(Day::Day3, Location::Mcc).unwrap();
        set.add_name(d1, "alice");
        set.add_name(d1h, "bob");
        set.add_name(d2, "alice");
        set.add_name(d3, "carol");
        set.allocate(d1, Location::Mcc, "07:00", "alice");
        set.allocate(d1, Location::Hcc2, "12:30", "alice");
        set.allocate(d1h, Location::Hcc1, "07:00", "bob");
        set.allocate(d2, Location::Hcc2, "06:00", "alice");
        // Night wrap, coerced to MCC.
        set.allocate(d3, Location::Hcc1, "23:30", "carol");
        set.allocate(d3, Location::Mcc, "00:00", "carol");
        set.clear_dirty();
        set
    }

    /// Unpack a bundle into path/bytes pairs for tampering.
    fn unpack(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut entries = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            entries.push((path, data));
        }
        entries
    }

    fn repack(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, data.as_slice()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_round_trip_empty() {
        let set = GridSet::new();
        let bytes = encode(&set).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn test_round_trip_populated() {
        let set = sample_set();
        let bytes = encode(&set).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, set);
        assert!(!decoded.is_dirty());
    }

    #[test]
    fn test_bundle_lists_every_grid() {
        let bytes = encode(&GridSet::new()).unwrap();
        let entries = unpack(&bytes);
        assert_eq!(entries.len(), 1 + 7 * 2);
        assert_eq!(entries[0].0, "manifest.json");
        assert!(entries.iter().any(|(p, _)| p == "grids/DAY3_MCC/table.json"));
    }

    #[test]
    fn test_decode_rejects_non_gzip() {
        let err = decode(b"definitely not a bundle").unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_decode_rejects_truncated_stream() {
        let bytes = encode(&sample_set()).unwrap();
        assert!(decode(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_format_line() {
        let bytes = encode(&GridSet::new()).unwrap();
        let mut entries = unpack(&bytes);
        let mut manifest: serde_json::Value = serde_json::from_slice(&entries[0].1).unwrap();
        manifest["format"] = "roster-session v9".into();
        entries[0].1 = serde_json::to_vec(&manifest).unwrap();
        let err = decode(&repack(&entries)).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFormat(v) if v == "roster-session v9"));
    }

    #[test]
    fn test_decode_rejects_missing_grid() {
        let bytes = encode(&GridSet::new()).unwrap();
        let entries: Vec<_> = unpack(&bytes)
            .into_iter()
            .filter(|(p, _)| !p.starts_with("grids/DAY2_HCC1/"))
            .collect();
        let err = decode(&repack(&entries)).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingEntry(p) if p.contains("DAY2_HCC1")));
    }

    #[test]
    fn test_decode_rejects_stray_entry() {
        let bytes = encode(&GridSet::new()).unwrap();
        let mut entries = unpack(&bytes);
        entries.push(("grids/DAY9_MCC/metadata.json".to_string(), b"{}".to_vec()));
        assert!(decode(&repack(&entries)).is_err());
    }

    #[test]
    fn test_decode_rejects_tampered_hours() {
        let bytes = encode(&sample_set()).unwrap();
        let mut entries = unpack(&bytes);
        let idx = entries
            .iter()
            .position(|(p, _)| p == "grids/DAY1_MCC/metadata.json")
            .unwrap();
        let mut meta: serde_json::Value = serde_json::from_slice(&entries[idx].1).unwrap();
        meta["hours"]["ALICE"] = 40.0.into();
        entries[idx].1 = serde_json::to_vec(&meta).unwrap();
        let err = decode(&repack(&entries)).unwrap_err();
        assert!(matches!(err, ArchiveError::Malformed { .. }));
    }

    #[test]
    fn test_decode_rejects_tampered_mask() {
        let bytes = encode(&sample_set()).unwrap();
        let mut entries = unpack(&bytes);
        let idx = entries
            .iter()
            .position(|(p, _)| p == "grids/DAY3_MCC/metadata.json")
            .unwrap();
        let mut meta: serde_json::Value = serde_json::from_slice(&entries[idx].1).unwrap();
        meta["merge_mask"] = "1111111111".into();
        entries[idx].1 = serde_json::to_vec(&meta).unwrap();
        assert!(decode(&repack(&entries)).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_cell_token() {
        let bytes = encode(&sample_set()).unwrap();
        let mut entries = unpack(&bytes);
        let idx = entries
            .iter()
            .position(|(p, _)| p == "grids/DAY1_MCC/table.json")
            .unwrap();
        let mut table: serde_json::Value = serde_json::from_slice(&entries[idx].1).unwrap();
        table["cells"]["ALICE"][0] = "OFFICE".into();
        entries[idx].1 = serde_json::to_vec(&table).unwrap();
        let err = decode(&repack(&entries)).unwrap_err();
        assert!(matches!(err, ArchiveError::Malformed { .. }));
    }

    #[test]
    fn test_decode_rejects_cross_day_duplicate() {
        let bytes = encode(&GridSet::new()).unwrap();
        let mut entries = unpack(&bytes);
        for token in ["DAY1_MCC", "DAY1_HCC1"] {
            let meta_idx = entries
                .iter()
                .position(|(p, _)| *p == format!("grids/{token}/metadata.json"))
                .unwrap();
            let mut meta: serde_json::Value =
                serde_json::from_slice(&entries[meta_idx].1).unwrap();
            meta["names"] = serde_json::json!(["ALICE"]);
            meta["hours"] = serde_json::json!({ "ALICE": 0.0 });
            entries[meta_idx].1 = serde_json::to_vec(&meta).unwrap();

            let table_idx = entries
                .iter()
                .position(|(p, _)| *p == format!("grids/{token}/table.json"))
                .unwrap();
            let mut table: serde_json::Value =
                serde_json::from_slice(&entries[table_idx].1).unwrap();
            table["cells"] = serde_json::json!({ "ALICE": vec!["0"; 28] });
            entries[table_idx].1 = serde_json::to_vec(&table).unwrap();
        }
        let err = decode(&repack(&entries)).unwrap_err();
        assert!(matches!(err, ArchiveError::Malformed { .. }));
    }
}
