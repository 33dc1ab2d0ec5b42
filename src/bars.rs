//! Ingestion of bar positions and states.
//!
//! Two sources are understood:
//! - the control system's flat status file, one `barno,pos,statuscode` line per bar;
//! - the image header, either as per-bar `Bxx POS` keys or as a per-slit table of
//!   centres and widths.
//!
//! Every parser is all-or-nothing: a bad line or a missing key fails the whole call,
//! so a caller never sees a partially populated map.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::hash::BuildHasher;
use std::io::{BufRead, BufReader};
use std::path::Path;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{Calibration, StatusCodes};
use crate::error::{CsuError, Result};
use crate::geometry::{slit_to_bars, NUM_BARS, NUM_SLITS};

/// Operational status of a bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarState {
    /// Bar reported healthy.
    Ok,
    /// Bar reported a fault.
    Error,
    /// No state known.
    Unknown,
}

/// Bar offsets along the travel axis, in mm, keyed by bar number.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BarPositions(BTreeMap<u32, f64>);

impl BarPositions {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of `bar`, if known.
    pub fn get(&self, bar: u32) -> Option<f64> {
        self.0.get(&bar).copied()
    }

    /// Set the position of `bar`, returning the previous one.
    pub fn insert(&mut self, bar: u32, mm: f64) -> Option<f64> {
        self.0.insert(bar, mm)
    }

    /// Forget the position of `bar`.
    pub fn remove(&mut self, bar: u32) -> Option<f64> {
        self.0.remove(&bar)
    }

    /// Number of bars with a position.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if no bar has a position.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `(bar, mm)` pairs in bar order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0.iter().map(|(bar, mm)| (*bar, *mm))
    }
}

impl FromIterator<(u32, f64)> for BarPositions {
    fn from_iter<T: IntoIterator<Item = (u32, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Bar states keyed by bar number. Bars without an entry are [`BarState::Unknown`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BarStates(BTreeMap<u32, BarState>);

impl BarStates {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `bar`, [`BarState::Unknown`] when absent.
    pub fn state(&self, bar: u32) -> BarState {
        self.0.get(&bar).copied().unwrap_or(BarState::Unknown)
    }

    /// Set the state of `bar`, returning the previous one.
    pub fn insert(&mut self, bar: u32, state: BarState) -> Option<BarState> {
        self.0.insert(bar, state)
    }

    /// Number of bars with a state.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if no bar has a state.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(u32, BarState)> for BarStates {
    fn from_iter<T: IntoIterator<Item = (u32, BarState)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Positions and states read together from a status file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BarSnapshot {
    /// Bar positions.
    pub positions: BarPositions,
    /// Bar states.
    pub states: BarStates,
}

/// Parse status file lines of the form `barno,pos,statuscode`.
///
/// Fields may carry surrounding whitespace; line terminators are stripped.
/// Blank lines, bars outside `1..=92` and repeated bars are rejected.
pub fn parse_status_lines<I, S>(lines: I, codes: &StatusCodes) -> Result<BarSnapshot>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut snapshot = BarSnapshot::default();

    for (i, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim_end_matches(['\r', '\n']);
        let line_no = i + 1;
        let malformed = |reason| CsuError::MalformedLine {
            line_no,
            line: line.to_string(),
            reason,
        };

        if line.trim().is_empty() {
            return Err(malformed("empty line"));
        }
        let (bar, pos, code) = line
            .split(',')
            .map(str::trim)
            .collect_tuple()
            .ok_or_else(|| malformed("expected 3 comma-separated fields"))?;

        let bar: u32 = bar
            .parse()
            .map_err(|_| malformed("bar number is not an integer"))?;
        if !(1..=NUM_BARS).contains(&bar) {
            return Err(malformed("bar number out of range"));
        }
        let pos: f64 = pos
            .parse()
            .ok()
            .filter(|pos: &f64| pos.is_finite())
            .ok_or_else(|| malformed("position is not a number"))?;
        let code: i32 = code
            .parse()
            .map_err(|_| malformed("status code is not an integer"))?;
        let state = codes
            .lookup(code)
            .ok_or_else(|| CsuError::MalformedStatusCode {
                line_no,
                line: line.to_string(),
                code,
            })?;

        if snapshot.positions.insert(bar, pos).is_some() {
            return Err(malformed("bar listed twice"));
        }
        snapshot.states.insert(bar, state);
    }

    debug!("Parsed status for {} bars", snapshot.positions.len());
    Ok(snapshot)
}

/// Parse a whole status file held in memory.
pub fn parse_status_str(text: &str, codes: &StatusCodes) -> Result<BarSnapshot> {
    parse_status_lines(text.lines(), codes)
}

/// Read and parse a status file.
pub fn read_status_file(path: impl AsRef<Path>, codes: &StatusCodes) -> Result<BarSnapshot> {
    let path = path.as_ref();
    let lines: Vec<String> = BufReader::new(File::open(path)?)
        .lines()
        .collect::<std::io::Result<_>>()?;
    debug!("Read {} status lines from {}", lines.len(), path.display());
    parse_status_lines(lines, codes)
}

/// One row of a per-slit mask table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlitRecord {
    /// Slit number, 1-based.
    pub slit: u32,
    /// Slit centre along the travel axis, in mm, relative to the CSU centre.
    pub center: f64,
    /// Slit width, in mm.
    pub width: f64,
}

/// Read-only view of an image header.
pub trait Header {
    /// Raw value of `key`.
    fn card(&self, key: &str) -> Option<&str>;

    /// Per-slit table, if the image carries bar positions in that form.
    fn slit_table(&self) -> Option<Vec<SlitRecord>> {
        None
    }
}

impl<S: BuildHasher> Header for HashMap<String, String, S> {
    fn card(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl Header for BTreeMap<String, String> {
    fn card(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

/// Header key holding the position of `bar`.
pub fn bar_key(bar: u32) -> String {
    format!("B{bar:02}POS")
}

/// Read all 92 bar positions from `B01POS` … `B92POS`.
pub fn parse_header_positions(header: &dyn Header) -> Result<BarPositions> {
    (1..=NUM_BARS)
        .map(|bar| -> Result<(u32, f64)> {
            let key = bar_key(bar);
            let raw = header.card(&key).ok_or(CsuError::MissingBarKey(bar))?;
            let mm = raw
                .trim()
                .trim_matches('\'')
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|mm| mm.is_finite())
                .ok_or_else(|| CsuError::MalformedHeaderValue {
                    key,
                    value: raw.to_string(),
                })?;
            Ok((bar, mm))
        })
        .collect()
}

/// Derive bar positions from slit centres and widths.
///
/// The left bar of slit `j` sits at `center + offset - width/2`, the right bar at
/// `center + offset + width/2`.
pub fn parse_slit_table(records: &[SlitRecord], calibration: &Calibration) -> Result<BarPositions> {
    let mut by_slit = BTreeMap::new();
    for record in records {
        if by_slit.insert(record.slit, record).is_some() {
            return Err(CsuError::DuplicateSlitRecord(record.slit));
        }
    }

    let mut positions = BarPositions::new();
    for slit in 1..=NUM_SLITS {
        let record = by_slit
            .get(&slit)
            .ok_or(CsuError::MissingSlitRecord(slit))?;
        if !(record.center.is_finite() && record.width.is_finite()) {
            return Err(CsuError::MalformedSlitRecord(slit));
        }
        let center = record.center + calibration.slit_center_offset;
        let half_width = record.width / 2.;
        let (left, right) = slit_to_bars(slit);
        positions.insert(left, center - half_width);
        positions.insert(right, center + half_width);
    }
    Ok(positions)
}

/// Bar positions from an image header, using the per-slit table when the header has one.
pub fn read_header(header: &dyn Header, calibration: &Calibration) -> Result<BarPositions> {
    let positions = match header.slit_table() {
        Some(records) => {
            debug!("Reading bar positions from a {}-row slit table", records.len());
            parse_slit_table(&records, calibration)?
        }
        None => parse_header_positions(header)?,
    };
    debug!("Read {} bar positions from header", positions.len());
    Ok(positions)
}
