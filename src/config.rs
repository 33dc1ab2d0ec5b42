//! Calibration constants, overlay styling, status codes and plugin settings.
//!
//! All numeric constants of the bar geometry live in [`Calibration`] so that an
//! instrument recalibration only needs a new JSON file, not a rebuild.
//! The defaults track the most recent calibration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::bars::BarState;
use crate::error::{CsuError, Result};
use crate::geometry::NUM_BARS;
use crate::plugin::SettingsStore;

/// Physical-to-pixel calibration of the CSU image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Signed slit pitch in mm. Negative values run slit 1 towards larger pixel `y`.
    pub bar_width: f64,
    /// Tilt between the bar travel axis and the detector columns, in degrees.
    pub bar_angle_deg: f64,
    /// Tilt of the slit edges, in degrees. Only used for the footprint corner skew.
    pub slit_angle_deg: f64,
    /// Pixels per mm.
    pub scale: f64,
    /// Travel-axis origin, in mm.
    pub origin_x: f64,
    /// Slit-axis origin, in mm.
    pub origin_y: f64,
    /// Sign applied to a bar offset before adding it to `origin_x`.
    pub travel_sign: f64,
    /// Travel-axis coordinate of a fully retracted even (right) bar, in mm.
    pub travel_limit: f64,
    /// Travel-axis coordinate of a fully retracted odd (left) bar, in mm.
    pub left_retracted: f64,
    /// Added to slit centres read from a per-slit table to reach bar coordinates, in mm.
    pub slit_center_offset: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            bar_width: -5.8,
            bar_angle_deg: 0.22,
            slit_angle_deg: 4.0,
            scale: 7.4,
            origin_x: 277.0,
            origin_y: 277.4,
            travel_sign: -1.0,
            travel_limit: 270.4,
            left_retracted: 0.0,
            slit_center_offset: 135.2,
        }
    }
}

impl Calibration {
    /// Bar tilt in radians.
    pub fn bar_angle(&self) -> f64 {
        self.bar_angle_deg.to_radians()
    }

    /// Slit tilt in radians.
    pub fn slit_angle(&self) -> f64 {
        self.slit_angle_deg.to_radians()
    }
}

/// Look of the drawn overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// Half-height of a bar footprint, in slit units.
    pub draw_height: f64,
    /// Font size of the bar number labels.
    pub font_size: f64,
    /// Distance of a bar label from the bar's retracted end, in mm.
    pub label_inset: f64,
    /// Whether footprints are filled.
    pub fill: bool,
    /// Fill opacity.
    pub fill_alpha: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            draw_height: 0.45,
            font_size: 10.0,
            label_inset: 6.0,
            fill: true,
            fill_alpha: 0.3,
        }
    }
}

/// Mapping from control-system status codes to bar states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCodes(BTreeMap<i32, BarState>);

impl Default for StatusCodes {
    fn default() -> Self {
        Self(BTreeMap::from([(2, BarState::Ok), (-3, BarState::Error)]))
    }
}

impl StatusCodes {
    /// Build a table from explicit `(code, state)` pairs.
    pub fn new(codes: impl IntoIterator<Item = (i32, BarState)>) -> Self {
        Self(codes.into_iter().collect())
    }

    /// State for `code`, if the code is known.
    pub fn lookup(&self, code: i32) -> Option<BarState> {
        self.0.get(&code).copied()
    }
}

/// Everything the core reads at call time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Geometry calibration.
    pub calibration: Calibration,
    /// Overlay look.
    pub style: OverlayStyle,
    /// Status file code table.
    pub status_codes: StatusCodes,
}

impl Config {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        info!("Loaded CSU configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved CSU configuration to {}", path.display());
        Ok(())
    }
}

/// The plugin's settings category in the host preferences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Currently selected bar.
    pub bar_num: u32,
    /// Drive the bar to the open position before initializing it.
    pub move_to_open: bool,
    /// Requested relative move, in mm.
    pub bar_dist: f64,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            bar_num: 1,
            move_to_open: false,
            bar_dist: 0.0,
        }
    }
}

impl PluginSettings {
    pub(crate) const BAR_NUM: &'static str = "bar_num";
    pub(crate) const MOVE_TO_OPEN: &'static str = "move_to_open";
    pub(crate) const BAR_DIST: &'static str = "bar_dist";

    /// Read the settings from the host store. Absent or unusable values keep their defaults.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let mut settings = Self::default();
        if let Some(value) = store.get(Self::BAR_NUM) {
            match parse_bar_num(&value) {
                Ok(bar_num) => settings.bar_num = bar_num,
                Err(e) => warn!("Ignoring stored setting: {e}"),
            }
        }
        if let Some(value) = store.get(Self::MOVE_TO_OPEN) {
            match value.trim().parse() {
                Ok(flag) => settings.move_to_open = flag,
                Err(_) => warn!("Ignoring stored setting {}={value:?}", Self::MOVE_TO_OPEN),
            }
        }
        if let Some(value) = store.get(Self::BAR_DIST) {
            match parse_bar_dist(&value) {
                Ok(dist) => settings.bar_dist = dist,
                Err(e) => warn!("Ignoring stored setting: {e}"),
            }
        }
        settings
    }

    /// Write all settings to the host store.
    pub fn save(&self, store: &mut dyn SettingsStore) {
        store.set(Self::BAR_NUM, self.bar_num.to_string());
        store.set(Self::MOVE_TO_OPEN, self.move_to_open.to_string());
        store.set(Self::BAR_DIST, self.bar_dist.to_string());
    }
}

/// Parse a bar number typed by the user.
pub(crate) fn parse_bar_num(text: &str) -> Result<u32> {
    text.trim()
        .parse::<u32>()
        .ok()
        .filter(|bar| (1..=NUM_BARS).contains(bar))
        .ok_or_else(|| CsuError::InvalidSetting {
            name: PluginSettings::BAR_NUM,
            value: text.to_string(),
        })
}

/// Parse a move distance typed by the user.
pub(crate) fn parse_bar_dist(text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|dist| dist.is_finite())
        .ok_or_else(|| CsuError::InvalidSetting {
            name: PluginSettings::BAR_DIST,
            value: text.to_string(),
        })
}
