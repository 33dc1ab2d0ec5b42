#![warn(missing_docs)]

//! Bar overlay core for the configurable slit unit (CSU) of a multi-object spectrograph.
//!
//! The CSU is a grid of 92 bars forming 46 slits; slit `j` is bounded by the odd bar `2j-1`
//! on the left and the even bar `2j` on the right. This crate reads where the bars are,
//! maps bar positions onto the pixels of a CSU image, and draws one coloured footprint
//! and one number per bar on a host-provided canvas.
//!
//! ## Interface
//! - [`CoordinateTransform`] maps a (slit coordinate, mm offset) pair to a pixel.
//!   All its constants come from [`Calibration`].
//! - [`bars`] parses the control system's status file
//!   ([`parse_status_lines`](bars::parse_status_lines)) and image headers
//!   ([`read_header`](bars::read_header)) into [`BarPositions`] and [`BarStates`].
//! - [`Overlay`] turns positions and states into polygons and labels on a [`Canvas`].
//! - [`plugin`] adapts all of the above to a host viewer's plugin hooks.
//!
//! Example:
//! ```rust
//! use csu_initializer::{bars, Config, DrawList, Overlay};
//!
//! let config = Config::default();
//! let status: String = (1..=92).map(|bar| format!("{bar},{}.0,2\n", 100 + bar)).collect();
//! let snapshot = bars::parse_status_str(&status, &config.status_codes).unwrap();
//!
//! let mut canvas = DrawList::new();
//! let drawn = Overlay::new(&config)
//!     .render(&mut canvas, &snapshot.positions, Some(&snapshot.states))
//!     .unwrap();
//! assert_eq!(drawn, 92);
//! ```
//!
//! ## Colours
//! Bars reported OK are green, bars in error are red, and bars without a known state
//! (including every bar read from an image header) are blue.
//!
//! ## Errors
//! Parsing is all-or-nothing and rendering refuses to draw if any bar position is
//! missing; see [`CsuError`].

pub mod bars;
pub mod config;
pub mod error;
pub mod geometry;
pub mod overlay;
pub mod plugin;

pub use bars::{BarPositions, BarSnapshot, BarState, BarStates, Header};
pub use config::{Calibration, Config, OverlayStyle, PluginSettings, StatusCodes};
pub use error::{CsuError, Result};
pub use geometry::{bar_to_slit, slit_to_bars, CoordinateTransform, NUM_BARS, NUM_SLITS};
pub use overlay::{Canvas, Color, DrawList, Overlay, Primitive};
pub use plugin::{CsuInitializer, LocalPlugin, SettingsStore};
