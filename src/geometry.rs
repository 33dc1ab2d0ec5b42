//! Slit and bar numbering, and the physical-to-pixel transform of the CSU image.

use nalgebra::{Matrix2, RowVector2, Vector2};

use crate::config::Calibration;

/// Number of slits in the CSU.
pub const NUM_SLITS: u32 = 46;
/// Number of bars in the CSU.
pub const NUM_BARS: u32 = 2 * NUM_SLITS;

/// Bars bounding `slit`: the odd (left) bar `2j-1` and the even (right) bar `2j`.
///
/// `slit` must be in `1..=NUM_SLITS`.
pub fn slit_to_bars(slit: u32) -> (u32, u32) {
    debug_assert!((1..=NUM_SLITS).contains(&slit), "slit {slit} out of range");
    (2 * slit - 1, 2 * slit)
}

/// Slit bounded by `bar`.
pub fn bar_to_slit(bar: u32) -> u32 {
    bar.div_ceil(2)
}

/// Odd bars are the left edge of their slit.
pub fn is_left_bar(bar: u32) -> bool {
    bar % 2 == 1
}

/// Affine map from (slit coordinate, bar offset in mm) to image pixels.
///
/// The physical row vector `(origin_x + travel_sign·mm, s·bar_width + origin_y)` is
/// right-multiplied by the scaled rotation
/// ```text
/// | scale·cos(a)   -sin(a)      |
/// | sin(a)          scale·cos(a)|
/// ```
/// where `a` is the bar tilt. The slit tilt is not part of this map.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateTransform {
    matrix: Matrix2<f64>,
    origin: Vector2<f64>,
    bar_width: f64,
    travel_sign: f64,
}

impl CoordinateTransform {
    /// Build the transform for a calibration.
    pub fn new(calibration: &Calibration) -> Self {
        let (sin, cos) = calibration.bar_angle().sin_cos();
        let scale = calibration.scale;
        Self {
            matrix: Matrix2::new(scale * cos, -sin, sin, scale * cos),
            origin: Vector2::new(calibration.origin_x, calibration.origin_y),
            bar_width: calibration.bar_width,
            travel_sign: calibration.travel_sign,
        }
    }

    /// The 2×2 matrix applied to physical coordinates.
    pub fn matrix(&self) -> &Matrix2<f64> {
        &self.matrix
    }

    /// Pixel position of the point `mm` along the travel axis at fractional slit coordinate `slit`.
    pub fn to_pixel(&self, slit: f64, mm: f64) -> Vector2<f64> {
        let physical = RowVector2::new(
            self.origin.x + self.travel_sign * mm,
            slit * self.bar_width + self.origin.y,
        );
        (physical * self.matrix).transpose()
    }
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self::new(&Calibration::default())
    }
}
