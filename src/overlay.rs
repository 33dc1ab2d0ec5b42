//! Bar footprint overlay.
//!
//! For each of the 46 slits, the two bars are drawn as quadrilaterals running from
//! their retracted end to their current position, coloured by bar state, with the
//! bar number written near the retracted end. Drawing goes through the host's
//! [`Canvas`]; the renderer keeps no state between calls.

use std::path::Path;

use itertools::Itertools;
use log::{debug, info};
use nalgebra::Vector2;

use crate::bars::{
    parse_status_lines, read_header, read_status_file, BarPositions, BarState, BarStates, Header,
};
use crate::config::{Calibration, Config, OverlayStyle, StatusCodes};
use crate::error::{CsuError, Result};
use crate::geometry::{is_left_bar, slit_to_bars, CoordinateTransform, NUM_SLITS};

/// Colours understood by the host canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    /// Healthy bar.
    Green,
    /// Faulty bar.
    Red,
    /// Bar without a known state.
    Blue,
}

impl Color {
    /// Host colour name.
    pub fn name(self) -> &'static str {
        match self {
            Color::Green => "green",
            Color::Red => "red",
            Color::Blue => "blue",
        }
    }
}

impl BarState {
    /// Display colour of a bar in this state.
    pub fn color(self) -> Color {
        match self {
            BarState::Ok => Color::Green,
            BarState::Error => Color::Red,
            BarState::Unknown => Color::Blue,
        }
    }
}

/// Closed polygon in pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    /// Vertices in drawing order.
    pub points: Vec<Vector2<f64>>,
    /// Stroke and fill colour.
    pub color: Color,
    /// Whether the polygon is filled.
    pub fill: bool,
    /// Fill opacity.
    pub fill_alpha: f64,
}

/// Text drawn at a pixel position.
#[derive(Clone, Debug, PartialEq)]
pub struct TextLabel {
    /// Anchor in pixel coordinates.
    pub position: Vector2<f64>,
    /// Text content.
    pub text: String,
    /// Font size.
    pub font_size: f64,
    /// Text colour.
    pub color: Color,
}

/// Drawing surface owned by the host.
pub trait Canvas {
    /// Add a polygon.
    fn add_polygon(&mut self, polygon: Polygon);
    /// Add a text label.
    fn add_text(&mut self, label: TextLabel);
    /// Delete everything previously drawn.
    fn delete_all(&mut self);
}

/// One recorded drawing call.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    /// A polygon.
    Polygon(Polygon),
    /// A text label.
    Text(TextLabel),
}

/// A [`Canvas`] that records primitives in memory, in submission order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    /// Everything drawn, in the order it was added.
    pub primitives: Vec<Primitive>,
}

impl DrawList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if nothing has been drawn.
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Recorded polygons, in drawing order.
    pub fn polygons(&self) -> Vec<&Polygon> {
        self.primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Polygon(polygon) => Some(polygon),
                Primitive::Text(_) => None,
            })
            .collect()
    }

    /// Recorded labels, in drawing order.
    pub fn labels(&self) -> Vec<&TextLabel> {
        self.primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Text(label) => Some(label),
                Primitive::Polygon(_) => None,
            })
            .collect()
    }

    /// Replay the recorded primitives onto another canvas, in the order they were drawn.
    pub fn replay(&self, canvas: &mut dyn Canvas) {
        for primitive in self.primitives.iter().cloned() {
            match primitive {
                Primitive::Polygon(polygon) => canvas.add_polygon(polygon),
                Primitive::Text(label) => canvas.add_text(label),
            }
        }
    }
}

impl Canvas for DrawList {
    fn add_polygon(&mut self, polygon: Polygon) {
        self.primitives.push(Primitive::Polygon(polygon));
    }

    fn add_text(&mut self, label: TextLabel) {
        self.primitives.push(Primitive::Text(label));
    }

    fn delete_all(&mut self) {
        self.primitives.clear();
    }
}

/// Pixel geometry of one drawn bar.
#[derive(Clone, Debug, PartialEq)]
pub struct BarFootprint {
    /// Bar number.
    pub bar: u32,
    /// Slit the bar bounds.
    pub slit: u32,
    /// Corners: retracted end low/high, then bar tip high/low.
    pub corners: [Vector2<f64>; 4],
    /// Label anchor.
    pub label_at: Vector2<f64>,
    /// Display colour.
    pub color: Color,
}

/// Vertical skew of a footprint's far corners, in mm, caused by the slit tilt.
pub fn corner_skew(calibration: &Calibration, draw_height: f64) -> f64 {
    draw_height * calibration.bar_width * calibration.slit_angle().sin()
}

/// Renders bar footprints through a [`Canvas`].
#[derive(Clone, Debug)]
pub struct Overlay {
    transform: CoordinateTransform,
    calibration: Calibration,
    style: OverlayStyle,
    status_codes: StatusCodes,
}

impl Overlay {
    /// Renderer for a configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            transform: CoordinateTransform::new(&config.calibration),
            calibration: config.calibration.clone(),
            style: config.style.clone(),
            status_codes: config.status_codes.clone(),
        }
    }

    /// The transform used for every corner.
    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    fn footprint(&self, slit: u32, bar: u32, mm: f64, color: Color) -> BarFootprint {
        let h = self.style.draw_height;
        let skew = corner_skew(&self.calibration, h);
        let s = slit as f64;
        let (retracted, inset) = if is_left_bar(bar) {
            (self.calibration.left_retracted, self.style.label_inset)
        } else {
            (self.calibration.travel_limit, -self.style.label_inset)
        };

        BarFootprint {
            bar,
            slit,
            corners: [
                self.transform.to_pixel(s - h, retracted),
                self.transform.to_pixel(s + h, retracted),
                self.transform.to_pixel(s + h, mm - skew),
                self.transform.to_pixel(s - h, mm + skew),
            ],
            label_at: self.transform.to_pixel(s, retracted + inset),
            color,
        }
    }

    /// Footprints of all 92 bars, in bar order.
    ///
    /// Fails with [`CsuError::MissingBarPosition`] if any bar has no position.
    /// Bars without a state, or all bars when `states` is `None`, are blue.
    pub fn footprints(
        &self,
        positions: &BarPositions,
        states: Option<&BarStates>,
    ) -> Result<Vec<BarFootprint>> {
        (1..=NUM_SLITS)
            .flat_map(|slit| {
                let (left, right) = slit_to_bars(slit);
                [(slit, left), (slit, right)]
            })
            .map(|(slit, bar)| -> Result<BarFootprint> {
                let mm = positions
                    .get(bar)
                    .ok_or(CsuError::MissingBarPosition(bar))?;
                let state = states.map_or(BarState::Unknown, |s| s.state(bar));
                Ok(self.footprint(slit, bar, mm, state.color()))
            })
            .collect()
    }

    /// Draw every bar's footprint and number. Returns the number of bars drawn.
    ///
    /// All footprints are computed before the first primitive is submitted, so an
    /// error leaves the canvas untouched. Calling this twice without
    /// [`clear`](Overlay::clear) draws everything twice.
    pub fn render(
        &self,
        canvas: &mut dyn Canvas,
        positions: &BarPositions,
        states: Option<&BarStates>,
    ) -> Result<usize> {
        let footprints = self.footprints(positions, states)?;
        for footprint in &footprints {
            canvas.add_polygon(Polygon {
                points: footprint.corners.to_vec(),
                color: footprint.color,
                fill: self.style.fill,
                fill_alpha: self.style.fill_alpha,
            });
            canvas.add_text(TextLabel {
                position: footprint.label_at,
                text: footprint.bar.to_string(),
                font_size: self.style.font_size,
                color: footprint.color,
            });
        }

        let counts = footprints.iter().counts_by(|f| f.color);
        debug!(
            "Overlay colours: {}",
            counts
                .iter()
                .sorted_by_key(|(c, _)| c.name())
                .map(|(c, n)| format!("{}={n}", c.name()))
                .join(", ")
        );
        info!("Drew {} bar footprints", footprints.len());
        Ok(footprints.len())
    }

    /// Parse status lines and draw them.
    pub fn overlay_from_lines<I, S>(&self, canvas: &mut dyn Canvas, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let snapshot = parse_status_lines(lines, &self.status_codes)?;
        self.render(canvas, &snapshot.positions, Some(&snapshot.states))
    }

    /// Read a status file and draw it.
    pub fn overlay_from_file(
        &self,
        canvas: &mut dyn Canvas,
        path: impl AsRef<Path>,
    ) -> Result<usize> {
        let snapshot = read_status_file(path, &self.status_codes)?;
        self.render(canvas, &snapshot.positions, Some(&snapshot.states))
    }

    /// Read bar positions from an image header and draw them without states.
    pub fn overlay_from_header(
        &self,
        canvas: &mut dyn Canvas,
        header: &dyn Header,
    ) -> Result<usize> {
        let positions = read_header(header, &self.calibration)?;
        self.render(canvas, &positions, None)
    }

    /// Remove everything from the canvas.
    pub fn clear(canvas: &mut dyn Canvas) {
        canvas.delete_all();
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::bars::tests::full_header;
    use crate::geometry::NUM_BARS;

    fn all_positions() -> BarPositions {
        (1..=NUM_BARS)
            .map(|bar| (bar, if bar % 2 == 1 { 130. } else { 140. }))
            .collect()
    }

    #[test]
    fn draws_every_bar() {
        let mut canvas = DrawList::new();
        let drawn = Overlay::default()
            .render(&mut canvas, &all_positions(), None)
            .unwrap();

        assert_eq!(drawn, 92);
        assert_eq!(canvas.polygons().len(), 92);
        assert_eq!(canvas.labels().len(), 92);
        assert!(canvas.polygons().iter().all(|p| p.points.len() == 4));
        assert!(canvas.polygons().iter().all(|p| p.color == Color::Blue));
        let texts = canvas.labels().iter().map(|l| l.text.clone()).collect_vec();
        assert_eq!(texts[0], "1");
        assert_eq!(texts[91], "92");
    }

    #[test]
    fn color_fallback() {
        let mut canvas = DrawList::new();
        let states = BarStates::from_iter([(1, BarState::Ok), (3, BarState::Error)]);
        Overlay::default()
            .render(&mut canvas, &all_positions(), Some(&states))
            .unwrap();

        assert_eq!(canvas.polygons()[0].color, Color::Green);
        assert_eq!(canvas.polygons()[1].color, Color::Blue);
        assert_eq!(canvas.polygons()[2].color, Color::Red);
        assert_eq!(canvas.labels()[0].color, Color::Green);
        assert_eq!(canvas.labels()[1].color, Color::Blue);
        assert_eq!(Color::Blue.name(), "blue");
    }

    #[test]
    fn missing_position_draws_nothing() {
        let mut positions = all_positions();
        positions.remove(5);

        let overlay = Overlay::default();
        let err = overlay.footprints(&positions, None).unwrap_err();
        assert!(matches!(err, CsuError::MissingBarPosition(5)));

        let mut canvas = DrawList::new();
        assert!(matches!(
            overlay.render(&mut canvas, &positions, None),
            Err(CsuError::MissingBarPosition(5))
        ));
        assert!(canvas.is_empty());
    }

    #[test]
    fn footprint_corners() {
        let overlay = Overlay::default();
        let calibration = Calibration::default();
        let transform = CoordinateTransform::new(&calibration);
        let skew = corner_skew(&calibration, 0.45);
        assert_abs_diff_eq!(skew, -0.18206439647216702, epsilon = 1e-12);

        let footprints = overlay.footprints(&all_positions(), None).unwrap();
        let slit3_left = &footprints[4];
        let slit3_right = &footprints[5];
        assert_eq!((slit3_left.bar, slit3_left.slit), (5, 3));
        assert_eq!((slit3_right.bar, slit3_right.slit), (6, 3));

        let expected_left = [
            transform.to_pixel(2.55, 0.),
            transform.to_pixel(3.45, 0.),
            transform.to_pixel(3.45, 130. - skew),
            transform.to_pixel(2.55, 130. + skew),
        ];
        let expected_right = [
            transform.to_pixel(2.55, 270.4),
            transform.to_pixel(3.45, 270.4),
            transform.to_pixel(3.45, 140. - skew),
            transform.to_pixel(2.55, 140. + skew),
        ];
        for (got, want) in slit3_left.corners.iter().zip(&expected_left) {
            assert_abs_diff_eq!(got.x, want.x, epsilon = 1e-9);
            assert_abs_diff_eq!(got.y, want.y, epsilon = 1e-9);
        }
        for (got, want) in slit3_right.corners.iter().zip(&expected_right) {
            assert_abs_diff_eq!(got.x, want.x, epsilon = 1e-9);
            assert_abs_diff_eq!(got.y, want.y, epsilon = 1e-9);
        }

        let left_label = transform.to_pixel(3., 6.);
        let right_label = transform.to_pixel(3., 264.4);
        assert_abs_diff_eq!(slit3_left.label_at.x, left_label.x, epsilon = 1e-9);
        assert_abs_diff_eq!(slit3_right.label_at.x, right_label.x, epsilon = 1e-9);
    }

    #[test]
    fn same_input_same_output() {
        let overlay = Overlay::default();
        let mut first = DrawList::new();
        let mut second = DrawList::new();
        overlay.render(&mut first, &all_positions(), None).unwrap();
        overlay.render(&mut second, &all_positions(), None).unwrap();
        assert_eq!(first, second);

        // Without a clear the primitives accumulate.
        overlay.render(&mut first, &all_positions(), None).unwrap();
        assert_eq!(first.polygons().len(), 184);
        Overlay::clear(&mut first);
        assert!(first.is_empty());
    }

    #[test]
    fn from_lines_and_header() {
        let overlay = Overlay::default();
        let lines = (1..=NUM_BARS)
            .map(|bar| format!("{bar},{}.5,{}", bar, if bar == 10 { -3 } else { 2 }))
            .collect_vec();

        let mut canvas = DrawList::new();
        assert_eq!(overlay.overlay_from_lines(&mut canvas, &lines).unwrap(), 92);
        assert_eq!(canvas.polygons()[8].color, Color::Green);
        assert_eq!(canvas.polygons()[9].color, Color::Red);

        let mut canvas = DrawList::new();
        assert_eq!(overlay.overlay_from_header(&mut canvas, &full_header()).unwrap(), 92);
        assert!(canvas.polygons().iter().all(|p| p.color == Color::Blue));
    }

    #[test]
    fn from_lines_rejects_partial_file() {
        let overlay = Overlay::default();
        let mut canvas = DrawList::new();
        assert!(matches!(
            overlay.overlay_from_lines(&mut canvas, ["1,72.0,2", "2,144.9,2"]),
            Err(CsuError::MissingBarPosition(3))
        ));
        assert!(canvas.is_empty());
    }

    #[test]
    fn replay_onto_other_canvas() {
        let mut recorded = DrawList::new();
        Overlay::default()
            .render(&mut recorded, &all_positions(), None)
            .unwrap();
        let mut target = DrawList::new();
        recorded.replay(&mut target);
        assert_eq!(recorded, target);

        // Each bar's polygon is followed by its label.
        for (i, pair) in target.primitives.chunks(2).enumerate() {
            match pair {
                [Primitive::Polygon(polygon), Primitive::Text(label)] => {
                    assert_eq!(label.text, (i + 1).to_string());
                    assert_eq!(label.color, polygon.color);
                }
                other => panic!("unexpected primitive order at bar {}: {other:?}", i + 1),
            }
        }
    }

    #[test]
    fn non_finite_header_position_draws_nothing() {
        let mut header = full_header();
        header.insert("B05POS".to_string(), "NaN".to_string());
        header.insert("B06POS".to_string(), "inf".to_string());

        let mut canvas = DrawList::new();
        assert!(matches!(
            Overlay::default().overlay_from_header(&mut canvas, &header),
            Err(CsuError::MalformedHeaderValue { .. })
        ));
        assert!(canvas.is_empty());
    }
}
