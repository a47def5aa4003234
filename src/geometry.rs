// ============================================================================
// GEOMETRY — display-space rectangles, aspect fitting, segment interpolation
// ============================================================================
//
// Everything in here is a pure function of its inputs.  Display space is the
// viewport's pixel grid (origin top-left, y down); native space is the
// source image's own pixel grid.

use egui::{Pos2, Vec2, pos2, vec2};
use serde::{Deserialize, Serialize};

use crate::error::{CanvasError, CanvasResult};

/// Tolerance used when comparing display-space coordinates.
pub const GEOMETRY_EPSILON: f32 = 1e-3;

/// Axis-aligned rectangle in display-space (viewport pixel) coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewportRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewportRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// A `width × height` rectangle whose center sits at `center`.
    pub fn from_center_size(center: Pos2, width: f32, height: f32) -> Self {
        Self {
            x: center.x - width / 2.0,
            y: center.y - height / 2.0,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Pos2 {
        pos2(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width / self.height
    }

    /// Pixel size rounded to whole pixels, never below 1×1.
    pub fn rounded_size(&self) -> (u32, u32) {
        (
            (self.width.round().max(1.0)) as u32,
            (self.height.round().max(1.0)) as u32,
        )
    }

    /// True when `other` lies fully inside `self` (within [`GEOMETRY_EPSILON`]).
    pub fn contains_rect(&self, other: &ViewportRect) -> bool {
        other.x >= self.x - GEOMETRY_EPSILON
            && other.y >= self.y - GEOMETRY_EPSILON
            && other.right() <= self.right() + GEOMETRY_EPSILON
            && other.bottom() <= self.bottom() + GEOMETRY_EPSILON
    }

    /// Same rectangle grown by `margin` on every side.
    pub fn expand(&self, margin: f32) -> ViewportRect {
        ViewportRect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }
}

/// Largest rectangle with the image's native aspect ratio that fits inside
/// `container`, centered.
///
/// Width-first: the image takes the full container width unless that makes
/// it too tall, in which case it takes the full height instead.
pub fn fit_to_container(natural_width: u32, natural_height: u32, container: Vec2) -> ViewportRect {
    if natural_width == 0 || natural_height == 0 || container.x <= 0.0 || container.y <= 0.0 {
        return ViewportRect::default();
    }
    let ratio = natural_width as f32 / natural_height as f32;

    let mut width = container.x;
    let mut height = container.x / ratio;
    if height > container.y {
        height = container.y;
        width = container.y * ratio;
    }

    ViewportRect {
        x: (container.x - width) / 2.0,
        y: (container.y - height) / 2.0,
        width,
        height,
    }
}

/// Parse a `"W:H"` aspect-ratio preset into `W / H`.
pub fn parse_aspect_ratio(ratio: &str) -> CanvasResult<f32> {
    let invalid = || CanvasError::InvalidAspectRatio(ratio.to_string());
    let (w, h) = ratio.split_once(':').ok_or_else(invalid)?;
    let w: f32 = w.trim().parse().map_err(|_| invalid())?;
    let h: f32 = h.trim().parse().map_err(|_| invalid())?;
    if !(w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
        return Err(invalid());
    }
    Ok(w / h)
}

/// Grow `draw` along one axis until it has `target_ratio`, keeping its center.
///
/// A wider target keeps the height and widens; a taller (or equal) target
/// keeps the width and grows the height.  The input is always contained in
/// the output.
pub fn expand_to_aspect(draw: &ViewportRect, target_ratio: f32) -> ViewportRect {
    let image_ratio = draw.aspect_ratio();
    let (width, height) = if target_ratio > image_ratio {
        (draw.height * target_ratio, draw.height)
    } else {
        (draw.width, draw.width / target_ratio)
    };
    ViewportRect::from_center_size(draw.center(), width, height)
}

/// Points to stamp between `from` and `to` at a fixed `step`, always ending
/// with a stamp exactly at `to`.
///
/// Shared by the mask brush and the sketch pen so fast pointer motion never
/// leaves gaps between sparse input events.  Non-finite endpoints yield no
/// stamps at all; callers clip long segments with [`clip_segment`] first.
pub fn segment_stamps(from: Pos2, to: Pos2, step: f32) -> Vec<Pos2> {
    if !is_finite_point(from) || !is_finite_point(to) {
        return Vec::new();
    }
    let step = if step.is_finite() { step.max(f32::EPSILON) } else { f32::INFINITY };
    let delta = to - from;
    let distance = delta.length();

    let mut points = Vec::new();
    if distance > 0.0 && distance.is_finite() {
        let dir = delta / distance;
        let count = (distance / step).ceil().min(MAX_SEGMENT_STAMPS as f32) as usize;
        points.reserve(count + 1);
        for i in 0..count {
            points.push(from + dir * (i as f32 * step));
        }
    }
    points.push(to);
    points
}

/// Upper bound on interpolated stamps per segment.
pub const MAX_SEGMENT_STAMPS: usize = 1 << 16;

pub fn is_finite_point(p: Pos2) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

/// The part of `from -> to` that lies inside `bounds` (Liang-Barsky), or
/// `None` when the segment misses it or an endpoint is not finite.
pub fn clip_segment(from: Pos2, to: Pos2, bounds: &ViewportRect) -> Option<(Pos2, Pos2)> {
    if !is_finite_point(from) || !is_finite_point(to) {
        return None;
    }
    // Widen to f64 so 1e20-sized coordinates keep their precision.
    let (x0, y0) = (from.x as f64, from.y as f64);
    let (dx, dy) = (to.x as f64 - x0, to.y as f64 - y0);
    let (left, top) = (bounds.x as f64, bounds.y as f64);
    let (right, bottom) = (bounds.right() as f64, bounds.bottom() as f64);

    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    for (p, q) in [(-dx, x0 - left), (dx, right - x0), (-dy, y0 - top), (dy, bottom - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| pos2((x0 + dx * t) as f32, (y0 + dy * t) as f32);
    let start = if t0 > 0.0 { at(t0) } else { from };
    let end = if t1 < 1.0 { at(t1) } else { to };
    Some((start, end))
}

/// Parse `"WxH"` (also `W×H` / `W,H`) into a container size.
pub fn parse_size(s: &str) -> Option<Vec2> {
    let s = s.trim();
    let (w, h) = s.split_once(|c: char| matches!(c, 'x' | 'X' | '×' | ','))?;
    let w: f32 = w.trim().parse().ok()?;
    let h: f32 = h.trim().parse().ok()?;
    (w > 0.0 && h > 0.0).then(|| vec2(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn fit_landscape_into_square() {
        let r = fit_to_container(800, 600, vec2(400.0, 400.0));
        assert!(approx(r.x, 0.0) && approx(r.y, 50.0));
        assert!(approx(r.width, 400.0) && approx(r.height, 300.0));
    }

    #[test]
    fn fit_portrait_uses_full_height() {
        let r = fit_to_container(600, 1200, vec2(500.0, 300.0));
        assert!(approx(r.height, 300.0));
        assert!(approx(r.width, 150.0));
        assert!(approx(r.x, 175.0));
        assert!(approx(r.y, 0.0));
    }

    #[test]
    fn fit_preserves_ratio_and_centers() {
        let images = [(1, 1), (1920, 1080), (3, 7), (4000, 100), (512, 513)];
        let containers = [vec2(1.0, 1.0), vec2(800.0, 600.0), vec2(200.0, 900.0), vec2(1234.5, 77.0)];
        for &(wi, hi) in &images {
            for &c in &containers {
                let r = fit_to_container(wi, hi, c);
                let expected = wi as f32 / hi as f32;
                assert!((r.aspect_ratio() - expected).abs() / expected < 1e-4);
                let outer = ViewportRect::new(0.0, 0.0, c.x, c.y);
                assert!(outer.contains_rect(&r), "{:?} not inside {:?}", r, c);
                assert!(approx(r.center().x, c.x / 2.0));
                assert!(approx(r.center().y, c.y / 2.0));
            }
        }
    }

    #[test]
    fn fit_degenerate_inputs_yield_empty_rect() {
        assert_eq!(fit_to_container(0, 10, vec2(10.0, 10.0)), ViewportRect::default());
        assert_eq!(fit_to_container(10, 10, vec2(0.0, 10.0)), ViewportRect::default());
    }

    #[test]
    fn aspect_ratio_parsing() {
        assert!(approx(parse_aspect_ratio("16:9").unwrap(), 16.0 / 9.0));
        assert!(approx(parse_aspect_ratio(" 1 : 1 ").unwrap(), 1.0));
        assert!(parse_aspect_ratio("16x9").is_err());
        assert!(parse_aspect_ratio("0:1").is_err());
        assert!(parse_aspect_ratio("a:b").is_err());
        assert!(parse_aspect_ratio("-4:3").is_err());
    }

    #[test]
    fn expand_wide_keeps_height() {
        let draw = ViewportRect::new(0.0, 50.0, 400.0, 300.0);
        let r = expand_to_aspect(&draw, 16.0 / 9.0);
        assert!(approx(r.height, 300.0));
        assert!(approx(r.width, 533.33));
        assert!(approx(r.center().x, 200.0));
        assert!(approx(r.center().y, 200.0));
        assert!(r.contains_rect(&draw));
    }

    #[test]
    fn expand_tall_keeps_width() {
        let draw = ViewportRect::new(0.0, 50.0, 400.0, 300.0);
        let r = expand_to_aspect(&draw, 9.0 / 16.0);
        assert!(approx(r.width, 400.0));
        assert!(approx(r.height, 400.0 * 16.0 / 9.0));
        assert!(r.contains_rect(&draw));
    }

    #[test]
    fn segment_always_ends_at_target() {
        let pts = segment_stamps(pos2(0.0, 0.0), pos2(10.0, 0.0), 3.0);
        assert_eq!(pts, vec![pos2(0.0, 0.0), pos2(3.0, 0.0), pos2(6.0, 0.0), pos2(9.0, 0.0), pos2(10.0, 0.0)]);
        let single = segment_stamps(pos2(5.0, 5.0), pos2(5.0, 5.0), 1.0);
        assert_eq!(single, vec![pos2(5.0, 5.0)]);
    }

    #[test]
    fn segment_with_unbounded_endpoint_is_empty() {
        assert!(segment_stamps(pos2(0.0, 0.0), pos2(f32::INFINITY, 0.0), 1.0).is_empty());
        assert!(segment_stamps(pos2(f32::NAN, 0.0), pos2(1.0, 0.0), 1.0).is_empty());
        let far = segment_stamps(pos2(0.0, 0.0), pos2(1e20, 0.0), 1.0);
        assert!(far.len() <= MAX_SEGMENT_STAMPS + 1);
        assert_eq!(far.last(), Some(&pos2(1e20, 0.0)));
    }

    #[test]
    fn clip_keeps_inside_part() {
        let bounds = ViewportRect::new(0.0, 0.0, 100.0, 50.0);
        let inside = clip_segment(pos2(10.0, 10.0), pos2(20.0, 20.0), &bounds);
        assert_eq!(inside, Some((pos2(10.0, 10.0), pos2(20.0, 20.0))));

        let (a, b) = clip_segment(pos2(50.0, 25.0), pos2(1e20, 25.0), &bounds).unwrap();
        assert_eq!(a, pos2(50.0, 25.0));
        assert!(approx(b.x, 100.0) && approx(b.y, 25.0));

        let (a, b) = clip_segment(pos2(-50.0, 10.0), pos2(150.0, 10.0), &bounds).unwrap();
        assert!(approx(a.x, 0.0) && approx(b.x, 100.0));

        assert_eq!(clip_segment(pos2(-10.0, -10.0), pos2(-1.0, 60.0), &bounds), None);
        assert_eq!(clip_segment(pos2(0.0, 0.0), pos2(f32::INFINITY, 0.0), &bounds), None);
    }

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("400x300"), Some(vec2(400.0, 300.0)));
        assert_eq!(parse_size("1024,768"), Some(vec2(1024.0, 768.0)));
        assert_eq!(parse_size("0x5"), None);
        assert_eq!(parse_size("wide"), None);
    }
}
