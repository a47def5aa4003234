// ============================================================================
// MASK LAYER — viewport-aligned inpainting mask with soft-edged brush stamps
// ============================================================================
//
// The mask only stores coverage (alpha).  Its colour is a render-time concern
// (`CanvasConfig::mask_color`), since every marked pixel has the same hue.
//
// Coverage lives behind an `Arc` so successive immutable viewport states can
// share one bitmap; only a transition that actually paints pays for a copy
// (`Arc::make_mut`).

use std::sync::Arc;

use egui::Pos2;
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::{ViewportRect, clip_segment, is_finite_point, segment_stamps};

/// Hardness never goes below this, otherwise the solid core and the fade
/// would collapse into a zero-width gradient stop.
pub const MIN_HARDNESS: f32 = 0.01;

/// Brush parameters for mask painting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrushSettings {
    /// Diameter in display pixels.
    pub size: f32,
    /// Peak alpha of a single stamp, 0.0–1.0.
    pub opacity: f32,
    /// Fraction of the radius that is fully opaque before the linear falloff.
    /// 1.0 = hard-edged circle, near 0 = fully soft radial gradient.
    pub hardness: f32,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            size: 40.0,
            opacity: 0.6,
            hardness: 0.5,
        }
    }
}

impl BrushSettings {
    pub fn sanitized(&self) -> Self {
        Self {
            size: self.size.max(1.0),
            opacity: self.opacity.clamp(0.0, 1.0),
            hardness: self.hardness.clamp(MIN_HARDNESS, 1.0),
        }
    }

    pub fn radius(&self) -> f32 {
        self.size / 2.0
    }

    /// Distance between interpolated stamps: a tenth of the diameter, at
    /// least one pixel.
    pub fn stamp_spacing(&self) -> f32 {
        (self.size / 10.0).max(1.0)
    }

    /// Stamp alpha (0.0–1.0) at `dist` pixels from the stamp center.
    pub fn falloff(&self, dist: f32) -> f32 {
        let b = self.sanitized();
        let radius = b.radius();
        let solid = radius * b.hardness;
        if dist <= solid {
            b.opacity
        } else if dist >= radius {
            0.0
        } else {
            b.opacity * (radius - dist) / (radius - solid)
        }
    }
}

/// Precomputed stamp for one set of brush settings.
///
/// The LUT maps the squared-distance ratio (`dist² / radius²`, quantised to
/// 0..=255) to stamp alpha, which avoids a `sqrt` per pixel.
struct BrushStamp {
    radius: f32,
    lut: [u8; 256],
}

impl BrushStamp {
    fn new(brush: &BrushSettings) -> Self {
        let brush = brush.sanitized();
        let radius = brush.radius();
        let mut lut = [0u8; 256];
        for (i, slot) in lut.iter_mut().enumerate() {
            let t_sq = i as f32 / 255.0;
            let dist = t_sq.sqrt() * radius;
            *slot = (brush.falloff(dist) * 255.0).round().min(255.0) as u8;
        }
        Self { radius, lut }
    }

    /// Composite one stamp source-over onto `coverage`.  Returns false when
    /// the stamp falls entirely outside the bitmap.
    fn apply(&self, coverage: &mut GrayImage, center: Pos2) -> bool {
        let (w, h) = coverage.dimensions();
        let r = self.radius;
        let r_sq = r * r;
        if w == 0 || h == 0 || r_sq < 0.001 || !is_finite_point(center) {
            return false;
        }

        let min_x = (center.x - r).floor().max(0.0) as i64;
        let min_y = (center.y - r).floor().max(0.0) as i64;
        let max_x = ((center.x + r).ceil() as i64).min(w as i64 - 1);
        let max_y = ((center.y + r).ceil() as i64).min(h as i64 - 1);
        if min_x > max_x || min_y > max_y {
            return false;
        }

        let inv_r_sq = 1.0 / r_sq;
        for y in min_y..=max_y {
            // Sample at pixel centers, like a canvas rasteriser does.
            let dy = y as f32 + 0.5 - center.y;
            for x in min_x..=max_x {
                let dx = x as f32 + 0.5 - center.x;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq >= r_sq {
                    continue;
                }
                let src = self.lut[(dist_sq * inv_r_sq * 255.0).min(255.0) as usize] as u32;
                if src == 0 {
                    continue;
                }
                let px = coverage.get_pixel_mut(x as u32, y as u32);
                let dst = px.0[0] as u32;
                // source-over: a = s + d·(1 − s)
                px.0[0] = (src + (dst * (255 - src) + 127) / 255).min(255) as u8;
            }
        }
        true
    }
}

/// Alpha-only paint surface aligned 1:1 with the viewport.
#[derive(Clone, Debug)]
pub struct MaskLayer {
    coverage: Arc<GrayImage>,
}

impl MaskLayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            coverage: Arc::new(GrayImage::new(width, height)),
        }
    }

    pub fn width(&self) -> u32 {
        self.coverage.width()
    }

    pub fn height(&self) -> u32 {
        self.coverage.height()
    }

    pub fn coverage(&self) -> &GrayImage {
        &self.coverage
    }

    /// True if `other` shares this layer's bitmap (no copy has happened).
    pub fn shares_bitmap_with(&self, other: &MaskLayer) -> bool {
        Arc::ptr_eq(&self.coverage, &other.coverage)
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        if x < self.width() && y < self.height() {
            self.coverage.get_pixel(x, y).0[0]
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.coverage.as_raw().par_iter().any(|&a| a != 0)
    }

    pub fn clear(&mut self) {
        if self.is_empty() {
            return;
        }
        self.coverage = Arc::new(GrayImage::new(self.width(), self.height()));
    }

    /// Bilinear coverage lookup at a fractional display-space position,
    /// treating pixel `(x, y)` as centered on `(x + 0.5, y + 0.5)`.
    /// Outside the bitmap coverage is zero.
    pub fn sample(&self, fx: f32, fy: f32) -> f32 {
        let (w, h) = (self.width() as i64, self.height() as i64);
        if w == 0 || h == 0 {
            return 0.0;
        }
        let sx = fx - 0.5;
        let sy = fy - 0.5;
        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let tx = sx - x0 as f32;
        let ty = sy - y0 as f32;

        let at = |x: i64, y: i64| -> f32 {
            if x < 0 || y < 0 || x >= w || y >= h {
                0.0
            } else {
                self.coverage.get_pixel(x as u32, y as u32).0[0] as f32 / 255.0
            }
        };
        let top = at(x0, y0) * (1.0 - tx) + at(x0 + 1, y0) * tx;
        let bottom = at(x0, y0 + 1) * (1.0 - tx) + at(x0 + 1, y0 + 1) * tx;
        top * (1.0 - ty) + bottom * ty
    }

    /// Stamp one soft circle of radius `brush.size / 2` at `center`.
    pub fn draw_soft_circle(&mut self, center: Pos2, brush: &BrushSettings) {
        let stamp = BrushStamp::new(brush);
        stamp.apply(Arc::make_mut(&mut self.coverage), center);
    }

    /// Stamp circles along `from → to` every `brush.stamp_spacing()` pixels,
    /// then once more exactly at `to`.  Returns the number of stamps.
    ///
    /// The segment is first clipped to the bitmap grown by the brush radius;
    /// a segment that never reaches the bitmap stamps nothing.
    pub fn stroke_segment(&mut self, from: Pos2, to: Pos2, brush: &BrushSettings) -> usize {
        let brush = brush.sanitized();
        let reach = ViewportRect::new(0.0, 0.0, self.width() as f32, self.height() as f32)
            .expand(brush.radius());
        let Some((from, to)) = clip_segment(from, to, &reach) else {
            return 0;
        };
        let stamp = BrushStamp::new(&brush);
        let points = segment_stamps(from, to, brush.stamp_spacing());
        let coverage = Arc::make_mut(&mut self.coverage);
        for p in &points {
            stamp.apply(coverage, *p);
        }
        points.len()
    }
}
