// ============================================================================
// SKETCH CANVAS — freehand opaque-ink drawing surface for the doodle flow
// ============================================================================

use egui::{ColorImage, Pos2};
use image::{Rgba, RgbaImage, imageops};

use crate::config::CanvasConfig;
use crate::error::CanvasResult;
use crate::geometry::{ViewportRect, clip_segment, is_finite_point, segment_stamps};
use crate::source::{EncodedImage, ImageMime};

/// A pointer sample as delivered by the host, in client coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum PointerInput {
    Mouse { client: Pos2 },
    /// Active touch points; only the first one draws.
    Touch { touches: Vec<Pos2> },
}

/// Single-layer drawing surface with a fixed round pen.
#[derive(Clone, Debug)]
pub struct SketchCanvas {
    surface: RgbaImage,
    /// Top-left of the surface in client coordinates.
    origin: Pos2,
    ink: Rgba<u8>,
    line_width: f32,
    last: Option<Pos2>,
}

impl SketchCanvas {
    pub fn new(width: u32, height: u32, config: &CanvasConfig) -> Self {
        Self {
            surface: RgbaImage::new(width.max(1), height.max(1)),
            origin: Pos2::ZERO,
            ink: Rgba(config.sketch_ink),
            line_width: config.sketch_line_width.max(1.0),
            last: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn set_origin(&mut self, origin: Pos2) {
        self.origin = origin;
    }

    pub fn is_drawing(&self) -> bool {
        self.last.is_some()
    }

    pub fn is_blank(&self) -> bool {
        self.surface.pixels().all(|p| p.0[3] == 0)
    }

    /// Surface-local position of a pointer sample.  Mouse and touch share
    /// this so both draw identically.
    fn local_position(&self, input: &PointerInput) -> Option<Pos2> {
        let client = match input {
            PointerInput::Mouse { client } => *client,
            PointerInput::Touch { touches } => *touches.first()?,
        };
        let local = Pos2::new(client.x - self.origin.x, client.y - self.origin.y);
        is_finite_point(local).then_some(local)
    }

    /// Pen down: starts a stroke and inks a dot.
    pub fn start(&mut self, input: &PointerInput) {
        let Some(p) = self.local_position(input) else { return };
        self.stamp(p);
        self.last = Some(p);
    }

    /// Pen move: continues the stroke if one is in progress.
    pub fn draw(&mut self, input: &PointerInput) {
        let (Some(from), Some(to)) = (self.last, self.local_position(input)) else {
            return;
        };
        let reach = ViewportRect::new(0.0, 0.0, self.width() as f32, self.height() as f32)
            .expand(self.line_width / 2.0);
        if let Some((a, b)) = clip_segment(from, to, &reach) {
            for p in segment_stamps(a, b, (self.line_width / 4.0).max(0.5)) {
                self.stamp(p);
            }
        }
        self.last = Some(to);
    }

    pub fn stop(&mut self) {
        self.last = None;
    }

    /// Solid disc of the pen width: round caps and joins fall out of
    /// stamping discs along the path.
    fn stamp(&mut self, center: Pos2) {
        let r = self.line_width / 2.0;
        let r_sq = r * r;
        let (w, h) = self.surface.dimensions();
        let min_x = (center.x - r).floor().max(0.0) as i64;
        let min_y = (center.y - r).floor().max(0.0) as i64;
        let max_x = ((center.x + r).ceil() as i64).min(w as i64 - 1);
        let max_y = ((center.y + r).ceil() as i64).min(h as i64 - 1);
        for y in min_y..=max_y {
            let dy = y as f32 + 0.5 - center.y;
            for x in min_x..=max_x {
                let dx = x as f32 + 0.5 - center.x;
                if dx * dx + dy * dy <= r_sq {
                    self.surface.put_pixel(x as u32, y as u32, self.ink);
                }
            }
        }
    }

    /// Resize the surface keeping existing ink at the same position.  Ink
    /// beyond the new bounds is cropped.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == self.surface.dimensions() {
            return;
        }
        let snapshot = std::mem::replace(&mut self.surface, RgbaImage::new(width, height));
        imageops::replace(&mut self.surface, &snapshot, 0, 0);
        self.last = None;
    }

    pub fn clear(&mut self) {
        self.surface = RgbaImage::new(self.width(), self.height());
        self.last = None;
    }

    pub fn capture_png(&self) -> CanvasResult<EncodedImage> {
        EncodedImage::encode(&self.surface, ImageMime::Png, 100)
    }

    pub fn capture_data_uri(&self) -> CanvasResult<String> {
        Ok(self.capture_png()?.to_data_uri())
    }

    pub fn to_color_image(&self) -> ColorImage {
        ColorImage::from_rgba_unmultiplied(
            [self.width() as usize, self.height() as usize],
            self.surface.as_raw(),
        )
    }
}
