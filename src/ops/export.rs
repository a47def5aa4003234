// ============================================================================
// EXPORT PIPELINE — viewport render, mask composite, expanded canvas
// ============================================================================
//
// All three outputs are pure functions of the viewport state, so calling them
// twice yields identical bytes.  The host can re-run export + submit as its
// retry strategy.

use egui::{ColorImage, Vec2};
use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::error::CanvasResult;
use crate::geometry::ViewportRect;
use crate::mask::MaskLayer;
use crate::source::{EncodedImage, ImageMime, SourceImage};

/// An encoded export ready for the generation service or a file-save.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub image: EncodedImage,
    pub width: u32,
    pub height: u32,
}

impl ExportPayload {
    pub fn mime(&self) -> ImageMime {
        self.image.mime
    }

    pub fn to_data_uri(&self) -> String {
        self.image.to_data_uri()
    }
}

/// Raw RGBA frame of the viewport, for hosts that draw it themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportFrame {
    pub width: u32,
    pub height: u32,
    /// Unmultiplied RGBA, row-major.
    pub rgba: Vec<u8>,
}

impl ViewportFrame {
    pub fn from_image(img: RgbaImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            rgba: img.into_raw(),
        }
    }

    /// Texture-ready image for egui hosts.
    pub fn to_color_image(&self) -> ColorImage {
        ColorImage::from_rgba_unmultiplied([self.width as usize, self.height as usize], &self.rgba)
    }
}

/// Pixel size of a viewport: container size rounded, at least 1×1.
pub fn viewport_pixel_size(container: Vec2) -> (u32, u32) {
    (
        container.x.round().max(1.0) as u32,
        container.y.round().max(1.0) as u32,
    )
}

/// MIME used for the mask composite: JPEG sources stay JPEG, everything else
/// becomes PNG.  Re-encoding a JPEG as PNG would only grow the payload.
pub fn composite_mime(source: ImageMime) -> ImageMime {
    match source {
        ImageMime::Jpeg => ImageMime::Jpeg,
        _ => ImageMime::Png,
    }
}

/// Draw `source` into `target` at `rect` (display space), rounded to whole
/// pixels.  Parts falling outside `target` are clipped.
fn draw_image_into(target: &mut RgbaImage, source: &RgbaImage, rect: &ViewportRect) {
    let (w, h) = rect.rounded_size();
    let scaled = if (w, h) == source.dimensions() {
        source.clone()
    } else {
        imageops::resize(source, w, h, imageops::FilterType::Triangle)
    };
    imageops::overlay(target, &scaled, rect.x.round() as i64, rect.y.round() as i64);
}

/// Source-over one colour with coverage `a` (0.0–1.0) onto `px`.
#[inline]
fn blend_over(px: &mut [u8], color: [u8; 3], a: f32) {
    if a <= 0.0 {
        return;
    }
    let a = a.min(1.0);
    let dst_a = px[3] as f32 / 255.0;
    let out_a = a + dst_a * (1.0 - a);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let src = color[c] as f32 / 255.0;
        let dst = px[c] as f32 / 255.0;
        let v = (src * a + dst * dst_a * (1.0 - a)) / out_a;
        px[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    px[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Image at its fitted rectangle with the mask overlaid unscaled on top.
///
/// The image always uses `draw` (aspect-correct), never the expansion
/// rectangle, so a resized `canvas_rect` never distorts the preview.
pub fn render_viewport(
    source: Option<&SourceImage>,
    draw: &ViewportRect,
    mask: &MaskLayer,
    container: Vec2,
    config: &CanvasConfig,
) -> RgbaImage {
    let (w, h) = viewport_pixel_size(container);
    let mut frame = RgbaImage::new(w, h);

    if let Some(src) = source
        && draw.width > 0.0
        && draw.height > 0.0
    {
        draw_image_into(&mut frame, src.pixels(), draw);
    }

    let color = config.mask_color;
    let stride = w as usize * 4;
    let buf: &mut [u8] = &mut frame;
    buf.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w as usize {
                let a = mask.alpha_at(x as u32, y as u32);
                if a > 0 {
                    blend_over(&mut row[x * 4..x * 4 + 4], color, a as f32 / 255.0);
                }
            }
        });

    frame
}

/// Native-resolution source with the viewport mask mapped onto it.
///
/// The mask is drawn under `scale(natural / draw)` after a translation of
/// `(-draw.x, -draw.y)`, so a stroke lands on the same image pixels whatever
/// the current fit.  Output dimensions always equal the natural size.
pub fn composite_with_mask(
    source: &SourceImage,
    draw: &ViewportRect,
    mask: &MaskLayer,
    config: &CanvasConfig,
) -> RgbaImage {
    let mut out = source.pixels().clone();
    if draw.width <= 0.0 || draw.height <= 0.0 || mask.is_empty() {
        return out;
    }

    let scale_x = source.natural_width() as f32 / draw.width;
    let scale_y = source.natural_height() as f32 / draw.height;
    let color = config.mask_color;
    let stride = out.width() as usize * 4;
    let width = out.width() as usize;

    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(v, row)| {
            // Native pixel center → display space.
            let vy = (v as f32 + 0.5) / scale_y + draw.y;
            for u in 0..width {
                let vx = (u as f32 + 0.5) / scale_x + draw.x;
                let a = mask.sample(vx, vy);
                if a > 0.0 {
                    blend_over(&mut row[u * 4..u * 4 + 4], color, a);
                }
            }
        });

    out
}

/// Encode [`composite_with_mask`] in the source's family (JPEG or PNG).
pub fn export_composite(
    source: &SourceImage,
    draw: &ViewportRect,
    mask: &MaskLayer,
    config: &CanvasConfig,
) -> CanvasResult<ExportPayload> {
    let pixels = composite_with_mask(source, draw, mask, config);
    let mime = composite_mime(source.mime());
    let (width, height) = pixels.dimensions();
    let image = EncodedImage::encode(&pixels, mime, config.jpeg_quality)?;
    crate::log_info!("export composite {}×{} as {}", width, height, mime.as_str());
    Ok(ExportPayload { image, width, height })
}

/// Canvas-sized image with the source kept at its fitted size and position
/// relative to the canvas origin.  Newly exposed area stays transparent.
pub fn expanded_image(source: &SourceImage, draw: &ViewportRect, canvas: &ViewportRect) -> RgbaImage {
    let (w, h) = canvas.rounded_size();
    let mut out = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 0]));
    let placed = ViewportRect::new(draw.x - canvas.x, draw.y - canvas.y, draw.width, draw.height);
    if placed.width > 0.0 && placed.height > 0.0 {
        draw_image_into(&mut out, source.pixels(), &placed);
    }
    out
}

/// Encode [`expanded_image`]; always PNG so the new area stays transparent.
pub fn export_expanded(
    source: &SourceImage,
    draw: &ViewportRect,
    canvas: &ViewportRect,
) -> CanvasResult<ExportPayload> {
    let pixels = expanded_image(source, draw, canvas);
    let (width, height) = pixels.dimensions();
    let image = EncodedImage::encode(&pixels, ImageMime::Png, 100)?;
    crate::log_info!("export expanded canvas {}×{}", width, height);
    Ok(ExportPayload { image, width, height })
}
