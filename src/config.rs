// ============================================================================
// CONFIGURATION — tunables for the canvas core, read from key=value text
// ============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mask::BrushSettings;

/// Side length of a drag handle in display pixels.  The expansion rectangle
/// can never shrink below two handles per axis.
pub const DEFAULT_HANDLE_SIZE: f32 = 12.0;

/// Canvas-wide settings.
///
/// File format is one `key=value` per line; unknown keys are ignored and
/// unparsable values keep their default, so a stale or hand-edited file never
/// prevents startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub handle_size: f32,
    /// Brush used until the host sends its own settings.
    pub default_brush: BrushSettings,
    /// RGB colour the mask coverage is rendered in.
    pub mask_color: [u8; 3],
    /// Quality (1–100) for JPEG re-encoding of the mask composite.
    pub jpeg_quality: u8,
    pub sketch_ink: [u8; 4],
    pub sketch_line_width: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            handle_size: DEFAULT_HANDLE_SIZE,
            default_brush: BrushSettings::default(),
            mask_color: [255, 0, 255],
            jpeg_quality: 92,
            sketch_ink: [0, 0, 0, 255],
            sketch_line_width: 3.0,
        }
    }
}

impl CanvasConfig {
    /// Smallest width/height the expansion rectangle may take.
    pub fn min_canvas_extent(&self) -> f32 {
        2.0 * self.handle_size
    }

    /// Load from a file; a missing or unreadable file yields the defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                crate::log_warn!("config {} unreadable ({}), using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut c = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "handle_size" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v > 0.0
                    {
                        c.handle_size = v;
                    }
                }
                "brush_size" => {
                    if let Ok(v) = val.parse::<f32>() {
                        c.default_brush.size = v.max(1.0);
                    }
                }
                "brush_opacity" => {
                    if let Ok(v) = val.parse::<f32>() {
                        c.default_brush.opacity = v.clamp(0.0, 1.0);
                    }
                }
                "brush_hardness" => {
                    if let Ok(v) = val.parse::<f32>() {
                        c.default_brush.hardness = v.clamp(0.0, 1.0);
                    }
                }
                "mask_color" => {
                    if let Some([r, g, b]) = parse_channels::<3>(val) {
                        c.mask_color = [r, g, b];
                    }
                }
                "jpeg_quality" => {
                    c.jpeg_quality = val.parse::<u8>().map(|q| q.clamp(1, 100)).unwrap_or(92);
                }
                "sketch_ink" => {
                    if let Some(ink) = parse_channels::<4>(val) {
                        c.sketch_ink = ink;
                    }
                }
                "sketch_line_width" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v > 0.0
                    {
                        c.sketch_line_width = v;
                    }
                }
                _ => {}
            }
        }
        c
    }

    /// Serialize back to the `key=value` format understood by [`parse`](Self::parse).
    pub fn to_config_string(&self) -> String {
        let [mr, mg, mb] = self.mask_color;
        let [ir, ig, ib, ia] = self.sketch_ink;
        format!(
            "handle_size={}\n\
             brush_size={}\n\
             brush_opacity={}\n\
             brush_hardness={}\n\
             mask_color={},{},{}\n\
             jpeg_quality={}\n\
             sketch_ink={},{},{},{}\n\
             sketch_line_width={}\n",
            self.handle_size,
            self.default_brush.size,
            self.default_brush.opacity,
            self.default_brush.hardness,
            mr, mg, mb,
            self.jpeg_quality,
            ir, ig, ib, ia,
            self.sketch_line_width,
        )
    }
}

/// Parse `"r,g,b"` / `"r,g,b,a"` style channel lists.
fn parse_channels<const N: usize>(s: &str) -> Option<[u8; N]> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != N {
        return None;
    }
    let mut out = [0u8; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part.trim().parse::<u8>().ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        assert_eq!(CanvasConfig::parse(""), CanvasConfig::default());
        assert_eq!(CanvasConfig::default().min_canvas_extent(), 24.0);
    }

    #[test]
    fn parses_known_keys_and_ignores_noise() {
        let c = CanvasConfig::parse(
            "# comment\n\
             handle_size = 8\n\
             brush_size=64\n\
             brush_hardness=1.7\n\
             mask_color=0,255,0\n\
             jpeg_quality=abc\n\
             sketch_ink=10,20,30,255\n\
             nonsense line\n\
             unknown_key=5\n",
        );
        assert_eq!(c.handle_size, 8.0);
        assert_eq!(c.default_brush.size, 64.0);
        assert_eq!(c.default_brush.hardness, 1.0);
        assert_eq!(c.mask_color, [0, 255, 0]);
        assert_eq!(c.jpeg_quality, 92);
        assert_eq!(c.sketch_ink, [10, 20, 30, 255]);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let c = CanvasConfig::parse("handle_size=-3\nmask_color=1,2\nsketch_line_width=0\n");
        assert_eq!(c.handle_size, DEFAULT_HANDLE_SIZE);
        assert_eq!(c.mask_color, [255, 0, 255]);
        assert_eq!(c.sketch_line_width, 3.0);
    }

    #[test]
    fn config_string_parses_back() {
        let mut c = CanvasConfig::default();
        c.handle_size = 10.0;
        c.jpeg_quality = 75;
        c.mask_color = [1, 2, 3];
        assert_eq!(CanvasConfig::parse(&c.to_config_string()), c);
    }
}
