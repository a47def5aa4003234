// ============================================================================
// SOURCE IMAGES — encoded payloads, data URIs and decoding
// ============================================================================
//
// The canvas never reads files.  Images arrive as encoded bytes with a
// declared MIME type (usually a `data:` URI from the host or the remote
// service) and are decoded once into an immutable `SourceImage`.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat, ImageOutputFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{CanvasError, CanvasResult};

/// Image encodings the canvas accepts and produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageMime {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
}

impl ImageMime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Png => "image/png",
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Webp => "image/webp",
            ImageMime::Gif => "image/gif",
            ImageMime::Bmp => "image/bmp",
        }
    }

    pub fn parse(mime: &str) -> CanvasResult<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/png" => Ok(ImageMime::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Ok(ImageMime::Jpeg),
            "image/webp" => Ok(ImageMime::Webp),
            "image/gif" => Ok(ImageMime::Gif),
            "image/bmp" | "image/x-ms-bmp" => Ok(ImageMime::Bmp),
            other => Err(CanvasError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(ImageMime::Png),
            "jpg" | "jpeg" => Some(ImageMime::Jpeg),
            "webp" => Some(ImageMime::Webp),
            "gif" => Some(ImageMime::Gif),
            "bmp" => Some(ImageMime::Bmp),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageMime::Png => "png",
            ImageMime::Jpeg => "jpg",
            ImageMime::Webp => "webp",
            ImageMime::Gif => "gif",
            ImageMime::Bmp => "bmp",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            ImageMime::Png => ImageFormat::Png,
            ImageMime::Jpeg => ImageFormat::Jpeg,
            ImageMime::Webp => ImageFormat::WebP,
            ImageMime::Gif => ImageFormat::Gif,
            ImageMime::Bmp => ImageFormat::Bmp,
        }
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(ImageMime::Png),
            ImageFormat::Jpeg => Some(ImageMime::Jpeg),
            ImageFormat::WebP => Some(ImageMime::Webp),
            ImageFormat::Gif => Some(ImageMime::Gif),
            ImageFormat::Bmp => Some(ImageMime::Bmp),
            _ => None,
        }
    }

    /// Sniff the encoding from the payload's magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        image::guess_format(bytes).ok().and_then(Self::from_image_format)
    }
}

/// Opaque encoded image: bytes plus their MIME type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub mime: ImageMime,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime", &self.mime)
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .finish()
    }
}

impl EncodedImage {
    pub fn new(mime: ImageMime, bytes: Vec<u8>) -> Self {
        Self { mime, bytes }
    }

    /// Parse `data:<mime>;base64,<payload>`.
    pub fn from_data_uri(uri: &str) -> CanvasResult<Self> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| CanvasError::UnsupportedFormat("not a data URI".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| CanvasError::UnsupportedFormat("data URI has no payload".to_string()))?;
        let Some(mime) = header.strip_suffix(";base64") else {
            return Err(CanvasError::UnsupportedFormat(format!(
                "data URI is not base64-encoded: '{}'",
                header
            )));
        };
        let mime = ImageMime::parse(mime)?;
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| CanvasError::Decode(format!("base64: {}", e)))?;
        Ok(Self { mime, bytes })
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime.as_str(), BASE64.encode(&self.bytes))
    }

    /// Encode RGBA pixels.  JPEG has no alpha, so pixels are flattened to RGB
    /// first; every other target keeps the alpha channel.
    pub fn encode(pixels: &RgbaImage, mime: ImageMime, jpeg_quality: u8) -> CanvasResult<Self> {
        let mut bytes = Vec::new();
        let mut cursor = Cursor::new(&mut bytes);
        let dynamic = DynamicImage::ImageRgba8(pixels.clone());
        let result = match mime {
            ImageMime::Jpeg => DynamicImage::ImageRgb8(dynamic.to_rgb8())
                .write_to(&mut cursor, ImageOutputFormat::Jpeg(jpeg_quality.clamp(1, 100))),
            ImageMime::Png => dynamic.write_to(&mut cursor, ImageOutputFormat::Png),
            ImageMime::Gif => dynamic.write_to(&mut cursor, ImageOutputFormat::Gif),
            ImageMime::Bmp => dynamic.write_to(&mut cursor, ImageOutputFormat::Bmp),
            ImageMime::Webp => {
                return Err(CanvasError::UnsupportedFormat(
                    "WebP is accepted as input only".to_string(),
                ));
            }
        };
        result.map_err(|e| CanvasError::Encode(e.to_string()))?;
        Ok(Self { mime, bytes })
    }

    /// Blocking decode.  The declared MIME type wins; if the bytes say
    /// otherwise the sniffed format is used instead.
    pub fn decode(&self) -> CanvasResult<SourceImage> {
        SourceImage::decode(self.clone())
    }
}

/// Immutable decoded source raster plus the payload it came from.
#[derive(Clone)]
pub struct SourceImage {
    encoded: Arc<EncodedImage>,
    pixels: Arc<RgbaImage>,
}

impl std::fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceImage")
            .field("mime", &self.encoded.mime)
            .field("natural_width", &self.natural_width())
            .field("natural_height", &self.natural_height())
            .finish()
    }
}

impl SourceImage {
    pub fn decode(mut encoded: EncodedImage) -> CanvasResult<Self> {
        let declared = encoded.mime.image_format();
        let decoded = match image::load_from_memory_with_format(&encoded.bytes, declared) {
            Ok(img) => img,
            Err(first) => match ImageMime::sniff(&encoded.bytes) {
                Some(actual) if actual != encoded.mime => {
                    crate::log_warn!(
                        "payload declared {} but looks like {}",
                        encoded.mime.as_str(),
                        actual.as_str()
                    );
                    encoded.mime = actual;
                    image::load_from_memory_with_format(&encoded.bytes, actual.image_format())?
                }
                _ => return Err(first.into()),
            },
        };
        let pixels = decoded.into_rgba8();
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(CanvasError::Decode("image has zero size".to_string()));
        }
        Ok(Self {
            encoded: Arc::new(encoded),
            pixels: Arc::new(pixels),
        })
    }

    pub fn from_data_uri(uri: &str) -> CanvasResult<Self> {
        Self::decode(EncodedImage::from_data_uri(uri)?)
    }

    /// Build from raw pixels, encoding them as `mime` so the payload is real.
    pub fn from_pixels(pixels: RgbaImage, mime: ImageMime) -> CanvasResult<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(CanvasError::Decode("image has zero size".to_string()));
        }
        let encoded = EncodedImage::encode(&pixels, mime, 92)?;
        Ok(Self {
            encoded: Arc::new(encoded),
            pixels: Arc::new(pixels),
        })
    }

    pub fn natural_width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn natural_height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn mime(&self) -> ImageMime {
        self.encoded.mime
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn encoded(&self) -> &EncodedImage {
        &self.encoded
    }

    pub fn to_data_uri(&self) -> String {
        self.encoded.to_data_uri()
    }
}

/// Decode on a worker thread; the result arrives on the returned channel.
///
/// Concurrent decodes are independent: no ordering is implied between two
/// receivers.
pub fn decode_in_background(encoded: EncodedImage) -> Receiver<CanvasResult<SourceImage>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(SourceImage::decode(encoded));
    });
    rx
}
