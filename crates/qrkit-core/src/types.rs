//! Core data types shared by the QR pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{QrError, Result};

/// Raw RGBA raster used as the common input to decode operations.
///
/// Row-major, tightly packed: `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap an RGBA byte buffer, checking that its length matches the dimensions.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(4));
        match expected {
            Some(len) if len == rgba.len() && len > 0 => Ok(Self {
                width,
                height,
                rgba,
            }),
            _ => Err(QrError::ImageLoadFailure(format!(
                "pixel buffer of {} bytes does not match {}x{} RGBA",
                rgba.len(),
                width,
                height
            ))),
        }
    }

    /// Build a buffer from packed RGB bytes (camera frames), adding an opaque alpha channel.
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Result<Self> {
        let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
        for chunk in rgb.chunks_exact(3) {
            rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
        }
        Self::new(width, height, rgba)
    }

    /// Rasterise a decoded image.
    pub fn from_image(image: &image::DynamicImage) -> Result<Self> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(width, height, rgba.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgba
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.rgba
    }

    /// Luminance of one pixel, composited over a white background.
    pub fn luma(&self, x: usize, y: usize) -> u8 {
        let idx = (y * self.width as usize + x) * 4;
        let Some(px) = self.rgba.get(idx..idx + 4) else {
            return 255;
        };
        // Y = 0.299*R + 0.587*G + 0.114*B
        let y = (px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000;
        let alpha = px[3] as u32;
        ((y * alpha + 255 * (255 - alpha)) / 255) as u8
    }

    /// Encode the raster as PNG, for downloads and clipboard export.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = std::io::Cursor::new(Vec::new());
        image::write_buffer_with_format(
            &mut out,
            &self.rgba,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )?;
        Ok(out.into_inner())
    }
}

/// QR redundancy tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ErrorCorrection {
    /// ~7% recovery.
    L,
    /// ~15% recovery.
    #[default]
    M,
    /// ~25% recovery.
    Q,
    /// ~30% recovery.
    H,
}

impl ErrorCorrection {
    pub fn all() -> &'static [ErrorCorrection] {
        &[
            ErrorCorrection::L,
            ErrorCorrection::M,
            ErrorCorrection::Q,
            ErrorCorrection::H,
        ]
    }

    pub fn symbol(&self) -> char {
        match self {
            ErrorCorrection::L => 'L',
            ErrorCorrection::M => 'M',
            ErrorCorrection::Q => 'Q',
            ErrorCorrection::H => 'H',
        }
    }

    /// Next level, wrapping around; used by the level toggle in the UI.
    pub fn next(&self) -> Self {
        match self {
            ErrorCorrection::L => ErrorCorrection::M,
            ErrorCorrection::M => ErrorCorrection::Q,
            ErrorCorrection::Q => ErrorCorrection::H,
            ErrorCorrection::H => ErrorCorrection::L,
        }
    }

    pub(crate) fn to_ec_level(self) -> qrcode::EcLevel {
        match self {
            ErrorCorrection::L => qrcode::EcLevel::L,
            ErrorCorrection::M => qrcode::EcLevel::M,
            ErrorCorrection::Q => qrcode::EcLevel::Q,
            ErrorCorrection::H => qrcode::EcLevel::H,
        }
    }
}

impl std::fmt::Display for ErrorCorrection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for ErrorCorrection {
    type Err = QrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(ErrorCorrection::L),
            "M" => Ok(ErrorCorrection::M),
            "Q" => Ok(ErrorCorrection::Q),
            "H" => Ok(ErrorCorrection::H),
            other => Err(QrError::InvalidRequest(format!(
                "unknown error-correction level '{}' (expected L, M, Q or H)",
                other
            ))),
        }
    }
}

/// Opaque sRGB colour used for QR modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const BLACK: Rgb = Rgb([0, 0, 0]);
    pub const WHITE: Rgb = Rgb([255, 255, 255]);

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }

    fn rgba(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], 255]
    }
}

impl FromStr for Rgb {
    type Err = QrError;

    /// Parses `#rrggbb` or `#rgb` (leading `#` optional).
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || QrError::InvalidRequest(format!("invalid colour '{}'", s));
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(invalid()),
        };
        let mut out = [0u8; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&expanded[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Rgb(out))
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Rendering options for a generated symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Output edge length in pixels.
    pub size: u32,
    /// Quiet zone in modules.
    pub margin: u32,
    pub foreground: Rgb,
    pub background: Rgb,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            size: 256,
            margin: 4,
            foreground: Rgb::BLACK,
            background: Rgb::WHITE,
        }
    }
}

impl RenderOptions {
    pub(crate) fn foreground_rgba(&self) -> [u8; 4] {
        self.foreground.rgba()
    }

    pub(crate) fn background_rgba(&self) -> [u8; 4] {
        self.background.rgba()
    }
}

/// Largest accepted output edge length in pixels.
pub const MAX_IMAGE_SIZE: u32 = 2048;

/// Text payload plus options, validated once and then immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    text: String,
    error_correction: ErrorCorrection,
    options: RenderOptions,
}

impl GenerationRequest {
    /// Build a request with default margin and colours.
    ///
    /// The size must be a positive pixel dimension. Empty text is accepted here
    /// and rejected by the encode adapter, so the UI can build requests eagerly.
    pub fn new(text: impl Into<String>, error_correction: ErrorCorrection, size: u32) -> Result<Self> {
        Self::with_options(
            text,
            error_correction,
            RenderOptions {
                size,
                ..RenderOptions::default()
            },
        )
    }

    pub fn with_options(
        text: impl Into<String>,
        error_correction: ErrorCorrection,
        options: RenderOptions,
    ) -> Result<Self> {
        if options.size == 0 {
            return Err(QrError::InvalidRequest(
                "size must be a positive pixel dimension".to_string(),
            ));
        }
        if options.size > MAX_IMAGE_SIZE {
            return Err(QrError::InvalidRequest(format!(
                "size {}px exceeds the {}px maximum",
                options.size, MAX_IMAGE_SIZE
            )));
        }
        Ok(Self {
            text: text.into(),
            error_correction,
            options,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn error_correction(&self) -> ErrorCorrection {
        self.error_correction
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn size(&self) -> u32 {
        self.options.size
    }
}

/// Outcome of one decode attempt. No partial or fuzzy results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    Found(String),
    NotFound,
}

impl DecodeResult {
    pub fn is_found(&self) -> bool {
        matches!(self, DecodeResult::Found(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            DecodeResult::Found(text) => Some(text),
            DecodeResult::NotFound => None,
        }
    }

    /// Treat "no symbol" as an error, for one-shot decodes of uploaded images.
    pub fn into_text(self) -> Result<String> {
        match self {
            DecodeResult::Found(text) => Ok(text),
            DecodeResult::NotFound => Err(QrError::DecodeNotFound),
        }
    }
}

impl From<Option<String>> for DecodeResult {
    fn from(value: Option<String>) -> Self {
        value.map_or(DecodeResult::NotFound, DecodeResult::Found)
    }
}

/// A file carried by a drop event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedFile {
    pub name: String,
    /// Declared MIME type, if the host provided one.
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Where a dropped payload will be read from. Resolved once per drop event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragSource {
    File(DroppedFile),
    DataUrl(String),
    RemoteUrl(String),
    /// A local path, as delivered by terminals when a file is dropped on them.
    LocalPath(PathBuf),
    Unrecognized,
}

impl DragSource {
    pub fn kind(&self) -> &'static str {
        match self {
            DragSource::File(_) => "file",
            DragSource::DataUrl(_) => "data-url",
            DragSource::RemoteUrl(_) => "remote-url",
            DragSource::LocalPath(_) => "local-path",
            DragSource::Unrecognized => "unrecognized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer_rejects_length_mismatch() {
        assert!(PixelBuffer::new(2, 2, vec![0; 15]).is_err());
        assert!(PixelBuffer::new(0, 0, Vec::new()).is_err());
        assert!(PixelBuffer::new(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_pixel_buffer_from_rgb_adds_alpha() {
        let buf = PixelBuffer::from_rgb(2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(buf.as_bytes(), &[1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn test_luma_composites_transparent_over_white() {
        let buf = PixelBuffer::new(2, 1, vec![0, 0, 0, 0, 0, 0, 0, 255]).unwrap();
        assert_eq!(buf.luma(0, 0), 255);
        assert_eq!(buf.luma(1, 0), 0);
        // Out of range reads as background.
        assert_eq!(buf.luma(5, 5), 255);
    }

    #[test]
    fn test_error_correction_parse() {
        assert_eq!("l".parse::<ErrorCorrection>().unwrap(), ErrorCorrection::L);
        assert_eq!(" H ".parse::<ErrorCorrection>().unwrap(), ErrorCorrection::H);
        assert!("X".parse::<ErrorCorrection>().is_err());
        assert_eq!(ErrorCorrection::H.next(), ErrorCorrection::L);
    }

    #[test]
    fn test_rgb_parse_and_hex() {
        assert_eq!("#ff0080".parse::<Rgb>().unwrap(), Rgb([255, 0, 128]));
        assert_eq!("fff".parse::<Rgb>().unwrap(), Rgb::WHITE);
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("#gggggg".parse::<Rgb>().is_err());
        assert_eq!(Rgb([1, 2, 3]).to_hex(), "#010203");
    }

    #[test]
    fn test_generation_request_requires_positive_size() {
        assert!(matches!(
            GenerationRequest::new("x", ErrorCorrection::M, 0),
            Err(QrError::InvalidRequest(_))
        ));
        let req = GenerationRequest::new("x", ErrorCorrection::Q, 128).unwrap();
        assert_eq!(req.size(), 128);
        assert_eq!(req.error_correction(), ErrorCorrection::Q);
        assert_eq!(req.options().margin, 4);
    }

    #[test]
    fn test_generation_request_rejects_oversized_image() {
        for size in [MAX_IMAGE_SIZE + 1, 100_000, u32::MAX] {
            assert!(matches!(
                GenerationRequest::new("HELLO", ErrorCorrection::M, size),
                Err(QrError::InvalidRequest(_))
            ));
        }
        assert!(GenerationRequest::new("HELLO", ErrorCorrection::M, MAX_IMAGE_SIZE).is_ok());
    }

    #[test]
    fn test_decode_result_into_text() {
        assert_eq!(DecodeResult::from(Some("a".to_string())).into_text().unwrap(), "a");
        assert_eq!(DecodeResult::NotFound.into_text(), Err(QrError::DecodeNotFound));
    }

    #[test]
    fn test_png_export_has_signature() {
        let buf = PixelBuffer::new(1, 1, vec![0, 0, 0, 255]).unwrap();
        let png = buf.to_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
