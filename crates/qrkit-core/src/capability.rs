//! External capabilities, resolved once at startup and passed down.
//!
//! A capability is either available (with a handle to use it) or not. Code
//! that needs one checks the variant instead of probing the environment again.

use std::sync::Arc;

use crate::error::{CapabilityKind, QrError, Result};
use crate::types::{GenerationRequest, PixelBuffer};

/// Availability of an external capability.
#[derive(Debug, Clone)]
pub enum Capability<T> {
    Available(T),
    Unavailable,
}

impl<T> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Capability::Available(handle) => Some(handle),
            Capability::Unavailable => None,
        }
    }

    /// Borrow the handle or report the capability as not loaded.
    pub fn require(&self, kind: CapabilityKind) -> Result<&T> {
        self.get().ok_or(QrError::LibraryNotLoaded(kind))
    }
}

impl<T> From<Option<T>> for Capability<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Capability::Unavailable, Capability::Available)
    }
}

/// Module matrix of an encoded symbol, without quiet zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMatrix {
    /// Modules per side.
    pub width: usize,
    /// Row-major, `true` for dark modules.
    pub modules: Vec<bool>,
}

impl SymbolMatrix {
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.modules[y * self.width + x]
    }
}

/// Opaque QR reader: pixels in, payload text out (or nothing).
pub trait QrDecoder: Send + Sync {
    fn decode(&self, buffer: &PixelBuffer) -> Option<String>;
}

/// Opaque QR generator: text and level in, module matrix out.
///
/// Failures carry no structure beyond a message.
pub trait QrEncoder: Send + Sync {
    fn encode(&self, request: &GenerationRequest) -> std::result::Result<SymbolMatrix, String>;
}

/// Decoder backed by `rqrr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode(&self, buffer: &PixelBuffer) -> Option<String> {
        let width = buffer.width() as usize;
        let height = buffer.height() as usize;
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| buffer.luma(x, y));

        let grids = prepared.detect_grids();
        if !grids.is_empty() {
            tracing::debug!("Detected {} QR grid(s) in {}x{} image", grids.len(), width, height);
        }

        for grid in grids {
            match grid.decode() {
                Ok((meta, content)) => {
                    tracing::debug!(
                        "QR decoded: {} bytes, ECC={:?}, version={:?}",
                        content.len(),
                        meta.ecc_level,
                        meta.version
                    );
                    return Some(content);
                }
                Err(e) => tracing::debug!("QR grid decode error: {:?}", e),
            }
        }
        None
    }
}

/// Encoder backed by the `qrcode` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrcodeEncoder;

impl QrEncoder for QrcodeEncoder {
    fn encode(&self, request: &GenerationRequest) -> std::result::Result<SymbolMatrix, String> {
        let code = qrcode::QrCode::with_error_correction_level(
            request.text().as_bytes(),
            request.error_correction().to_ec_level(),
        )
        .map_err(|e| e.to_string())?;

        let modules = code
            .to_colors()
            .into_iter()
            .map(|c| c == qrcode::Color::Dark)
            .collect();
        Ok(SymbolMatrix {
            width: code.width(),
            modules,
        })
    }
}

/// The QR capabilities available to this process.
#[derive(Clone)]
pub struct Capabilities {
    pub decoder: Capability<Arc<dyn QrDecoder>>,
    pub encoder: Capability<Arc<dyn QrEncoder>>,
}

impl Capabilities {
    /// Resolve the built-in capabilities. Called once at startup.
    pub fn detect() -> Self {
        tracing::info!("QR capabilities resolved: rqrr decoder, qrcode encoder");
        let decoder: Arc<dyn QrDecoder> = Arc::new(RqrrDecoder);
        let encoder: Arc<dyn QrEncoder> = Arc::new(QrcodeEncoder);
        Self {
            decoder: Capability::Available(decoder),
            encoder: Capability::Available(encoder),
        }
    }

    /// Nothing loaded; used before startup finishes and in tests.
    pub fn none() -> Self {
        Self {
            decoder: Capability::Unavailable,
            encoder: Capability::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCorrection;

    #[test]
    fn test_require_unavailable_reports_not_loaded() {
        let cap: Capability<u8> = Capability::Unavailable;
        assert_eq!(
            cap.require(CapabilityKind::Decoder),
            Err(QrError::LibraryNotLoaded(CapabilityKind::Decoder))
        );
        let cap = Capability::from(Some(7u8));
        assert_eq!(cap.require(CapabilityKind::Decoder), Ok(&7));
    }

    #[test]
    fn test_qrcode_encoder_version1_width() {
        let req = GenerationRequest::new("HELLO", ErrorCorrection::M, 256).unwrap();
        let matrix = QrcodeEncoder.encode(&req).unwrap();
        assert_eq!(matrix.width, 21);
        assert_eq!(matrix.modules.len(), 21 * 21);
        // Finder pattern corner is always dark.
        assert!(matrix.is_dark(0, 0));
        assert!(!matrix.is_dark(21, 0));
    }

    #[test]
    fn test_rqrr_decoder_blank_image_finds_nothing() {
        let buf = PixelBuffer::new(8, 8, vec![255; 8 * 8 * 4]).unwrap();
        assert_eq!(RqrrDecoder.decode(&buf), None);
    }
}
