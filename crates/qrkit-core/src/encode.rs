//! Encode adapter: turns a generation request into a raster image.

use std::sync::Arc;

use crate::capability::{Capability, QrEncoder, SymbolMatrix};
use crate::error::{CapabilityKind, QrError, Result};
use crate::types::{GenerationRequest, PixelBuffer};

/// A generated symbol: the raster plus the module matrix it was drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub request: GenerationRequest,
    pub matrix: SymbolMatrix,
    pub image: PixelBuffer,
}

impl EncodedImage {
    /// PNG bytes for download.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        self.image.to_png()
    }
}

#[derive(Clone)]
pub struct EncodeAdapter {
    encoder: Capability<Arc<dyn QrEncoder>>,
}

impl EncodeAdapter {
    pub fn new(encoder: Capability<Arc<dyn QrEncoder>>) -> Self {
        Self { encoder }
    }

    pub fn is_ready(&self) -> bool {
        self.encoder.is_available()
    }

    /// Encode a request. Empty text is rejected before the encoder is touched.
    pub fn encode(&self, request: &GenerationRequest) -> Result<EncodedImage> {
        if request.text().is_empty() {
            return Err(QrError::EmptyInput);
        }
        let encoder = self.encoder.require(CapabilityKind::Encoder)?;
        let matrix = encoder.encode(request).map_err(QrError::Encode)?;
        let image = rasterize(&matrix, request)?;

        tracing::debug!(
            "Encoded {} bytes at level {} into {} modules, {}px",
            request.text().len(),
            request.error_correction(),
            matrix.width,
            request.size()
        );

        Ok(EncodedImage {
            request: request.clone(),
            matrix,
            image,
        })
    }
}

/// Draw the matrix with its quiet zone onto an exactly `size`×`size` raster.
///
/// Each output pixel samples the module under it, so modules may differ by one
/// pixel in width when `size` is not a multiple of the module count.
fn rasterize(matrix: &SymbolMatrix, request: &GenerationRequest) -> Result<PixelBuffer> {
    let options = request.options();
    let margin = options.margin as usize;
    let total = matrix.width + 2 * margin;
    let size = options.size as usize;

    if size < total {
        return Err(QrError::InvalidRequest(format!(
            "size {}px is smaller than the {} modules of this symbol",
            size, total
        )));
    }

    let fg = options.foreground_rgba();
    let bg = options.background_rgba();
    let mut rgba = Vec::with_capacity(size * size * 4);
    for py in 0..size {
        let my = py * total / size;
        for px in 0..size {
            let mx = px * total / size;
            let dark = mx >= margin
                && my >= margin
                && matrix.is_dark(mx - margin, my - margin);
            rgba.extend_from_slice(if dark { &fg } else { &bg });
        }
    }
    PixelBuffer::new(options.size, options.size, rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{QrcodeEncoder, RqrrDecoder};
    use crate::decode::DecodeAdapter;
    use crate::types::{DecodeResult, ErrorCorrection, RenderOptions, Rgb};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn encoder() -> EncodeAdapter {
        let handle: Arc<dyn QrEncoder> = Arc::new(QrcodeEncoder);
        EncodeAdapter::new(Capability::Available(handle))
    }

    fn decoder() -> DecodeAdapter {
        let handle: Arc<dyn crate::capability::QrDecoder> = Arc::new(RqrrDecoder);
        DecodeAdapter::new(Capability::Available(handle))
    }

    struct CountingEncoder(AtomicUsize);

    impl QrEncoder for CountingEncoder {
        fn encode(&self, request: &GenerationRequest) -> std::result::Result<SymbolMatrix, String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            QrcodeEncoder.encode(request)
        }
    }

    #[test]
    fn test_empty_input_never_reaches_encoder() {
        let counting = Arc::new(CountingEncoder(AtomicUsize::new(0)));
        let handle: Arc<dyn QrEncoder> = counting.clone();
        let adapter = EncodeAdapter::new(Capability::Available(handle));

        let req = GenerationRequest::new("", ErrorCorrection::M, 256).unwrap();
        assert_eq!(adapter.encode(&req), Err(QrError::EmptyInput));
        assert_eq!(counting.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unloaded_encoder() {
        let adapter = EncodeAdapter::new(Capability::Unavailable);
        let req = GenerationRequest::new("x", ErrorCorrection::M, 256).unwrap();
        assert_eq!(
            adapter.encode(&req),
            Err(QrError::LibraryNotLoaded(CapabilityKind::Encoder))
        );
    }

    #[test]
    fn test_output_has_requested_size_and_colours() {
        let options = RenderOptions {
            size: 200,
            margin: 2,
            foreground: Rgb([10, 20, 30]),
            background: Rgb([250, 240, 230]),
        };
        let req = GenerationRequest::with_options("abc", ErrorCorrection::L, options).unwrap();
        let out = encoder().encode(&req).unwrap();
        assert_eq!(out.image.width(), 200);
        assert_eq!(out.image.height(), 200);
        // Top-left pixel is inside the quiet zone.
        assert_eq!(&out.image.as_bytes()[..4], &[250, 240, 230, 255]);
        assert!(
            out.image
                .as_bytes()
                .chunks_exact(4)
                .any(|px| px == [10, 20, 30, 255])
        );
    }

    #[test]
    fn test_size_smaller_than_symbol_is_rejected() {
        let req = GenerationRequest::new("HELLO", ErrorCorrection::M, 20).unwrap();
        assert!(matches!(encoder().encode(&req), Err(QrError::InvalidRequest(_))));
    }

    #[test]
    fn test_largest_size_encodes() {
        let req =
            GenerationRequest::new("HELLO", ErrorCorrection::M, crate::types::MAX_IMAGE_SIZE)
                .unwrap();
        let out = encoder().encode(&req).unwrap();
        assert_eq!(out.image.width(), crate::types::MAX_IMAGE_SIZE);
        assert_eq!(out.image.as_bytes().len(), 2048 * 2048 * 4);
    }

    #[test]
    fn test_hello_round_trip() {
        let req = GenerationRequest::new("HELLO", ErrorCorrection::M, 256).unwrap();
        let out = encoder().encode(&req).unwrap();
        assert_eq!(
            decoder().decode(&out.image).unwrap(),
            DecodeResult::Found("HELLO".to_string())
        );
    }

    #[test]
    fn test_encoding_is_deterministic_across_levels_and_sizes() {
        let adapter = encoder();
        for level in ErrorCorrection::all() {
            for size in (128..=512).step_by(32) {
                let req = GenerationRequest::new("deterministic payload", *level, size).unwrap();
                let first = adapter.encode(&req).unwrap();
                let second = adapter.encode(&req).unwrap();
                assert_eq!(first.image.as_bytes(), second.image.as_bytes());
                assert_eq!(first.to_png().unwrap(), second.to_png().unwrap());
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn test_round_trip_printable_ascii(text in "[ -~]{1,48}", level_idx in 0usize..4) {
            let level = ErrorCorrection::all()[level_idx];
            let req = GenerationRequest::new(text.clone(), level, 512).unwrap();
            let out = encoder().encode(&req).unwrap();
            let decoded = decoder().decode(&out.image).unwrap();
            prop_assert_eq!(decoded, DecodeResult::Found(text));
        }
    }
}
