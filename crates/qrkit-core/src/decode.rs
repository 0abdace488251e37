//! Decode adapter: hands a pixel buffer to the QR reader capability.

use std::sync::Arc;

use crate::capability::{Capability, QrDecoder};
use crate::error::{CapabilityKind, Result};
use crate::types::{DecodeResult, PixelBuffer};

/// Wraps the decoder capability. Performs exactly one attempt per call;
/// retry policy belongs to the scan controller.
#[derive(Clone)]
pub struct DecodeAdapter {
    decoder: Capability<Arc<dyn QrDecoder>>,
}

impl DecodeAdapter {
    pub fn new(decoder: Capability<Arc<dyn QrDecoder>>) -> Self {
        Self { decoder }
    }

    pub fn is_ready(&self) -> bool {
        self.decoder.is_available()
    }

    pub fn decode(&self, buffer: &PixelBuffer) -> Result<DecodeResult> {
        let decoder = self.decoder.require(CapabilityKind::Decoder)?;
        Ok(DecodeResult::from(decoder.decode(buffer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QrError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDecoder {
        calls: AtomicUsize,
        answer: Option<String>,
    }

    impl QrDecoder for CountingDecoder {
        fn decode(&self, _buffer: &PixelBuffer) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn white() -> PixelBuffer {
        PixelBuffer::new(4, 4, vec![255; 64]).unwrap()
    }

    #[test]
    fn test_unloaded_decoder_reports_library_not_loaded() {
        let adapter = DecodeAdapter::new(Capability::Unavailable);
        assert!(!adapter.is_ready());
        assert_eq!(
            adapter.decode(&white()),
            Err(QrError::LibraryNotLoaded(CapabilityKind::Decoder))
        );
    }

    #[test]
    fn test_decode_delegates_once() {
        let decoder = Arc::new(CountingDecoder {
            calls: AtomicUsize::new(0),
            answer: Some("payload".to_string()),
        });
        let handle: Arc<dyn QrDecoder> = decoder.clone();
        let adapter = DecodeAdapter::new(Capability::Available(handle));
        assert_eq!(
            adapter.decode(&white()).unwrap(),
            DecodeResult::Found("payload".to_string())
        );
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decode_not_found() {
        let decoder = Arc::new(CountingDecoder {
            calls: AtomicUsize::new(0),
            answer: None,
        });
        let handle: Arc<dyn QrDecoder> = decoder;
        let adapter = DecodeAdapter::new(Capability::Available(handle));
        assert_eq!(adapter.decode(&white()).unwrap(), DecodeResult::NotFound);
    }
}
