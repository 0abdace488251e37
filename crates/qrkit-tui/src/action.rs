//! Actions exchanged between the UI state, the main loop and background tasks.

use qrkit_core::{DragData, MediaStream, QrError, RequestToken};

/// Outcome of a camera request, handed back to the scan controller.
pub struct CameraGrant(pub Result<Box<dyn MediaStream>, QrError>);

impl std::fmt::Debug for CameraGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Ok(stream) => write!(f, "Granted({}x{})", stream.resolution().0, stream.resolution().1),
            Err(e) => write!(f, "Denied({})", e),
        }
    }
}

/// Actions that need the main loop (side effects, background work) or that
/// carry results back into the app state.
#[derive(Debug)]
pub enum Action {
    /// Request the camera for the pending scan.
    RequestCamera(RequestToken),
    /// Camera request finished.
    CameraResponse(RequestToken, CameraGrant),
    /// Resolve and decode a dropped or typed source.
    Decode { id: u64, data: DragData },
    /// Decode the image currently on the clipboard.
    PasteImage { id: u64 },
    /// Background decode finished.
    DecodeFinished { id: u64, result: Result<String, QrError> },
    /// Copy text to the clipboard.
    CopyText(String),
    /// Copy the generated image to the clipboard.
    CopyImage,
    /// Open a link in the browser.
    OpenLink(String),
    /// Save the generated image as PNG.
    SavePng,
    /// Quit the application.
    Quit,
}
