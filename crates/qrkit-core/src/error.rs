//! Error taxonomy for the QR pipeline and toolbox widgets.
//!
//! Every variant is meant to be shown to the user; none of them is fatal to
//! the application. Callers catch them at the operation boundary and turn
//! them into a status message.

use thiserror::Error;

/// Which external capability an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Decoder,
    Encoder,
}

impl CapabilityKind {
    pub fn label(&self) -> &'static str {
        match self {
            CapabilityKind::Decoder => "QR decoder",
            CapabilityKind::Encoder => "QR encoder",
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrError {
    #[error("The {0} is not loaded yet")]
    LibraryNotLoaded(CapabilityKind),

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("No QR code found in image")]
    DecodeNotFound,

    #[error("Unsupported drop type: {0}")]
    UnsupportedDropType(String),

    #[error("Dropped content is not an image, image URL or data URL")]
    UnrecognizedDropContent,

    #[error("Nothing to encode: input text is empty")]
    EmptyInput,

    #[error("Failed to load image: {0}")]
    ImageLoadFailure(String),

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("QR encoding failed: {0}")]
    Encode(String),

    #[error("A scan session is already active")]
    SessionActive,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl QrError {
    pub fn image_load(err: impl std::fmt::Display) -> Self {
        QrError::ImageLoadFailure(err.to_string())
    }

    pub fn camera(err: impl std::fmt::Display) -> Self {
        QrError::CameraUnavailable(err.to_string())
    }
}

impl From<image::ImageError> for QrError {
    fn from(err: image::ImageError) -> Self {
        QrError::image_load(err)
    }
}

pub type Result<T> = std::result::Result<T, QrError>;
