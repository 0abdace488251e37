//! Core QR pipeline for qrkit.
//!
//! This crate provides:
//! - Capability handles for the QR reader and generator (`capability` module)
//! - Image acquisition from files, drops and URLs (`acquire` module)
//! - Decode and encode adapters (`decode`, `encode` modules)
//! - The camera scan loop controller (`scan` module)
//! - Debounced generation with last-request-wins (`debounce` module)
//! - Result actions and the text toolbox (`display`, `tools` modules)
//! - Configuration management (`config` module)

pub mod acquire;
pub mod capability;
pub mod config;
pub mod debounce;
pub mod decode;
pub mod display;
pub mod encode;
pub mod error;
pub mod scan;
pub mod tools;
pub mod types;

pub use acquire::{DragData, HttpImageFetcher, ImageAcquirer, ImageFetcher};
pub use capability::{Capabilities, Capability, QrDecoder, QrEncoder, SymbolMatrix};
pub use config::{AppConfig, ConfigError, ThemeConfig};
pub use debounce::{DebounceSlot, GenerationOutcome, GenerationTrigger, GenerationView};
pub use decode::DecodeAdapter;
pub use display::ResultAction;
pub use encode::{EncodeAdapter, EncodedImage};
pub use error::{CapabilityKind, QrError, Result};
pub use scan::{
    CameraProvider, FacingMode, FrameStep, FrameTicket, MediaStream, RequestToken, ScanController,
    ScanOutcome, ScanState,
};
pub use tools::{TextStats, TextTool};
pub use types::*;
