//! Result presentation: the actions offered next to a decoded or generated result.

use chrono::{DateTime, Local};
use reqwest::Url;
use std::path::{Path, PathBuf};

use crate::encode::EncodedImage;
use crate::error::{QrError, Result};

/// An action the user can take on a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultAction {
    /// Copy the text payload to the clipboard.
    Copy,
    /// Open the payload in the system browser.
    OpenLink(Url),
    /// Save the generated image as PNG.
    Download,
}

impl ResultAction {
    pub fn label(&self) -> &'static str {
        match self {
            ResultAction::Copy => "Copy",
            ResultAction::OpenLink(_) => "Open link",
            ResultAction::Download => "Save PNG",
        }
    }

    /// Key bound to this action in the TUI.
    pub fn key(&self) -> char {
        match self {
            ResultAction::Copy => 'y',
            ResultAction::OpenLink(_) => 'o',
            ResultAction::Download => 's',
        }
    }
}

/// Parse the payload as a web link. Only `http` and `https` qualify.
pub fn as_link(text: &str) -> Option<Url> {
    let url = Url::parse(text.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Actions for a decoded payload.
pub fn actions_for_decoded(text: &str) -> Vec<ResultAction> {
    let mut actions = vec![ResultAction::Copy];
    if let Some(url) = as_link(text) {
        actions.push(ResultAction::OpenLink(url));
    }
    actions
}

/// Actions for a generated image.
pub fn actions_for_generated(_image: &EncodedImage) -> Vec<ResultAction> {
    vec![ResultAction::Copy, ResultAction::Download]
}

/// File name for a saved symbol, e.g. `qrcode-20240131-235959.png`.
pub fn download_file_name(at: DateTime<Local>) -> String {
    format!("qrcode-{}.png", at.format("%Y%m%d-%H%M%S"))
}

/// Write the image as PNG into `dir`, creating it if needed. Returns the file path.
pub fn save_png(image: &EncodedImage, dir: &Path) -> Result<PathBuf> {
    let png = image.to_png()?;
    std::fs::create_dir_all(dir).map_err(QrError::image_load)?;
    let path = dir.join(download_file_name(Local::now()));
    std::fs::write(&path, png).map_err(QrError::image_load)?;
    tracing::info!("Saved QR code to {}", path.display());
    Ok(path)
}

/// Shorten a payload for one-line display.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    let count = first_line.chars().count();
    if count <= max_chars && first_line.len() == text.len() {
        return first_line.to_string();
    }
    let keep = max_chars.saturating_sub(1).min(count);
    let mut out: String = first_line.chars().take(keep).collect();
    out.push('…');
    out
}
