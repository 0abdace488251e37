//! System clipboard and link opener.

use arboard::{Clipboard, ImageData};
use qrkit_core::{PixelBuffer, QrError};
use std::borrow::Cow;
use std::process::Command;

pub fn copy_text(text: &str) -> Result<(), String> {
    let mut clipboard = Clipboard::new().map_err(|e| format!("Clipboard unavailable: {}", e))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|e| format!("Failed to copy: {}", e))?;
    tracing::info!("Copied {} chars to clipboard", text.chars().count());
    Ok(())
}

pub fn copy_image(image: &PixelBuffer) -> Result<(), String> {
    let mut clipboard = Clipboard::new().map_err(|e| format!("Clipboard unavailable: {}", e))?;
    clipboard
        .set_image(ImageData {
            width: image.width() as usize,
            height: image.height() as usize,
            bytes: Cow::Borrowed(image.as_bytes()),
        })
        .map_err(|e| format!("Failed to copy image: {}", e))?;
    tracing::info!("Copied {}x{} image to clipboard", image.width(), image.height());
    Ok(())
}

/// Read an image from the clipboard for decoding.
pub fn paste_image() -> Result<PixelBuffer, QrError> {
    let mut clipboard = Clipboard::new().map_err(QrError::image_load)?;
    match clipboard.get_image() {
        Ok(data) => {
            tracing::debug!("Clipboard image: {}x{}", data.width, data.height);
            PixelBuffer::new(data.width as u32, data.height as u32, data.bytes.into_owned())
        }
        Err(arboard::Error::ContentNotAvailable) => Err(QrError::ImageLoadFailure(
            "clipboard holds no image".to_string(),
        )),
        Err(e) => Err(QrError::image_load(e)),
    }
}

/// Open a link with the platform's default handler.
pub fn open_link(url: &str) -> Result<(), String> {
    let mut command = opener_command();
    command.arg(url);
    command
        .spawn()
        .map_err(|e| format!("Failed to open link: {}", e))?;
    tracing::info!("Opened {}", url);
    Ok(())
}

#[cfg(target_os = "macos")]
fn opener_command() -> Command {
    Command::new("open")
}

#[cfg(target_os = "windows")]
fn opener_command() -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command() -> Command {
    Command::new("xdg-open")
}
