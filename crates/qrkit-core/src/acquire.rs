//! Image acquisition: turn files, drops, URLs and data URLs into pixel buffers.
//!
//! Drop payloads are resolved into a [`DragSource`] first, in a fixed
//! precedence order (files, then URI list, then HTML, then plain text), and
//! only then read. Camera frames are acquired by the scan controller.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{QrError, Result};
use crate::types::{DragSource, DroppedFile, PixelBuffer};

/// Payload of one drop (or paste) event, as delivered by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DragData {
    pub files: Vec<DroppedFile>,
    /// `text/uri-list` content.
    pub uri_list: Option<String>,
    /// `text/html` content.
    pub html: Option<String>,
    /// `text/plain` content.
    pub text: Option<String>,
}

impl DragData {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn from_file(file: DroppedFile) -> Self {
        Self {
            files: vec![file],
            ..Self::default()
        }
    }
}

impl DragSource {
    /// Resolve a drop payload.
    ///
    /// A dropped file that is not an image fails with `UnsupportedDropType`.
    /// Text payloads that match nothing resolve to `Unrecognized`; reading
    /// that source reports `UnrecognizedDropContent`.
    pub fn resolve(data: &DragData) -> Result<DragSource> {
        if let Some(file) = data.files.first() {
            let mime = file_mime(file);
            return match mime {
                Some(mime) if mime.starts_with("image/") => Ok(DragSource::File(file.clone())),
                Some(mime) => Err(QrError::UnsupportedDropType(mime)),
                None => Err(QrError::UnsupportedDropType(format!("unknown type of '{}'", file.name))),
            };
        }

        let candidates = [
            data.uri_list.as_deref().and_then(first_uri),
            data.html.as_deref().and_then(extract_img_src),
            data.text.as_deref().map(str::trim),
        ];

        for candidate in candidates.into_iter().flatten() {
            if let Some(source) = classify_text(candidate) {
                return Ok(source);
            }
        }
        Ok(DragSource::Unrecognized)
    }
}

/// Declared MIME type, or one inferred from the file extension.
fn file_mime(file: &DroppedFile) -> Option<String> {
    if let Some(mime) = file.mime.as_deref().filter(|m| !m.is_empty()) {
        return Some(mime.to_ascii_lowercase());
    }
    image::ImageFormat::from_path(&file.name)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// First non-comment entry of a `text/uri-list`.
fn first_uri(list: &str) -> Option<&str> {
    list.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Value of the first `src` attribute in an HTML fragment.
///
/// Only a standalone `src` name counts; `data-src` and `srcset` are skipped.
fn extract_img_src(html: &str) -> Option<&str> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find("src") {
        let at = from + pos;
        let start = at + 3;
        let standalone = at == 0 || lower.as_bytes()[at - 1].is_ascii_whitespace();
        if !standalone {
            from = start;
            continue;
        }
        let rest = html[start..].trim_start();
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let quote = after_eq.chars().next()?;
            if quote == '"' || quote == '\'' {
                let value = &after_eq[1..];
                return value.find(quote).map(|end| &value[..end]);
            }
            let end = after_eq
                .find(|c: char| c.is_whitespace() || c == '>')
                .unwrap_or(after_eq.len());
            return Some(&after_eq[..end]);
        }
        from = start;
    }
    None
}

fn classify_text(candidate: &str) -> Option<DragSource> {
    let lower = candidate.to_ascii_lowercase();
    if lower.starts_with("data:image/") {
        return Some(DragSource::DataUrl(candidate.to_string()));
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(DragSource::RemoteUrl(candidate.to_string()));
    }
    if lower.starts_with("file://") {
        let decoded = urlencoding::decode(&candidate["file://".len()..]).ok()?;
        return Some(DragSource::LocalPath(PathBuf::from(decoded.into_owned())));
    }
    // Terminals quote dropped paths that contain spaces.
    let unquoted = candidate.trim_matches(|c| c == '\'' || c == '"');
    if Path::new(unquoted).is_absolute() {
        return Some(DragSource::LocalPath(PathBuf::from(unquoted)));
    }
    None
}

/// Decode the bytes of a `data:image/...;base64,` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| QrError::ImageLoadFailure("data URL has no payload".to_string()))?;

    if !header.to_ascii_lowercase().starts_with("data:image/") {
        return Err(QrError::UnrecognizedDropContent);
    }

    if header.ends_with(";base64") {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| QrError::ImageLoadFailure(format!("invalid base64 in data URL: {}", e)))
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}

/// Decode an encoded image (PNG, JPEG, ...) into RGBA pixels.
pub fn pixels_from_bytes(bytes: &[u8]) -> Result<PixelBuffer> {
    if bytes.is_empty() {
        return Err(QrError::ImageLoadFailure("empty image data".to_string()));
    }
    let image = image::load_from_memory(bytes)?;
    PixelBuffer::from_image(&image)
}

/// Read a whole file into memory and rasterise it.
pub async fn pixels_from_file(path: &Path) -> Result<PixelBuffer> {
    tracing::info!("Loading image from {}", path.display());
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| QrError::ImageLoadFailure(format!("{}: {}", path.display(), e)))?;
    pixels_from_bytes(&bytes)
}

/// Fetches remote image bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP GET without credentials.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(QrError::image_load)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::info!("Fetching image from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(QrError::image_load)?;

        let status = response.status();
        if !status.is_success() {
            return Err(QrError::ImageLoadFailure(format!("{} returned {}", url, status)));
        }

        let bytes = response.bytes().await.map_err(QrError::image_load)?;
        tracing::debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// Reads resolved sources into pixel buffers.
pub struct ImageAcquirer<F: ImageFetcher> {
    fetcher: F,
}

impl<F: ImageFetcher> ImageAcquirer<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub async fn acquire(&self, source: &DragSource) -> Result<PixelBuffer> {
        tracing::debug!("Acquiring image from {} source", source.kind());
        match source {
            DragSource::File(file) => pixels_from_bytes(&file.bytes),
            DragSource::DataUrl(url) => pixels_from_bytes(&decode_data_url(url)?),
            DragSource::RemoteUrl(url) => pixels_from_bytes(&self.fetcher.fetch(url).await?),
            DragSource::LocalPath(path) => pixels_from_file(path).await,
            DragSource::Unrecognized => Err(QrError::UnrecognizedDropContent),
        }
    }

    /// Resolve and read a drop payload in one step.
    pub async fn from_drop(&self, data: &DragData) -> Result<PixelBuffer> {
        let source = DragSource::resolve(data)?;
        self.acquire(&source).await
    }
}
