//! Text toolbox: encoders and case transforms applied to a single input string.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{QrError, Result};

/// A text-to-text transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextTool {
    #[default]
    Base64Encode,
    Base64Decode,
    UrlEncode,
    UrlDecode,
    Upper,
    Lower,
    Title,
    Camel,
    Snake,
    Kebab,
    Reverse,
}

impl TextTool {
    pub fn all() -> &'static [TextTool] {
        &[
            TextTool::Base64Encode,
            TextTool::Base64Decode,
            TextTool::UrlEncode,
            TextTool::UrlDecode,
            TextTool::Upper,
            TextTool::Lower,
            TextTool::Title,
            TextTool::Camel,
            TextTool::Snake,
            TextTool::Kebab,
            TextTool::Reverse,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextTool::Base64Encode => "Base64 encode",
            TextTool::Base64Decode => "Base64 decode",
            TextTool::UrlEncode => "URL encode",
            TextTool::UrlDecode => "URL decode",
            TextTool::Upper => "UPPER CASE",
            TextTool::Lower => "lower case",
            TextTool::Title => "Title Case",
            TextTool::Camel => "camelCase",
            TextTool::Snake => "snake_case",
            TextTool::Kebab => "kebab-case",
            TextTool::Reverse => "Reverse",
        }
    }

    /// Next tool in display order, wrapping around.
    pub fn next(&self) -> TextTool {
        let all = Self::all();
        let idx = all.iter().position(|t| t == self).unwrap_or(0);
        all[(idx + 1) % all.len()]
    }

    pub fn prev(&self) -> TextTool {
        let all = Self::all();
        let idx = all.iter().position(|t| t == self).unwrap_or(0);
        all[(idx + all.len() - 1) % all.len()]
    }

    pub fn apply(&self, input: &str) -> Result<String> {
        match self {
            TextTool::Base64Encode => Ok(base64_encode(input)),
            TextTool::Base64Decode => base64_decode(input),
            TextTool::UrlEncode => Ok(url_encode(input)),
            TextTool::UrlDecode => url_decode(input),
            TextTool::Upper => Ok(input.to_uppercase()),
            TextTool::Lower => Ok(input.to_lowercase()),
            TextTool::Title => Ok(title_case(input)),
            TextTool::Camel => Ok(camel_case(input)),
            TextTool::Snake => Ok(words(input).join("_")),
            TextTool::Kebab => Ok(words(input).join("-")),
            TextTool::Reverse => Ok(input.chars().rev().collect()),
        }
    }
}

pub fn base64_encode(input: &str) -> String {
    STANDARD.encode(input.as_bytes())
}

pub fn base64_decode(input: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(input.trim())
        .map_err(|e| QrError::InvalidInput(format!("not valid base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| QrError::InvalidInput("decoded bytes are not UTF-8 text".to_string()))
}

/// Percent-encode everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn url_encode(input: &str) -> String {
    let encoded = urlencoding::encode(input);
    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded.as_ref();
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escape = &rest[pos..pos + 3];
        match escape {
            "%21" => out.push('!'),
            "%2A" => out.push('*'),
            "%27" => out.push('\''),
            "%28" => out.push('('),
            "%29" => out.push(')'),
            _ => out.push_str(escape),
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    out
}

pub fn url_decode(input: &str) -> Result<String> {
    urlencoding::decode(input)
        .map(|s| s.into_owned())
        .map_err(|_| QrError::InvalidInput("decoded bytes are not UTF-8 text".to_string()))
}

/// Split into lowercase words on separators and lower→upper boundaries.
///
/// A boundary needs at least two characters before it, so a lone leading
/// lowercase letter stays with the capitals that follow (`wORLD` is one word).
fn words(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in input.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && current.chars().nth(1).is_some() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_numeric();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn title_case(input: &str) -> String {
    input
        .split(' ')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn camel_case(input: &str) -> String {
    let mut out = String::new();
    for (i, word) in words(input).iter().enumerate() {
        if i == 0 {
            out.push_str(word);
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

/// Character, word and line counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStats {
    pub chars: usize,
    pub words: usize,
    pub lines: usize,
}

impl TextStats {
    pub fn of(input: &str) -> Self {
        Self {
            chars: input.chars().count(),
            words: input.split_whitespace().count(),
            lines: input.lines().count(),
        }
    }
}
