//! Theme support with auto-detection for dark/light terminals.

use qrkit_core::ThemeConfig;
use ratatui::style::Color;

/// Application theme (dark or light).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    /// Resolve the configured preference, probing the terminal for `System`.
    ///
    /// Must run before raw mode is enabled.
    pub fn resolve(config: ThemeConfig) -> Self {
        match config {
            ThemeConfig::Light => Theme::Light,
            ThemeConfig::Dark => Theme::Dark,
            ThemeConfig::System => Self::detect(),
        }
    }

    /// Detect the terminal theme based on background luminance.
    pub fn detect() -> Self {
        match terminal_light::luma() {
            Ok(luma) if luma > 0.5 => {
                tracing::info!("Detected light terminal (luma: {:.2})", luma);
                Theme::Light
            }
            Ok(luma) => {
                tracing::info!("Detected dark terminal (luma: {:.2})", luma);
                Theme::Dark
            }
            Err(e) => {
                tracing::debug!("Could not detect terminal theme: {}, defaulting to dark", e);
                Theme::Dark
            }
        }
    }

    pub fn toggle(&self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn palette(&self) -> Palette {
        match self {
            Theme::Dark => Palette::dark(),
            Theme::Light => Palette::light(),
        }
    }
}

/// Color palette for the application.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub fg: Color,
    pub fg_dim: Color,
    pub bg: Color,
    pub border: Color,

    pub primary: Color,
    pub accent: Color,

    pub success: Color,
    pub warning: Color,
    pub error: Color,

    pub highlight: Color,
    pub muted: Color,

    pub tab_active: Color,
    pub tab_inactive: Color,

    /// QR dark modules and quiet zone. Always high contrast so phones can read
    /// the symbol off the screen.
    pub qr_dark: Color,
    pub qr_light: Color,
}

impl Palette {
    /// Dark theme palette (for dark terminal backgrounds).
    pub fn dark() -> Self {
        Self {
            fg: Color::White,
            fg_dim: Color::Gray,
            bg: Color::Reset,
            border: Color::DarkGray,

            primary: Color::Cyan,
            accent: Color::Magenta,

            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,

            highlight: Color::Yellow,
            muted: Color::DarkGray,

            tab_active: Color::Cyan,
            tab_inactive: Color::DarkGray,

            qr_dark: Color::Black,
            qr_light: Color::White,
        }
    }

    /// Light theme palette (for light terminal backgrounds).
    pub fn light() -> Self {
        Self {
            fg: Color::Black,
            fg_dim: Color::DarkGray,
            bg: Color::Reset,
            border: Color::Gray,

            primary: Color::Rgb(0, 128, 128),  // Teal
            accent: Color::Rgb(128, 0, 128),   // Purple

            success: Color::Rgb(0, 128, 0),    // Dark green
            warning: Color::Rgb(184, 134, 11), // Dark goldenrod
            error: Color::Rgb(178, 34, 34),    // Firebrick

            highlight: Color::Rgb(184, 134, 11),
            muted: Color::Gray,

            tab_active: Color::Rgb(0, 128, 128),
            tab_inactive: Color::Gray,

            qr_dark: Color::Black,
            qr_light: Color::White,
        }
    }
}
