//! Output colors. The core only tags shapes dark or clear; colors are
//! applied when an image or SVG document is produced.

use std::fmt;
use std::str::FromStr;

/// Straight (not premultiplied) RGBA color
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Color {
        Color { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color::rgba(r, g, b, 255)
    }

    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    /// `#RRGGBB`, with `AA` appended only when not opaque.
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    pub fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Error for a color that is not `#RGB`, `#RRGGBB` or `#RRGGBBAA`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseColorError(pub String);

impl fmt::Display for ParseColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid color `{}`", self.0)
    }
}

impl std::error::Error for ParseColorError {}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseColorError(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(error)?;
        if !hex.is_ascii() {
            return Err(error());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| error());
        match hex.len() {
            3 => {
                let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map(|d| d * 17).map_err(|_| error());
                Ok(Color::rgb(digit(0)?, digit(1)?, digit(2)?))
            }
            6 => Ok(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(error()),
        }
    }
}

/// Colors of one rendered layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Style {
    pub background: Color,
    pub foreground: Color,
}

impl Style {
    pub const fn new(background: Color, foreground: Color) -> Style {
        Style { background, foreground }
    }

    pub const SILK: Style = Style::new(Color::BLACK, Color::WHITE);
    pub const SILK_ALPHA: Style = Style::new(Color::TRANSPARENT, Color::WHITE);
    pub const COPPER: Style = Style::new(Color::BLACK, Color::rgb(40, 143, 40));
    pub const COPPER_ALPHA: Style = Style::new(Color::TRANSPARENT, Color::rgb(40, 143, 40));
    pub const PASTE_MASK: Style = Style::new(Color::BLACK, Color::rgb(117, 117, 117));
    pub const PASTE_MASK_ALPHA: Style = Style::new(Color::TRANSPARENT, Color::rgb(117, 117, 117));
    pub const SOLDER_MASK: Style = Style::new(Color::BLACK, Color::rgb(117, 117, 117));
    pub const SOLDER_MASK_ALPHA: Style = Style::new(Color::TRANSPARENT, Color::rgb(153, 153, 153));
    pub const DEBUG: Style = Style::new(Color::TRANSPARENT, Color::rgb(19, 61, 145));
    pub const BLACK_WHITE: Style = Style::new(Color::BLACK, Color::WHITE);
    pub const BLACK_WHITE_ALPHA: Style = Style::new(Color::TRANSPARENT, Color::WHITE);

    /// Preset by lowercase name, as accepted on the command line.
    pub fn preset(name: &str) -> Option<Style> {
        Some(match name {
            "silk" => Style::SILK,
            "silk-alpha" => Style::SILK_ALPHA,
            "copper" => Style::COPPER,
            "copper-alpha" => Style::COPPER_ALPHA,
            "paste-mask" => Style::PASTE_MASK,
            "paste-mask-alpha" => Style::PASTE_MASK_ALPHA,
            "solder-mask" => Style::SOLDER_MASK,
            "solder-mask-alpha" => Style::SOLDER_MASK_ALPHA,
            "debug" => Style::DEBUG,
            "black-white" => Style::BLACK_WHITE,
            "black-white-alpha" => Style::BLACK_WHITE_ALPHA,
            _ => return None,
        })
    }
}

impl Default for Style {
    /// Grayscale on a transparent background
    fn default() -> Self {
        Style::new(Color::TRANSPARENT, Color::WHITE)
    }
}
