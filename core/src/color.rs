use std::str::FromStr;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

pub const DEFAULT_BACKGROUND_COLOR: Chip8Color = Chip8Color::new(0, 0, 0);
pub const DEFAULT_FOREGROUND_COLOR: Chip8Color = Chip8Color::new(255, 255, 255);

/// One display pixel as laid out in a little endian RGBX8888 texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct Chip8Color {
    padding: u8,
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl Chip8Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Chip8Color {
        Chip8Color { r, g, b, padding: 0 }
    }

    /// Reinterpret a slice of pixels as raw texture bytes
    pub fn as_bytes(pixels: &[Chip8Color]) -> &[u8] {
        bytemuck::cast_slice(pixels)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse hex color {0:?}, expected 0xRRGGBB")]
pub struct Chip8ColorParseError(String);

impl FromStr for Chip8Color {
    type Err = Chip8ColorParseError;

    fn from_str(s: &str) -> Result<Chip8Color, Chip8ColorParseError> {
        let err = || Chip8ColorParseError(s.to_string());
        let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix('#')).unwrap_or(s);

        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }

        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).map_err(|_| err());
        Ok(Chip8Color::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("0xAABBCC".parse::<Chip8Color>(), Ok(Chip8Color::new(0xAA, 0xBB, 0xCC)));
        assert_eq!("#102030".parse::<Chip8Color>(), Ok(Chip8Color::new(0x10, 0x20, 0x30)));
        assert_eq!("ffffff".parse::<Chip8Color>(), Ok(DEFAULT_FOREGROUND_COLOR));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("0xAABB".parse::<Chip8Color>().is_err());
        assert!("0xGGBBCC".parse::<Chip8Color>().is_err());
        assert!("".parse::<Chip8Color>().is_err());
    }

    #[test]
    fn test_byte_layout() {
        let pixels = [Chip8Color::new(0x11, 0x22, 0x33)];

        assert_eq!(Chip8Color::as_bytes(&pixels), &[0x00, 0x33, 0x22, 0x11]);
    }
}
