//! VGA and EGA colour table entries as stored in ground and special files.

use std::io::{self, Read};

use serde::Serialize;

/// One VGA DAC entry with 6-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VgaColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl VgaColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        VgaColor { r, g, b }
    }

    /// Widen to 8 bits per component, replicating the top bits into the
    /// bottom so 0x3F maps to 0xFF.
    pub const fn to_rgb8(self) -> [u8; 3] {
        [widen(self.r), widen(self.g), widen(self.b)]
    }
}

const fn widen(component: u8) -> u8 {
    (component << 2) | (component >> 4)
}

/// One EGA palette register value. Bits 5..3 hold the high bit of each 2-bit
/// component and bits 2..0 the low bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct EgaColor(pub u8);

impl EgaColor {
    pub const fn red(self) -> u8 {
        (((self.0 & 0b100_000) >> 2) | (self.0 & 0b000_100)) >> 2
    }

    pub const fn green(self) -> u8 {
        (((self.0 & 0b010_000) >> 2) | (self.0 & 0b000_010)) >> 1
    }

    pub const fn blue(self) -> u8 {
        ((self.0 & 0b001_000) >> 2) | (self.0 & 0b000_001)
    }

    pub const fn to_rgb8(self) -> [u8; 3] {
        [self.red() * 0x55, self.green() * 0x55, self.blue() * 0x55]
    }
}

pub fn read_vga_colors<R: Read>(reader: &mut R) -> io::Result<[VgaColor; 8]> {
    let mut raw = [0u8; 24];
    reader.read_exact(&mut raw)?;
    Ok(std::array::from_fn(|i| {
        VgaColor::new(raw[i * 3], raw[i * 3 + 1], raw[i * 3 + 2])
    }))
}

pub fn read_ega_colors<R: Read>(reader: &mut R) -> io::Result<[EgaColor; 8]> {
    let mut raw = [0u8; 8];
    reader.read_exact(&mut raw)?;
    Ok(raw.map(EgaColor))
}
