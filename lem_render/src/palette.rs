use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use image::{ColorType, ImageEncoder, codecs::png::PngEncoder};
use lem_formats::ground::{GroundColors, VgaSpecial};
use lem_formats::VgaColor;
use serde::Serialize;

/// Entry 7 on special levels.
pub const SPECIAL_HIGHLIGHT: VgaColor = VgaColor::new(0x1F, 0x1F, 0x00);

/// The 16-entry VGA palette a level is displayed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelPalette {
    pub colors: [VgaColor; 16],
}

impl LevelPalette {
    /// Entries 0..8 come from the ground's standard table, 8..16 from the
    /// custom table of the special background if there is one, else the
    /// ground's. Entry 7 is replaced by the first custom colour (or a fixed
    /// yellow for special levels).
    pub fn assemble(ground: &GroundColors, special: Option<&VgaSpecial>) -> Self {
        let mut colors = [VgaColor::default(); 16];
        colors[..8].copy_from_slice(&ground.vga_standard);
        match special {
            Some(special) => {
                colors[7] = SPECIAL_HIGHLIGHT;
                colors[8..].copy_from_slice(&special.vga_custom);
            }
            None => {
                colors[7] = ground.vga_custom[0];
                colors[8..].copy_from_slice(&ground.vga_custom);
            }
        }
        LevelPalette { colors }
    }

    pub fn rgb8(&self) -> [[u8; 3]; 16] {
        self.colors.map(VgaColor::to_rgb8)
    }

    /// Expand palette indices to packed RGB bytes; indices use the low nibble.
    pub fn expand(&self, indexed: &[u8]) -> Vec<u8> {
        let lookup = self.rgb8();
        indexed
            .iter()
            .flat_map(|&index| lookup[usize::from(index & 0x0F)])
            .collect()
    }
}

pub fn write_png(
    path: &Path,
    width: u32,
    height: u32,
    indexed: &[u8],
    palette: &LevelPalette,
) -> Result<()> {
    ensure!(
        indexed.len() == width as usize * height as usize,
        "{} pixels do not fill a {width}x{height} image",
        indexed.len()
    );
    let rgb = palette.expand(indexed);
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let encoder = PngEncoder::new(file);
    encoder
        .write_image(&rgb, width, height, ColorType::Rgb8.into())
        .with_context(|| format!("writing PNG to {}", path.display()))?;
    Ok(())
}
