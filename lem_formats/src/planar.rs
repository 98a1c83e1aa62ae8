//! Bitplane image reconstruction.
//!
//! Decoded pixels hold a colour index in the low nibble and the mask (opaque)
//! flag in bit 7, the layout every blit in `lem_render` works on.

use crate::error::{DatError, DatResult};

/// Set on every opaque pixel.
pub const MASK_BIT: u8 = 0x80;

pub const SPECIAL_WIDTH: usize = 960;
pub const SPECIAL_HEIGHT: usize = 40;
pub const SPECIAL_IMAGE_COUNT: usize = 4;
const SPECIAL_BIT_DEPTH: u8 = 3;
const SPECIAL_PLANES_LEN: usize = SPECIAL_WIDTH / 8 * SPECIAL_HEIGHT * SPECIAL_BIT_DEPTH as usize;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sprite {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Sprite {
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> DatResult<Self> {
        if width.checked_mul(height) != Some(pixels.len()) {
            return Err(DatError::UnsupportedSprite(format!(
                "{}x{} sprite cannot hold {} pixels",
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Sprite {
            width,
            height,
            pixels,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }

    pub fn is_opaque(&self, x: usize, y: usize) -> bool {
        self.pixel(x, y) & MASK_BIT != 0
    }

    pub fn opaque_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p & MASK_BIT != 0).count()
    }
}

/// Where a sprite's planes live inside a decompressed blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanarLayout {
    pub width: usize,
    pub height: usize,
    /// First byte of colour plane 0; further planes follow back to back.
    pub color_offset: usize,
    /// 1-bpp mask plane. Without one every pixel stays transparent.
    pub mask_offset: Option<usize>,
    /// Number of colour planes, 1 to 4.
    pub bit_depth: u8,
}

impl PlanarLayout {
    pub fn plane_len(&self) -> usize {
        self.width / 8 * self.height
    }
}

fn plane<'a>(blob: &'a [u8], offset: usize, len: usize, what: &str) -> DatResult<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| blob.get(offset..end))
        .ok_or_else(|| {
            DatError::UnsupportedSprite(format!(
                "{what} at {offset:#x}+{len:#x} lies outside the {}-byte blob",
                blob.len()
            ))
        })
}

/// Reassemble a sprite stored as consecutive bitplanes plus an optional mask
/// plane. Bit `7 - x % 8` of each plane byte belongs to pixel `x`.
pub fn decode_interleaved(blob: &[u8], layout: &PlanarLayout) -> DatResult<Sprite> {
    if layout.width % 8 != 0 {
        return Err(DatError::UnsupportedSprite(format!(
            "width {} is not byte aligned",
            layout.width
        )));
    }
    if !(1..=4).contains(&layout.bit_depth) {
        return Err(DatError::UnsupportedSprite(format!(
            "bit depth {} is not supported",
            layout.bit_depth
        )));
    }

    let mut pixels = vec![0u8; layout.width * layout.height];
    let plane_len = layout.plane_len();
    if plane_len == 0 {
        return Sprite::new(layout.width, layout.height, pixels);
    }

    for index in 0..layout.bit_depth {
        let offset = layout
            .color_offset
            .checked_add(usize::from(index) * plane_len)
            .ok_or_else(|| DatError::UnsupportedSprite("colour plane offset overflows".into()))?;
        let bytes = plane(blob, offset, plane_len, "colour plane")?;
        merge_plane(&mut pixels, bytes, index);
    }

    if let Some(mask_offset) = layout.mask_offset {
        let bytes = plane(blob, mask_offset, plane_len, "mask plane")?;
        merge_plane(&mut pixels, bytes, 7);
    }

    Sprite::new(layout.width, layout.height, pixels)
}

fn merge_plane(pixels: &mut [u8], plane: &[u8], bit: u8) {
    for (index, pixel) in pixels.iter_mut().enumerate() {
        let value = (plane[index >> 3] >> (7 - (index & 7))) & 1;
        *pixel |= value << bit;
    }
}

/// Expand one control-byte run-length stream into `out`, starting at
/// `*cursor` and leaving it just past the terminator.
///
/// `0x00..=0x7F` copies the next `n + 1` bytes, `0x81..=0xFF` repeats the next
/// byte `257 - n` times and `0x80` ends the stream, which must fill `out`
/// exactly.
pub fn decode_rle_planes(data: &[u8], cursor: &mut usize, out: &mut [u8]) -> DatResult<()> {
    let mut filled = 0usize;
    loop {
        let control = *data
            .get(*cursor)
            .ok_or(DatError::InvalidData("run-length stream has no terminator"))?;
        *cursor += 1;

        match control {
            0x80 => {
                if filled != out.len() {
                    return Err(DatError::InvalidData("run-length stream ends early"));
                }
                return Ok(());
            }
            0x00..=0x7F => {
                let len = usize::from(control) + 1;
                let src = data
                    .get(*cursor..*cursor + len)
                    .ok_or(DatError::InvalidData("literal run past the end of the data"))?;
                out.get_mut(filled..filled + len)
                    .ok_or(DatError::InvalidData("run-length stream overflows the image"))?
                    .copy_from_slice(src);
                *cursor += len;
                filled += len;
            }
            _ => {
                let value = *data
                    .get(*cursor)
                    .ok_or(DatError::InvalidData("repeat run past the end of the data"))?;
                *cursor += 1;
                let len = 257 - usize::from(control);
                out.get_mut(filled..filled + len)
                    .ok_or(DatError::InvalidData("run-length stream overflows the image"))?
                    .fill(value);
                filled += len;
            }
        }
    }
}

/// Decode the four run-length prefixed background images that start at
/// `start`. Returns the images and the position just past the last stream.
///
/// These images have no mask plane: a pixel is opaque when any colour bit is
/// set, and opaque pixels also gain bit 3 so they index the upper palette half.
pub fn decode_rle_prefixed(data: &[u8], start: usize) -> DatResult<(Vec<Sprite>, usize)> {
    let layout = PlanarLayout {
        width: SPECIAL_WIDTH,
        height: SPECIAL_HEIGHT,
        color_offset: 0,
        mask_offset: None,
        bit_depth: SPECIAL_BIT_DEPTH,
    };

    let mut planes = vec![0u8; SPECIAL_PLANES_LEN];
    let mut cursor = start;
    let mut images = Vec::with_capacity(SPECIAL_IMAGE_COUNT);

    for _ in 0..SPECIAL_IMAGE_COUNT {
        decode_rle_planes(data, &mut cursor, &mut planes)?;
        let mut image = decode_interleaved(&planes, &layout)?;
        for pixel in image.pixels.iter_mut() {
            let color = *pixel;
            *pixel = color | (!color.wrapping_sub(1) & 0x88);
        }
        images.push(image);
    }

    Ok((images, cursor))
}
