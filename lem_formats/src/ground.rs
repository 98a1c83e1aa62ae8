use std::io::{Cursor, Read, Seek, Write};

use anyhow::{Context, Result, ensure};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use serde::Serialize;

use crate::dat::{ChunkDecompressor, read_chunk_header};
use crate::error::DatError;
use crate::palette::{EgaColor, VgaColor, read_ega_colors, read_vga_colors};
use crate::planar::{PlanarLayout, Sprite, decode_interleaved, decode_rle_prefixed};

pub const OBJECT_INFO_COUNT: usize = 16;
pub const PIECE_INFO_COUNT: usize = 64;
const OBJECT_INFO_LEN: usize = 28;
const PIECE_INFO_LEN: usize = 8;
const COLOR_TABLES_LEN: usize = 3 * 8 + 3 * 24;

/// Size of an uncompressed `GROUNDnO.DAT` file.
pub const GROUND_FILE_LEN: usize =
    OBJECT_INFO_COUNT * OBJECT_INFO_LEN + PIECE_INFO_COUNT * PIECE_INFO_LEN + COLOR_TABLES_LEN;

/// Largest blob either `VGAGRn.DAT` chunk may decompress to.
pub const GRAPHICS_CHUNK_LIMIT: u32 = 0x10000;

/// Palette prefix of a special graphics chunk: 8 VGA colours, then 8 EGA
/// preview and 8 EGA in-game colours.
pub const SPECIAL_PALETTE_LEN: usize = 24 + 8 + 8;

/// Largest special graphics chunk: the palette plus four images whose
/// streams never expand past one control byte per data byte.
pub const SPECIAL_CHUNK_LIMIT: u32 = SPECIAL_PALETTE_LEN as u32 + (14400 * 2 + 1) * 4;

/// What happens to a lemming inside an object's trigger area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    None,
    Exit,
    TurnAround,
    Trap,
    Drown,
    Disintegrate,
    OneWayLeft,
    OneWayRight,
    Indestructible,
}

impl Effect {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Effect::None,
            1 => Effect::Exit,
            2 => Effect::TurnAround,
            4 => Effect::Trap,
            5 => Effect::Drown,
            6 => Effect::Disintegrate,
            7 => Effect::OneWayLeft,
            8 => Effect::OneWayRight,
            9 => Effect::Indestructible,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            Effect::None => 0,
            Effect::Exit => 1,
            Effect::TurnAround => 2,
            Effect::Trap => 4,
            Effect::Drown => 5,
            Effect::Disintegrate => 6,
            Effect::OneWayLeft => 7,
            Effect::OneWayRight => 8,
            Effect::Indestructible => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectAnimation {
    Never,
    TrapTriggered,
    Always,
    Once,
}

impl ObjectAnimation {
    fn from_low_bits(value: u16) -> Self {
        match value & 0x03 {
            0 => ObjectAnimation::Never,
            1 => ObjectAnimation::TrapTriggered,
            2 => ObjectAnimation::Always,
            _ => ObjectAnimation::Once,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ObjectInfo {
    /// Animation kind in the low two bits; the rest is not understood.
    pub unknown_and_animation: u16,
    pub animation_initial_frame: u8,
    pub animation_frame_count: u8,
    pub width: u8,
    pub height: u8,
    pub animation_frame_len: u16,
    /// Relative to the start of each image.
    pub mask_offset: u16,
    pub unknown10: u16,
    pub unknown12: u16,
    /// Trigger area, in 4-pixel units relative to the object.
    pub effect_left: u16,
    pub effect_top_plus1: u16,
    pub effect_width: u8,
    pub effect_height: u8,
    /// Raw effect code; see [`Effect::from_code`].
    pub effect: u8,
    pub animation_frames_offset: u16,
    pub image_offset: u16,
    pub unknown25: u16,
    pub trap_sound: u8,
}

impl ObjectInfo {
    fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        Ok(ObjectInfo {
            unknown_and_animation: cursor.read_u16::<BigEndian>()?,
            animation_initial_frame: cursor.read_u8()?,
            animation_frame_count: cursor.read_u8()?,
            width: cursor.read_u8()?,
            height: cursor.read_u8()?,
            animation_frame_len: cursor.read_u16::<LittleEndian>()?,
            mask_offset: cursor.read_u16::<LittleEndian>()?,
            unknown10: cursor.read_u16::<LittleEndian>()?,
            unknown12: cursor.read_u16::<LittleEndian>()?,
            effect_left: cursor.read_u16::<LittleEndian>()?,
            effect_top_plus1: cursor.read_u16::<LittleEndian>()?,
            effect_width: cursor.read_u8()?,
            effect_height: cursor.read_u8()?,
            effect: cursor.read_u8()?,
            animation_frames_offset: cursor.read_u16::<LittleEndian>()?,
            image_offset: cursor.read_u16::<LittleEndian>()?,
            unknown25: cursor.read_u16::<LittleEndian>()?,
            trap_sound: cursor.read_u8()?,
        })
    }

    fn write<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_u16::<BigEndian>(self.unknown_and_animation)?;
        out.write_u8(self.animation_initial_frame)?;
        out.write_u8(self.animation_frame_count)?;
        out.write_u8(self.width)?;
        out.write_u8(self.height)?;
        out.write_u16::<LittleEndian>(self.animation_frame_len)?;
        out.write_u16::<LittleEndian>(self.mask_offset)?;
        out.write_u16::<LittleEndian>(self.unknown10)?;
        out.write_u16::<LittleEndian>(self.unknown12)?;
        out.write_u16::<LittleEndian>(self.effect_left)?;
        out.write_u16::<LittleEndian>(self.effect_top_plus1)?;
        out.write_u8(self.effect_width)?;
        out.write_u8(self.effect_height)?;
        out.write_u8(self.effect)?;
        out.write_u16::<LittleEndian>(self.animation_frames_offset)?;
        out.write_u16::<LittleEndian>(self.image_offset)?;
        out.write_u16::<LittleEndian>(self.unknown25)?;
        out.write_u8(self.trap_sound)
    }

    pub fn animation(&self) -> ObjectAnimation {
        ObjectAnimation::from_low_bits(self.unknown_and_animation)
    }

    pub fn effect_kind(&self) -> Option<Effect> {
        Effect::from_code(self.effect)
    }

    pub fn effect_top(&self) -> i32 {
        i32::from(self.effect_top_plus1) - 1
    }

    fn layout(&self, image_offset: u16) -> PlanarLayout {
        PlanarLayout {
            width: usize::from(self.width),
            height: usize::from(self.height),
            color_offset: usize::from(image_offset),
            mask_offset: Some(usize::from(image_offset.wrapping_add(self.mask_offset))),
            bit_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PieceInfo {
    pub width: u8,
    pub height: u8,
    pub image_offset: u16,
    /// Absolute within the pieces blob.
    pub mask_offset: u16,
    pub unknown6: u16,
}

impl PieceInfo {
    fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        Ok(PieceInfo {
            width: cursor.read_u8()?,
            height: cursor.read_u8()?,
            image_offset: cursor.read_u16::<LittleEndian>()?,
            mask_offset: cursor.read_u16::<LittleEndian>()?,
            unknown6: cursor.read_u16::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_u8(self.width)?;
        out.write_u8(self.height)?;
        out.write_u16::<LittleEndian>(self.image_offset)?;
        out.write_u16::<LittleEndian>(self.mask_offset)?;
        out.write_u16::<LittleEndian>(self.unknown6)
    }

    fn layout(&self) -> PlanarLayout {
        PlanarLayout {
            width: usize::from(self.width),
            height: usize::from(self.height),
            color_offset: usize::from(self.image_offset),
            mask_offset: Some(usize::from(self.mask_offset)),
            bit_depth: 4,
        }
    }
}

/// The six colour tables of a ground set. Custom and preview tables cover
/// palette entries 8 to 15, standard tables entries 0 to 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GroundColors {
    pub ega_custom: [EgaColor; 8],
    pub ega_standard: [EgaColor; 8],
    pub ega_preview: [EgaColor; 8],
    pub vga_custom: [VgaColor; 8],
    pub vga_standard: [VgaColor; 8],
    pub vga_preview: [VgaColor; 8],
}

/// Parsed `GROUNDnO.DAT`: sprite metadata for one graphics set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroundFile {
    pub objects: Vec<ObjectInfo>,
    pub pieces: Vec<PieceInfo>,
    pub colors: GroundColors,
}

impl GroundFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() == GROUND_FILE_LEN,
            "ground file is {} bytes, expected {GROUND_FILE_LEN}",
            bytes.len()
        );

        let mut cursor = Cursor::new(bytes);
        let objects = (0..OBJECT_INFO_COUNT)
            .map(|index| {
                ObjectInfo::read(&mut cursor).with_context(|| format!("object info {index}"))
            })
            .collect::<Result<Vec<_>>>()?;
        let pieces = (0..PIECE_INFO_COUNT)
            .map(|index| {
                PieceInfo::read(&mut cursor).with_context(|| format!("piece info {index}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let colors = GroundColors {
            ega_custom: read_ega_colors(&mut cursor)?,
            ega_standard: read_ega_colors(&mut cursor)?,
            ega_preview: read_ega_colors(&mut cursor)?,
            vga_custom: read_vga_colors(&mut cursor)?,
            vga_standard: read_vga_colors(&mut cursor)?,
            vga_preview: read_vga_colors(&mut cursor)?,
        };

        Ok(GroundFile {
            objects,
            pieces,
            colors,
        })
    }

    /// Serialize back to the on-disk layout, unknown fields included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        ensure!(
            self.objects.len() == OBJECT_INFO_COUNT && self.pieces.len() == PIECE_INFO_COUNT,
            "ground file needs {OBJECT_INFO_COUNT} objects and {PIECE_INFO_COUNT} pieces"
        );
        let mut out = Vec::with_capacity(GROUND_FILE_LEN);
        for object in &self.objects {
            object.write(&mut out)?;
        }
        for piece in &self.pieces {
            piece.write(&mut out)?;
        }
        let colors = &self.colors;
        for table in [colors.ega_custom, colors.ega_standard, colors.ega_preview] {
            out.extend(table.iter().map(|color| color.0));
        }
        for table in [colors.vga_custom, colors.vga_standard, colors.vga_preview] {
            out.extend(table.iter().flat_map(|color| [color.r, color.g, color.b]));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VgaPiece {
    pub info: PieceInfo,
    pub image: Sprite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VgaObject {
    pub info: ObjectInfo,
    pub image: Sprite,
    pub frames: Vec<Sprite>,
}

/// A ground set with every piece and object sprite decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VgaGround {
    pub colors: GroundColors,
    pub pieces: Vec<VgaPiece>,
    pub objects: Vec<VgaObject>,
}

impl VgaGround {
    /// Decode `VGAGRn.DAT`, whose first chunk holds the piece graphics and
    /// second chunk the object graphics. `reader` covers the whole file.
    pub fn decode<R: Read + Seek>(reader: &mut R, ground: &GroundFile) -> Result<Self> {
        let mut decompressor = ChunkDecompressor::new();

        let header = read_chunk_header(reader, 0).context("reading piece graphics header")?;
        let pieces_blob = decompressor
            .decompress_capped(reader, &header, GRAPHICS_CHUNK_LIMIT)
            .context("decompressing piece graphics")?;
        let pieces = ground
            .pieces
            .iter()
            .enumerate()
            .map(|(index, info)| {
                let image = decode_interleaved(&pieces_blob, &info.layout())
                    .with_context(|| format!("decoding piece {index}"))?;
                Ok(VgaPiece { info: *info, image })
            })
            .collect::<Result<Vec<_>>>()?;

        let header = read_chunk_header(reader, header.next_offset())
            .context("reading object graphics header")?;
        let objects_blob = decompressor
            .decompress_capped(reader, &header, GRAPHICS_CHUNK_LIMIT)
            .context("decompressing object graphics")?;
        let objects = ground
            .objects
            .iter()
            .enumerate()
            .map(|(index, info)| {
                decode_object(&objects_blob, info).with_context(|| format!("decoding object {index}"))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "decoded ground set: {} pieces ({} bytes), {} objects ({} bytes)",
            pieces.len(),
            pieces_blob.len(),
            objects.len(),
            objects_blob.len()
        );

        Ok(VgaGround {
            colors: ground.colors,
            pieces,
            objects,
        })
    }
}

fn decode_object(blob: &[u8], info: &ObjectInfo) -> Result<VgaObject> {
    let image = decode_interleaved(blob, &info.layout(info.image_offset))?;
    let frames = (0..info.animation_frame_count)
        .map(|frame| {
            let offset = info
                .animation_frames_offset
                .wrapping_add(u16::from(frame).wrapping_mul(info.animation_frame_len));
            decode_interleaved(blob, &info.layout(offset))
                .with_context(|| format!("animation frame {frame}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(VgaObject {
        info: *info,
        image,
        frames,
    })
}

/// Decoded `VGASPECn.DAT`: a fixed background replacing the terrain pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VgaSpecial {
    pub vga_custom: [VgaColor; 8],
    pub ega_preview: [EgaColor; 8],
    pub ega_custom: [EgaColor; 8],
    /// Four 960x40 strips, top to bottom.
    pub images: Vec<Sprite>,
}

impl VgaSpecial {
    pub fn decode<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header = read_chunk_header(reader, 0).context("reading special graphics header")?;
        let data = ChunkDecompressor::new()
            .decompress_capped(reader, &header, SPECIAL_CHUNK_LIMIT)
            .context("decompressing special graphics")?;
        ensure!(
            data.len() >= SPECIAL_PALETTE_LEN,
            "special graphics are only {} bytes",
            data.len()
        );

        let mut cursor = Cursor::new(&data[..SPECIAL_PALETTE_LEN]);
        let vga_custom = read_vga_colors(&mut cursor)?;
        let ega_preview = read_ega_colors(&mut cursor)?;
        let ega_custom = read_ega_colors(&mut cursor)?;

        let (images, end) =
            decode_rle_prefixed(&data, SPECIAL_PALETTE_LEN).context("decoding special images")?;
        if end != data.len() {
            return Err(DatError::InvalidData("trailing bytes after the special images").into());
        }

        Ok(VgaSpecial {
            vga_custom,
            ega_preview,
            ega_custom,
            images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::encode_stored_chunk;
    use crate::planar::{SPECIAL_HEIGHT, SPECIAL_IMAGE_COUNT, SPECIAL_WIDTH};

    fn sample_ground() -> GroundFile {
        let mut objects = vec![ObjectInfo::default(); OBJECT_INFO_COUNT];
        objects[0] = ObjectInfo {
            unknown_and_animation: 0xA502,
            animation_initial_frame: 1,
            animation_frame_count: 2,
            width: 8,
            height: 2,
            animation_frame_len: 10,
            mask_offset: 8,
            unknown10: 0x1234,
            unknown12: 0xBEEF,
            effect_left: 1,
            effect_top_plus1: 3,
            effect_width: 2,
            effect_height: 1,
            effect: 4,
            animation_frames_offset: 10,
            image_offset: 0,
            unknown25: 0x0102,
            trap_sound: 7,
        };
        let mut pieces = vec![PieceInfo::default(); PIECE_INFO_COUNT];
        pieces[0] = PieceInfo {
            width: 8,
            height: 1,
            image_offset: 0,
            mask_offset: 4,
            unknown6: 0xCAFE,
        };
        let mut colors = GroundColors::default();
        colors.vga_custom[0] = VgaColor::new(1, 2, 3);
        colors.vga_standard[7] = VgaColor::new(0x3F, 0x3F, 0x3F);
        colors.ega_preview[2] = EgaColor(0x15);
        GroundFile {
            objects,
            pieces,
            colors,
        }
    }

    #[test]
    fn ground_file_round_trips_unknown_fields() {
        let ground = sample_ground();
        let bytes = ground.to_bytes().unwrap();
        assert_eq!(bytes.len(), GROUND_FILE_LEN);
        // first object record: big-endian animation word, little-endian rest
        assert_eq!(&bytes[0..2], &[0xA5, 0x02]);
        assert_eq!(&bytes[10..12], &[0x34, 0x12]);
        assert_eq!(&bytes[27], &7);

        let parsed = GroundFile::parse(&bytes).unwrap();
        assert_eq!(parsed, ground);
        assert_eq!(parsed.objects[0].animation(), ObjectAnimation::Always);
        assert_eq!(parsed.objects[0].effect_kind(), Some(Effect::Trap));
        assert_eq!(parsed.objects[0].effect_top(), 2);
        assert_eq!(parsed.pieces[0].unknown6, 0xCAFE);
    }

    #[test]
    fn ground_file_length_is_checked() {
        assert!(GroundFile::parse(&[0u8; GROUND_FILE_LEN - 1]).is_err());
        assert!(GroundFile::parse(&[0u8; GROUND_FILE_LEN + 1]).is_err());
    }

    #[test]
    fn effect_codes_skip_three() {
        assert_eq!(Effect::from_code(3), None);
        assert_eq!(Effect::from_code(10), None);
        for code in [0, 1, 2, 4, 5, 6, 7, 8, 9] {
            assert_eq!(Effect::from_code(code).map(Effect::code), Some(code));
        }
    }

    #[test]
    fn decodes_ground_graphics() {
        let ground = sample_ground();

        // Piece 0: 8x1, four colour planes then the mask at 4.
        let mut pieces_blob = vec![0xFF, 0x00, 0x00, 0x00, 0x0F];
        pieces_blob.resize(16, 0);

        // Object 0: 8x2, still image at 0 with mask at 8, two frames from 10.
        let mut objects_blob = vec![0u8; 10 + 2 * 10];
        objects_blob[8] = 0x80;
        objects_blob[10] = 0x80; // frame 0 plane 0, row 0
        objects_blob[18] = 0x80; // frame 0 mask
        objects_blob[20 + 2] = 0x01; // frame 1 plane 1, row 0
        objects_blob[20 + 8] = 0x01; // frame 1 mask

        let mut container = encode_stored_chunk(&pieces_blob);
        container.extend(encode_stored_chunk(&objects_blob));

        let vga = VgaGround::decode(&mut Cursor::new(container), &ground).unwrap();
        assert_eq!(vga.pieces.len(), PIECE_INFO_COUNT);
        assert_eq!(vga.objects.len(), OBJECT_INFO_COUNT);
        assert_eq!(
            vga.pieces[0].image.pixels(),
            &[0x01, 0x01, 0x01, 0x01, 0x81, 0x81, 0x81, 0x81]
        );

        let object = &vga.objects[0];
        assert_eq!(object.image.pixel(0, 0), 0x80);
        assert_eq!(object.frames.len(), 2);
        assert_eq!(object.frames[0].pixel(0, 0), 0x81);
        assert_eq!(object.frames[1].pixel(7, 0), 0x82);
        assert!(vga.objects[1].image.is_empty());
    }

    #[test]
    fn piece_outside_blob_is_unsupported() {
        let mut ground = sample_ground();
        ground.pieces[1] = PieceInfo {
            width: 16,
            height: 16,
            image_offset: 0x100,
            mask_offset: 0x180,
            unknown6: 0,
        };
        let mut container = encode_stored_chunk(&[0u8; 16]);
        container.extend(encode_stored_chunk(&[0u8; 32]));

        let err = VgaGround::decode(&mut Cursor::new(container), &ground).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatError>(),
            Some(DatError::UnsupportedSprite(_))
        ));
    }

    #[test]
    fn decodes_special_graphics() {
        let mut data = Vec::new();
        data.extend((0..24).map(|i| i as u8));
        data.extend([0x11; 8]);
        data.extend([0x22; 8]);
        let plane_len = SPECIAL_WIDTH / 8 * SPECIAL_HEIGHT;
        for image in 0..SPECIAL_IMAGE_COUNT {
            // first byte of plane 0 carries the image number; the rest repeats zero
            data.extend([0x00, image as u8]);
            let mut remaining = plane_len * 3 - 1;
            while remaining > 0 {
                let run = remaining.min(128);
                data.extend([(257 - run) as u8, 0x00]);
                remaining -= run;
            }
            data.push(0x80);
        }

        let container = encode_stored_chunk(&data);
        let special = VgaSpecial::decode(&mut Cursor::new(container)).unwrap();
        assert_eq!(special.vga_custom[1], VgaColor::new(3, 4, 5));
        assert_eq!(special.ega_preview[0], EgaColor(0x11));
        assert_eq!(special.ega_custom[7], EgaColor(0x22));
        assert_eq!(special.images.len(), SPECIAL_IMAGE_COUNT);
        // image 1 sets bit 7 of the first plane byte: pixel (7, 0) gets colour 1
        assert_eq!(special.images[1].pixel(7, 0), 0x89);
        assert_eq!(special.images[0].opaque_count(), 0);
    }

    #[test]
    fn special_graphics_reject_trailing_bytes() {
        let mut data = vec![0u8; SPECIAL_PALETTE_LEN];
        let plane_len = SPECIAL_WIDTH / 8 * SPECIAL_HEIGHT * 3;
        for _ in 0..SPECIAL_IMAGE_COUNT {
            let mut remaining = plane_len;
            while remaining > 0 {
                let run = remaining.min(128);
                data.extend([(257 - run) as u8, 0x00]);
                remaining -= run;
            }
            data.push(0x80);
        }
        data.push(0x00);

        let container = encode_stored_chunk(&data);
        let err = VgaSpecial::decode(&mut Cursor::new(container)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatError>(),
            Some(DatError::InvalidData(_))
        ));
    }
}
