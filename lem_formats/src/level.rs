use std::io::{Cursor, Read, Seek, Write};

use anyhow::{Context, Result, ensure};
use bitflags::bitflags;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use serde::Serialize;

use crate::dat::{ChunkDecompressor, next_chunk_header};

/// Size of one decompressed level record.
pub const LEVEL_LEN: usize = 2048;
pub const LEVEL_OBJECT_COUNT: usize = 32;
pub const LEVEL_PIECE_COUNT: usize = 400;
pub const LEVEL_METAL_COUNT: usize = 32;
pub const LEVEL_NAME_LEN: usize = 32;

/// Raw `modifiers_and_x_plus16` value of an unused piece slot.
pub const UNUSED_PIECE: u16 = 0xFFFF;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
    #[serde(transparent)]
    pub struct PieceModifiers: u16 {
        const ERASE  = 0x2000;
        const FLIP   = 0x4000;
        const BEHIND = 0x8000;
    }
}

bitflags! {
    /// The low nibble also carries flags whose meaning is unknown; they are
    /// kept as retained bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
    #[serde(transparent)]
    pub struct ObjectModifiers: u16 {
        const FLIP   = 0x0080;
        const MASK   = 0x4000;
        const BEHIND = 0x8000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LevelMode {
    Normal,
    SuperLemming,
    Other(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SkillCounts {
    pub climber: u16,
    pub floater: u16,
    pub bomber: u16,
    pub blocker: u16,
    pub builder: u16,
    pub basher: u16,
    pub miner: u16,
    pub digger: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LevelObject {
    pub x_plus16: i16,
    pub y: i16,
    pub id: u16,
    pub modifiers: ObjectModifiers,
}

impl LevelObject {
    pub fn is_unused(&self) -> bool {
        self.x_plus16 == 0
    }

    pub fn x(&self) -> i32 {
        i32::from(self.x_plus16.wrapping_sub(16))
    }

    pub fn y(&self) -> i32 {
        i32::from(self.y)
    }
}

/// A terrain piece placement, packed into two words:
/// `mmmm xxxx xxxx xxxx` and `yyyy yyyy yiii iiii`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelPiece {
    pub modifiers_and_x_plus16: u16,
    pub y_plus4_and_id: u16,
}

impl Default for LevelPiece {
    fn default() -> Self {
        LevelPiece {
            modifiers_and_x_plus16: UNUSED_PIECE,
            y_plus4_and_id: 0,
        }
    }
}

impl LevelPiece {
    pub fn is_used(&self) -> bool {
        self.modifiers_and_x_plus16 != UNUSED_PIECE
    }

    pub fn modifiers(&self) -> PieceModifiers {
        PieceModifiers::from_bits_retain(self.modifiers_and_x_plus16 & 0xF000)
    }

    pub fn x(&self) -> i32 {
        i32::from(self.modifiers_and_x_plus16 & 0x0FFF) - 16
    }

    pub fn y(&self) -> i32 {
        i32::from((self.y_plus4_and_id as i16) >> 7) - 4
    }

    pub fn id(&self) -> u8 {
        (self.y_plus4_and_id & 0x7F) as u8
    }
}

/// Indestructible terrain area, in 4-pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LevelMetal {
    pub x_plus4_and_y: u16,
    pub width_minus1_and_height_minus1: u8,
    pub unused: u8,
}

impl LevelMetal {
    pub fn x(&self) -> i32 {
        i32::from(self.x_plus4_and_y >> 7) - 4
    }

    pub fn y(&self) -> i32 {
        i32::from(self.x_plus4_and_y & 0x7F)
    }

    pub fn width(&self) -> i32 {
        i32::from(self.width_minus1_and_height_minus1 >> 4) + 1
    }

    pub fn height(&self) -> i32 {
        i32::from(self.width_minus1_and_height_minus1 & 0x0F) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Level {
    pub release_rate: u16,
    pub release_count: u16,
    pub to_save_count: u16,
    pub time_minutes: u16,
    pub skills: SkillCounts,
    pub initial_x: u16,
    pub ground_id: u16,
    /// Zero for ordinary levels, otherwise one more than the special
    /// background index.
    pub special_id: u16,
    pub mode: u16,
    pub objects: Vec<LevelObject>,
    pub pieces: Vec<LevelPiece>,
    pub metals: Vec<LevelMetal>,
    pub name: [u8; LEVEL_NAME_LEN],
}

impl Default for Level {
    fn default() -> Self {
        Level {
            release_rate: 0,
            release_count: 0,
            to_save_count: 0,
            time_minutes: 0,
            skills: SkillCounts::default(),
            initial_x: 0,
            ground_id: 0,
            special_id: 0,
            mode: 0,
            objects: vec![LevelObject::default(); LEVEL_OBJECT_COUNT],
            pieces: vec![LevelPiece::default(); LEVEL_PIECE_COUNT],
            metals: vec![LevelMetal::default(); LEVEL_METAL_COUNT],
            name: [b' '; LEVEL_NAME_LEN],
        }
    }
}

impl Level {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() == LEVEL_LEN,
            "level record is {} bytes, expected {LEVEL_LEN}",
            bytes.len()
        );
        let mut cursor = Cursor::new(bytes);

        let release_rate = cursor.read_u16::<BigEndian>()?;
        let release_count = cursor.read_u16::<BigEndian>()?;
        let to_save_count = cursor.read_u16::<BigEndian>()?;
        let time_minutes = cursor.read_u16::<BigEndian>()?;
        let skills = SkillCounts {
            climber: cursor.read_u16::<BigEndian>()?,
            floater: cursor.read_u16::<BigEndian>()?,
            bomber: cursor.read_u16::<BigEndian>()?,
            blocker: cursor.read_u16::<BigEndian>()?,
            builder: cursor.read_u16::<BigEndian>()?,
            basher: cursor.read_u16::<BigEndian>()?,
            miner: cursor.read_u16::<BigEndian>()?,
            digger: cursor.read_u16::<BigEndian>()?,
        };
        let initial_x = cursor.read_u16::<BigEndian>()?;
        let ground_id = cursor.read_u16::<BigEndian>()?;
        let special_id = cursor.read_u16::<BigEndian>()?;
        let mode = cursor.read_u16::<BigEndian>()?;

        let mut objects = Vec::with_capacity(LEVEL_OBJECT_COUNT);
        for _ in 0..LEVEL_OBJECT_COUNT {
            objects.push(LevelObject {
                x_plus16: cursor.read_i16::<BigEndian>()?,
                y: cursor.read_i16::<BigEndian>()?,
                id: cursor.read_u16::<BigEndian>()?,
                modifiers: ObjectModifiers::from_bits_retain(cursor.read_u16::<BigEndian>()?),
            });
        }

        let mut pieces = Vec::with_capacity(LEVEL_PIECE_COUNT);
        for _ in 0..LEVEL_PIECE_COUNT {
            pieces.push(LevelPiece {
                modifiers_and_x_plus16: cursor.read_u16::<BigEndian>()?,
                y_plus4_and_id: cursor.read_u16::<BigEndian>()?,
            });
        }

        let mut metals = Vec::with_capacity(LEVEL_METAL_COUNT);
        for _ in 0..LEVEL_METAL_COUNT {
            metals.push(LevelMetal {
                x_plus4_and_y: cursor.read_u16::<BigEndian>()?,
                width_minus1_and_height_minus1: cursor.read_u8()?,
                unused: cursor.read_u8()?,
            });
        }

        let mut name = [0u8; LEVEL_NAME_LEN];
        cursor.read_exact(&mut name)?;

        Ok(Level {
            release_rate,
            release_count,
            to_save_count,
            time_minutes,
            skills,
            initial_x,
            ground_id,
            special_id,
            mode,
            objects,
            pieces,
            metals,
            name,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        ensure!(
            self.objects.len() == LEVEL_OBJECT_COUNT
                && self.pieces.len() == LEVEL_PIECE_COUNT
                && self.metals.len() == LEVEL_METAL_COUNT,
            "level record has the wrong number of placements"
        );

        let mut out = Vec::with_capacity(LEVEL_LEN);
        let skills = &self.skills;
        for word in [
            self.release_rate,
            self.release_count,
            self.to_save_count,
            self.time_minutes,
            skills.climber,
            skills.floater,
            skills.bomber,
            skills.blocker,
            skills.builder,
            skills.basher,
            skills.miner,
            skills.digger,
            self.initial_x,
            self.ground_id,
            self.special_id,
            self.mode,
        ] {
            out.write_u16::<BigEndian>(word)?;
        }
        for object in &self.objects {
            out.write_i16::<BigEndian>(object.x_plus16)?;
            out.write_i16::<BigEndian>(object.y)?;
            out.write_u16::<BigEndian>(object.id)?;
            out.write_u16::<BigEndian>(object.modifiers.bits())?;
        }
        for piece in &self.pieces {
            out.write_u16::<BigEndian>(piece.modifiers_and_x_plus16)?;
            out.write_u16::<BigEndian>(piece.y_plus4_and_id)?;
        }
        for metal in &self.metals {
            out.write_u16::<BigEndian>(metal.x_plus4_and_y)?;
            out.write_u8(metal.width_minus1_and_height_minus1)?;
            out.write_u8(metal.unused)?;
        }
        out.write_all(&self.name)?;
        Ok(out)
    }

    pub fn mode(&self) -> LevelMode {
        match self.mode {
            0x0000 => LevelMode::Normal,
            0xFFFF => LevelMode::SuperLemming,
            other => LevelMode::Other(other),
        }
    }

    pub fn is_special(&self) -> bool {
        self.special_id != 0
    }

    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name)
            .trim_end_matches([' ', '\0'])
            .to_string()
    }

    /// Pieces up to the first unused slot; later slots are never drawn.
    pub fn pieces_in_use(&self) -> impl Iterator<Item = &LevelPiece> {
        self.pieces.iter().take_while(|piece| piece.is_used())
    }

    pub fn objects_in_use(&self) -> impl Iterator<Item = &LevelObject> {
        self.objects.iter().filter(|object| !object.is_unused())
    }
}

/// Read every level of a `LEVEL00n.DAT` container. Each chunk must hold
/// exactly one 2048-byte record; reading stops at the end of the source.
pub fn read_levels<R: Read + Seek>(reader: &mut R) -> Result<Vec<Level>> {
    let mut decompressor = ChunkDecompressor::new();
    let mut levels = Vec::new();
    let mut position = 0u64;

    while let Some(header) = next_chunk_header(reader, position)
        .with_context(|| format!("reading header of level {}", levels.len()))?
    {
        let data = decompressor
            .decompress_exact(reader, &header, LEVEL_LEN as u32)
            .with_context(|| format!("decompressing level {}", levels.len()))?;
        levels.push(Level::parse(&data)?);
        position = header.next_offset();
    }

    debug!("read {} levels", levels.len());
    Ok(levels)
}
