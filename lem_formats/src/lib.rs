pub mod bits;
pub mod dat;
pub mod error;
pub mod ground;
pub mod level;
pub mod palette;
pub mod planar;

pub use dat::{ChunkDecompressor, ChunkHeader, DatFile, encode_stored_chunk, read_chunk_header};
pub use error::{DatError, DatResult};
pub use ground::{Effect, GroundFile, ObjectInfo, PieceInfo, VgaGround, VgaSpecial};
pub use level::{Level, LevelMetal, LevelObject, LevelPiece, ObjectModifiers, PieceModifiers, read_levels};
pub use palette::{EgaColor, VgaColor};
pub use planar::{MASK_BIT, PlanarLayout, Sprite, decode_interleaved, decode_rle_prefixed};
