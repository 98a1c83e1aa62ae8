use thiserror::Error;

/// Failures raised while decoding DAT containers and planar sprites.
///
/// Every variant is terminal for the asset being decoded; callers decide
/// whether that aborts the whole load or only skips one asset.
#[derive(Debug, Error)]
pub enum DatError {
    #[error("invalid chunk header: initial bit count {initial_bit_count}, compressed length {compressed_len}")]
    InvalidHeader {
        initial_bit_count: u8,
        compressed_len: u32,
    },
    #[error("invalid compressed data: {0}")]
    InvalidData(&'static str),
    #[error("source ended before the expected data could be read")]
    TruncatedInput,
    #[error("unsupported sprite: {0}")]
    UnsupportedSprite(String),
    #[error("destination holds {actual} bytes but the chunk decompresses to {expected}")]
    DestinationLength { expected: u32, actual: usize },
    #[error("chunk decompresses to {actual} bytes, expected {expected}")]
    UnexpectedLength { expected: String, actual: u32 },
    #[error("io error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for DatError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            DatError::TruncatedInput
        } else {
            DatError::Io(err)
        }
    }
}

pub type DatResult<T> = Result<T, DatError>;
