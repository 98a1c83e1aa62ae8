use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("piece slot {slot} references piece {id}, but the ground set has {available}")]
    MissingPiece { slot: usize, id: u16, available: usize },
    #[error("object slot {slot} references object {id}, but the ground set has {available}")]
    MissingObject { slot: usize, id: u16, available: usize },
    #[error("ground id {0} is out of range")]
    GroundId(u16),
    #[error("special id {0} is out of range")]
    SpecialId(u16),
}
