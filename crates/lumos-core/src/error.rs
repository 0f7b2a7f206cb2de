use thiserror::Error;

pub type LumosResult<T> = Result<T, LumosError>;

#[derive(Debug, Error)]
pub enum LumosError {
    #[error("key ring error: {0}")]
    KeyRing(String),

    #[error("code collision: {0}")]
    Collision(String),

    #[error("identifier overflow: {0}")]
    IdentifierOverflow(String),

    #[error("batch of {count} codes exceeds the limit of {max}")]
    BatchTooLarge { count: u64, max: u64 },
}
