//! Main Crate Error

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// swarm-dht crate error enum.
pub enum Error {
    /// Id bytes of the wrong length.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Id string is not 40 hex characters.
    #[error("Invalid Id encoding, expected 40 hex characters")]
    InvalidIdEncoding,
}
