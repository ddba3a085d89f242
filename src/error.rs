//! Main Crate Error

#[derive(thiserror::Error, Debug)]
/// Chord crate error enum.
pub enum Error {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    #[error("Failed to parse packet bytes: {0}")]
    BencodeError(#[from] serde_bencode::Error),

    /// Id is expected to by 20 bytes.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Ring width must be within `1..=32` bits.
    #[error("Invalid ring width: {0} bits, expected 1..=32")]
    InvalidRingWidth(u8),

    /// A decoded message is missing a field or carries a malformed one.
    #[error("Invalid message: {0}")]
    InvalidMessage(&'static str),
}

/// Alias for `Result<T, chord_ring::Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
