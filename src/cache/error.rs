use thiserror::Error;

/// Everything that can go wrong while turning cache bytes into data structures.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A read ran past the end of the backing buffer.
    #[error("read of {wanted} bytes at offset {offset} is out of bounds (len {len})")]
    OutOfBounds {
        offset: usize,
        wanted: usize,
        len: usize,
    },

    /// Cipher input is not a whole number of 8-byte blocks.
    #[error("cipher region of {len} bytes is not block aligned")]
    UnalignedBlock { len: usize },

    /// An opcode stream contained a value the format does not define.
    #[error("unknown {kind} opcode {opcode}")]
    UnknownOpcode { kind: &'static str, opcode: u8 },

    /// The payload is of a format revision this crate does not decode.
    #[error("payload is not decodable: {0}")]
    Undecodable(String),

    /// A decoded index points outside the collection it refers to.
    #[error("{what} index {index} is out of range (len {len})")]
    InvalidIndex {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
