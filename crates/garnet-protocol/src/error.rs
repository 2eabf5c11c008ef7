//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while parsing the wire format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input buffer doesn't contain a complete frame yet.
    /// The caller should read more data and try again.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// A request frame didn't start with the array prefix `*`.
    #[error("expected array, got prefix {0:#04x}")]
    ExpectedArray(u8),

    /// An array item didn't start with the bulk prefix `$`.
    #[error("expected bulk string, got prefix {0:#04x}")]
    ExpectedBulk(u8),

    /// Failed to parse an integer from a frame header line.
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// A bulk string or array declared a negative length.
    #[error("invalid frame length: {0}")]
    InvalidLength(i64),

    /// An array declared more elements than the parser will accept.
    #[error("array declares too many elements: {0}")]
    TooManyElements(usize),

    /// A bulk string declared a length beyond the parser's cap.
    #[error("bulk string too large: {0} bytes")]
    BulkTooLarge(usize),

    /// A bulk payload wasn't terminated with `\r\n`.
    #[error("missing bulk terminator")]
    MissingTerminator,
}
