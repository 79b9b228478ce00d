use thiserror::Error;

/// Errors that can occur while decoding bencode data.
///
/// # Examples
///
/// ```
/// use dht_node::bencode::{decode, BencodeError};
///
/// assert!(matches!(decode(b"i42"), Err(BencodeError::UnexpectedEof)));
/// assert!(matches!(decode(b"i007e"), Err(BencodeError::InvalidInteger(_))));
/// assert!(matches!(decode(b"i42eextra"), Err(BencodeError::TrailingData)));
/// ```
#[derive(Debug, Error)]
pub enum BencodeError {
    /// Input ended before a complete value was parsed.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Integer is malformed: empty, signed with `+`, leading zeros, or `-0`.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Byte string length prefix is not a canonical decimal number.
    #[error("invalid string length")]
    InvalidStringLength,

    /// Encountered a byte that does not start any bencode value.
    #[error("unexpected character: {0}")]
    UnexpectedChar(char),

    /// Dictionary keys are not in strictly ascending byte order.
    #[error("dictionary keys not in ascending order")]
    UnsortedKeys,

    /// Extra data exists after the top-level value.
    #[error("trailing data after value")]
    TrailingData,

    /// Recursion limit (64 levels) exceeded.
    #[error("nesting too deep")]
    NestingTooDeep,
}
