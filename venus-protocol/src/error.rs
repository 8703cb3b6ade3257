use thiserror::Error;

/// Errors raised while decoding or encoding wire bytes.
///
/// These are distinct from [`crate::command`]'s header validation: a
/// `WireError` means the *payload* of an otherwise well-formed frame
/// didn't match the shape its command id promises.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("payload truncated: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("payload longer than its struct: {extra} trailing bytes")]
    TrailingBytes { extra: usize },
    #[error("value {value} is not a valid {what}")]
    InvalidEnumValue { what: &'static str, value: u32 },
}
