use thiserror::Error;

use venus_hal::BackendError;

/// The complete error taxonomy this core ever reports. Every handler,
/// the decoder, and the ring construct one of these; there is no
/// catch-all `Other` variant, so a caller can exhaustively match.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid ring layout: {0}")]
    InvalidLayout(String),

    #[error("invalid command header: {0}")]
    InvalidHeader(String),

    #[error("guest id {guest_id:#x} did not resolve to a {expected} handle")]
    InvalidHandle {
        guest_id: u64,
        expected: venus_protocol::ObjectType,
    },

    #[error("object {guest_id:#x} is in state {actual:?}, expected {expected:?}")]
    InvalidState {
        guest_id: u64,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("object table has no free slot (capacity {capacity})")]
    TableFull { capacity: usize },

    #[error("native GPU backend failure: {0}")]
    BackendFailure(#[from] BackendError),

    #[error("no handler registered for command id {0}")]
    UnknownCommand(u32),
}

impl From<venus_protocol::WireError> for CoreError {
    fn from(err: venus_protocol::WireError) -> Self {
        // A payload that doesn't match the shape its command id
        // promises is the same class of guest mistake as a bad
        // header: reject the frame, don't crash the dispatch loop.
        CoreError::InvalidHeader(err.to_string())
    }
}
