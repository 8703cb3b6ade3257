//! Command handlers (C4): one per covered Venus command id, each
//! decoding its fixed-size payload, translating guest ids through the
//! object table, calling the native GPU backend, and reconciling the
//! object table's bookkeeping.

mod command_pool;
mod device;
mod instance;
mod memory;
mod physical_device;
mod queue;
mod resource;

use crate::context::HandlerContext;
use crate::decoder::DispatchContext;
use crate::error::CoreError;
use crate::ring::Ring;

/// Writes `bytes` into the ring's extra region at `offset`, failing
/// with [`CoreError::InvalidHeader`] if the guest-supplied offset
/// doesn't fit — the same class of mistake as a malformed header,
/// since the offset travels in the command payload.
fn write_reply(ring: &Ring, offset: u64, bytes: &[u8]) -> Result<(), CoreError> {
    let offset: u32 = offset
        .try_into()
        .map_err(|_| CoreError::InvalidHeader(format!("reply offset {offset} overflows u32")))?;
    let dest = ring.extra_get_mut(offset, bytes.len() as u32).ok_or_else(|| {
        CoreError::InvalidHeader(format!(
            "reply offset {offset} + {} bytes exceeds the extra region",
            bytes.len()
        ))
    })?;
    dest.copy_from_slice(bytes);
    Ok(())
}

/// Registers every handler this core implements against a fresh
/// [`DispatchContext`]. Command ids outside the covered subset are
/// left unregistered and fall through to the decoder's unknown path.
pub fn register_default_handlers(dispatch: &mut DispatchContext<HandlerContext>) {
    instance::register(dispatch);
    physical_device::register(dispatch);
    device::register(dispatch);
    memory::register(dispatch);
    resource::register(dispatch);
    command_pool::register(dispatch);
    queue::register(dispatch);
}
