//! The command decoder (C2): turns ring bytes into typed handler
//! invocations, validating headers without trusting the guest.

use venus_protocol::{CommandHeader, MAX_COMMAND_ID};

use crate::error::CoreError;
use crate::ring::{FrameAttempt, Ring};

type Handler<Ctx> =
    Box<dyn Fn(&mut Ctx, &Ring, CommandHeader, &[u8]) -> Result<(), CoreError> + Send + Sync>;

/// Per-ring handler table, dense and indexed by command id.
///
/// Generic over the user context type (`Ctx`, almost always
/// [`crate::context::HandlerContext`]) rather than threading a `void*`
/// through the handler signature the way the original C dispatch
/// context did.
pub struct DispatchContext<Ctx> {
    handlers: Vec<Option<Handler<Ctx>>>,
}

impl<Ctx> DispatchContext<Ctx> {
    /// Allocates a zero-initialized handler table of size
    /// `MAX_COMMAND_ID`.
    pub fn new() -> Self {
        let mut handlers = Vec::with_capacity(MAX_COMMAND_ID as usize);
        handlers.resize_with(MAX_COMMAND_ID as usize, || None);
        Self { handlers }
    }

    /// Binds a handler to `command_id`. Out-of-range ids are silently
    /// ignored; re-registering a bound id silently overwrites it.
    pub fn register<F>(&mut self, command_id: u32, handler: F)
    where
        F: Fn(&mut Ctx, &Ring, CommandHeader, &[u8]) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        if let Some(slot) = self.handlers.get_mut(command_id as usize) {
            *slot = Some(Box::new(handler));
        }
    }

    fn lookup(&self, command_id: u32) -> Option<&Handler<Ctx>> {
        self.handlers.get(command_id as usize).and_then(|s| s.as_ref())
    }
}

impl<Ctx> Default for DispatchContext<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of decoding and dispatching a single frame.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Not enough bytes available to decode another frame right now.
    NoData,
    /// The frame's header was malformed; the declared size was
    /// skipped without dispatch.
    InvalidHeader,
    /// No handler is registered for the frame's command id.
    UnknownCommand(u32),
    /// The handler ran and returned success.
    Handled(u32),
    /// The handler ran and returned an error.
    HandlerFailed(u32, CoreError),
}

/// Reads the 8-byte header, validates it, reads the payload, looks up
/// a handler, invokes it, and updates `ctx`'s counters.
pub fn decode_one<Ctx>(ring: &Ring, dispatch: &DispatchContext<Ctx>, ctx: &mut Ctx) -> DecodeOutcome
where
    Ctx: crate::context::Counted,
{
    match ring.try_take_frame() {
        FrameAttempt::NoData => DecodeOutcome::NoData,
        FrameAttempt::InvalidHeader => DecodeOutcome::InvalidHeader,
        FrameAttempt::Frame { header, payload } => {
            match dispatch.lookup(header.command_id) {
                None => {
                    ctx.counters_mut().commands_unknown += 1;
                    log::trace!("unknown command id {}", header.command_id);
                    DecodeOutcome::UnknownCommand(header.command_id)
                }
                Some(handler) => match handler(ctx, ring, header, &payload) {
                    Ok(()) => {
                        ctx.counters_mut().commands_handled += 1;
                        DecodeOutcome::Handled(header.command_id)
                    }
                    Err(err) => {
                        ctx.counters_mut().commands_failed += 1;
                        log::warn!(
                            "handler for command id {} failed: {err}",
                            header.command_id
                        );
                        DecodeOutcome::HandlerFailed(header.command_id, err)
                    }
                },
            }
        }
    }
}

/// Repeats [`decode_one`] while data remains available, publishing the
/// head cursor once at the end. Never aborts on a per-frame error;
/// returns the number of frames that were fully dispatched (handled,
/// failed, or unknown — anything that consumed a frame).
pub fn decode_all<Ctx>(ring: &Ring, dispatch: &DispatchContext<Ctx>, ctx: &mut Ctx) -> u32
where
    Ctx: crate::context::Counted,
{
    profiling::scope!("venus_core::decode_all");
    let mut processed = 0u32;
    loop {
        match decode_one(ring, dispatch, ctx) {
            DecodeOutcome::NoData => break,
            DecodeOutcome::InvalidHeader => {
                processed += 1;
            }
            DecodeOutcome::UnknownCommand(_)
            | DecodeOutcome::Handled(_)
            | DecodeOutcome::HandlerFailed(_, _) => {
                processed += 1;
            }
        }
    }
    ring.publish_head_if_dirty();
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Counters, HandlerContext};
    use crate::ring::{RingMode, SharedMemoryLayout};
    use std::sync::Arc;
    use venus_hal::stub::StubBackend;
    use venus_protocol::CommandHeader;

    fn make_ring(buffer_size: u32) -> (Vec<u8>, Arc<Ring>) {
        let total = 16 + buffer_size as usize;
        let mut mem = vec![0u8; total];
        let layout = SharedMemoryLayout {
            base: mem.as_mut_ptr(),
            total_size: total,
            buffer_size,
            extra_size: 0,
        };
        let ring = Ring::new(layout, RingMode::Polled).unwrap();
        (mem, ring)
    }

    fn push_frame(mem: &mut [u8], tail: &mut u32, buffer_size: u32, header: CommandHeader, payload: &[u8]) {
        let mask = buffer_size - 1;
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(payload);
        for b in bytes {
            let idx = 16 + (*tail & mask) as usize;
            mem[idx] = b;
            *tail = tail.wrapping_add(1);
        }
    }

    #[test]
    fn unknown_command_is_counted_and_consumed() {
        let (mut mem, ring) = make_ring(128);
        let mut tail = 0u32;
        // 4 is in range (< MAX_COMMAND_ID) but falls in a gap the
        // covered command table doesn't fill, so it decodes as a
        // well-formed header with no registered handler.
        push_frame(
            &mut mem,
            &mut tail,
            128,
            CommandHeader {
                command_id: 4,
                command_size: 8,
            },
            &[],
        );
        unsafe {
            std::sync::atomic::AtomicU32::from_ptr(mem.as_mut_ptr().add(4) as *mut u32)
                .store(tail, std::sync::atomic::Ordering::Release);
        }

        let dispatch: DispatchContext<HandlerContext> = DispatchContext::new();
        let mut ctx = HandlerContext::new(Arc::new(StubBackend::new()));
        let processed = decode_all(&ring, &dispatch, &mut ctx);
        assert_eq!(processed, 1);
        assert_eq!(ctx.counters.commands_unknown, 1);
        assert_eq!(ctx.counters.commands_handled, 0);
    }

    #[test]
    fn invalid_header_does_not_block_subsequent_frames() {
        let (mut mem, ring) = make_ring(128);
        let mut tail = 0u32;
        // command_id out of range, but a well-formed (8-byte,
        // no-payload) declared size, so the whole malformed frame is
        // cleanly skipped and the next frame starts aligned.
        push_frame(
            &mut mem,
            &mut tail,
            128,
            CommandHeader {
                command_id: 999,
                command_size: 8,
            },
            &[],
        );
        push_frame(
            &mut mem,
            &mut tail,
            128,
            CommandHeader {
                command_id: venus_protocol::command::CMD_CREATE_INSTANCE,
                command_size: 16,
            },
            &0x1000u64.to_le_bytes(),
        );
        unsafe {
            std::sync::atomic::AtomicU32::from_ptr(mem.as_mut_ptr().add(4) as *mut u32)
                .store(tail, std::sync::atomic::Ordering::Release);
        }

        let mut dispatch: DispatchContext<HandlerContext> = DispatchContext::new();
        crate::handlers::register_default_handlers(&mut dispatch);
        let mut ctx = HandlerContext::new(Arc::new(StubBackend::new()));
        decode_all(&ring, &dispatch, &mut ctx);
        assert_eq!(ring.stats().header_errors, 1);
        assert_eq!(ctx.counters.commands_handled, 1);
    }

    #[test]
    fn counters_struct_starts_zeroed() {
        assert_eq!(Counters::default().commands_handled, 0);
    }
}
