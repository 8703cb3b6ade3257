use venus_hal::{CommandBufferHandle, FenceHandle, QueueHandle};
use venus_protocol::command::{CMD_QUEUE_SUBMIT, CMD_QUEUE_WAIT_IDLE};
use venus_protocol::{wire, ObjectType};

use crate::command_buffer_state::CommandBufferState;
use crate::context::HandlerContext;
use crate::decoder::DispatchContext;
use crate::error::CoreError;
use crate::fence_channel::FenceEvent;
use crate::ring::Ring;

pub(super) fn register(dispatch: &mut DispatchContext<HandlerContext>) {
    dispatch.register(CMD_QUEUE_SUBMIT, queue_submit);
    dispatch.register(CMD_QUEUE_WAIT_IDLE, queue_wait_idle);
}

fn queue_submit(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::QueueSubmit::decode(payload)?;
    let queue = ctx
        .objects
        .get_typed(req.queue_guest_id, ObjectType::Queue)
        .map(QueueHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.queue_guest_id,
            expected: ObjectType::Queue,
        })?;
    let command_buffer = ctx
        .objects
        .get_typed(req.command_buffer_guest_id, ObjectType::CommandBuffer)
        .map(CommandBufferHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.command_buffer_guest_id,
            expected: ObjectType::CommandBuffer,
        })?;

    let current = ctx
        .objects
        .command_buffer_state(req.command_buffer_guest_id)
        .expect("command buffer slots always carry a recording state");
    let next = current.submit().ok_or(CoreError::InvalidState {
        guest_id: req.command_buffer_guest_id,
        expected: "Executable",
        actual: current.name(),
    })?;

    // A guest id of zero means "no fence requested".
    let fence = if req.fence_guest_id == 0 {
        None
    } else {
        Some(
            ctx.objects
                .get_typed(req.fence_guest_id, ObjectType::Fence)
                .map(FenceHandle)
                .ok_or(CoreError::InvalidHandle {
                    guest_id: req.fence_guest_id,
                    expected: ObjectType::Fence,
                })?,
        )
    };

    ctx.backend.queue_submit(queue, command_buffer, fence)?;
    ctx.objects
        .set_command_buffer_state(req.command_buffer_guest_id, next);

    // Both covered backends execute `queue_submit` synchronously, so
    // the requested fence (if any) is already signaled by the time
    // this handler returns.
    if req.fence_guest_id != 0 {
        if let Some(subscriber) = ctx.fence_subscriber.as_ref() {
            subscriber.notify(FenceEvent {
                ctx_id: ctx.ctx_id,
                ring_idx: ctx.ring_idx,
                fence_id: req.fence_guest_id,
            });
        }
    }
    Ok(())
}

fn queue_wait_idle(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::QueueWaitIdle::decode(payload)?;
    let queue = ctx
        .objects
        .get_typed(req.queue_guest_id, ObjectType::Queue)
        .map(QueueHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.queue_guest_id,
            expected: ObjectType::Queue,
        })?;
    ctx.backend.queue_wait_idle(queue)?;

    // The backend call is synchronous, so every command buffer this
    // queue had Pending is now done executing; walk the table and
    // complete them back to Executable.
    let pending: Vec<u64> = ctx
        .objects
        .iter()
        .filter(|(_, _, ty)| *ty == ObjectType::CommandBuffer)
        .map(|(guest_id, _, _)| guest_id)
        .filter(|guest_id| {
            matches!(
                ctx.objects.command_buffer_state(*guest_id),
                Some(CommandBufferState::Pending)
            )
        })
        .collect();
    for guest_id in pending {
        let state = ctx
            .objects
            .command_buffer_state(guest_id)
            .expect("just filtered for Some(Pending)");
        ctx.objects.set_command_buffer_state(guest_id, state.complete());
    }
    Ok(())
}
