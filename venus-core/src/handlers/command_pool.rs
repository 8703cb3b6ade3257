use venus_hal::{CommandBufferHandle, CommandPoolHandle, DeviceHandle};
use venus_protocol::command::{
    CMD_ALLOCATE_COMMAND_BUFFERS, CMD_BEGIN_COMMAND_BUFFER, CMD_CREATE_COMMAND_POOL,
    CMD_END_COMMAND_BUFFER, CMD_FREE_COMMAND_BUFFERS,
};
use venus_protocol::{wire, ObjectType};

use crate::context::HandlerContext;
use crate::decoder::DispatchContext;
use crate::error::CoreError;
use crate::ring::Ring;

pub(super) fn register(dispatch: &mut DispatchContext<HandlerContext>) {
    dispatch.register(CMD_CREATE_COMMAND_POOL, create_command_pool);
    dispatch.register(CMD_ALLOCATE_COMMAND_BUFFERS, allocate_command_buffers);
    dispatch.register(CMD_FREE_COMMAND_BUFFERS, free_command_buffers);
    dispatch.register(CMD_BEGIN_COMMAND_BUFFER, begin_command_buffer);
    dispatch.register(CMD_END_COMMAND_BUFFER, end_command_buffer);
}

fn create_command_pool(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::CreateCommandPool::decode(payload)?;
    let device = ctx
        .objects
        .get_typed(req.device_guest_id, ObjectType::Device)
        .map(DeviceHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.device_guest_id,
            expected: ObjectType::Device,
        })?;
    let pool = ctx
        .backend
        .create_command_pool(device, req.queue_family_index)?;
    ctx.objects
        .add(req.pool_guest_id, pool.as_raw(), ObjectType::CommandPool)?;
    ctx.counters.objects_created += 1;
    Ok(())
}

fn allocate_command_buffers(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::AllocateCommandBuffers::decode(payload)?;
    let pool = ctx
        .objects
        .get_typed(req.pool_guest_id, ObjectType::CommandPool)
        .map(CommandPoolHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.pool_guest_id,
            expected: ObjectType::CommandPool,
        })?;
    let command_buffer = ctx.backend.allocate_command_buffer(pool)?;
    ctx.objects.add(
        req.command_buffer_guest_id,
        command_buffer.as_raw(),
        ObjectType::CommandBuffer,
    )?;
    ctx.counters.objects_created += 1;
    Ok(())
}

fn free_command_buffers(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::FreeCommandBuffers::decode(payload)?;
    let pool = ctx
        .objects
        .get_typed(req.pool_guest_id, ObjectType::CommandPool)
        .map(CommandPoolHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.pool_guest_id,
            expected: ObjectType::CommandPool,
        })?;
    let command_buffer = ctx
        .objects
        .get_typed(req.command_buffer_guest_id, ObjectType::CommandBuffer)
        .map(CommandBufferHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.command_buffer_guest_id,
            expected: ObjectType::CommandBuffer,
        })?;
    ctx.backend.free_command_buffer(pool, command_buffer);
    ctx.objects.remove(req.command_buffer_guest_id);
    ctx.counters.objects_destroyed += 1;
    Ok(())
}

fn begin_command_buffer(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::BeginCommandBuffer::decode(payload)?;
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
    let next = current.begin().ok_or(CoreError::InvalidState {
        guest_id: req.command_buffer_guest_id,
        expected: "Initial or Executable",
        actual: current.name(),
    })?;
    ctx.backend.begin_command_buffer(command_buffer)?;
    ctx.objects
        .set_command_buffer_state(req.command_buffer_guest_id, next);
    Ok(())
}

fn end_command_buffer(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::EndCommandBuffer::decode(payload)?;
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
    let next = current.end().ok_or(CoreError::InvalidState {
        guest_id: req.command_buffer_guest_id,
        expected: "Recording",
        actual: current.name(),
    })?;
    ctx.backend.end_command_buffer(command_buffer)?;
    ctx.objects
        .set_command_buffer_state(req.command_buffer_guest_id, next);
    Ok(())
}
