use venus_hal::{BufferHandle, DeviceHandle, DeviceMemoryHandle, ImageHandle};
use venus_protocol::command::{
    CMD_ALLOCATE_MEMORY, CMD_BIND_BUFFER_MEMORY, CMD_BIND_IMAGE_MEMORY, CMD_FREE_MEMORY,
};
use venus_protocol::{wire, ObjectType};

use crate::context::HandlerContext;
use crate::decoder::DispatchContext;
use crate::error::CoreError;
use crate::ring::Ring;

pub(super) fn register(dispatch: &mut DispatchContext<HandlerContext>) {
    dispatch.register(CMD_ALLOCATE_MEMORY, allocate_memory);
    dispatch.register(CMD_FREE_MEMORY, free_memory);
    dispatch.register(CMD_BIND_BUFFER_MEMORY, bind_buffer_memory);
    dispatch.register(CMD_BIND_IMAGE_MEMORY, bind_image_memory);
}

fn allocate_memory(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::AllocateMemory::decode(payload)?;
    let device = ctx
        .objects
        .get_typed(req.device_guest_id, ObjectType::Device)
        .map(DeviceHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.device_guest_id,
            expected: ObjectType::Device,
        })?;
    let memory = ctx
        .backend
        .allocate_memory(device, req.allocation_size, req.memory_type_index)?;
    ctx.objects
        .add(req.memory_guest_id, memory.as_raw(), ObjectType::DeviceMemory)?;
    ctx.counters.objects_created += 1;
    Ok(())
}

fn free_memory(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::FreeMemory::decode(payload)?;
    let memory = ctx
        .objects
        .get_typed(req.memory_guest_id, ObjectType::DeviceMemory)
        .map(DeviceMemoryHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.memory_guest_id,
            expected: ObjectType::DeviceMemory,
        })?;
    ctx.backend.free_memory(memory);
    ctx.objects.remove(req.memory_guest_id);
    ctx.counters.objects_destroyed += 1;
    Ok(())
}

fn bind_buffer_memory(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::BindBufferMemory::decode(payload)?;
    let buffer = ctx
        .objects
        .get_typed(req.buffer_guest_id, ObjectType::Buffer)
        .map(BufferHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.buffer_guest_id,
            expected: ObjectType::Buffer,
        })?;
    let memory = ctx
        .objects
        .get_typed(req.memory_guest_id, ObjectType::DeviceMemory)
        .map(DeviceMemoryHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.memory_guest_id,
            expected: ObjectType::DeviceMemory,
        })?;
    ctx.backend
        .bind_buffer_memory(buffer, memory, req.memory_offset)?;
    Ok(())
}

fn bind_image_memory(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::BindImageMemory::decode(payload)?;
    let image = ctx
        .objects
        .get_typed(req.image_guest_id, ObjectType::Image)
        .map(ImageHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.image_guest_id,
            expected: ObjectType::Image,
        })?;
    let memory = ctx
        .objects
        .get_typed(req.memory_guest_id, ObjectType::DeviceMemory)
        .map(DeviceMemoryHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.memory_guest_id,
            expected: ObjectType::DeviceMemory,
        })?;
    ctx.backend
        .bind_image_memory(image, memory, req.memory_offset)?;
    Ok(())
}
