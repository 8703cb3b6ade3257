use venus_hal::{BufferUsage, DeviceHandle, ImageDescriptor};
use venus_protocol::command::{CMD_CREATE_BUFFER, CMD_CREATE_IMAGE, CMD_DESTROY_BUFFER, CMD_DESTROY_IMAGE};
use venus_protocol::{wire, ObjectType};

use crate::context::HandlerContext;
use crate::decoder::DispatchContext;
use crate::error::CoreError;
use crate::ring::Ring;

pub(super) fn register(dispatch: &mut DispatchContext<HandlerContext>) {
    dispatch.register(CMD_CREATE_BUFFER, create_buffer);
    dispatch.register(CMD_DESTROY_BUFFER, destroy_buffer);
    dispatch.register(CMD_CREATE_IMAGE, create_image);
    dispatch.register(CMD_DESTROY_IMAGE, destroy_image);
}

fn create_buffer(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::CreateBuffer::decode(payload)?;
    let device = ctx
        .objects
        .get_typed(req.device_guest_id, ObjectType::Device)
        .map(DeviceHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.device_guest_id,
            expected: ObjectType::Device,
        })?;
    let usage = BufferUsage::from_bits_truncate(req.usage);
    let buffer = ctx.backend.create_buffer(device, req.size, usage)?;
    ctx.objects
        .add(req.buffer_guest_id, buffer.as_raw(), ObjectType::Buffer)?;
    ctx.counters.objects_created += 1;
    Ok(())
}

fn destroy_buffer(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::DestroyBuffer::decode(payload)?;
    let buffer = ctx
        .objects
        .get_typed(req.buffer_guest_id, ObjectType::Buffer)
        .map(venus_hal::BufferHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.buffer_guest_id,
            expected: ObjectType::Buffer,
        })?;
    ctx.backend.destroy_buffer(buffer);
    ctx.objects.remove(req.buffer_guest_id);
    ctx.counters.objects_destroyed += 1;
    Ok(())
}

fn create_image(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::CreateImage::decode(payload)?;
    let device = ctx
        .objects
        .get_typed(req.device_guest_id, ObjectType::Device)
        .map(DeviceHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.device_guest_id,
            expected: ObjectType::Device,
        })?;
    let descriptor = ImageDescriptor {
        width: req.width,
        height: req.height,
        format: req.format,
        usage: req.usage,
    };
    let image = ctx.backend.create_image(device, descriptor)?;
    ctx.objects
        .add(req.image_guest_id, image.as_raw(), ObjectType::Image)?;
    ctx.counters.objects_created += 1;
    Ok(())
}

fn destroy_image(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::DestroyImage::decode(payload)?;
    let image = ctx
        .objects
        .get_typed(req.image_guest_id, ObjectType::Image)
        .map(venus_hal::ImageHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.image_guest_id,
            expected: ObjectType::Image,
        })?;
    ctx.backend.destroy_image(image);
    ctx.objects.remove(req.image_guest_id);
    ctx.counters.objects_destroyed += 1;
    Ok(())
}
