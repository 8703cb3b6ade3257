use venus_hal::{DeviceHandle, PhysicalDeviceHandle};
use venus_protocol::command::{CMD_CREATE_DEVICE, CMD_DESTROY_DEVICE, CMD_GET_DEVICE_QUEUE};
use venus_protocol::{wire, ObjectType};

use crate::context::HandlerContext;
use crate::decoder::DispatchContext;
use crate::error::CoreError;
use crate::ring::Ring;

pub(super) fn register(dispatch: &mut DispatchContext<HandlerContext>) {
    dispatch.register(CMD_CREATE_DEVICE, create_device);
    dispatch.register(CMD_DESTROY_DEVICE, destroy_device);
    dispatch.register(CMD_GET_DEVICE_QUEUE, get_device_queue);
}

fn create_device(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::CreateDevice::decode(payload)?;
    let pd = ctx
        .objects
        .get_typed(req.physical_device_guest_id, ObjectType::PhysicalDevice)
        .map(PhysicalDeviceHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.physical_device_guest_id,
            expected: ObjectType::PhysicalDevice,
        })?;
    let device = ctx.backend.create_device(pd)?;
    ctx.objects
        .add(req.device_guest_id, device.as_raw(), ObjectType::Device)?;
    ctx.counters.objects_created += 1;
    Ok(())
}

fn destroy_device(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::DestroyDevice::decode(payload)?;
    let device = ctx
        .objects
        .get_typed(req.device_guest_id, ObjectType::Device)
        .map(DeviceHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.device_guest_id,
            expected: ObjectType::Device,
        })?;
    ctx.backend.destroy_device(device);
    ctx.objects.remove(req.device_guest_id);
    ctx.counters.objects_destroyed += 1;
    Ok(())
}

fn get_device_queue(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::GetDeviceQueue::decode(payload)?;
    let device = ctx
        .objects
        .get_typed(req.device_guest_id, ObjectType::Device)
        .map(DeviceHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.device_guest_id,
            expected: ObjectType::Device,
        })?;
    let queue = ctx
        .backend
        .get_device_queue(device, req.queue_family_index, req.queue_index)?;
    ctx.objects
        .add(req.queue_guest_id, queue.as_raw(), ObjectType::Queue)?;
    ctx.counters.objects_created += 1;
    Ok(())
}
