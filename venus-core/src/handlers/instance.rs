use venus_hal::InstanceHandle;
use venus_protocol::command::{CMD_CREATE_INSTANCE, CMD_DESTROY_INSTANCE, CMD_ENUMERATE_PHYSICAL_DEVICES};
use venus_protocol::wire;
use venus_protocol::ObjectType;

use crate::context::HandlerContext;
use crate::decoder::DispatchContext;
use crate::error::CoreError;
use crate::ring::Ring;

pub(super) fn register(dispatch: &mut DispatchContext<HandlerContext>) {
    dispatch.register(CMD_CREATE_INSTANCE, create_instance);
    dispatch.register(CMD_DESTROY_INSTANCE, destroy_instance);
    dispatch.register(CMD_ENUMERATE_PHYSICAL_DEVICES, enumerate_physical_devices);
}

fn create_instance(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::CreateInstance::decode(payload)?;
    let handle = ctx.backend.create_instance()?;
    ctx.objects.add(req.guest_id, handle.as_raw(), ObjectType::Instance)?;
    ctx.counters.objects_created += 1;
    Ok(())
}

fn destroy_instance(
    ctx: &mut HandlerContext,
    _ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::DestroyInstance::decode(payload)?;
    let host = ctx
        .objects
        .get_typed(req.guest_id, ObjectType::Instance)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.guest_id,
            expected: ObjectType::Instance,
        })?;
    ctx.backend.destroy_instance(InstanceHandle(host));
    ctx.objects.remove(req.guest_id);
    ctx.counters.objects_destroyed += 1;
    Ok(())
}

fn enumerate_physical_devices(
    ctx: &mut HandlerContext,
    ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::EnumeratePhysicalDevices::decode(payload)?;
    let instance_host = ctx
        .objects
        .get_typed(req.instance_guest_id, ObjectType::Instance)
        .ok_or(CoreError::InvalidHandle {
            guest_id: req.instance_guest_id,
            expected: ObjectType::Instance,
        })?;

    let devices = ctx
        .backend
        .enumerate_physical_devices(InstanceHandle(instance_host))?;
    let first = devices
        .first()
        .copied()
        .ok_or_else(|| CoreError::BackendFailure(venus_hal::BackendError::Other(
            "backend enumerated zero physical devices".into(),
        )))?;

    ctx.objects
        .add(req.device_guest_id, first.as_raw(), ObjectType::PhysicalDevice)?;
    ctx.counters.objects_created += 1;

    super::write_reply(ring, req.reply_offset, &(devices.len() as u32).to_le_bytes())
}
