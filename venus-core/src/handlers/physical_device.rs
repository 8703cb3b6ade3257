use venus_hal::PhysicalDeviceHandle;
use venus_protocol::command::{
    CMD_GET_PHYSICAL_DEVICE_FEATURES, CMD_GET_PHYSICAL_DEVICE_MEMORY_PROPERTIES,
    CMD_GET_PHYSICAL_DEVICE_PROPERTIES,
};
use venus_protocol::{wire, ObjectType};

use crate::context::HandlerContext;
use crate::decoder::DispatchContext;
use crate::error::CoreError;
use crate::ring::Ring;

pub(super) fn register(dispatch: &mut DispatchContext<HandlerContext>) {
    dispatch.register(CMD_GET_PHYSICAL_DEVICE_FEATURES, get_features);
    dispatch.register(CMD_GET_PHYSICAL_DEVICE_PROPERTIES, get_properties);
    dispatch.register(
        CMD_GET_PHYSICAL_DEVICE_MEMORY_PROPERTIES,
        get_memory_properties,
    );
}

fn resolve(ctx: &HandlerContext, guest_id: u64) -> Result<PhysicalDeviceHandle, CoreError> {
    ctx.objects
        .get_typed(guest_id, ObjectType::PhysicalDevice)
        .map(PhysicalDeviceHandle)
        .ok_or(CoreError::InvalidHandle {
            guest_id,
            expected: ObjectType::PhysicalDevice,
        })
}

fn get_features(
    ctx: &mut HandlerContext,
    ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::GetPhysicalDeviceFeatures::decode(payload)?;
    let pd = resolve(ctx, req.physical_device_guest_id)?;
    let features = ctx.backend.get_physical_device_features(pd)?;
    let reply = wire::PhysicalDeviceFeaturesReply {
        geometry_shader: features.geometry_shader as u32,
        tessellation_shader: features.tessellation_shader as u32,
        sampler_anisotropy: features.sampler_anisotropy as u32,
        fill_mode_non_solid: features.fill_mode_non_solid as u32,
    };
    super::write_reply(ring, req.reply_offset, &reply.encode())
}

fn get_properties(
    ctx: &mut HandlerContext,
    ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::GetPhysicalDeviceProperties::decode(payload)?;
    let pd = resolve(ctx, req.physical_device_guest_id)?;
    let props = ctx.backend.get_physical_device_properties(pd)?;
    let reply = wire::PhysicalDevicePropertiesReply {
        vendor_id: props.vendor_id,
        device_id: props.device_id,
        device_type: props.device_type,
        max_image_dimension_2d: props.max_image_dimension_2d,
    };
    super::write_reply(ring, req.reply_offset, &reply.encode())
}

fn get_memory_properties(
    ctx: &mut HandlerContext,
    ring: &Ring,
    _header: venus_protocol::CommandHeader,
    payload: &[u8],
) -> Result<(), CoreError> {
    let req = wire::GetPhysicalDeviceMemoryProperties::decode(payload)?;
    let pd = resolve(ctx, req.physical_device_guest_id)?;
    let props = ctx.backend.get_physical_device_memory_properties(pd)?;
    let reply = wire::PhysicalDeviceMemoryPropertiesReply {
        memory_type_count: props.memory_type_count,
        memory_type_flags: props.memory_type_flags,
        memory_heap_count: props.memory_heap_count,
        memory_heap_size: props.memory_heap_size,
    };
    super::write_reply(ring, req.reply_offset, &reply.encode())
}
