//! Fixed-size, little-endian payload structs for every command the
//! core dispatches.
//!
//! The real Venus wire format marshals arbitrary Vulkan structs
//! (arrays, pNext chains, variable-length data) through a scheme
//! inherited from virglrenderer that is not reconstructable from the
//! sources this crate was grounded on. Every struct below is instead a
//! flat, fixed-size layout carrying exactly the guest ids and scalar
//! parameters its handler needs — no nested pointers, no variable
//! length fields. `encode`/`decode` are the only way in or out, so a
//! layout can change without touching call sites.

use crate::codec::{LeReader, LeWriter};
use crate::WireError;

macro_rules! wire_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(pub $field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl $name {
            pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
                let mut r = LeReader::new(bytes);
                $(let $field = wire_struct!(@read r, $ty);)*
                r.finish()?;
                Ok(Self { $($field,)* })
            }

            pub fn encode(&self) -> Vec<u8> {
                let mut w = LeWriter::new();
                $(wire_struct!(@write w, self.$field, $ty);)*
                w.into_bytes()
            }
        }
    };
    (@read $r:ident, u32) => { $r.read_u32()? };
    (@read $r:ident, u64) => { $r.read_u64()? };
    (@write $w:ident, $val:expr, u32) => { $w.write_u32($val) };
    (@write $w:ident, $val:expr, u64) => { $w.write_u64($val) };
}

wire_struct! {
    pub struct CreateInstance {
        pub guest_id: u64,
    }
}

wire_struct! {
    pub struct DestroyInstance {
        pub guest_id: u64,
    }
}

wire_struct! {
    pub struct EnumeratePhysicalDevices {
        pub instance_guest_id: u64,
        pub device_guest_id: u64,
        pub reply_offset: u64,
    }
}

wire_struct! {
    pub struct GetPhysicalDeviceFeatures {
        pub physical_device_guest_id: u64,
        pub reply_offset: u64,
    }
}

wire_struct! {
    pub struct GetPhysicalDeviceProperties {
        pub physical_device_guest_id: u64,
        pub reply_offset: u64,
    }
}

wire_struct! {
    pub struct GetPhysicalDeviceMemoryProperties {
        pub physical_device_guest_id: u64,
        pub reply_offset: u64,
    }
}

wire_struct! {
    pub struct CreateDevice {
        pub physical_device_guest_id: u64,
        pub device_guest_id: u64,
    }
}

wire_struct! {
    pub struct DestroyDevice {
        pub device_guest_id: u64,
    }
}

wire_struct! {
    pub struct GetDeviceQueue {
        pub device_guest_id: u64,
        pub queue_family_index: u32,
        pub queue_index: u32,
        pub queue_guest_id: u64,
    }
}

wire_struct! {
    pub struct AllocateMemory {
        pub device_guest_id: u64,
        pub memory_guest_id: u64,
        pub allocation_size: u64,
        pub memory_type_index: u32,
        pub _pad: u32,
    }
}

wire_struct! {
    pub struct FreeMemory {
        pub memory_guest_id: u64,
    }
}

wire_struct! {
    pub struct CreateBuffer {
        pub device_guest_id: u64,
        pub buffer_guest_id: u64,
        pub size: u64,
        pub usage: u32,
        pub _pad: u32,
    }
}

wire_struct! {
    pub struct DestroyBuffer {
        pub buffer_guest_id: u64,
    }
}

wire_struct! {
    pub struct BindBufferMemory {
        pub buffer_guest_id: u64,
        pub memory_guest_id: u64,
        pub memory_offset: u64,
    }
}

wire_struct! {
    pub struct CreateImage {
        pub device_guest_id: u64,
        pub image_guest_id: u64,
        pub width: u32,
        pub height: u32,
        pub format: u32,
        pub usage: u32,
    }
}

wire_struct! {
    pub struct DestroyImage {
        pub image_guest_id: u64,
    }
}

wire_struct! {
    pub struct BindImageMemory {
        pub image_guest_id: u64,
        pub memory_guest_id: u64,
        pub memory_offset: u64,
    }
}

wire_struct! {
    pub struct CreateCommandPool {
        pub device_guest_id: u64,
        pub pool_guest_id: u64,
        pub queue_family_index: u32,
        pub _pad: u32,
    }
}

wire_struct! {
    pub struct AllocateCommandBuffers {
        pub pool_guest_id: u64,
        pub command_buffer_guest_id: u64,
    }
}

wire_struct! {
    pub struct FreeCommandBuffers {
        pub pool_guest_id: u64,
        pub command_buffer_guest_id: u64,
    }
}

wire_struct! {
    pub struct BeginCommandBuffer {
        pub command_buffer_guest_id: u64,
    }
}

wire_struct! {
    pub struct EndCommandBuffer {
        pub command_buffer_guest_id: u64,
    }
}

wire_struct! {
    pub struct QueueSubmit {
        pub queue_guest_id: u64,
        pub command_buffer_guest_id: u64,
        pub fence_guest_id: u64,
    }
}

wire_struct! {
    pub struct QueueWaitIdle {
        pub queue_guest_id: u64,
    }
}

/// Reply payload for `vkGetPhysicalDeviceFeatures`, grounded in the
/// fields `pv_moltenvk_context::device_features` actually populates.
/// Booleans are carried as `u32` (`VkBool32` convention).
wire_struct! {
    pub struct PhysicalDeviceFeaturesReply {
        pub geometry_shader: u32,
        pub tessellation_shader: u32,
        pub sampler_anisotropy: u32,
        pub fill_mode_non_solid: u32,
    }
}

/// Reply payload for `vkGetPhysicalDeviceProperties`, trimmed to the
/// scalar fields the original's `device_properties` fills in; `vendor_id`
/// and `device_id` are enough for a guest driver to make feature
/// decisions without a full `VkPhysicalDeviceProperties` struct.
wire_struct! {
    pub struct PhysicalDevicePropertiesReply {
        pub vendor_id: u32,
        pub device_id: u32,
        pub device_type: u32,
        pub max_image_dimension_2d: u32,
    }
}

/// Reply payload for `vkGetPhysicalDeviceMemoryProperties`, grounded in
/// `pv_moltenvk_context::memory_properties`: a single unified heap with
/// one device-local, host-visible memory type, matching Apple Silicon's
/// unified memory architecture.
wire_struct! {
    pub struct PhysicalDeviceMemoryPropertiesReply {
        pub memory_type_count: u32,
        pub memory_type_flags: u32,
        pub memory_heap_count: u32,
        pub memory_heap_size: u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_buffer_round_trips() {
        let payload = CreateBuffer {
            device_guest_id: 0x1000,
            buffer_guest_id: 0x6001,
            size: 4096,
            usage: 0x10,
            _pad: 0,
        };
        let bytes = payload.encode();
        assert_eq!(bytes.len(), 32);
        assert_eq!(CreateBuffer::decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn get_device_queue_round_trips() {
        let payload = GetDeviceQueue {
            device_guest_id: 0x3000,
            queue_family_index: 0,
            queue_index: 1,
            queue_guest_id: 0x4001,
        };
        let bytes = payload.encode();
        assert_eq!(GetDeviceQueue::decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = [0u8; 10];
        assert!(CreateBuffer::decode(&bytes).is_err());
    }
}
