use once_cell::sync::Lazy;

use crate::codec::{LeReader, LeWriter};
use crate::WireError;

/// Largest command id the dispatch table has a slot for.
///
/// Ids at or above this value are always `UnknownCommand`, regardless
/// of whether the guest thinks it's a real `VkCommandTypeEXT` value.
pub const MAX_COMMAND_ID: u32 = 500;

/// Smallest legal frame: just the header, no payload.
pub const MIN_FRAME_SIZE: u32 = 8;

/// Largest frame the ring will ever hand to a decoder.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// The 8-byte frame header: a command id and the size of the payload
/// that follows it, both little-endian `u32`s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandHeader {
    pub command_id: u32,
    pub command_size: u32,
}

impl CommandHeader {
    pub const ENCODED_LEN: usize = 8;

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = LeReader::new(bytes);
        let command_id = r.read_u32()?;
        let command_size = r.read_u32()?;
        r.finish()?;
        Ok(Self {
            command_id,
            command_size,
        })
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut w = LeWriter::new();
        w.write_u32(self.command_id).write_u32(self.command_size);
        w.into_bytes().try_into().unwrap()
    }
}

/// A Venus-style command id, mirroring `VkCommandTypeEXT`.
///
/// This is a thin wrapper over `u32` rather than a closed enum: the
/// guest's id space is bigger than the set of commands this core
/// understands, and an unrecognized id must become `UnknownCommand`,
/// not a decode failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(pub u32);

impl CommandId {
    pub fn is_known(&self) -> bool {
        self.0 < MAX_COMMAND_ID && name_table()[self.0 as usize].is_some()
    }

    /// Human-readable name for logging and diagnostics, falling back
    /// to `Unknown(0xHH)` for ids the table has no entry for.
    pub fn name(&self) -> String {
        if self.0 < MAX_COMMAND_ID {
            if let Some(name) = name_table()[self.0 as usize] {
                return name.to_string();
            }
        }
        format!("Unknown(0x{:02x})", self.0)
    }
}

impl From<u32> for CommandId {
    fn from(value: u32) -> Self {
        CommandId(value)
    }
}

macro_rules! command_ids {
    ($($id:expr => $konst:ident, $name:expr;)*) => {
        $(pub const $konst: u32 = $id;)*

        fn build_name_table() -> Box<[Option<&'static str>; MAX_COMMAND_ID as usize]> {
            let mut table: Box<[Option<&'static str>; MAX_COMMAND_ID as usize]> =
                Box::new([None; MAX_COMMAND_ID as usize]);
            $(table[$id as usize] = Some($name);)*
            table
        }
    };
}

// Decimal ids match the upstream VkCommandTypeEXT constants this
// protocol mirrors; gaps are commands outside the covered subset.
command_ids! {
    0  => CMD_CREATE_INSTANCE, "vkCreateInstance";
    1  => CMD_DESTROY_INSTANCE, "vkDestroyInstance";
    2  => CMD_ENUMERATE_PHYSICAL_DEVICES, "vkEnumeratePhysicalDevices";
    3  => CMD_GET_PHYSICAL_DEVICE_FEATURES, "vkGetPhysicalDeviceFeatures";
    6  => CMD_GET_PHYSICAL_DEVICE_PROPERTIES, "vkGetPhysicalDeviceProperties";
    8  => CMD_GET_PHYSICAL_DEVICE_MEMORY_PROPERTIES, "vkGetPhysicalDeviceMemoryProperties";
    11 => CMD_CREATE_DEVICE, "vkCreateDevice";
    12 => CMD_DESTROY_DEVICE, "vkDestroyDevice";
    17 => CMD_GET_DEVICE_QUEUE, "vkGetDeviceQueue";
    18 => CMD_QUEUE_SUBMIT, "vkQueueSubmit";
    19 => CMD_QUEUE_WAIT_IDLE, "vkQueueWaitIdle";
    21 => CMD_ALLOCATE_MEMORY, "vkAllocateMemory";
    22 => CMD_FREE_MEMORY, "vkFreeMemory";
    28 => CMD_BIND_BUFFER_MEMORY, "vkBindBufferMemory";
    29 => CMD_BIND_IMAGE_MEMORY, "vkBindImageMemory";
    50 => CMD_CREATE_BUFFER, "vkCreateBuffer";
    51 => CMD_DESTROY_BUFFER, "vkDestroyBuffer";
    54 => CMD_CREATE_IMAGE, "vkCreateImage";
    55 => CMD_DESTROY_IMAGE, "vkDestroyImage";
    85 => CMD_CREATE_COMMAND_POOL, "vkCreateCommandPool";
    88 => CMD_ALLOCATE_COMMAND_BUFFERS, "vkAllocateCommandBuffers";
    89 => CMD_FREE_COMMAND_BUFFERS, "vkFreeCommandBuffers";
    90 => CMD_BEGIN_COMMAND_BUFFER, "vkBeginCommandBuffer";
    91 => CMD_END_COMMAND_BUFFER, "vkEndCommandBuffer";
}

static NAME_TABLE: Lazy<Box<[Option<&'static str>; MAX_COMMAND_ID as usize]>> =
    Lazy::new(build_name_table);

fn name_table() -> &'static [Option<&'static str>; MAX_COMMAND_ID as usize] {
    &NAME_TABLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = CommandHeader {
            command_id: CMD_CREATE_BUFFER,
            command_size: 24,
        };
        let bytes = h.encode();
        assert_eq!(CommandHeader::decode(&bytes).unwrap(), h);
    }

    #[test]
    fn known_command_names_resolve() {
        let id = CommandId(CMD_CREATE_INSTANCE);
        assert!(id.is_known());
        assert_eq!(id.name(), "vkCreateInstance");
    }

    #[test]
    fn unknown_command_falls_back() {
        let id = CommandId(499);
        assert!(!id.is_known());
        assert_eq!(id.name(), "Unknown(0x1f3)");

        let oob = CommandId(MAX_COMMAND_ID + 5);
        assert!(!oob.is_known());
        assert_eq!(oob.name(), "Unknown(0x1f9)");
    }
}
