/// The closed set of Vulkan object kinds the core tracks in its
/// object table. Every guest handle passed across the ring carries one
/// of these tags, checked on lookup so a buffer id can never be used
/// where an image id is expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Instance,
    PhysicalDevice,
    Device,
    Queue,
    Semaphore,
    Fence,
    DeviceMemory,
    Buffer,
    Image,
    CommandPool,
    CommandBuffer,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Instance => "Instance",
            ObjectType::PhysicalDevice => "PhysicalDevice",
            ObjectType::Device => "Device",
            ObjectType::Queue => "Queue",
            ObjectType::Semaphore => "Semaphore",
            ObjectType::Fence => "Fence",
            ObjectType::DeviceMemory => "DeviceMemory",
            ObjectType::Buffer => "Buffer",
            ObjectType::Image => "Image",
            ObjectType::CommandPool => "CommandPool",
            ObjectType::CommandBuffer => "CommandBuffer",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
