/*! The native GPU backend interface consumed by the Venus command core.
 *
 * `venus-core` never talks to Vulkan-on-Metal directly: everything it
 * needs crosses this one trait. That keeps the core testable against
 * [`stub::StubBackend`] without a real GPU, and keeps the Vulkan
 * translation layer (`vulkan`, behind the `vulkan` feature) an
 * implementation detail the core doesn't know the shape of.
 */
#![warn(trivial_casts, trivial_numeric_casts, unused_extern_crates)]

mod error;
mod handle;
pub mod stub;
#[cfg(feature = "vulkan")]
pub mod vulkan;

use bitflags::bitflags;

pub use error::BackendError;
pub use handle::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DeviceHandle, DeviceMemoryHandle,
    FenceHandle, ImageHandle, InstanceHandle, PhysicalDeviceHandle, QueueHandle,
};

bitflags! {
    /// Mirrors the subset of `VkBufferUsageFlags` the core cares about.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM_BUFFER = 1 << 2;
        const STORAGE_BUFFER = 1 << 3;
        const VERTEX_BUFFER = 1 << 4;
        const INDEX_BUFFER = 1 << 5;
    }
}

/// Parameters for [`GpuBackend::create_image`], trimmed to the scalars
/// the Venus command table actually carries (see
/// `venus_protocol::wire::CreateImage`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub usage: u32,
}

/// Reply payload for `vkGetPhysicalDeviceFeatures`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhysicalDeviceFeatures {
    pub geometry_shader: bool,
    pub tessellation_shader: bool,
    pub sampler_anisotropy: bool,
    pub fill_mode_non_solid: bool,
}

/// Reply payload for `vkGetPhysicalDeviceProperties`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhysicalDeviceProperties {
    pub vendor_id: u32,
    pub device_id: u32,
    pub device_type: u32,
    pub max_image_dimension_2d: u32,
}

/// Reply payload for `vkGetPhysicalDeviceMemoryProperties`. Apple
/// Silicon's unified memory means there is exactly one heap and one
/// memory type that is simultaneously device-local and host-visible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhysicalDeviceMemoryProperties {
    pub memory_type_count: u32,
    pub memory_type_flags: u32,
    pub memory_heap_count: u32,
    pub memory_heap_size: u64,
}

/// The interface a native GPU backend exposes to the command core.
///
/// One call per Venus command the core understands; no batching, no
/// generics over backend kind. Only one backend is ever active per
/// [`HandlerContext`](../venus_core/struct.HandlerContext.html), so
/// unlike `wgpu-hal`'s `Api` trait this is object-safe and used as
/// `Arc<dyn GpuBackend>`.
pub trait GpuBackend: Send + Sync {
    fn create_instance(&self) -> Result<InstanceHandle, BackendError>;
    fn destroy_instance(&self, instance: InstanceHandle);

    fn enumerate_physical_devices(
        &self,
        instance: InstanceHandle,
    ) -> Result<Vec<PhysicalDeviceHandle>, BackendError>;

    fn get_physical_device_features(
        &self,
        physical_device: PhysicalDeviceHandle,
    ) -> Result<PhysicalDeviceFeatures, BackendError>;

    fn get_physical_device_properties(
        &self,
        physical_device: PhysicalDeviceHandle,
    ) -> Result<PhysicalDeviceProperties, BackendError>;

    fn get_physical_device_memory_properties(
        &self,
        physical_device: PhysicalDeviceHandle,
    ) -> Result<PhysicalDeviceMemoryProperties, BackendError>;

    fn create_device(
        &self,
        physical_device: PhysicalDeviceHandle,
    ) -> Result<DeviceHandle, BackendError>;
    fn destroy_device(&self, device: DeviceHandle);

    fn get_device_queue(
        &self,
        device: DeviceHandle,
        queue_family_index: u32,
        queue_index: u32,
    ) -> Result<QueueHandle, BackendError>;

    fn allocate_memory(
        &self,
        device: DeviceHandle,
        allocation_size: u64,
        memory_type_index: u32,
    ) -> Result<DeviceMemoryHandle, BackendError>;
    fn free_memory(&self, memory: DeviceMemoryHandle);

    fn create_buffer(
        &self,
        device: DeviceHandle,
        size: u64,
        usage: BufferUsage,
    ) -> Result<BufferHandle, BackendError>;
    fn destroy_buffer(&self, buffer: BufferHandle);
    fn bind_buffer_memory(
        &self,
        buffer: BufferHandle,
        memory: DeviceMemoryHandle,
        memory_offset: u64,
    ) -> Result<(), BackendError>;

    fn create_image(
        &self,
        device: DeviceHandle,
        descriptor: ImageDescriptor,
    ) -> Result<ImageHandle, BackendError>;
    fn destroy_image(&self, image: ImageHandle);
    fn bind_image_memory(
        &self,
        image: ImageHandle,
        memory: DeviceMemoryHandle,
        memory_offset: u64,
    ) -> Result<(), BackendError>;

    fn create_command_pool(
        &self,
        device: DeviceHandle,
        queue_family_index: u32,
    ) -> Result<CommandPoolHandle, BackendError>;
    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    fn allocate_command_buffer(
        &self,
        pool: CommandPoolHandle,
    ) -> Result<CommandBufferHandle, BackendError>;
    fn free_command_buffer(&self, pool: CommandPoolHandle, command_buffer: CommandBufferHandle);

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<(), BackendError>;
    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<(), BackendError>;

    fn queue_submit(
        &self,
        queue: QueueHandle,
        command_buffer: CommandBufferHandle,
        fence: Option<FenceHandle>,
    ) -> Result<(), BackendError>;
    fn queue_wait_idle(&self, queue: QueueHandle) -> Result<(), BackendError>;
}
