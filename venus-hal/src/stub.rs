//! A deterministic backend with no real GPU behind it.
//!
//! Every `create_*` call hands out the next value from a monotonic
//! counter and records nothing else; `destroy_*` calls are no-ops.
//! This is what the core's tests and integration scenarios run
//! against — real Vulkan-on-Metal behavior is outside this crate's
//! concern, per [`crate::vulkan`]'s doc comment.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    BackendError, BufferHandle, BufferUsage, CommandBufferHandle, CommandPoolHandle, DeviceHandle,
    DeviceMemoryHandle, FenceHandle, GpuBackend, ImageDescriptor, ImageHandle, InstanceHandle,
    PhysicalDeviceFeatures, PhysicalDeviceHandle, PhysicalDeviceMemoryProperties,
    PhysicalDeviceProperties, QueueHandle,
};

#[derive(Debug)]
pub struct StubBackend {
    next_handle: AtomicU64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
        }
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for StubBackend {
    fn create_instance(&self) -> Result<InstanceHandle, BackendError> {
        Ok(InstanceHandle(self.next()))
    }

    fn destroy_instance(&self, _instance: InstanceHandle) {}

    fn enumerate_physical_devices(
        &self,
        _instance: InstanceHandle,
    ) -> Result<Vec<PhysicalDeviceHandle>, BackendError> {
        Ok(vec![PhysicalDeviceHandle(self.next())])
    }

    fn get_physical_device_features(
        &self,
        _physical_device: PhysicalDeviceHandle,
    ) -> Result<PhysicalDeviceFeatures, BackendError> {
        Ok(PhysicalDeviceFeatures {
            geometry_shader: false,
            tessellation_shader: false,
            sampler_anisotropy: true,
            fill_mode_non_solid: true,
        })
    }

    fn get_physical_device_properties(
        &self,
        physical_device: PhysicalDeviceHandle,
    ) -> Result<PhysicalDeviceProperties, BackendError> {
        Ok(PhysicalDeviceProperties {
            vendor_id: 0x106b, // Apple's PCI vendor id, matching the original's MoltenVK context
            device_id: physical_device.0 as u32,
            device_type: 2, // VK_PHYSICAL_DEVICE_TYPE_INTEGRATED_GPU
            max_image_dimension_2d: 16384,
        })
    }

    fn get_physical_device_memory_properties(
        &self,
        _physical_device: PhysicalDeviceHandle,
    ) -> Result<PhysicalDeviceMemoryProperties, BackendError> {
        Ok(PhysicalDeviceMemoryProperties {
            memory_type_count: 1,
            memory_type_flags: 0x1 | 0x2, // DEVICE_LOCAL | HOST_VISIBLE
            memory_heap_count: 1,
            memory_heap_size: 8u64 * 1024 * 1024 * 1024,
        })
    }

    fn create_device(
        &self,
        _physical_device: PhysicalDeviceHandle,
    ) -> Result<DeviceHandle, BackendError> {
        Ok(DeviceHandle(self.next()))
    }

    fn destroy_device(&self, _device: DeviceHandle) {}

    fn get_device_queue(
        &self,
        _device: DeviceHandle,
        _queue_family_index: u32,
        _queue_index: u32,
    ) -> Result<QueueHandle, BackendError> {
        Ok(QueueHandle(self.next()))
    }

    fn allocate_memory(
        &self,
        _device: DeviceHandle,
        _allocation_size: u64,
        _memory_type_index: u32,
    ) -> Result<DeviceMemoryHandle, BackendError> {
        Ok(DeviceMemoryHandle(self.next()))
    }

    fn free_memory(&self, _memory: DeviceMemoryHandle) {}

    fn create_buffer(
        &self,
        _device: DeviceHandle,
        _size: u64,
        _usage: BufferUsage,
    ) -> Result<BufferHandle, BackendError> {
        Ok(BufferHandle(self.next()))
    }

    fn destroy_buffer(&self, _buffer: BufferHandle) {}

    fn bind_buffer_memory(
        &self,
        _buffer: BufferHandle,
        _memory: DeviceMemoryHandle,
        _memory_offset: u64,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn create_image(
        &self,
        _device: DeviceHandle,
        _descriptor: ImageDescriptor,
    ) -> Result<ImageHandle, BackendError> {
        Ok(ImageHandle(self.next()))
    }

    fn destroy_image(&self, _image: ImageHandle) {}

    fn bind_image_memory(
        &self,
        _image: ImageHandle,
        _memory: DeviceMemoryHandle,
        _memory_offset: u64,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn create_command_pool(
        &self,
        _device: DeviceHandle,
        _queue_family_index: u32,
    ) -> Result<CommandPoolHandle, BackendError> {
        Ok(CommandPoolHandle(self.next()))
    }

    fn destroy_command_pool(&self, _pool: CommandPoolHandle) {}

    fn allocate_command_buffer(
        &self,
        _pool: CommandPoolHandle,
    ) -> Result<CommandBufferHandle, BackendError> {
        Ok(CommandBufferHandle(self.next()))
    }

    fn free_command_buffer(&self, _pool: CommandPoolHandle, _command_buffer: CommandBufferHandle) {}

    fn begin_command_buffer(&self, _command_buffer: CommandBufferHandle) -> Result<(), BackendError> {
        Ok(())
    }

    fn end_command_buffer(&self, _command_buffer: CommandBufferHandle) -> Result<(), BackendError> {
        Ok(())
    }

    fn queue_submit(
        &self,
        _queue: QueueHandle,
        _command_buffer: CommandBufferHandle,
        _fence: Option<FenceHandle>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: QueueHandle) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_monotonic_and_distinct() {
        let backend = StubBackend::new();
        let instance = backend.create_instance().unwrap();
        let device = backend.create_device(PhysicalDeviceHandle(1)).unwrap();
        assert_ne!(instance.0, device.0);
    }

    #[test]
    fn memory_properties_describe_a_single_unified_heap() {
        let backend = StubBackend::new();
        let props = backend
            .get_physical_device_memory_properties(PhysicalDeviceHandle(1))
            .unwrap();
        assert_eq!(props.memory_heap_count, 1);
        assert_eq!(props.memory_type_count, 1);
    }
}
