/*!
# Vulkan backend.

`VulkanBackend` is the one concrete [`crate::GpuBackend`] this crate
ships. It owns a single `VkInstance` and fans out devices/queues under
it; there is no per-object Rust wrapper type the way a full Vulkan
abstraction layer would have; each create call stores just enough
state (in an internal table, not exposed) to answer later calls
(`destroy_device` needs the `ash::Device` that `create_device`
returned, `queue_submit` needs the pool a command buffer came from,
etc.) and returns the caller an opaque handle.

Enumerating a real physical GPU, building a `VkDevice`, and submitting
command buffers through `ash` follows the same builder-pattern style as
any modern `ash`-based backend; see `create_instance`/`queue_submit`
below.
!*/

use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use parking_lot::Mutex;

use crate::{
    BackendError, BufferHandle, BufferUsage, CommandBufferHandle, CommandPoolHandle, DeviceHandle,
    DeviceMemoryHandle, FenceHandle, GpuBackend, ImageDescriptor, ImageHandle, InstanceHandle,
    PhysicalDeviceFeatures, PhysicalDeviceHandle, PhysicalDeviceMemoryProperties,
    PhysicalDeviceProperties, QueueHandle,
};

/// Required on Apple Silicon: MoltenVK only exposes its ICD through
/// the portability-enumeration path, never as a direct Vulkan driver.
/// Grounded in the MoltenVK bring-up sequence this backend replaces.
const KHR_PORTABILITY_ENUMERATION: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_KHR_portability_enumeration\0") };

struct DeviceEntry {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
}

struct CommandPoolEntry {
    pool: vk::CommandPool,
    device: ash::Device,
}

/// State tables keyed by the opaque handle the backend handed out.
///
/// Values are generic Vulkan handles (`u64` under the hood, same as
/// `ash`'s dispatchable/non-dispatchable handle types), so one map
/// per object kind is enough; there's no per-handle metadata beyond
/// "which device/pool owns this" for the few kinds that need it.
#[derive(Default)]
struct State {
    instances: HashMap<u64, ash::Instance>,
    physical_devices: HashMap<u64, (vk::PhysicalDevice, ash::Instance)>,
    devices: HashMap<u64, DeviceEntry>,
    queues: HashMap<u64, (vk::Queue, ash::Device)>,
    memories: HashMap<u64, (vk::DeviceMemory, ash::Device)>,
    buffers: HashMap<u64, (vk::Buffer, ash::Device)>,
    images: HashMap<u64, (vk::Image, ash::Device)>,
    command_pools: HashMap<u64, CommandPoolEntry>,
    command_buffers: HashMap<u64, (vk::CommandBuffer, ash::Device)>,
}

/// `GpuBackend` implementation over real Vulkan-on-Metal, reached
/// through `ash`. Every method takes `&self`; interior state lives
/// behind a single mutex, matched to the volume of calls this core
/// makes (one per guest command, never in a hot per-frame loop the
/// way a renderer's draw calls would be).
pub struct VulkanBackend {
    entry: ash::Entry,
    state: Mutex<State>,
    next_handle: AtomicU64,
}

impl VulkanBackend {
    /// Loads the Vulkan loader. Fails if no `libvulkan`/MoltenVK ICD is
    /// reachable, mirroring `ash::Entry::load`'s own failure mode.
    pub fn new() -> Result<Self, BackendError> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
        Ok(Self {
            entry,
            state: Mutex::new(State::default()),
            next_handle: AtomicU64::new(1),
        })
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

fn map_vk_err(err: vk::Result) -> BackendError {
    match err {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => BackendError::OutOfDeviceMemory,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY => BackendError::OutOfHostMemory,
        vk::Result::ERROR_DEVICE_LOST => BackendError::DeviceLost,
        vk::Result::ERROR_FEATURE_NOT_PRESENT | vk::Result::ERROR_EXTENSION_NOT_PRESENT => {
            BackendError::FeatureNotSupported
        }
        other => BackendError::Other(other.to_string()),
    }
}

impl GpuBackend for VulkanBackend {
    fn create_instance(&self) -> Result<InstanceHandle, BackendError> {
        let app_name = unsafe { CStr::from_bytes_with_nul_unchecked(b"venus-hal\0") };
        let app_info = vk::ApplicationInfo::builder()
            .application_name(app_name)
            .api_version(vk::API_VERSION_1_2);
        let portability_extensions = [KHR_PORTABILITY_ENUMERATION.as_ptr()];
        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR)
            .enabled_extension_names(&portability_extensions);

        let instance = unsafe { self.entry.create_instance(&create_info, None) }
            .map_err(map_vk_err)?;

        let handle = self.next();
        log::debug!("created VkInstance -> guest handle {handle:#x}");
        self.state.lock().instances.insert(handle, instance);
        Ok(InstanceHandle(handle))
    }

    fn destroy_instance(&self, instance: InstanceHandle) {
        if let Some(vk_instance) = self.state.lock().instances.remove(&instance.0) {
            log::debug!("destroying VkInstance for guest handle {:#x}", instance.0);
            unsafe { vk_instance.destroy_instance(None) };
        }
    }

    fn enumerate_physical_devices(
        &self,
        instance: InstanceHandle,
    ) -> Result<Vec<PhysicalDeviceHandle>, BackendError> {
        let state = self.state.lock();
        let vk_instance = state
            .instances
            .get(&instance.0)
            .ok_or(BackendError::Other("unknown instance".into()))?
            .clone();
        drop(state);

        let physical_devices =
            unsafe { vk_instance.enumerate_physical_devices() }.map_err(map_vk_err)?;

        let mut handles = Vec::with_capacity(physical_devices.len());
        let mut state = self.state.lock();
        for pd in physical_devices {
            let handle = self.next();
            state
                .physical_devices
                .insert(handle, (pd, vk_instance.clone()));
            handles.push(PhysicalDeviceHandle(handle));
        }
        Ok(handles)
    }

    fn get_physical_device_features(
        &self,
        physical_device: PhysicalDeviceHandle,
    ) -> Result<PhysicalDeviceFeatures, BackendError> {
        let state = self.state.lock();
        let (pd, instance) = state
            .physical_devices
            .get(&physical_device.0)
            .ok_or(BackendError::Other("unknown physical device".into()))?;
        let features = unsafe { instance.get_physical_device_features(*pd) };
        Ok(PhysicalDeviceFeatures {
            geometry_shader: features.geometry_shader == vk::TRUE,
            tessellation_shader: features.tessellation_shader == vk::TRUE,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            fill_mode_non_solid: features.fill_mode_non_solid == vk::TRUE,
        })
    }

    fn get_physical_device_properties(
        &self,
        physical_device: PhysicalDeviceHandle,
    ) -> Result<PhysicalDeviceProperties, BackendError> {
        let state = self.state.lock();
        let (pd, instance) = state
            .physical_devices
            .get(&physical_device.0)
            .ok_or(BackendError::Other("unknown physical device".into()))?;
        let props = unsafe { instance.get_physical_device_properties(*pd) };
        Ok(PhysicalDeviceProperties {
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            device_type: props.device_type.as_raw() as u32,
            max_image_dimension_2d: props.limits.max_image_dimension2_d,
        })
    }

    fn get_physical_device_memory_properties(
        &self,
        physical_device: PhysicalDeviceHandle,
    ) -> Result<PhysicalDeviceMemoryProperties, BackendError> {
        let state = self.state.lock();
        let (pd, instance) = state
            .physical_devices
            .get(&physical_device.0)
            .ok_or(BackendError::Other("unknown physical device".into()))?;
        let props = unsafe { instance.get_physical_device_memory_properties(*pd) };
        let heap_size = props
            .memory_heaps
            .iter()
            .take(props.memory_heap_count as usize)
            .map(|h| h.size)
            .max()
            .unwrap_or(0);
        let type_flags = props
            .memory_types
            .iter()
            .take(props.memory_type_count as usize)
            .next()
            .map(|t| t.property_flags.as_raw())
            .unwrap_or(0);
        Ok(PhysicalDeviceMemoryProperties {
            memory_type_count: props.memory_type_count,
            memory_type_flags: type_flags,
            memory_heap_count: props.memory_heap_count,
            memory_heap_size: heap_size,
        })
    }

    fn create_device(
        &self,
        physical_device: PhysicalDeviceHandle,
    ) -> Result<DeviceHandle, BackendError> {
        let state = self.state.lock();
        let (pd, instance) = state
            .physical_devices
            .get(&physical_device.0)
            .ok_or(BackendError::Other("unknown physical device".into()))?;
        let pd = *pd;
        let instance = instance.clone();
        drop(state);

        let queue_priorities = [1.0f32];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(0)
            .queue_priorities(&queue_priorities);
        let queue_create_infos = [queue_create_info.build()];
        let create_info = vk::DeviceCreateInfo::builder().queue_create_infos(&queue_create_infos);

        let device =
            unsafe { instance.create_device(pd, &create_info, None) }.map_err(map_vk_err)?;

        let handle = self.next();
        log::debug!("created VkDevice -> guest handle {handle:#x}");
        self.state.lock().devices.insert(
            handle,
            DeviceEntry {
                device,
                physical_device: pd,
            },
        );
        Ok(DeviceHandle(handle))
    }

    fn destroy_device(&self, device: DeviceHandle) {
        if let Some(entry) = self.state.lock().devices.remove(&device.0) {
            log::debug!("destroying VkDevice for guest handle {:#x}", device.0);
            unsafe { entry.device.destroy_device(None) };
        }
    }

    fn get_device_queue(
        &self,
        device: DeviceHandle,
        queue_family_index: u32,
        queue_index: u32,
    ) -> Result<QueueHandle, BackendError> {
        let state = self.state.lock();
        let entry = state
            .devices
            .get(&device.0)
            .ok_or(BackendError::Other("unknown device".into()))?;
        let queue = unsafe { entry.device.get_device_queue(queue_family_index, queue_index) };
        let device = entry.device.clone();
        drop(state);

        let handle = self.next();
        self.state.lock().queues.insert(handle, (queue, device));
        Ok(QueueHandle(handle))
    }

    fn allocate_memory(
        &self,
        device: DeviceHandle,
        allocation_size: u64,
        memory_type_index: u32,
    ) -> Result<DeviceMemoryHandle, BackendError> {
        let state = self.state.lock();
        let entry = state
            .devices
            .get(&device.0)
            .ok_or(BackendError::Other("unknown device".into()))?;
        let device = entry.device.clone();
        drop(state);

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(allocation_size)
            .memory_type_index(memory_type_index);
        let memory = unsafe { device.allocate_memory(&alloc_info, None) }.map_err(map_vk_err)?;

        let handle = self.next();
        self.state.lock().memories.insert(handle, (memory, device));
        Ok(DeviceMemoryHandle(handle))
    }

    fn free_memory(&self, memory: DeviceMemoryHandle) {
        if let Some((memory, device)) = self.state.lock().memories.remove(&memory.0) {
            unsafe { device.free_memory(memory, None) };
        }
    }

    fn create_buffer(
        &self,
        device: DeviceHandle,
        size: u64,
        usage: BufferUsage,
    ) -> Result<BufferHandle, BackendError> {
        let state = self.state.lock();
        let entry = state
            .devices
            .get(&device.0)
            .ok_or(BackendError::Other("unknown device".into()))?;
        let device = entry.device.clone();
        drop(state);

        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(conv_buffer_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&create_info, None) }.map_err(map_vk_err)?;

        let handle = self.next();
        self.state.lock().buffers.insert(handle, (buffer, device));
        Ok(BufferHandle(handle))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if let Some((buffer, device)) = self.state.lock().buffers.remove(&buffer.0) {
            unsafe { device.destroy_buffer(buffer, None) };
        }
    }

    fn bind_buffer_memory(
        &self,
        buffer: BufferHandle,
        memory: DeviceMemoryHandle,
        memory_offset: u64,
    ) -> Result<(), BackendError> {
        let state = self.state.lock();
        let (vk_buffer, device) = state
            .buffers
            .get(&buffer.0)
            .ok_or(BackendError::Other("unknown buffer".into()))?;
        let (vk_memory, _) = state
            .memories
            .get(&memory.0)
            .ok_or(BackendError::Other("unknown memory".into()))?;
        unsafe { device.bind_buffer_memory(*vk_buffer, *vk_memory, memory_offset) }
            .map_err(map_vk_err)
    }

    fn create_image(
        &self,
        device: DeviceHandle,
        descriptor: ImageDescriptor,
    ) -> Result<ImageHandle, BackendError> {
        let state = self.state.lock();
        let entry = state
            .devices
            .get(&device.0)
            .ok_or(BackendError::Other("unknown device".into()))?;
        let device = entry.device.clone();
        drop(state);

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::from_raw(descriptor.format as i32))
            .extent(vk::Extent3D {
                width: descriptor.width,
                height: descriptor.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::from_raw(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { device.create_image(&create_info, None) }.map_err(map_vk_err)?;

        let handle = self.next();
        self.state.lock().images.insert(handle, (image, device));
        Ok(ImageHandle(handle))
    }

    fn destroy_image(&self, image: ImageHandle) {
        if let Some((image, device)) = self.state.lock().images.remove(&image.0) {
            unsafe { device.destroy_image(image, None) };
        }
    }

    fn bind_image_memory(
        &self,
        image: ImageHandle,
        memory: DeviceMemoryHandle,
        memory_offset: u64,
    ) -> Result<(), BackendError> {
        let state = self.state.lock();
        let (vk_image, device) = state
            .images
            .get(&image.0)
            .ok_or(BackendError::Other("unknown image".into()))?;
        let (vk_memory, _) = state
            .memories
            .get(&memory.0)
            .ok_or(BackendError::Other("unknown memory".into()))?;
        unsafe { device.bind_image_memory(*vk_image, *vk_memory, memory_offset) }
            .map_err(map_vk_err)
    }

    fn create_command_pool(
        &self,
        device: DeviceHandle,
        queue_family_index: u32,
    ) -> Result<CommandPoolHandle, BackendError> {
        let state = self.state.lock();
        let entry = state
            .devices
            .get(&device.0)
            .ok_or(BackendError::Other("unknown device".into()))?;
        let device = entry.device.clone();
        drop(state);

        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let pool = unsafe { device.create_command_pool(&create_info, None) }.map_err(map_vk_err)?;

        let handle = self.next();
        self.state
            .lock()
            .command_pools
            .insert(handle, CommandPoolEntry { pool, device });
        Ok(CommandPoolHandle(handle))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        if let Some(entry) = self.state.lock().command_pools.remove(&pool.0) {
            unsafe { entry.device.destroy_command_pool(entry.pool, None) };
        }
    }

    fn allocate_command_buffer(
        &self,
        pool: CommandPoolHandle,
    ) -> Result<CommandBufferHandle, BackendError> {
        let state = self.state.lock();
        let entry = state
            .command_pools
            .get(&pool.0)
            .ok_or(BackendError::Other("unknown command pool".into()))?;
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(entry.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers =
            unsafe { entry.device.allocate_command_buffers(&alloc_info) }.map_err(map_vk_err)?;
        let device = entry.device.clone();
        drop(state);

        let handle = self.next();
        self.state
            .lock()
            .command_buffers
            .insert(handle, (buffers[0], device));
        Ok(CommandBufferHandle(handle))
    }

    fn free_command_buffer(&self, pool: CommandPoolHandle, command_buffer: CommandBufferHandle) {
        let mut state = self.state.lock();
        let Some((vk_buffer, device)) = state.command_buffers.remove(&command_buffer.0) else {
            return;
        };
        let Some(pool_entry) = state.command_pools.get(&pool.0) else {
            return;
        };
        unsafe { device.free_command_buffers(pool_entry.pool, &[vk_buffer]) };
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<(), BackendError> {
        let state = self.state.lock();
        let (vk_buffer, device) = state
            .command_buffers
            .get(&command_buffer.0)
            .ok_or(BackendError::Other("unknown command buffer".into()))?;
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe { device.begin_command_buffer(*vk_buffer, &begin_info) }.map_err(map_vk_err)
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<(), BackendError> {
        let state = self.state.lock();
        let (vk_buffer, device) = state
            .command_buffers
            .get(&command_buffer.0)
            .ok_or(BackendError::Other("unknown command buffer".into()))?;
        unsafe { device.end_command_buffer(*vk_buffer) }.map_err(map_vk_err)
    }

    fn queue_submit(
        &self,
        queue: QueueHandle,
        command_buffer: CommandBufferHandle,
        fence: Option<FenceHandle>,
    ) -> Result<(), BackendError> {
        profiling::scope!("vkQueueSubmit");
        let state = self.state.lock();
        let (vk_queue, queue_device) = state
            .queues
            .get(&queue.0)
            .ok_or(BackendError::Other("unknown queue".into()))?;
        let (vk_buffer, _) = state
            .command_buffers
            .get(&command_buffer.0)
            .ok_or(BackendError::Other("unknown command buffer".into()))?;

        let buffers = [*vk_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);
        let vk_fence = fence.map(|f| vk::Fence::from_raw(f.0)).unwrap_or(vk::Fence::null());
        unsafe { queue_device.queue_submit(*vk_queue, &[submit_info.build()], vk_fence) }
            .map_err(map_vk_err)
    }

    fn queue_wait_idle(&self, queue: QueueHandle) -> Result<(), BackendError> {
        let state = self.state.lock();
        let (vk_queue, device) = state
            .queues
            .get(&queue.0)
            .ok_or(BackendError::Other("unknown queue".into()))?;
        unsafe { device.queue_wait_idle(*vk_queue) }.map_err(map_vk_err)
    }
}

fn conv_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::UNIFORM_BUFFER) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE_BUFFER) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::VERTEX_BUFFER) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX_BUFFER) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    flags
}
