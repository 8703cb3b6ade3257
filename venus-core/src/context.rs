use std::sync::Arc;

use venus_hal::GpuBackend;
use venus_protocol::ObjectType;

use crate::fence_channel::FenceSubscriber;
use crate::object_table::ObjectTable;

/// Monotonically-incremented activity counters, exposed read-only so
/// an operator can detect regressions without a full metrics stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct Counters {
    pub commands_handled: u64,
    pub objects_created: u64,
    pub objects_destroyed: u64,
    pub commands_unknown: u64,
    pub commands_failed: u64,
}

/// Lets the decoder update counters without knowing the concrete
/// context type beyond this one trait bound.
pub trait Counted {
    fn counters_mut(&mut self) -> &mut Counters;
}

/// Process-scoped state for one guest's ring: the native GPU backend
/// handle, the object table, and the activity counters. Created once
/// per guest, matching the spec's lifecycle ("the handler context is
/// created once per guest").
pub struct HandlerContext {
    pub backend: Arc<dyn GpuBackend>,
    pub objects: ObjectTable,
    pub counters: Counters,
    /// Identifies this guest's context and ring in every [`FenceEvent`]
    /// this context forwards. Only meaningful once a fence subscriber
    /// is wired in via [`HandlerContext::with_fence_subscriber`].
    ///
    /// [`FenceEvent`]: crate::fence_channel::FenceEvent
    pub ctx_id: u64,
    pub ring_idx: u32,
    pub fence_subscriber: Option<Arc<dyn FenceSubscriber>>,
}

impl HandlerContext {
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            objects: ObjectTable::new(),
            counters: Counters::default(),
            ctx_id: 0,
            ring_idx: 0,
            fence_subscriber: None,
        }
    }

    /// Wires a fence subscriber in, stamping `ctx_id`/`ring_idx` onto
    /// every [`FenceEvent`](crate::fence_channel::FenceEvent) it goes
    /// on to forward (e.g. from `vkQueueSubmit`'s handler).
    pub fn with_fence_subscriber(
        mut self,
        ctx_id: u64,
        ring_idx: u32,
        subscriber: Arc<dyn FenceSubscriber>,
    ) -> Self {
        self.ctx_id = ctx_id;
        self.ring_idx = ring_idx;
        self.fence_subscriber = Some(subscriber);
        self
    }

    /// Walks the object table, releasing every still-tracked resident
    /// via the backend. After this call `objects_destroyed +
    /// still_tracked == objects_created` holds trivially since
    /// `still_tracked` becomes 0.
    pub fn teardown(&mut self) {
        let residents: Vec<_> = self.objects.iter().collect();
        for (guest_id, host_handle, object_type) in residents {
            destroy_by_type(&*self.backend, host_handle, object_type);
            self.objects.remove(guest_id);
            self.counters.objects_destroyed += 1;
        }
    }
}

fn destroy_by_type(backend: &dyn GpuBackend, host_handle: u64, object_type: ObjectType) {
    use venus_hal::{
        BufferHandle, CommandPoolHandle, DeviceHandle, DeviceMemoryHandle, ImageHandle,
        InstanceHandle,
    };
    match object_type {
        ObjectType::Instance => backend.destroy_instance(InstanceHandle(host_handle)),
        ObjectType::Device => backend.destroy_device(DeviceHandle(host_handle)),
        ObjectType::DeviceMemory => backend.free_memory(DeviceMemoryHandle(host_handle)),
        ObjectType::Buffer => backend.destroy_buffer(BufferHandle(host_handle)),
        ObjectType::Image => backend.destroy_image(ImageHandle(host_handle)),
        ObjectType::CommandPool => backend.destroy_command_pool(CommandPoolHandle(host_handle)),
        // PhysicalDevice, Queue, Semaphore, Fence, and CommandBuffer
        // have no standalone destructor in the covered command
        // subset: physical devices and queues are owned by the
        // instance/device that enumerated them, command buffers are
        // freed with their pool, and fences/semaphores are never
        // created by a handler in this protocol's covered subset.
        ObjectType::PhysicalDevice
        | ObjectType::Queue
        | ObjectType::Semaphore
        | ObjectType::Fence
        | ObjectType::CommandBuffer => {}
    }
}

impl Counted for HandlerContext {
    fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venus_hal::stub::StubBackend;

    #[test]
    fn teardown_releases_every_resident() {
        let backend = Arc::new(StubBackend::new());
        let mut ctx = HandlerContext::new(backend);
        ctx.objects.add(0x1000, 1, ObjectType::Instance).unwrap();
        ctx.objects.add(0x2000, 2, ObjectType::Buffer).unwrap();
        ctx.counters.objects_created = 2;

        ctx.teardown();
        assert_eq!(ctx.objects.len(), 0);
        assert_eq!(ctx.counters.objects_destroyed, 2);
    }
}
