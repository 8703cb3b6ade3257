/// Opaque handles returned by a [`crate::GpuBackend`].
///
/// These are deliberately plain `u64` newtypes rather than raw
/// pointers: the core never dereferences them, only threads them back
/// through the same backend that minted them, so there is nothing to
/// gain from pointer punning and a real risk of a guest-controlled
/// value being mistaken for one.
macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub fn as_raw(&self) -> u64 {
                self.0
            }
        }
    };
}

opaque_handle!(
    /// A `VkInstance` equivalent.
    InstanceHandle
);
opaque_handle!(
    /// A `VkPhysicalDevice` equivalent.
    PhysicalDeviceHandle
);
opaque_handle!(
    /// A `VkDevice` equivalent.
    DeviceHandle
);
opaque_handle!(
    /// A `VkQueue` equivalent.
    QueueHandle
);
opaque_handle!(
    /// A `VkDeviceMemory` equivalent.
    DeviceMemoryHandle
);
opaque_handle!(
    /// A `VkBuffer` equivalent.
    BufferHandle
);
opaque_handle!(
    /// A `VkImage` equivalent.
    ImageHandle
);
opaque_handle!(
    /// A `VkCommandPool` equivalent.
    CommandPoolHandle
);
opaque_handle!(
    /// A `VkCommandBuffer` equivalent.
    CommandBufferHandle
);
opaque_handle!(
    /// A `VkFence` equivalent.
    FenceHandle
);
