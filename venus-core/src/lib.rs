/*! Decodes a Venus-protocol Vulkan command stream from a guest VM over
 *  a shared-memory ring and dispatches it to handlers that translate
 *  guest object handles to host Vulkan objects via a native GPU
 *  backend ([`venus_hal::GpuBackend`]).
 *
 *  The pieces, bottom to top:
 *  - [`ring`]: the lock-free shared-memory transport (C1).
 *  - [`decoder`]: turns ring bytes into typed handler calls (C2).
 *  - [`object_table`]: the guest-id ↔ host-handle translation table.
 *  - [`command_buffer_state`]: the `VkCommandBuffer` recording state
 *    machine.
 *  - [`context`]: per-guest state tying a backend, an object table,
 *    and activity counters together.
 *  - [`handlers`]: one function per covered command id.
 */

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications,
    clippy::pattern_type_mismatch,
)]

pub mod command_buffer_state;
pub mod context;
pub mod decoder;
pub mod error;
pub mod fence_channel;
pub mod handlers;
pub mod object_table;
pub mod ring;

pub use command_buffer_state::CommandBufferState;
pub use context::{Counted, Counters, HandlerContext};
pub use decoder::{decode_all, decode_one, DecodeOutcome, DispatchContext};
pub use error::CoreError;
pub use fence_channel::{ChannelFenceSubscriber, FenceEvent, FenceSubscriber};
pub use handlers::register_default_handlers;
pub use object_table::ObjectTable;
pub use ring::{Ring, RingMode, RingStats, SharedMemoryLayout};
