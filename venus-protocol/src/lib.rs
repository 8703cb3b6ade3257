/*! Wire format for the Venus-style command protocol.
 *
 * This crate knows nothing about shared memory, threads, or Vulkan
 * objects — it only describes how bytes on the ring are structured:
 * the 8-byte command header, the command id registry, and the
 * fixed-size payload layout for every command the core handles.
 */
#![warn(trivial_casts, trivial_numeric_casts, unused_extern_crates)]

mod codec;
pub mod command;
mod error;
mod object;
pub mod wire;

pub use codec::{LeReader, LeWriter};
pub use command::{CommandHeader, CommandId, MAX_COMMAND_ID, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
pub use error::WireError;
pub use object::ObjectType;
