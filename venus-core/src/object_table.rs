use venus_protocol::ObjectType;

use crate::command_buffer_state::CommandBufferState;
use crate::error::CoreError;

const INITIAL_CAPACITY: usize = 1024;

/// A guard against an abusive or buggy guest growing the table without
/// bound; real hypervisor deployments have nowhere near this many live
/// Vulkan objects per guest.
const MAX_CAPACITY: usize = 1 << 20;

#[derive(Clone, Copy, Debug)]
struct ObjectSlot {
    guest_id: u64,
    host_handle: u64,
    object_type: ObjectType,
    command_buffer_state: Option<CommandBufferState>,
}

/// Bidirectional map between guest-chosen 64-bit ids and host Vulkan
/// handles, with a type tag per slot.
///
/// Lookups are a linear scan, not a hash map: the protocol's Non-goals
/// keep per-guest object counts small enough (low thousands at most)
/// that a scan is cheaper than hashing, and it keeps `Add`'s
/// first-free-slot policy trivial to reason about.
pub struct ObjectTable {
    slots: Vec<Option<ObjectSlot>>,
    count: usize,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; INITIAL_CAPACITY],
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Inserts a new guest id/host handle pair into the first free
    /// slot, growing the table by doubling if none is free.
    pub fn add(
        &mut self,
        guest_id: u64,
        host_handle: u64,
        object_type: ObjectType,
    ) -> Result<(), CoreError> {
        if host_handle == 0 {
            return Err(CoreError::InvalidHandle {
                guest_id,
                expected: object_type,
            });
        }

        if self.find_index(guest_id).is_some() {
            // Re-adding an id already in use is a guest bug; treat it
            // the same as a failed allocation rather than silently
            // clobbering an existing translation.
            return Err(CoreError::TableFull {
                capacity: self.capacity(),
            });
        }

        let index = match self.slots.iter().position(|s| s.is_none()) {
            Some(index) => index,
            None => {
                let new_capacity = self.slots.len() * 2;
                if new_capacity > MAX_CAPACITY {
                    return Err(CoreError::TableFull {
                        capacity: self.capacity(),
                    });
                }
                let old_len = self.slots.len();
                self.slots.resize(new_capacity, None);
                old_len
            }
        };

        self.slots[index] = Some(ObjectSlot {
            guest_id,
            host_handle,
            object_type,
            command_buffer_state: if object_type == ObjectType::CommandBuffer {
                Some(CommandBufferState::Initial)
            } else {
                None
            },
        });
        self.count += 1;
        Ok(())
    }

    fn find_index(&self, guest_id: u64) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(slot) if slot.guest_id == guest_id))
    }

    /// Returns the host handle for `guest_id` regardless of type.
    pub fn get(&self, guest_id: u64) -> Option<u64> {
        self.find_index(guest_id)
            .and_then(|i| self.slots[i].as_ref())
            .map(|slot| slot.host_handle)
    }

    /// Returns the host handle for `guest_id`, requiring it to carry
    /// `expected_type`. Handlers must use this form whenever the
    /// protocol specifies an object type for the id they're resolving.
    pub fn get_typed(&self, guest_id: u64, expected_type: ObjectType) -> Option<u64> {
        self.find_index(guest_id)
            .and_then(|i| self.slots[i].as_ref())
            .filter(|slot| slot.object_type == expected_type)
            .map(|slot| slot.host_handle)
    }

    pub fn command_buffer_state(&self, guest_id: u64) -> Option<CommandBufferState> {
        self.find_index(guest_id)
            .and_then(|i| self.slots[i].as_ref())
            .and_then(|slot| slot.command_buffer_state)
    }

    pub fn set_command_buffer_state(&mut self, guest_id: u64, state: CommandBufferState) {
        if let Some(i) = self.find_index(guest_id) {
            if let Some(slot) = self.slots[i].as_mut() {
                slot.command_buffer_state = Some(state);
            }
        }
    }

    /// Frees the slot for `guest_id`, if any. Never touches the host
    /// resource — only the handler that owns the Vulkan type may call
    /// the backend destructor, before or after this call.
    pub fn remove(&mut self, guest_id: u64) {
        if let Some(i) = self.find_index(guest_id) {
            if self.slots[i].take().is_some() {
                self.count -= 1;
            }
        }
    }

    /// Iterates every still-tracked `(guest_id, host_handle, type)`
    /// triple, for teardown to walk and release via the backend.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64, ObjectType)> + '_ {
        self.slots.iter().filter_map(|s| {
            s.as_ref()
                .map(|slot| (slot.guest_id, slot.host_handle, slot.object_type))
        })
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_is_idempotent_on_count() {
        let mut table = ObjectTable::new();
        table.add(0x1000, 7, ObjectType::Instance).unwrap();
        assert_eq!(table.len(), 1);
        table.remove(0x1000);
        assert_eq!(table.len(), 0);
        assert!(table.get(0x1000).is_none());
    }

    #[test]
    fn get_typed_rejects_wrong_type() {
        let mut table = ObjectTable::new();
        table.add(0x2000, 9, ObjectType::Buffer).unwrap();
        assert!(table.get_typed(0x2000, ObjectType::Image).is_none());
        assert_eq!(table.get_typed(0x2000, ObjectType::Buffer), Some(9));
        assert_eq!(table.get(0x2000), Some(9));
    }

    #[test]
    fn null_handle_is_rejected() {
        let mut table = ObjectTable::new();
        let err = table.add(0x3000, 0, ObjectType::Fence).unwrap_err();
        assert!(matches!(err, CoreError::InvalidHandle { .. }));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut table = ObjectTable::new();
        for i in 0..INITIAL_CAPACITY + 1 {
            table.add(i as u64 + 1, i as u64 + 1, ObjectType::Buffer).unwrap();
        }
        assert_eq!(table.len(), INITIAL_CAPACITY + 1);
        assert!(table.capacity() > INITIAL_CAPACITY);
    }

    #[test]
    fn missing_id_remove_is_a_no_op() {
        let mut table = ObjectTable::new();
        table.remove(0xdead);
        assert_eq!(table.len(), 0);
    }
}
