use std::sync::mpsc;

/// One fence-completion notification from the native GPU backend.
///
/// Replaces the two raw callback pointers (`write_fence`,
/// `write_context_fence`) the alternative backend used: a handler
/// forwards this tuple into the ring's reply stream instead of the
/// backend reaching back into guest memory itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FenceEvent {
    pub ctx_id: u64,
    pub ring_idx: u32,
    pub fence_id: u64,
}

/// Typed replacement for the C-style cookie pointer: something a
/// backend can hand completion events to without knowing how they're
/// consumed.
pub trait FenceSubscriber: Send + Sync {
    fn notify(&self, event: FenceEvent);
}

/// Default subscriber backed by an `mpsc` channel; the consuming side
/// (typically the same loop that calls `DecodeAll`) drains it and
/// writes completions back into the guest's reply stream.
pub struct ChannelFenceSubscriber {
    sender: mpsc::Sender<FenceEvent>,
}

impl ChannelFenceSubscriber {
    pub fn new() -> (Self, mpsc::Receiver<FenceEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl FenceSubscriber for ChannelFenceSubscriber {
    fn notify(&self, event: FenceEvent) {
        // A closed receiver means nobody is listening for completions
        // anymore (e.g. the guest is torn down); dropping the event is
        // correct, there's nowhere else for it to go.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_delivers_to_receiver() {
        let (subscriber, receiver) = ChannelFenceSubscriber::new();
        subscriber.notify(FenceEvent {
            ctx_id: 1,
            ring_idx: 0,
            fence_id: 0x9000,
        });
        let event = receiver.recv().unwrap();
        assert_eq!(event.fence_id, 0x9000);
    }

    #[test]
    fn notify_after_drop_does_not_panic() {
        let (subscriber, receiver) = ChannelFenceSubscriber::new();
        drop(receiver);
        subscriber.notify(FenceEvent {
            ctx_id: 1,
            ring_idx: 0,
            fence_id: 1,
        });
    }
}
