/// Recording state machine for a guest `CommandBuffer` object.
///
/// Tracked in the object table entry rather than delegated to the
/// backend, since neither the stub nor the Vulkan backend exposes a
/// way to query a `VkCommandBuffer`'s recording state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
}

impl CommandBufferState {
    pub fn name(&self) -> &'static str {
        match self {
            CommandBufferState::Initial => "Initial",
            CommandBufferState::Recording => "Recording",
            CommandBufferState::Executable => "Executable",
            CommandBufferState::Pending => "Pending",
        }
    }

    /// `BeginCommandBuffer` is legal from `Initial` or `Executable`
    /// (re-recording), landing in `Recording`.
    pub fn begin(self) -> Option<Self> {
        matches!(self, CommandBufferState::Initial | CommandBufferState::Executable)
            .then_some(CommandBufferState::Recording)
    }

    /// `EndCommandBuffer` is legal only from `Recording`.
    pub fn end(self) -> Option<Self> {
        matches!(self, CommandBufferState::Recording).then_some(CommandBufferState::Executable)
    }

    /// `QueueSubmit` is legal only from `Executable`; completion takes
    /// it back to `Executable` (modeled synchronously by the stub and
    /// Vulkan backends, since `queue_submit` blocks via the fence or
    /// `QueueWaitIdle` follows immediately in every covered scenario).
    pub fn submit(self) -> Option<Self> {
        matches!(self, CommandBufferState::Executable).then_some(CommandBufferState::Pending)
    }

    pub fn complete(self) -> Self {
        CommandBufferState::Executable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_end_submit_cycle() {
        let s = CommandBufferState::Initial;
        let s = s.begin().unwrap();
        assert_eq!(s, CommandBufferState::Recording);
        let s = s.end().unwrap();
        assert_eq!(s, CommandBufferState::Executable);
        let s = s.submit().unwrap();
        assert_eq!(s, CommandBufferState::Pending);
        assert_eq!(s.complete(), CommandBufferState::Executable);
    }

    #[test]
    fn end_outside_recording_is_rejected() {
        assert!(CommandBufferState::Initial.end().is_none());
        assert!(CommandBufferState::Executable.end().is_none());
        assert!(CommandBufferState::Pending.end().is_none());
    }

    #[test]
    fn begin_outside_initial_or_executable_is_rejected() {
        assert!(CommandBufferState::Recording.begin().is_none());
        assert!(CommandBufferState::Pending.begin().is_none());
    }
}
