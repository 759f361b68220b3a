//! Frame slot bookkeeping.
//!
//! [`FrameCycle`] tracks which of the `MAX_FRAMES_IN_FLIGHT` slots is being
//! recorded, the acquired swap chain image and whether a render pass is
//! open. It holds no Vulkan objects, so the call-order rules of a frame are
//! checked without a device.

use ash::vk;
use orbit_rhi::sync::MAX_FRAMES_IN_FLIGHT;

/// State of the frame currently being recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Recording {
    command_buffer: vk::CommandBuffer,
    image_index: u32,
    suboptimal: bool,
    pass_open: bool,
}

/// What [`FrameCycle::finish`] hands back for submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinishedFrame {
    pub command_buffer: vk::CommandBuffer,
    pub frame_index: usize,
    pub image_index: u32,
    /// Acquisition reported a suboptimal swap chain.
    pub suboptimal: bool,
}

/// Frame slot index and in-progress state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCycle {
    frame_index: usize,
    recording: Option<Recording>,
}

impl FrameCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot whose buffers and sync objects the current frame uses.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.recording.is_some()
    }

    #[inline]
    pub fn is_pass_open(&self) -> bool {
        self.recording.is_some_and(|r| r.pass_open)
    }

    /// Command buffer of the frame in progress.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.current().command_buffer
    }

    /// Swap chain image acquired for the frame in progress.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn image_index(&self) -> u32 {
        self.current().image_index
    }

    /// Marks a frame as started.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already in progress.
    pub fn start(&mut self, command_buffer: vk::CommandBuffer, image_index: u32, suboptimal: bool) {
        assert!(
            self.recording.is_none(),
            "Can't begin a frame while one is already in progress"
        );
        self.recording = Some(Recording {
            command_buffer,
            image_index,
            suboptimal,
            pass_open: false,
        });
    }

    /// Marks a render pass as open on `command_buffer`.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress, `command_buffer` belongs to a
    /// different frame, or a pass is already open.
    pub fn open_pass(&mut self, command_buffer: vk::CommandBuffer) {
        let recording = self.checked_mut(command_buffer);
        assert!(!recording.pass_open, "A render pass is already open");
        recording.pass_open = true;
    }

    /// Marks the open render pass as closed.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress, `command_buffer` belongs to a
    /// different frame, or no pass is open.
    pub fn close_pass(&mut self, command_buffer: vk::CommandBuffer) {
        let recording = self.checked_mut(command_buffer);
        assert!(recording.pass_open, "No render pass is open");
        recording.pass_open = false;
    }

    /// Ends the frame in progress and returns what must be submitted.
    ///
    /// The slot index does not move until [`advance`](Self::advance).
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress or a render pass is still open.
    pub fn finish(&mut self) -> FinishedFrame {
        let recording = self
            .recording
            .take()
            .unwrap_or_else(|| panic!("Can't end a frame that was never begun"));
        assert!(
            !recording.pass_open,
            "Can't end a frame while a render pass is open"
        );
        FinishedFrame {
            command_buffer: recording.command_buffer,
            frame_index: self.frame_index,
            image_index: recording.image_index,
            suboptimal: recording.suboptimal,
        }
    }

    /// Moves to the next slot.
    pub fn advance(&mut self) {
        self.frame_index = (self.frame_index + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    fn current(&self) -> &Recording {
        self.recording
            .as_ref()
            .unwrap_or_else(|| panic!("No frame in progress"))
    }

    fn checked_mut(&mut self, command_buffer: vk::CommandBuffer) -> &mut Recording {
        let recording = self
            .recording
            .as_mut()
            .unwrap_or_else(|| panic!("No frame in progress"));
        assert_eq!(
            recording.command_buffer, command_buffer,
            "Command buffer belongs to a different frame"
        );
        recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn cmd(raw: u64) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(raw)
    }

    #[test]
    fn test_frame_index_has_period_of_frames_in_flight() {
        let mut cycle = FrameCycle::new();
        let mut seen = Vec::new();
        for i in 0..2 * MAX_FRAMES_IN_FLIGHT {
            seen.push(cycle.frame_index());
            cycle.start(cmd(1 + i as u64), 0, false);
            cycle.finish();
            cycle.advance();
        }
        let (first, second) = seen.split_at(MAX_FRAMES_IN_FLIGHT);
        assert_eq!(first, second);
        assert_eq!(first, (0..MAX_FRAMES_IN_FLIGHT).collect::<Vec<_>>());
    }

    #[test]
    fn test_finish_reports_acquired_image() {
        let mut cycle = FrameCycle::new();
        cycle.start(cmd(7), 2, true);
        assert!(cycle.is_frame_in_progress());
        assert_eq!(cycle.image_index(), 2);

        let finished = cycle.finish();
        assert_eq!(finished.command_buffer, cmd(7));
        assert_eq!(finished.image_index, 2);
        assert_eq!(finished.frame_index, 0);
        assert!(finished.suboptimal);
        assert!(!cycle.is_frame_in_progress());
    }

    #[test]
    fn test_pass_open_and_close() {
        let mut cycle = FrameCycle::new();
        cycle.start(cmd(1), 0, false);
        cycle.open_pass(cmd(1));
        assert!(cycle.is_pass_open());
        cycle.close_pass(cmd(1));
        assert!(!cycle.is_pass_open());
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn test_begin_twice_panics() {
        let mut cycle = FrameCycle::new();
        cycle.start(cmd(1), 0, false);
        cycle.start(cmd(2), 1, false);
    }

    #[test]
    #[should_panic(expected = "never begun")]
    fn test_finish_without_begin_panics() {
        FrameCycle::new().finish();
    }

    #[test]
    #[should_panic(expected = "render pass is open")]
    fn test_finish_with_open_pass_panics() {
        let mut cycle = FrameCycle::new();
        cycle.start(cmd(1), 0, false);
        cycle.open_pass(cmd(1));
        cycle.finish();
    }

    #[test]
    #[should_panic(expected = "different frame")]
    fn test_pass_on_foreign_command_buffer_panics() {
        let mut cycle = FrameCycle::new();
        cycle.start(cmd(1), 0, false);
        cycle.open_pass(cmd(2));
    }
}
