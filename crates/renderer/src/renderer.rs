//! Frame lifecycle.
//!
//! ```text
//! begin_frame ─► [begin_render_pass ─► draws ─► end_render_pass]* ─► end_frame
//! ```
//!
//! `begin_frame` returns `None` when no image could be acquired (out-of-date
//! swap chain, minimized window). The caller skips the frame and tries again
//! next iteration.

use ash::vk;
use orbit_rhi::RhiResult;
use orbit_rhi::swapchain::AcquireOutcome;
use tracing::{debug, error, info};

use crate::backend::{FrameBackend, RenderPassTarget};
use crate::frame::FrameCycle;

/// Drives acquisition, recording, submission and swap chain rebuilds.
pub struct Renderer<B: FrameBackend> {
    backend: B,
    cycle: FrameCycle,
    window_extent: vk::Extent2D,
    resized: bool,
    rebuild_pending: bool,
}

impl<B: FrameBackend> Renderer<B> {
    /// Wraps `backend`, whose swap chain was built for `window_extent`.
    pub fn new(backend: B, window_extent: vk::Extent2D) -> Self {
        Self {
            backend,
            cycle: FrameCycle::new(),
            window_extent,
            resized: false,
            rebuild_pending: false,
        }
    }

    /// Starts a frame and returns its command buffer, or `None` if this
    /// frame has to be skipped.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already in progress.
    ///
    /// # Errors
    ///
    /// Returns an error if acquisition, a rebuild or command buffer setup
    /// fails. A changed swap chain format is reported as
    /// [`RhiError::SwapchainFormatChanged`](orbit_rhi::RhiError::SwapchainFormatChanged).
    pub fn begin_frame(&mut self) -> RhiResult<Option<vk::CommandBuffer>> {
        assert!(
            !self.cycle.is_frame_in_progress(),
            "Can't call begin_frame while already in progress"
        );

        if self.rebuild_pending && !self.rebuild()? {
            return Ok(None);
        }

        let frame_index = self.cycle.frame_index();
        let (image_index, suboptimal) = match self.backend.acquire(frame_index)? {
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Swap chain out of date at acquire");
                self.rebuild()?;
                return Ok(None);
            }
        };

        let command_buffer = self.backend.begin_commands(frame_index)?;
        self.cycle.start(command_buffer, image_index, suboptimal);
        Ok(Some(command_buffer))
    }

    /// Ends recording, submits and presents, then moves to the next slot.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress or a render pass is still open.
    ///
    /// # Errors
    ///
    /// Returns an error if recording, submission, presentation or a rebuild
    /// fails.
    pub fn end_frame(&mut self) -> RhiResult<()> {
        let frame = self.cycle.finish();
        self.backend.end_commands(frame.command_buffer)?;

        let outcome = self
            .backend
            .submit(frame.command_buffer, frame.frame_index, frame.image_index)?;

        if outcome.needs_rebuild() || frame.suboptimal || self.resized {
            debug!(
                "Rebuilding swap chain after present ({:?}, resized: {})",
                outcome, self.resized
            );
            self.rebuild()?;
        }

        self.cycle.advance();
        Ok(())
    }

    /// Begins an arbitrary render pass, such as the shadow pass.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress, `command_buffer` is not the
    /// current frame's, or a pass is already open.
    pub fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer, target: &RenderPassTarget) {
        self.cycle.open_pass(command_buffer);
        self.backend.begin_render_pass(command_buffer, target);
    }

    /// # Panics
    ///
    /// Panics if no frame is in progress, `command_buffer` is not the
    /// current frame's, or no pass is open.
    pub fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        self.cycle.close_pass(command_buffer);
        self.backend.end_render_pass(command_buffer);
    }

    /// Begins the main pass into the acquired swap chain image.
    ///
    /// # Panics
    ///
    /// See [`begin_render_pass`](Self::begin_render_pass).
    pub fn begin_swap_chain_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        let target = self.backend.swap_chain_target(self.cycle.image_index());
        self.begin_render_pass(command_buffer, &target);
    }

    /// # Panics
    ///
    /// See [`end_render_pass`](Self::end_render_pass).
    pub fn end_swap_chain_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        self.end_render_pass(command_buffer);
    }

    /// Records a new window size; the swap chain follows after the next
    /// present.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_extent = vk::Extent2D { width, height };
        self.resized = true;
    }

    #[inline]
    pub fn frame_index(&self) -> usize {
        self.cycle.frame_index()
    }

    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.cycle.is_frame_in_progress()
    }

    /// Width over height of the swap chain.
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.backend.swap_chain_extent();
        extent.width as f32 / extent.height as f32
    }

    pub fn swap_chain_render_pass(&self) -> vk::RenderPass {
        self.backend.swap_chain_render_pass()
    }

    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        self.cycle.command_buffer()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Rebuilds for the current window extent. A zero extent (minimized
    /// window) defers the rebuild to a later `begin_frame`; returns whether
    /// the rebuild happened.
    fn rebuild(&mut self) -> RhiResult<bool> {
        let extent = self.window_extent;
        if extent.width == 0 || extent.height == 0 {
            if !self.rebuild_pending {
                debug!("Window has no area, deferring swap chain rebuild");
            }
            self.rebuild_pending = true;
            return Ok(false);
        }

        self.backend.rebuild(extent)?;
        self.rebuild_pending = false;
        self.resized = false;
        info!("Swap chain rebuilt for {}x{}", extent.width, extent.height);
        Ok(true)
    }
}

impl<B: FrameBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use approx::assert_abs_diff_eq;

    use ash::vk::Handle;
    use orbit_rhi::RhiError;
    use orbit_rhi::swapchain::PresentOutcome;
    use orbit_rhi::sync::MAX_FRAMES_IN_FLIGHT;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Acquire(usize),
        BeginCommands(usize),
        EndCommands,
        Submit { frame_index: usize, image_index: u32 },
        Rebuild(u32, u32),
        BeginPass,
        EndPass,
    }

    /// Backend that replays scripted acquire and present results.
    #[derive(Default)]
    struct ScriptedBackend {
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        calls: Vec<Call>,
        formats_change: bool,
        extent: Option<vk::Extent2D>,
    }

    impl ScriptedBackend {
        fn with_acquires(acquires: impl IntoIterator<Item = AcquireOutcome>) -> Self {
            Self {
                acquires: acquires.into_iter().collect(),
                ..Default::default()
            }
        }

        fn count(&self, wanted: fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|call| wanted(call)).count()
        }
    }

    impl FrameBackend for ScriptedBackend {
        fn acquire(&mut self, frame_index: usize) -> RhiResult<AcquireOutcome> {
            self.calls.push(Call::Acquire(frame_index));
            Ok(self.acquires.pop_front().unwrap_or(ready(0)))
        }

        fn begin_commands(&mut self, frame_index: usize) -> RhiResult<vk::CommandBuffer> {
            self.calls.push(Call::BeginCommands(frame_index));
            Ok(vk::CommandBuffer::from_raw(100 + frame_index as u64))
        }

        fn end_commands(&mut self, _command_buffer: vk::CommandBuffer) -> RhiResult<()> {
            self.calls.push(Call::EndCommands);
            Ok(())
        }

        fn submit(
            &mut self,
            _command_buffer: vk::CommandBuffer,
            frame_index: usize,
            image_index: u32,
        ) -> RhiResult<PresentOutcome> {
            self.calls.push(Call::Submit {
                frame_index,
                image_index,
            });
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn rebuild(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
            self.calls.push(Call::Rebuild(extent.width, extent.height));
            if self.formats_change {
                return Err(RhiError::SwapchainFormatChanged);
            }
            self.extent = Some(extent);
            Ok(())
        }

        fn begin_render_pass(&mut self, _command_buffer: vk::CommandBuffer, _target: &RenderPassTarget) {
            self.calls.push(Call::BeginPass);
        }

        fn end_render_pass(&mut self, _command_buffer: vk::CommandBuffer) {
            self.calls.push(Call::EndPass);
        }

        fn swap_chain_target(&self, _image_index: u32) -> RenderPassTarget {
            RenderPassTarget::color_depth(
                vk::RenderPass::null(),
                vk::Framebuffer::null(),
                self.swap_chain_extent(),
                [0.0; 4],
            )
        }

        fn swap_chain_render_pass(&self) -> vk::RenderPass {
            vk::RenderPass::null()
        }

        fn swap_chain_extent(&self) -> vk::Extent2D {
            self.extent.unwrap_or(vk::Extent2D {
                width: 800,
                height: 600,
            })
        }

        fn wait_idle(&self) -> RhiResult<()> {
            Ok(())
        }
    }

    fn ready(image_index: u32) -> AcquireOutcome {
        AcquireOutcome::Ready {
            image_index,
            suboptimal: false,
        }
    }

    fn renderer(backend: ScriptedBackend) -> Renderer<ScriptedBackend> {
        Renderer::new(
            backend,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        )
    }

    /// Runs one iteration of the application loop; returns whether a frame
    /// was drawn.
    fn run_frame(renderer: &mut Renderer<ScriptedBackend>) -> bool {
        match renderer.begin_frame().expect("begin_frame") {
            Some(cmd) => {
                renderer.begin_swap_chain_render_pass(cmd);
                renderer.end_swap_chain_render_pass(cmd);
                renderer.end_frame().expect("end_frame");
                true
            }
            None => false,
        }
    }

    fn is_rebuild(call: &Call) -> bool {
        matches!(call, Call::Rebuild(..))
    }

    fn is_begin_pass(call: &Call) -> bool {
        matches!(call, Call::BeginPass)
    }

    #[test]
    fn test_out_of_date_acquire_skips_frame_and_rebuilds_once() {
        let mut renderer = renderer(ScriptedBackend::with_acquires([
            ready(0),
            AcquireOutcome::OutOfDate,
            ready(1),
        ]));

        assert!(run_frame(&mut renderer));
        assert!(!run_frame(&mut renderer));
        assert!(!renderer.is_frame_in_progress());
        assert!(run_frame(&mut renderer));

        let backend = renderer.backend();
        assert_eq!(backend.count(is_rebuild), 1);
        assert_eq!(backend.count(is_begin_pass), 2);

        // The skipped frame recorded nothing between its acquire and the rebuild.
        let skipped = backend
            .calls
            .iter()
            .position(|call| *call == Call::Rebuild(800, 600))
            .expect("rebuild recorded");
        assert_eq!(backend.calls[skipped - 1], Call::Acquire(1));
    }

    #[test]
    fn test_skipped_frame_keeps_slot() {
        let mut renderer = renderer(ScriptedBackend::with_acquires([
            AcquireOutcome::OutOfDate,
            ready(0),
        ]));
        assert!(!run_frame(&mut renderer));
        assert_eq!(renderer.frame_index(), 0);
        assert!(run_frame(&mut renderer));
        assert_eq!(renderer.frame_index(), 1 % MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn test_frame_index_cycles_through_slots() {
        let mut renderer = renderer(ScriptedBackend::default());
        let mut indices = Vec::new();
        for _ in 0..3 * MAX_FRAMES_IN_FLIGHT {
            indices.push(renderer.frame_index());
            assert!(run_frame(&mut renderer));
        }
        for (i, index) in indices.iter().enumerate() {
            assert_eq!(*index, i % MAX_FRAMES_IN_FLIGHT);
        }

        let submitted: Vec<usize> = renderer
            .backend()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Submit { frame_index, .. } => Some(*frame_index),
                _ => None,
            })
            .collect();
        assert_eq!(submitted, indices);
    }

    #[test]
    fn test_present_results_trigger_rebuild() {
        let mut backend = ScriptedBackend::default();
        backend.presents = [
            PresentOutcome::Suboptimal,
            PresentOutcome::Presented,
            PresentOutcome::OutOfDate,
        ]
        .into();
        let mut renderer = renderer(backend);
        for _ in 0..3 {
            assert!(run_frame(&mut renderer));
        }
        assert_eq!(renderer.backend().count(is_rebuild), 2);
    }

    #[test]
    fn test_suboptimal_acquire_rebuilds_after_present() {
        let mut renderer = renderer(ScriptedBackend::with_acquires([AcquireOutcome::Ready {
            image_index: 0,
            suboptimal: true,
        }]));
        assert!(run_frame(&mut renderer));

        let calls = &renderer.backend().calls;
        let submit = calls
            .iter()
            .position(|call| matches!(call, Call::Submit { .. }))
            .expect("submitted");
        assert_eq!(calls[submit + 1], Call::Rebuild(800, 600));
    }

    #[test]
    fn test_resize_rebuilds_with_new_extent() {
        let mut renderer = renderer(ScriptedBackend::default());
        renderer.resize(1024, 768);
        assert!(run_frame(&mut renderer));
        assert!(run_frame(&mut renderer));

        let rebuilds: Vec<_> = renderer
            .backend()
            .calls
            .iter()
            .filter(|call| is_rebuild(call))
            .cloned()
            .collect();
        assert_eq!(rebuilds, vec![Call::Rebuild(1024, 768)]);
    }

    #[test]
    fn test_aspect_ratio_follows_rebuild_in_begin_frame() {
        let mut renderer = renderer(ScriptedBackend::with_acquires([AcquireOutcome::OutOfDate]));
        renderer.resize(0, 0);
        assert!(!run_frame(&mut renderer));
        assert_abs_diff_eq!(renderer.aspect_ratio(), 800.0 / 600.0);

        // Restored: the deferred rebuild runs at the start of this frame.
        renderer.resize(1200, 400);
        let cmd = renderer.begin_frame().expect("begin_frame").expect("frame");
        assert_eq!(renderer.backend().calls[1], Call::Rebuild(1200, 400));
        assert_abs_diff_eq!(renderer.aspect_ratio(), 3.0);

        renderer.begin_swap_chain_render_pass(cmd);
        renderer.end_swap_chain_render_pass(cmd);
        renderer.end_frame().expect("end_frame");
    }

    #[test]
    fn test_minimized_window_defers_rebuild() {
        let mut renderer = renderer(ScriptedBackend::with_acquires([AcquireOutcome::OutOfDate]));
        renderer.resize(0, 0);

        assert!(!run_frame(&mut renderer));
        assert!(!run_frame(&mut renderer));
        assert_eq!(renderer.backend().count(is_rebuild), 0);
        // Only the first attempt reached acquisition.
        let acquires = renderer
            .backend()
            .count(|call| matches!(call, Call::Acquire(_)));
        assert_eq!(acquires, 1);

        renderer.resize(640, 480);
        assert!(run_frame(&mut renderer));
        let calls = &renderer.backend().calls;
        assert_eq!(renderer.backend().count(is_rebuild), 1);
        assert_eq!(calls[1], Call::Rebuild(640, 480));
        assert_eq!(calls[2], Call::Acquire(0));
    }

    #[test]
    fn test_format_change_is_fatal() {
        let mut backend = ScriptedBackend::with_acquires([AcquireOutcome::OutOfDate]);
        backend.formats_change = true;
        let mut renderer = renderer(backend);
        assert!(matches!(
            renderer.begin_frame(),
            Err(RhiError::SwapchainFormatChanged)
        ));
    }

    #[test]
    fn test_accessors_during_frame() {
        let mut renderer = renderer(ScriptedBackend::default());
        assert_eq!(renderer.aspect_ratio(), 800.0 / 600.0);

        let cmd = renderer.begin_frame().expect("begin").expect("frame");
        assert!(renderer.is_frame_in_progress());
        assert_eq!(renderer.current_command_buffer(), cmd);
        renderer.end_frame().expect("end");
        assert!(!renderer.is_frame_in_progress());
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn test_begin_frame_twice_panics() {
        let mut renderer = renderer(ScriptedBackend::default());
        let _ = renderer.begin_frame();
        let _ = renderer.begin_frame();
    }

    #[test]
    #[should_panic(expected = "render pass is open")]
    fn test_end_frame_inside_pass_panics() {
        let mut renderer = renderer(ScriptedBackend::default());
        let cmd = renderer.begin_frame().expect("begin").expect("frame");
        renderer.begin_swap_chain_render_pass(cmd);
        let _ = renderer.end_frame();
    }

    #[test]
    #[should_panic(expected = "different frame")]
    fn test_pass_on_wrong_command_buffer_panics() {
        let mut renderer = renderer(ScriptedBackend::default());
        renderer.begin_frame().expect("begin").expect("frame");
        renderer.begin_swap_chain_render_pass(vk::CommandBuffer::from_raw(1));
    }
}
