//! The boundary between the runtime and whatever owns the surface, the frame
//! scheduler and the graphics context.

use std::time::Duration;
use worldspace_kernel::World;
use worldspace_quality::QualityTier;
use worldspace_render::{DebugTextRenderer, RenderView, Renderer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("surface has no size yet ({width}x{height})")]
    NotReady { width: u32, height: u32 },
    #[error("graphics setup failed: {0}")]
    Setup(String),
}

/// Services the simulation loop needs from its environment.
///
/// The runtime never blocks on any of these. `request_frame` and
/// `schedule_retry` only ask the host to call back into
/// [`crate::WorldRuntime::on_frame`] or [`crate::WorldRuntime::on_retry`]
/// later.
pub trait Host {
    /// Surface size in physical pixels. Zero while not laid out.
    fn dimensions(&self) -> (u32, u32);

    /// Create the renderer and its controls. Called once per initialization
    /// attempt, after the dimensions check passed.
    fn setup(&mut self) -> Result<(), HostError>;

    fn request_frame(&mut self);

    fn cancel_frame(&mut self);

    fn schedule_retry(&mut self, delay: Duration);

    fn render(&mut self, world: &World);

    fn apply_quality(&mut self, tier: QualityTier);

    /// Release renderer and control resources. Called on teardown.
    fn release(&mut self);
}

/// Host without a window. Renders through [`DebugTextRenderer`] and records
/// every request so a driver (the CLI, tests) can act on them.
#[derive(Debug)]
pub struct HeadlessHost {
    pub width: u32,
    pub height: u32,
    /// Setup calls that fail before one succeeds.
    pub failing_setups: u32,
    pub setup_calls: u32,
    pub frame_requested: bool,
    pub retries: Vec<Duration>,
    pub frames_rendered: u64,
    pub tier: Option<QualityTier>,
    pub released: bool,
    pub view: RenderView,
    renderer: DebugTextRenderer,
    last_frame: Option<String>,
}

impl HeadlessHost {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            failing_setups: 0,
            setup_calls: 0,
            frame_requested: false,
            retries: Vec::new(),
            frames_rendered: 0,
            tier: None,
            released: false,
            view: RenderView::default(),
            renderer: DebugTextRenderer::compact(),
            last_frame: None,
        }
    }

    /// List every entity in rendered frames, not just the header.
    pub fn verbose(mut self) -> Self {
        self.renderer = DebugTextRenderer::new();
        self
    }

    pub fn last_frame(&self) -> Option<&str> {
        self.last_frame.as_deref()
    }

    /// Take the pending retry request, if any.
    pub fn take_retry(&mut self) -> Option<Duration> {
        if self.retries.is_empty() {
            None
        } else {
            Some(self.retries.remove(0))
        }
    }
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl Host for HeadlessHost {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn setup(&mut self) -> Result<(), HostError> {
        self.setup_calls += 1;
        if self.failing_setups > 0 {
            self.failing_setups -= 1;
            return Err(HostError::Setup("headless context unavailable".into()));
        }
        self.released = false;
        Ok(())
    }

    fn request_frame(&mut self) {
        self.frame_requested = true;
    }

    fn cancel_frame(&mut self) {
        self.frame_requested = false;
    }

    fn schedule_retry(&mut self, delay: Duration) {
        self.retries.push(delay);
    }

    fn render(&mut self, world: &World) {
        self.frames_rendered += 1;
        self.last_frame = Some(self.renderer.render(world, &self.view));
    }

    fn apply_quality(&mut self, tier: QualityTier) {
        self.view.pixel_ratio = tier.settings().pixel_ratio;
        self.tier = Some(tier);
    }

    fn release(&mut self) {
        self.frame_requested = false;
        self.released = true;
    }
}
