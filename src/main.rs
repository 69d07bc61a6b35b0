// =============================================================================
// TRIANGLE BOOTSTRAP - Vulkan setup and teardown for a single triangle pipeline
// =============================================================================
//
// SEQUENCE:
// window -> instance -> debug messenger -> surface -> physical device
//        -> logical device + queues -> swapchain -> image views
//        -> render pass -> pipeline layout -> graphics pipeline
//
// Everything is built once when the window appears and destroyed in reverse
// order on exit. The event loop only waits for the window to close; nothing
// is drawn.
//
// =============================================================================

mod backend;
mod config;
mod error;

use anyhow::{Context, Result};
use backend::VulkanContext;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    init_logging();
    log::info!("Starting triangle bootstrap");
    log::info!("Window: \"{}\" {}x{}", config::WINDOW_TITLE, config::WIDTH, config::HEIGHT);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new();
    event_loop.run_app(&mut app).context("Event loop failed")?;

    // Returning Err prints the error chain to stderr and exits with status 1
    app.finish()
}

/// RUST_LOG wins when set, otherwise `info`
fn init_logging() {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or(config::DEFAULT_LOG_FILTER)).init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Owns the window and the Vulkan context.
///
/// Field order matters for Drop: the context (and its surface) must go
/// before the window.
struct App {
    context: Option<VulkanContext>,
    window: Option<Arc<Window>>,
    /// First fatal error; ends the event loop
    error: Option<anyhow::Error>,
}

impl App {
    fn new() -> Self {
        Self {
            context: None,
            window: None,
            error: None,
        }
    }

    /// Create the window, then run the whole Vulkan bootstrap against it
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attributes = WindowAttributes::default()
            .with_title(config::WINDOW_TITLE)
            .with_inner_size(winit::dpi::PhysicalSize::new(config::WIDTH, config::HEIGHT))
            .with_resizable(false);

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("Failed to create window")?,
        );

        let context = VulkanContext::new(window.clone())
            .context("Failed to initialize Vulkan")?;

        log::info!(
            "Pipeline {:?} ready: render pass {:?}, layout {:?}, {} image views ({:?}, {}x{}), {} live objects",
            context.pipeline,
            context.render_pass,
            context.pipeline_layout,
            context.image_views.len(),
            context.swapchain_format,
            context.swapchain_extent.width,
            context.swapchain_extent.height,
            context.live_objects()
        );
        log::debug!(
            "Physical device {:?}, graphics queue {:?}, present queue {:?}, swapchain {:?}",
            context.physical_device,
            context.graphics_queue,
            context.present_queue,
            context.swapchain
        );

        self.context = Some(context);
        self.window = Some(window);
        Ok(())
    }

    /// Tear everything down and report the outcome
    fn finish(mut self) -> Result<()> {
        // Reverse-order teardown happens in VulkanContext::drop
        self.context = None;
        self.window = None;

        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.error = Some(e);
            event_loop.exit();
        }
    }

    /// Only a close request ends the loop. Nothing is rendered.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if closes_window(&event) {
            log::info!("Close requested, shutting down...");
            event_loop.exit();
        }
    }
}

fn closes_window(event: &WindowEvent) -> bool {
    matches!(event, WindowEvent::CloseRequested)
}
