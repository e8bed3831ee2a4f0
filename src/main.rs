// =============================================================================
// VK-BRINGUP DEMO - bring the context up, keep the swap chain sized, tear down
// =============================================================================
//
// FLOW:
// 1. Load config.toml, install logging
// 2. On resume: Context::init (instance -> device -> window/surface ->
//    queues -> logical device -> swap chain)
// 3. On resize: wait for the GPU, rebuild the swap chain
// 4. On close: Context::cleanup
//
// No frames are rendered; the ring is only built and rebuilt.
//
// =============================================================================

use anyhow::{Context as _, Result};
use vk_bringup::backend::surface::WindowParams;
use vk_bringup::{Config, Context};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::WindowId,
};

fn main() -> Result<()> {
    let config = Config::load();

    init_logging();
    log::info!("Starting vk-bringup");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );

    let event_loop = EventLoop::new().context("Failed to initialize windowing layer")?;
    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    if let Some(message) = app.failure.take() {
        anyhow::bail!(message);
    }
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

struct App {
    config: Config,
    context: Option<Context>,
    /// Set when bring-up or a rebuild fails; reported after the loop exits
    failure: Option<String>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            context: None,
            failure: None,
        }
    }

    fn window_params(&self) -> WindowParams {
        WindowParams {
            title: self.config.window.title.clone(),
            width: self.config.window.width,
            height: self.config.window.height,
            fullscreen: self.config.window.fullscreen,
            resizable: self.config.window.resizable,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, message: String) {
        log::error!("{}", message);
        self.failure = Some(message);
        if let Some(context) = self.context.take() {
            context.cleanup();
        }
        event_loop.exit();
    }

    fn resize(&mut self, width: u32, height: u32) -> vk_bringup::Result<()> {
        let Some(context) = self.context.as_mut() else {
            return Ok(());
        };

        // Minimized windows keep the old ring until they come back
        if width == 0 || height == 0 {
            return Ok(());
        }

        context.wait_idle()?;
        context.set_extent(width, height);
        let config = context.rebuild_swap_chain()?;
        log::info!(
            "Resized to {}x{}, {} images",
            config.extent.width,
            config.extent.height,
            config.image_count
        );
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.context.is_some() {
            return;
        }

        // Validation only in debug builds
        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;

        match Context::init(
            event_loop,
            &self.window_params(),
            enable_validation,
            self.config.clone(),
        ) {
            Ok(context) => {
                if let (Some(fps), Some(budget)) = (context.fps_target(), context.frame_budget()) {
                    log::info!("Frame-rate target: {:.2} fps ({:?} per frame)", fps, budget);
                }
                self.context = Some(context);
            }
            Err(e) => self.fail(event_loop, format!("Failed to initialize Vulkan: {}", e)),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(context) = self.context.take() {
                    context.cleanup();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Err(e) = self.resize(size.width, size.height) {
                    self.fail(event_loop, format!("Failed to rebuild swap chain: {}", e));
                }
            }

            _ => {}
        }
    }
}
