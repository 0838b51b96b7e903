mod capture;
mod scene;

use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use kiln_engine::command::{
    Command, CommandBuffer, Image, ResizeCommand, ScreenshotCommand, SwapCommand, VSyncCommand,
};
use kiln_engine::logging::{LoggingConfig, init_logging};
use kiln_engine::{Graphics, GraphicsConfig};

use scene::{Frame, Scene};

const TITLE: &str = "kiln studio";

struct Studio {
    config: GraphicsConfig,
    window: Option<Arc<Window>>,
    graphics: Option<Graphics>,
    buffer: Option<CommandBuffer>,
    scene: Scene,

    vsync: bool,
    vsync_changed: bool,
    resized: Option<(u32, u32)>,
    screenshot_requested: bool,
    frames: u64,
}

impl Studio {
    fn new(config: GraphicsConfig) -> Self {
        Self {
            vsync: config.vsync,
            config,
            window: None,
            graphics: None,
            buffer: None,
            scene: Scene::new(),
            vsync_changed: false,
            resized: None,
            screenshot_requested: false,
            frames: 0,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(LogicalSize::new(960.0, 600.0));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create wgpu surface")?;

        let size = window.inner_size();
        let graphics = Graphics::start_wgpu(
            instance,
            surface,
            size.width,
            size.height,
            self.config.clone(),
        )?;

        self.buffer = Some(graphics.new_command_buffer());
        self.graphics = Some(graphics);
        self.window = Some(window);
        Ok(())
    }

    fn on_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match event.physical_key {
            PhysicalKey::Code(KeyCode::KeyV) => {
                self.vsync = !self.vsync;
                self.vsync_changed = true;
                log::info!("vsync {}", if self.vsync { "on" } else { "off" });
            }
            PhysicalKey::Code(KeyCode::F12) => self.screenshot_requested = true,
            _ => {}
        }
    }

    fn redraw(&mut self) {
        let (Some(window), Some(graphics)) = (self.window.as_ref(), self.graphics.as_mut()) else {
            return;
        };
        let size = window.inner_size();
        let buffer = self
            .buffer
            .take()
            .unwrap_or_else(|| graphics.new_command_buffer());

        let mut frame = Frame::new(graphics, buffer);
        if let Some((width, height)) = self.resized.take() {
            frame.push(Command::Resize(ResizeCommand { width, height }));
        }
        if std::mem::take(&mut self.vsync_changed) {
            frame.push(Command::VSync(VSyncCommand { vsync: self.vsync }));
        }

        self.scene.record(&mut frame, size.width, size.height);

        let shot = std::mem::take(&mut self.screenshot_requested).then(|| {
            let (tx, rx) = crossbeam_channel::bounded(1);
            frame.push(Command::Screenshot(ScreenshotCommand {
                region: None,
                reply: tx,
            }));
            rx
        });
        frame.push(Command::Swap(SwapCommand::default()));
        self.buffer = Some(frame.finish());

        if let Some(rx) = shot {
            graphics.wait_for_idle();
            save_screenshot(&rx);
        }

        self.frames += 1;
        if self.frames % 60 == 0 {
            let kib = graphics.memory_usage() / 1024;
            let vsync = if self.vsync { "on" } else { "off" };
            window.set_title(&format!("{TITLE} - {kib} KiB textures - vsync {vsync}"));
        }
    }

    fn stop(&mut self) {
        if let Some(mut graphics) = self.graphics.take() {
            graphics.shutdown();
            log::info!("renderer stopped after {} frames", self.frames);
        }
        self.window = None;
    }
}

fn save_screenshot(rx: &Receiver<Image>) {
    let Ok(image) = rx.try_recv() else {
        log::warn!("screenshot not available");
        return;
    };
    let path = capture::screenshot_path();
    match capture::save_png(image, &path) {
        Ok(()) => log::info!("screenshot saved to {}", path.display()),
        Err(err) => log::error!("{err:#}"),
    }
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            log::error!("failed to start: {err:#}");
            event_loop.exit();
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.resized = Some((size.width, size.height)),
            WindowEvent::KeyboardInput { event, .. } => self.on_key(&event),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn exiting(&mut self, _: &ActiveEventLoop) {
        self.stop();
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new(GraphicsConfig::default());
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;
    Ok(())
}
