//! Producer-side entry point.
//!
//! [`Graphics`] starts the render thread for one backend, sends the backend's
//! init command and afterwards just forwards command buffers.

use anyhow::{Result, anyhow};

use crate::backend::wgpu::{WgpuBackend, WgpuInitCommand};
use crate::command::{BackendInit, Command, CommandBuffer};
use crate::device::{GpuInit, SurfaceSize};
use crate::dispatch::CommandProcessor;
use crate::texture::MemoryCounter;
use crate::threaded::ThreadedBackend;

/// Startup parameters shared by all backends.
#[derive(Debug, Clone)]
pub struct GraphicsConfig {
    pub vsync: bool,
    /// Command region size of buffers from [`Graphics::new_command_buffer`], in bytes.
    pub command_capacity: usize,
    /// Vertex region size, in bytes.
    pub data_capacity: usize,
    /// Only read by the wgpu backend.
    pub gpu: GpuInit,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            command_capacity: 1 << 20,
            data_capacity: 4 << 20,
            gpu: GpuInit::default(),
        }
    }
}

pub struct Graphics {
    threaded: ThreadedBackend,
    memory: MemoryCounter,
    command_capacity: usize,
    data_capacity: usize,
    stopped: bool,
}

impl Graphics {
    fn start<P, F>(factory: F, memory: MemoryCounter, config: &GraphicsConfig) -> Result<Self>
    where
        P: crate::threaded::BufferProcessor + 'static,
        F: FnOnce() -> P + Send + 'static,
    {
        Ok(Self {
            threaded: ThreadedBackend::start(factory)?,
            memory,
            command_capacity: config.command_capacity,
            data_capacity: config.data_capacity,
            stopped: false,
        })
    }

    /// Starts the render thread with the wgpu backend and initializes it.
    ///
    /// The surface must have been created from `instance`. Device errors are
    /// logged by the render thread; the renderer then ignores draws.
    pub fn start_wgpu(
        instance: wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        config: GraphicsConfig,
    ) -> Result<Self> {
        let memory = MemoryCounter::new();
        let backend_memory = memory.clone();
        let mut graphics = Self::start(
            move || CommandProcessor::with_platform(WgpuBackend::new(backend_memory)),
            memory,
            &config,
        )?;

        let init = WgpuInitCommand {
            instance,
            surface,
            size: SurfaceSize::new(width, height),
            vsync: config.vsync,
            gpu: config.gpu,
        };
        graphics.submit_and_wait(Command::Init(BackendInit::Wgpu(init)))?;
        log::debug!("wgpu renderer started");
        Ok(graphics)
    }

    /// Starts the render thread with the OpenGL backend and initializes it.
    #[cfg(feature = "opengl")]
    pub fn start_gl(
        surface: Box<dyn crate::backend::gl::GlSurface>,
        config: GraphicsConfig,
    ) -> Result<Self> {
        use crate::backend::gl::{GlBackend, GlInitCommand};

        let memory = MemoryCounter::new();
        let backend_memory = memory.clone();
        let mut graphics = Self::start(
            move || CommandProcessor::with_platform(GlBackend::new(backend_memory)),
            memory,
            &config,
        )?;

        let init = GlInitCommand {
            surface,
            vsync: config.vsync,
        };
        graphics.submit_and_wait(Command::Init(BackendInit::Gl(init)))?;
        log::debug!("GL renderer started");
        Ok(graphics)
    }

    fn submit_and_wait(&mut self, command: Command) -> Result<()> {
        let mut buffer = self.new_command_buffer();
        buffer
            .add_command(command)
            .map_err(|err| anyhow!("{err}"))?;
        self.threaded.run_buffer(buffer);
        self.threaded.wait_for_idle();
        Ok(())
    }

    /// An empty buffer sized by the startup config.
    pub fn new_command_buffer(&self) -> CommandBuffer {
        CommandBuffer::new(self.command_capacity, self.data_capacity)
    }

    /// Submits `buffer` and returns an empty one to record the next batch into.
    ///
    /// Blocks while the previous buffer is still executing.
    pub fn run_buffer(&mut self, buffer: CommandBuffer) -> CommandBuffer {
        self.threaded
            .run_buffer(buffer)
            .unwrap_or_else(|| self.new_command_buffer())
    }

    pub fn is_idle(&self) -> bool {
        self.threaded.is_idle()
    }

    pub fn wait_for_idle(&mut self) {
        self.threaded.wait_for_idle();
    }

    /// Bytes of texture memory currently held by the render thread.
    pub fn memory_usage(&self) -> usize {
        self.memory.get()
    }

    /// Releases GPU resources on the render thread and joins it.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(err) = self.submit_and_wait(Command::Shutdown) {
            log::warn!("shutdown command not sent: {err:#}");
        }
        self.threaded.stop();
    }
}

impl Drop for Graphics {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_sizes() {
        let config = GraphicsConfig::default();
        assert!(config.vsync);
        assert_eq!(config.command_capacity, 1024 * 1024);
        assert_eq!(config.data_capacity, 4 * 1024 * 1024);
    }
}
