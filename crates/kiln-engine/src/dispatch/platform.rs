use crate::backend::GpuBackend;
use crate::command::Command;

use super::gpu::GpuFragment;

/// Window-system commands: swap interval, resize and teardown.
#[derive(Debug, Default)]
pub struct PlatformFragment;

impl PlatformFragment {
    pub fn run_command<B: GpuBackend>(&mut self, cmd: &mut Command, gpu: &mut GpuFragment<B>) -> bool {
        match cmd {
            Command::VSync(c) => gpu.request_vsync(c.vsync),
            Command::Resize(c) => gpu.resize(c.width, c.height),
            Command::Shutdown => {
                log::debug!("backend shutdown");
                gpu.shutdown();
            }
            _ => return false,
        }
        true
    }
}
