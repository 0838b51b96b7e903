use crate::command::Command;

/// Backend-independent commands: no-op and cross-thread signal.
#[derive(Debug, Default)]
pub struct GeneralFragment;

impl GeneralFragment {
    pub fn run_command(&mut self, cmd: &mut Command) -> bool {
        match cmd {
            Command::Nop => true,
            Command::Signal(signal) => {
                signal.semaphore.signal();
                true
            }
            _ => false,
        }
    }
}
