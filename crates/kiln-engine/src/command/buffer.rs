use std::mem;

use thiserror::Error;

use super::cmd::Command;
use super::types::Vertex;

#[derive(Debug, Error)]
pub enum CommandBufferError {
    /// The rejected command is handed back so the caller can flush and retry.
    #[error("command region full: {used} of {capacity} bytes used")]
    CommandsFull {
        used: usize,
        capacity: usize,
        command: Box<Command>,
    },
    /// `command` is set when a texture command's pixels did not fit.
    #[error("data region full: {requested} bytes requested, {available} available")]
    DataFull {
        requested: usize,
        available: usize,
        command: Option<Box<Command>>,
    },
}

impl CommandBufferError {
    /// The command that was rejected, if any.
    pub fn into_command(self) -> Option<Command> {
        match self {
            CommandBufferError::CommandsFull { command, .. } => Some(*command),
            CommandBufferError::DataFull { command, .. } => command.map(|c| *c),
        }
    }
}

/// Ordered commands plus a data region, both with fixed capacities.
///
/// Capacities are in bytes. Each command costs `size_of::<Command>()` of the
/// command region. Vertices and texture pixels share the data region.
pub struct CommandBuffer {
    commands: Vec<Command>,
    command_capacity: usize,
    data: Vec<Vertex>,
    pixel_bytes: usize,
    data_capacity: usize,
}

/// Pixel payload a command carries into the data region.
fn pixel_payload(command: &Command) -> usize {
    match command {
        Command::TextureCreate(cmd) => cmd.data.len(),
        Command::TextureUpdate(cmd) => cmd.data.len(),
        _ => 0,
    }
}

impl CommandBuffer {
    pub fn new(command_capacity: usize, data_capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(command_capacity / mem::size_of::<Command>()),
            command_capacity,
            data: Vec::with_capacity(data_capacity / Vertex::STRIDE),
            pixel_bytes: 0,
            data_capacity,
        }
    }

    #[inline]
    fn command_bytes(&self) -> usize {
        self.commands.len() * mem::size_of::<Command>()
    }

    pub fn add_command(&mut self, command: Command) -> Result<(), CommandBufferError> {
        let used = self.command_bytes();
        if used + mem::size_of::<Command>() > self.command_capacity {
            return Err(CommandBufferError::CommandsFull {
                used,
                capacity: self.command_capacity,
                command: Box::new(command),
            });
        }
        let requested = pixel_payload(&command);
        let available = self.remaining_data();
        if requested > available {
            return Err(CommandBufferError::DataFull {
                requested,
                available,
                command: Some(Box::new(command)),
            });
        }
        self.pixel_bytes += requested;
        self.commands.push(command);
        Ok(())
    }

    /// Appends vertices to the data region and returns their byte offset.
    ///
    /// Nothing is written when the vertices do not fit.
    pub fn add_vertices(&mut self, vertices: &[Vertex]) -> Result<usize, CommandBufferError> {
        let requested = vertices.len() * Vertex::STRIDE;
        let available = self.remaining_data();
        if requested > available {
            return Err(CommandBufferError::DataFull {
                requested,
                available,
                command: None,
            });
        }
        let offset = self.data_bytes();
        self.data.extend_from_slice(vertices);
        Ok(offset)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Raw data region; vertices are tightly packed at `Vertex::STRIDE`.
    pub fn data(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Commands for in-place consumption next to the vertex data.
    pub fn parts_mut(&mut self) -> (&mut [Command], &[Vertex]) {
        (self.commands.as_mut_slice(), self.data.as_slice())
    }

    pub fn vertex_data(&self) -> &[Vertex] {
        &self.data
    }

    #[inline]
    fn data_bytes(&self) -> usize {
        self.data.len() * Vertex::STRIDE
    }

    /// Vertices stored at byte `offset`. Returns `None` when the range is out
    /// of bounds or the offset is not on a vertex boundary.
    pub fn vertices(&self, offset: usize, count: usize) -> Option<&[Vertex]> {
        if offset % Vertex::STRIDE != 0 {
            return None;
        }
        let start = offset / Vertex::STRIDE;
        self.data.get(start..start.checked_add(count)?)
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[cfg(test)]
    fn remaining_commands(&self) -> usize {
        (self.command_capacity - self.command_bytes()) / mem::size_of::<Command>()
    }

    /// Data bytes still free for vertices and texture pixels.
    pub fn remaining_data(&self) -> usize {
        self.data_capacity
            .saturating_sub(self.data_bytes() + self.pixel_bytes)
    }

    /// Drops all commands and data; capacities are kept.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.data.clear();
        self.pixel_bytes = 0;
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("commands", &self.commands.len())
            .field("command_capacity", &self.command_capacity)
            .field("data", &self.data_bytes())
            .field("pixels", &self.pixel_bytes)
            .field("data_capacity", &self.data_capacity)
            .finish()
    }
}
