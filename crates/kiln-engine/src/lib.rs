//! Kiln engine crate.
//!
//! A producer thread records [`command::CommandBuffer`]s; the render thread
//! owned by [`threaded::ThreadedBackend`] replays them through a
//! [`dispatch::CommandProcessor`] against one [`backend::GpuBackend`].

pub mod backend;
pub mod command;
pub mod coords;
pub mod device;
pub mod dispatch;
pub mod graphics;
pub mod logging;
pub mod screen;
pub mod texture;
pub mod threaded;

pub use graphics::{Graphics, GraphicsConfig};
