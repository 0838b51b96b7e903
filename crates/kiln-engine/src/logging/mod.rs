//! Logging setup.
//!
//! Everything in the engine reports through the `log` facade; this module only
//! wires `env_logger` behind it for binaries that want a default sink.

mod init;

pub use init::{init_logging, LoggingConfig};
