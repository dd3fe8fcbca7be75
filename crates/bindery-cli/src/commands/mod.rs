//! CLI command handlers.

pub mod bindings;
pub mod init;
pub mod map;
pub mod status;
