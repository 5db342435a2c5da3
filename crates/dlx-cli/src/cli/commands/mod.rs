//! CLI command handlers, one file per command.

mod checksum;
mod get;

pub use checksum::run_checksum;
pub use get::{run_get, GetArgs};
