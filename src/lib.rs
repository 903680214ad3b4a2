pub mod cli_interface;
pub mod commands;
pub mod error;
mod fs;
pub mod mkfs;
pub mod mount;
pub mod utils;
pub use error::*;
pub use fs::*;
