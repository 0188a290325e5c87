//! Command implementations for the tether CLI

pub mod config;
mod watch;

pub use config::{config_init, config_path, config_show, load_client_config};
pub use watch::{apply_overrides, watch_command, WatchOptions};
