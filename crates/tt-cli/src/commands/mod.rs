//! CLI command implementations

mod config;
mod shell;
mod status;

pub use config::{config_edit, config_get, config_init, config_set, config_show};
pub use shell::shell_command;
pub use status::status_command;
