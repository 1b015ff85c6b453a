//! tether: Command-line client for shared remote debug shells
//!
//! Opens deduplicated connections to remote debug endpoints and shows one of
//! them interactively, while the session layer keeps status and the
//! keep-alive marker in step with every open connection.

pub mod commands;
pub mod output;
pub mod surface;
