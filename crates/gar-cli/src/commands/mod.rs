//! CLI subcommand implementations.

pub mod auth;
pub mod inbox;
pub mod report;
pub mod util;
