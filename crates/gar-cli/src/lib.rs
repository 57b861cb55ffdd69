//! GitHub activity reporter CLI library.
//!
//! This crate provides the `gar` command-line interface: argument parsing,
//! configuration, saved credentials and the subcommands.

mod cli;
pub mod commands;
mod config;
pub mod credentials;

pub use cli::{Cli, Commands, ReportArgs, TokenArgs};
pub use config::Config;
