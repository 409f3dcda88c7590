//! h2wtf CLI library.
//!
//! This crate provides the command-line interface of h2wtf.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, LineSelection};
pub use config::{Config, RuleConfig};
