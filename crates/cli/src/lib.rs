//! Command-line host for the registration plugin.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod settings;
