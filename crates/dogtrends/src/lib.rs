#![forbid(unsafe_code)]

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod exclusion;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod reporter;
pub mod store;
pub mod temporal;
pub mod verify;

pub use cli::app::{Cli, Command};
