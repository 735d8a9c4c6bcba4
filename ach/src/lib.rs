pub mod cli;
pub mod client;
pub mod load_config;

pub use cli::{run, run_with, Cli, Commands};
