//! Chat client engine and CLI
//!
//! This crate provides [`ChatClient`] and the `tlschat` command-line client.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use client::{ChatClient, ClientOptions};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
