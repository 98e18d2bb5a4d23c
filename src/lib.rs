//! Obra application crate: CLI configuration and the development remote
//! store server.

pub mod config;
pub mod server;
