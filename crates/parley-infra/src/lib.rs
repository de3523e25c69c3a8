//! Infrastructure layer for Parley.
//!
//! Contains the SQLite implementations of the repository traits defined in
//! `parley-core` and the `config.toml` loader.

pub mod config;
pub mod sqlite;
