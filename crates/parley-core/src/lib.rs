//! Messaging services and repository trait definitions for Parley.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements, and the services layered on top of them. It depends only
//! on `parley-types` -- never on `parley-infra` or any database/IO crate.

pub mod event;
pub mod repository;
pub mod service;
