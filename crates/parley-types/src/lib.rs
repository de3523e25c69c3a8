//! Shared domain types for Parley.
//!
//! This crate contains the domain types of the buyer/vendor messaging core:
//! conversations, messages, the audit trail, caller identity, pagination,
//! notification events, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod audit;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod page;
pub mod time;
