//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (parley-infra) implements. The core crate never depends on any
//! specific storage technology.
//!
//! Every write that touches both a message and its conversation summary is a
//! single repository call, so the implementation can wrap it in one
//! transaction. Services never stitch such writes together themselves.

pub mod audit;
pub mod conversation;
pub mod message;

#[cfg(test)]
pub(crate) mod mock;
