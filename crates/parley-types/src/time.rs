//! Timestamp helpers.
//!
//! Persisted timestamps carry microsecond precision, so every timestamp the
//! core generates is truncated to microseconds up front. An entity returned
//! from a write then compares equal to the same entity read back.

use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC time truncated to microsecond precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
