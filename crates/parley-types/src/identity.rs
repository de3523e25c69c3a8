//! Caller identity as supplied by the external auth layer.
//!
//! The messaging core trusts the `(user_id, role)` pair it is handed and
//! never re-derives a role from storage.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Verified role of a marketplace account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Vendor,
    /// Moderators. Admin-authored messages are system annotations.
    Admin,
}

impl Role {
    /// The conversation side this role speaks for. Admins have none.
    pub fn party(self) -> Option<Party> {
        match self {
            Role::Buyer => Some(Party::Buyer),
            Role::Vendor => Some(Party::Vendor),
            Role::Admin => None,
        }
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Vendor => write!(f, "vendor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buyer" => Ok(Role::Buyer),
            "vendor" => Ok(Role::Vendor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// One of the two sides of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Buyer,
    Vendor,
}

impl Party {
    /// The opposite side.
    pub fn other(self) -> Party {
        match self {
            Party::Buyer => Party::Vendor,
            Party::Vendor => Party::Buyer,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Buyer => write!(f, "buyer"),
            Party::Vendor => write!(f, "vendor"),
        }
    }
}

/// A verified `(user_id, role)` pair for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn buyer(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Buyer)
    }

    pub fn vendor(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Vendor)
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin)
    }
}
