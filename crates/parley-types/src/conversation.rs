//! Conversation types for Parley.
//!
//! A conversation is a persistent thread between exactly one buyer and one
//! vendor, tagged with a context and an optional product/order/dispute link.
//! The conversation row also carries a denormalized summary of its message
//! set (last message and per-party unread counters) that is maintained at
//! write time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::identity::{Caller, Party, Role};
use crate::message::MessageId;

/// Unique identifier for a conversation, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a conversation is about.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (context IN ('product_inquiry', 'order_support', 'general', 'dispute'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationContext {
    ProductInquiry,
    OrderSupport,
    General,
    Dispute,
}

impl fmt::Display for ConversationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationContext::ProductInquiry => write!(f, "product_inquiry"),
            ConversationContext::OrderSupport => write!(f, "order_support"),
            ConversationContext::General => write!(f, "general"),
            ConversationContext::Dispute => write!(f, "dispute"),
        }
    }
}

impl FromStr for ConversationContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product_inquiry" => Ok(ConversationContext::ProductInquiry),
            "order_support" => Ok(ConversationContext::OrderSupport),
            "general" => Ok(ConversationContext::General),
            "dispute" => Ok(ConversationContext::Dispute),
            other => Err(format!("invalid conversation context: '{other}'")),
        }
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        ConversationContext::General
    }
}

/// Lifecycle status of a conversation.
///
/// - Active: open for messaging
/// - Flagged: under moderator review
/// - Archived: put away by a participant
/// - Closed: terminal, admin-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
    Flagged,
    Closed,
}

impl ConversationStatus {
    /// Closed conversations never leave the closed state.
    pub fn is_terminal(self) -> bool {
        self == ConversationStatus::Closed
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Archived => write!(f, "archived"),
            ConversationStatus::Flagged => write!(f, "flagged"),
            ConversationStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ConversationStatus::Active),
            "archived" => Ok(ConversationStatus::Archived),
            "flagged" => Ok(ConversationStatus::Flagged),
            "closed" => Ok(ConversationStatus::Closed),
            other => Err(format!("invalid conversation status: '{other}'")),
        }
    }
}

impl Default for ConversationStatus {
    fn default() -> Self {
        ConversationStatus::Active
    }
}

/// A buyer/vendor conversation with its denormalized message summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub buyer_id: String,
    pub vendor_id: String,
    pub context: ConversationContext,
    pub product_id: Option<String>,
    pub order_id: Option<String>,
    pub dispute_id: Option<String>,

    pub is_pinned_buyer: bool,
    pub is_pinned_vendor: bool,
    pub is_muted_buyer: bool,
    pub is_muted_vendor: bool,

    pub last_message_id: Option<MessageId>,
    /// Preview of the last message, at most `preview_chars` characters.
    pub last_message_content: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_sender_id: Option<String>,
    /// Unread messages authored by the vendor.
    pub unread_count_buyer: u32,
    /// Unread messages authored by the buyer.
    pub unread_count_vendor: u32,

    pub status: ConversationStatus,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<String>,
    pub flagged_at: Option<DateTime<Utc>>,
    pub flagged_by: Option<String>,
    pub flag_reason: Option<String>,
    pub moderator_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Build a fresh active conversation with zeroed counters.
    pub fn new(input: &NewConversation, now: DateTime<Utc>) -> Self {
        Self {
            id: ConversationId::new(),
            buyer_id: input.buyer_id.clone(),
            vendor_id: input.vendor_id.clone(),
            context: input.context,
            product_id: input.product_id.clone(),
            order_id: input.order_id.clone(),
            dispute_id: input.dispute_id.clone(),
            is_pinned_buyer: false,
            is_pinned_vendor: false,
            is_muted_buyer: false,
            is_muted_vendor: false,
            last_message_id: None,
            last_message_content: None,
            last_message_at: None,
            last_message_sender_id: None,
            unread_count_buyer: 0,
            unread_count_vendor: 0,
            status: ConversationStatus::Active,
            archived_at: None,
            archived_by: None,
            flagged_at: None,
            flagged_by: None,
            flag_reason: None,
            moderator_notes: None,
            reviewed_at: None,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The account id on the given side.
    pub fn participant(&self, party: Party) -> &str {
        match party {
            Party::Buyer => &self.buyer_id,
            Party::Vendor => &self.vendor_id,
        }
    }

    /// The side the caller speaks for, if the caller is a participant.
    ///
    /// Admins are never a party, even when their id happens to match.
    pub fn party_of(&self, caller: &Caller) -> Option<Party> {
        let party = caller.role.party()?;
        (self.participant(party) == caller.user_id).then_some(party)
    }

    /// Whether the caller may see this conversation at all.
    pub fn is_visible_to(&self, caller: &Caller) -> bool {
        caller.role == Role::Admin || self.party_of(caller).is_some()
    }

    pub fn unread_count(&self, party: Party) -> u32 {
        match party {
            Party::Buyer => self.unread_count_buyer,
            Party::Vendor => self.unread_count_vendor,
        }
    }

    pub fn is_pinned(&self, party: Party) -> bool {
        match party {
            Party::Buyer => self.is_pinned_buyer,
            Party::Vendor => self.is_pinned_vendor,
        }
    }

    pub fn is_muted(&self, party: Party) -> bool {
        match party {
            Party::Buyer => self.is_muted_buyer,
            Party::Vendor => self.is_muted_vendor,
        }
    }

    /// The idempotency key this conversation was created under.
    pub fn key(&self) -> ConversationKey {
        ConversationKey {
            buyer_id: self.buyer_id.clone(),
            vendor_id: self.vendor_id.clone(),
            context: self.context,
            product_id: self.product_id.clone(),
            order_id: self.order_id.clone(),
        }
    }
}

/// Request to create (or fetch) a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConversation {
    pub buyer_id: String,
    pub vendor_id: String,
    #[serde(default)]
    pub context: ConversationContext,
    pub product_id: Option<String>,
    pub order_id: Option<String>,
    pub dispute_id: Option<String>,
}

impl NewConversation {
    pub fn key(&self) -> ConversationKey {
        ConversationKey {
            buyer_id: self.buyer_id.clone(),
            vendor_id: self.vendor_id.clone(),
            context: self.context,
            product_id: self.product_id.clone(),
            order_id: self.order_id.clone(),
        }
    }
}

/// Idempotency key: `(buyer_id, vendor_id, context, product_id?, order_id?)`.
///
/// `dispute_id` is linkage only and does not participate in the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub buyer_id: String,
    pub vendor_id: String,
    pub context: ConversationContext,
    pub product_id: Option<String>,
    pub order_id: Option<String>,
}

/// Partial update of the mutable, non-summary conversation fields.
///
/// `None` leaves a field unchanged. Summary and unread fields are not
/// reachable through a patch; only message writes maintain them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationPatch {
    pub is_pinned_buyer: Option<bool>,
    pub is_pinned_vendor: Option<bool>,
    pub is_muted_buyer: Option<bool>,
    pub is_muted_vendor: Option<bool>,
    pub status: Option<ConversationStatus>,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<String>,
    pub flagged_at: Option<DateTime<Utc>>,
    pub flagged_by: Option<String>,
    pub flag_reason: Option<String>,
    pub moderator_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

impl ConversationPatch {
    /// Patch setting one side's pinned flag.
    pub fn pinned(party: Party, value: bool) -> Self {
        match party {
            Party::Buyer => Self {
                is_pinned_buyer: Some(value),
                ..Self::default()
            },
            Party::Vendor => Self {
                is_pinned_vendor: Some(value),
                ..Self::default()
            },
        }
    }

    /// Patch setting one side's muted flag.
    pub fn muted(party: Party, value: bool) -> Self {
        match party {
            Party::Buyer => Self {
                is_muted_buyer: Some(value),
                ..Self::default()
            },
            Party::Vendor => Self {
                is_muted_vendor: Some(value),
                ..Self::default()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to a conversation in place.
    pub fn apply(&self, conv: &mut Conversation) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set(&mut conv.is_pinned_buyer, &self.is_pinned_buyer);
        set(&mut conv.is_pinned_vendor, &self.is_pinned_vendor);
        set(&mut conv.is_muted_buyer, &self.is_muted_buyer);
        set(&mut conv.is_muted_vendor, &self.is_muted_vendor);
        set(&mut conv.status, &self.status);
        set_opt(&mut conv.archived_at, &self.archived_at);
        set_opt(&mut conv.archived_by, &self.archived_by);
        set_opt(&mut conv.flagged_at, &self.flagged_at);
        set_opt(&mut conv.flagged_by, &self.flagged_by);
        set_opt(&mut conv.flag_reason, &self.flag_reason);
        set_opt(&mut conv.moderator_notes, &self.moderator_notes);
        set_opt(&mut conv.reviewed_at, &self.reviewed_at);
        set_opt(&mut conv.reviewed_by, &self.reviewed_by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Conversation {
        Conversation::new(
            &NewConversation {
                buyer_id: "buyer-1".to_string(),
                vendor_id: "vendor-1".to_string(),
                context: ConversationContext::ProductInquiry,
                product_id: Some("P1".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_context_roundtrip() {
        for ctx in [
            ConversationContext::ProductInquiry,
            ConversationContext::OrderSupport,
            ConversationContext::General,
            ConversationContext::Dispute,
        ] {
            let parsed: ConversationContext = ctx.to_string().parse().unwrap();
            assert_eq!(parsed, ctx);
        }
    }

    #[test]
    fn test_status_serde_and_terminal() {
        let json = serde_json::to_string(&ConversationStatus::Flagged).unwrap();
        assert_eq!(json, "\"flagged\"");
        assert!(ConversationStatus::Closed.is_terminal());
        assert!(!ConversationStatus::Archived.is_terminal());
        assert!("deleted".parse::<ConversationStatus>().is_err());
    }

    #[test]
    fn test_new_conversation_defaults() {
        let conv = sample();
        assert_eq!(conv.status, ConversationStatus::Active);
        assert_eq!(conv.unread_count_buyer, 0);
        assert_eq!(conv.unread_count_vendor, 0);
        assert!(conv.last_message_id.is_none());
        assert_eq!(conv.created_at, conv.updated_at);
    }

    #[test]
    fn test_party_of_scopes_by_role() {
        let conv = sample();
        assert_eq!(conv.party_of(&Caller::buyer("buyer-1")), Some(Party::Buyer));
        assert_eq!(conv.party_of(&Caller::vendor("vendor-1")), Some(Party::Vendor));
        // Right id, wrong role.
        assert_eq!(conv.party_of(&Caller::vendor("buyer-1")), None);
        assert_eq!(conv.party_of(&Caller::admin("buyer-1")), None);
        assert!(conv.is_visible_to(&Caller::admin("mod-1")));
        assert!(!conv.is_visible_to(&Caller::buyer("someone-else")));
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut conv = sample();
        let patch = ConversationPatch {
            is_muted_vendor: Some(true),
            moderator_notes: Some("looked fine".to_string()),
            ..Default::default()
        };
        patch.apply(&mut conv);
        assert!(conv.is_muted_vendor);
        assert!(!conv.is_muted_buyer);
        assert_eq!(conv.moderator_notes.as_deref(), Some("looked fine"));
        assert_eq!(conv.status, ConversationStatus::Active);
    }

    #[test]
    fn test_side_patches() {
        let patch = ConversationPatch::pinned(Party::Vendor, true);
        assert_eq!(patch.is_pinned_vendor, Some(true));
        assert!(patch.is_pinned_buyer.is_none());
        assert!(!patch.is_empty());
        assert!(ConversationPatch::default().is_empty());
    }

    #[test]
    fn test_key_ignores_dispute_link() {
        let mut conv = sample();
        let key = conv.key();
        conv.dispute_id = Some("D1".to_string());
        assert_eq!(conv.key(), key);
    }
}
