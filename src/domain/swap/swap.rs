//! Swap (trade proposal) entity and the role-gated actions on it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{
    DomainError, ErrorCode, ItemId, StateMachine, SwapId, Timestamp, UserId, ValidationError,
};
use crate::domain::item::ItemSummary;

use super::SwapStatus;

const MAX_MESSAGE_LEN: usize = 500;

/// Which side of a swap a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapRole {
    Sender,
    Receiver,
}

impl SwapRole {
    /// Column the guarded update filters on for this role.
    pub fn column(&self) -> &'static str {
        match self {
            SwapRole::Sender => "sender_id",
            SwapRole::Receiver => "receiver_id",
        }
    }
}

/// A state-changing action a participant can take on a pending swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapAction {
    Accept,
    Decline,
    Cancel,
}

impl SwapAction {
    /// Only the receiver accepts or declines; only the sender cancels.
    pub fn required_role(&self) -> SwapRole {
        match self {
            SwapAction::Accept | SwapAction::Decline => SwapRole::Receiver,
            SwapAction::Cancel => SwapRole::Sender,
        }
    }

    pub fn target_status(&self) -> SwapStatus {
        match self {
            SwapAction::Accept => SwapStatus::Accepted,
            SwapAction::Decline => SwapStatus::Declined,
            SwapAction::Cancel => SwapStatus::Canceled,
        }
    }

    pub fn prompt_title(&self) -> &'static str {
        match self {
            SwapAction::Accept => "Confirm trade?",
            SwapAction::Decline => "Deny trade?",
            SwapAction::Cancel => "Cancel offer?",
        }
    }

    pub fn prompt_message(&self) -> &'static str {
        match self {
            SwapAction::Accept => "This will accept the trade.",
            SwapAction::Decline => "This will reject the trade.",
            SwapAction::Cancel => "This will withdraw your offer.",
        }
    }

    pub fn confirm_label(&self) -> &'static str {
        match self {
            SwapAction::Accept => "Confirm",
            SwapAction::Decline => "Deny",
            SwapAction::Cancel => "Cancel offer",
        }
    }
}

impl fmt::Display for SwapAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwapAction::Accept => "accept",
            SwapAction::Decline => "decline",
            SwapAction::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// A trade proposal between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swap {
    pub id: SwapId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// The receiver's item the sender wants.
    #[serde(rename = "item_id")]
    pub requested_item_id: ItemId,
    /// The sender's item put up in exchange.
    #[serde(default)]
    pub offered_item_id: Option<ItemId>,
    #[serde(default)]
    pub message: Option<String>,
    pub status: SwapStatus,
    pub created_at: Timestamp,
}

impl Swap {
    pub fn role_of(&self, user_id: &UserId) -> Option<SwapRole> {
        if &self.receiver_id == user_id {
            Some(SwapRole::Receiver)
        } else if &self.sender_id == user_id {
            Some(SwapRole::Sender)
        } else {
            None
        }
    }

    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.role_of(user_id).is_some()
    }

    /// The other participant, from `user_id`'s point of view.
    pub fn counterparty(&self, user_id: &UserId) -> Option<&UserId> {
        match self.role_of(user_id)? {
            SwapRole::Sender => Some(&self.receiver_id),
            SwapRole::Receiver => Some(&self.sender_id),
        }
    }

    /// Client-side precondition for `action` by `actor`.
    ///
    /// Returns the target status on success. The backend guard enforces the
    /// same predicate; this check only produces a better message up front.
    pub fn check_action(&self, actor: &UserId, action: SwapAction) -> Result<SwapStatus, DomainError> {
        let required = action.required_role();
        let actual_column = match required {
            SwapRole::Receiver => &self.receiver_id,
            SwapRole::Sender => &self.sender_id,
        };
        if actual_column != actor {
            return Err(DomainError::new(
                ErrorCode::Forbidden,
                format!("Only the {} can {} this trade", role_name(required), action),
            )
            .with_detail("swap_id", self.id.to_string()));
        }
        self.status.transition_to(action.target_status())
    }

    /// True when both the role and the status allow `action`.
    pub fn allows(&self, actor: &UserId, action: SwapAction) -> bool {
        self.check_action(actor, action).is_ok()
    }
}

fn role_name(role: SwapRole) -> &'static str {
    match role {
        SwapRole::Sender => "sender",
        SwapRole::Receiver => "receiver",
    }
}

/// A swap together with the items it references, as rendered in lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapWithItems {
    #[serde(flatten)]
    pub swap: Swap,
    #[serde(default)]
    pub requested: Option<ItemSummary>,
    #[serde(default)]
    pub offered: Option<ItemSummary>,
}

impl SwapWithItems {
    pub fn bare(swap: Swap) -> Self {
        Self {
            swap,
            requested: None,
            offered: None,
        }
    }
}

/// Insert payload for a new proposal. Always starts pending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSwap {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(rename = "item_id")]
    pub requested_item_id: ItemId,
    pub offered_item_id: Option<ItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: SwapStatus,
}

impl NewSwap {
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        requested_item_id: ItemId,
        offered_item_id: Option<ItemId>,
        message: Option<String>,
    ) -> Result<Self, ValidationError> {
        if sender_id == receiver_id {
            return Err(ValidationError::invalid_format(
                "receiver_id",
                "cannot send an offer on your own item",
            ));
        }
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        if let Some(m) = &message {
            let len = m.chars().count();
            if len > MAX_MESSAGE_LEN {
                return Err(ValidationError::too_long("message", MAX_MESSAGE_LEN, len));
            }
        }
        Ok(Self {
            sender_id,
            receiver_id,
            requested_item_id,
            offered_item_id,
            message,
            status: SwapStatus::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn swap(status: SwapStatus) -> Swap {
        Swap {
            id: SwapId::new(),
            sender_id: user("alice"),
            receiver_id: user("bob"),
            requested_item_id: ItemId::new(),
            offered_item_id: Some(ItemId::new()),
            message: None,
            status,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn receiver_may_accept_pending_swap() {
        let s = swap(SwapStatus::Pending);
        assert_eq!(
            s.check_action(&user("bob"), SwapAction::Accept),
            Ok(SwapStatus::Accepted)
        );
    }

    #[test]
    fn sender_may_not_accept() {
        let err = swap(SwapStatus::Pending)
            .check_action(&user("alice"), SwapAction::Accept)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[test]
    fn receiver_may_not_cancel() {
        let err = swap(SwapStatus::Pending)
            .check_action(&user("bob"), SwapAction::Cancel)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[test]
    fn resolved_swap_rejects_transition() {
        let err = swap(SwapStatus::Declined)
            .check_action(&user("bob"), SwapAction::Accept)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
    }

    #[test]
    fn counterparty_is_the_other_side() {
        let s = swap(SwapStatus::Pending);
        assert_eq!(s.counterparty(&user("alice")), Some(&user("bob")));
        assert_eq!(s.counterparty(&user("bob")), Some(&user("alice")));
        assert_eq!(s.counterparty(&user("carol")), None);
    }

    #[test]
    fn deserializes_row_with_embedded_items() {
        let row = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "sender_id": "alice",
            "receiver_id": "bob",
            "item_id": "550e8400-e29b-41d4-a716-446655440001",
            "offered_item_id": null,
            "message": "Interested?",
            "status": "pending",
            "created_at": "2024-05-01T10:00:00+00:00",
            "requested": { "id": "550e8400-e29b-41d4-a716-446655440001", "title": "Lamp", "image_url": null },
            "offered": null
        });

        let row: SwapWithItems = serde_json::from_value(row).unwrap();
        assert_eq!(row.swap.status, SwapStatus::Pending);
        assert_eq!(row.requested.unwrap().title.as_deref(), Some("Lamp"));
        assert!(row.offered.is_none());
    }

    #[test]
    fn new_swap_rejects_self_offer() {
        let result = NewSwap::new(user("a"), user("a"), ItemId::new(), None, None);
        assert!(result.is_err());
    }

    #[test]
    fn new_swap_drops_blank_message() {
        let new = NewSwap::new(user("a"), user("b"), ItemId::new(), None, Some("  ".into())).unwrap();
        assert_eq!(new.message, None);
        assert_eq!(new.status, SwapStatus::Pending);
    }

    fn any_status() -> impl Strategy<Value = SwapStatus> {
        prop_oneof![
            Just(SwapStatus::Pending),
            Just(SwapStatus::Accepted),
            Just(SwapStatus::Declined),
            Just(SwapStatus::Canceled),
        ]
    }

    fn any_action() -> impl Strategy<Value = SwapAction> {
        prop_oneof![
            Just(SwapAction::Accept),
            Just(SwapAction::Decline),
            Just(SwapAction::Cancel),
        ]
    }

    proptest! {
        #[test]
        fn action_allowed_iff_pending_and_role_matches(
            status in any_status(),
            action in any_action(),
            actor_is_sender in any::<bool>(),
        ) {
            let s = swap(status);
            let actor = if actor_is_sender { user("alice") } else { user("bob") };
            let role_ok = match action.required_role() {
                SwapRole::Sender => actor_is_sender,
                SwapRole::Receiver => !actor_is_sender,
            };
            prop_assert_eq!(s.allows(&actor, action), role_ok && status.is_pending());
        }
    }
}
