//! Notification rows written by backend triggers on swap changes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::{NotificationId, SwapId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TradeOffered,
    TradeAccepted,
    TradeDeclined,
    /// Types added server-side that this client does not know yet.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Structured payload; rows written as stringified JSON are decoded.
    #[serde(default, deserialize_with = "coerce_payload")]
    pub payload: JsonValue,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_read: bool,
    pub created_at: Timestamp,
}

impl Notification {
    /// Parses a raw row as delivered by the table API or the change feed.
    pub fn from_row(row: &JsonValue) -> Result<Self, serde_json::Error> {
        Notification::deserialize(row)
    }

    /// The swap this notification refers to, under either key spelling.
    pub fn swap_id(&self) -> Option<SwapId> {
        ["swap_id", "swapId"]
            .iter()
            .filter_map(|key| self.payload.get(*key))
            .filter_map(JsonValue::as_str)
            .find_map(|s| s.parse().ok())
    }
}

fn coerce_payload<'de, D>(deserializer: D) -> Result<JsonValue, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<JsonValue>::deserialize(deserializer)?.unwrap_or(JsonValue::Null);
    Ok(match raw {
        JsonValue::String(s) => serde_json::from_str(&s).unwrap_or(JsonValue::String(s)),
        other => other,
    })
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(payload: JsonValue) -> JsonValue {
        json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "user_id": "u-1",
            "type": "trade_offered",
            "payload": payload,
            "is_read": null,
            "created_at": "2024-05-01T10:00:00+00:00"
        })
    }

    #[test]
    fn stringified_payload_is_decoded() {
        let n = Notification::from_row(&row(json!(
            "{\"swap_id\":\"550e8400-e29b-41d4-a716-446655440009\"}"
        )))
        .unwrap();
        assert!(n.payload.is_object());
        assert_eq!(
            n.swap_id().map(|id| id.to_string()).as_deref(),
            Some("550e8400-e29b-41d4-a716-446655440009")
        );
    }

    #[test]
    fn non_json_string_payload_is_kept_verbatim() {
        let n = Notification::from_row(&row(json!("hello"))).unwrap();
        assert_eq!(n.payload, json!("hello"));
        assert_eq!(n.swap_id(), None);
    }

    #[test]
    fn camel_case_swap_id_is_accepted() {
        let n = Notification::from_row(&row(json!({
            "swapId": "550e8400-e29b-41d4-a716-446655440009"
        })))
        .unwrap();
        assert!(n.swap_id().is_some());
    }

    #[test]
    fn null_is_read_means_unread() {
        let n = Notification::from_row(&row(JsonValue::Null)).unwrap();
        assert!(!n.is_read);
        assert_eq!(n.payload, JsonValue::Null);
    }

    #[test]
    fn unknown_type_maps_to_other() {
        let mut r = row(JsonValue::Null);
        r["type"] = json!("rating_received");
        let n = Notification::from_row(&r).unwrap();
        assert_eq!(n.kind, NotificationType::Other);
    }
}
