//! Human-readable rendering of notifications.

use crate::domain::item::ItemSummary;

use super::{Notification, NotificationType};

/// Items referenced by the swap behind a notification, when already loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapMeta {
    pub requested: Option<ItemSummary>,
    pub offered: Option<ItemSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationText {
    pub title: String,
    pub body: String,
    pub thumbnail: Option<String>,
}

fn title_of(item: Option<&ItemSummary>) -> Option<&str> {
    item.and_then(|i| i.title.as_deref())
}

fn image_of(item: Option<&ItemSummary>) -> Option<String> {
    item.and_then(|i| i.image_url.clone())
}

pub fn describe(notification: &Notification, meta: Option<&SwapMeta>) -> NotificationText {
    let requested = meta.and_then(|m| m.requested.as_ref());
    let offered = meta.and_then(|m| m.offered.as_ref());

    match notification.kind {
        NotificationType::TradeOffered => {
            let body = if title_of(offered).is_some() || title_of(requested).is_some() {
                format!(
                    "{} → {}",
                    title_of(offered).unwrap_or("Their item"),
                    title_of(requested).unwrap_or("your item")
                )
            } else {
                "Tap to view the offer".to_string()
            };
            NotificationText {
                title: "New trade offer".to_string(),
                body,
                thumbnail: image_of(offered),
            }
        }
        NotificationType::TradeAccepted => NotificationText {
            title: "Trade accepted".to_string(),
            body: title_of(requested)
                .map(|t| format!("Accepted: {t}"))
                .unwrap_or_else(|| "Your offer was accepted".to_string()),
            thumbnail: image_of(requested),
        },
        NotificationType::TradeDeclined => NotificationText {
            title: "Trade declined".to_string(),
            body: title_of(requested)
                .map(|t| format!("Declined: {t}"))
                .unwrap_or_else(|| "Your offer was declined".to_string()),
            thumbnail: image_of(requested),
        },
        NotificationType::Other => NotificationText {
            title: "Update".to_string(),
            body: "Open details".to_string(),
            thumbnail: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ItemId, NotificationId, Timestamp, UserId};
    use serde_json::Value as JsonValue;

    fn note(kind: NotificationType) -> Notification {
        Notification {
            id: NotificationId::new(),
            user_id: UserId::new("u").unwrap(),
            kind,
            payload: JsonValue::Null,
            is_read: false,
            created_at: Timestamp::now(),
        }
    }

    fn summary(title: &str) -> ItemSummary {
        ItemSummary {
            id: ItemId::new(),
            title: Some(title.to_string()),
            image_url: Some(format!("https://cdn/{title}.jpg")),
        }
    }

    #[test]
    fn offer_without_meta_uses_fallback_body() {
        let text = describe(&note(NotificationType::TradeOffered), None);
        assert_eq!(text.title, "New trade offer");
        assert_eq!(text.body, "Tap to view the offer");
    }

    #[test]
    fn offer_with_partial_meta_fills_placeholders() {
        let meta = SwapMeta {
            requested: Some(summary("Lamp")),
            offered: None,
        };
        let text = describe(&note(NotificationType::TradeOffered), Some(&meta));
        assert_eq!(text.body, "Their item → Lamp");
        assert_eq!(text.thumbnail, None);
    }

    #[test]
    fn accepted_mentions_requested_item() {
        let meta = SwapMeta {
            requested: Some(summary("Boots")),
            offered: Some(summary("Hat")),
        };
        let text = describe(&note(NotificationType::TradeAccepted), Some(&meta));
        assert_eq!(text.body, "Accepted: Boots");
        assert_eq!(text.thumbnail.as_deref(), Some("https://cdn/Boots.jpg"));
    }

    #[test]
    fn unknown_type_is_generic() {
        let text = describe(&note(NotificationType::Other), None);
        assert_eq!(text.title, "Update");
    }
}
