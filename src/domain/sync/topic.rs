//! Change topics carried on the in-process event bus.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of "something changed" signals.
///
/// Topics carry no payload; subscribers re-fetch authoritative state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeTopic {
    #[serde(rename = "items:changed")]
    ItemsChanged,
    #[serde(rename = "wishlist:changed")]
    WishlistChanged,
    #[serde(rename = "swaps:changed")]
    SwapsChanged,
    #[serde(rename = "profile:changed")]
    ProfileChanged,
    #[serde(rename = "notifications:changed")]
    NotificationsChanged,
}

impl ChangeTopic {
    /// Every topic, in declaration order.
    pub const ALL: [ChangeTopic; 5] = [
        ChangeTopic::ItemsChanged,
        ChangeTopic::WishlistChanged,
        ChangeTopic::SwapsChanged,
        ChangeTopic::ProfileChanged,
        ChangeTopic::NotificationsChanged,
    ];

    /// Wire name, e.g. `swaps:changed`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeTopic::ItemsChanged => "items:changed",
            ChangeTopic::WishlistChanged => "wishlist:changed",
            ChangeTopic::SwapsChanged => "swaps:changed",
            ChangeTopic::ProfileChanged => "profile:changed",
            ChangeTopic::NotificationsChanged => "notifications:changed",
        }
    }
}

impl fmt::Display for ChangeTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_wire_names() {
        assert_eq!(ChangeTopic::SwapsChanged.to_string(), "swaps:changed");
        assert_eq!(
            ChangeTopic::NotificationsChanged.to_string(),
            "notifications:changed"
        );
    }

    #[test]
    fn serde_matches_display() {
        for topic in ChangeTopic::ALL {
            let json = serde_json::to_string(&topic).unwrap();
            assert_eq!(json, format!("\"{}\"", topic.as_str()));
        }
    }
}
