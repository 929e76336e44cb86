//! Notifications: rows, the merged local feed, and display text.

mod feed;
mod format;
mod notification;

pub use feed::{NotificationFeed, DEFAULT_FEED_LIMIT};
pub use format::{describe, NotificationText, SwapMeta};
pub use notification::{Notification, NotificationType};
