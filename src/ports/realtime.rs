//! Realtime ports - row change feeds pushed by the backend.
//!
//! A transport opens named channels, each carrying a set of table
//! subscriptions. A channel yields row changes and status transitions; the
//! consumer decides what to do with either.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::sync::ChangeTopic;

/// Backend tables the client listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Items,
    Swaps,
    Wishlist,
    Profiles,
    Notifications,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Items => "items",
            Table::Swaps => "swaps",
            Table::Wishlist => "wishlist",
            Table::Profiles => "profiles",
            Table::Notifications => "notifications",
        }
    }

    pub fn parse(name: &str) -> Option<Table> {
        match name {
            "items" => Some(Table::Items),
            "swaps" => Some(Table::Swaps),
            "wishlist" => Some(Table::Wishlist),
            "profiles" => Some(Table::Profiles),
            "notifications" => Some(Table::Notifications),
            _ => None,
        }
    }

    /// Bus topic announced when a row of this table changes.
    pub fn topic(&self) -> ChangeTopic {
        match self {
            Table::Items => ChangeTopic::ItemsChanged,
            Table::Swaps => ChangeTopic::SwapsChanged,
            Table::Wishlist => ChangeTopic::WishlistChanged,
            Table::Profiles => ChangeTopic::ProfileChanged,
            Table::Notifications => ChangeTopic::NotificationsChanged,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(name: &str) -> Option<ChangeKind> {
        match name.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// Server-side equality filter, rendered as `column=eq.value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnFilter {
    pub column: String,
    pub value: String,
}

impl ColumnFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &JsonValue) -> bool {
        match row.get(&self.column) {
            Some(JsonValue::String(s)) => s == &self.value,
            Some(other) if !other.is_null() => other.to_string() == self.value,
            _ => false,
        }
    }
}

impl fmt::Display for ColumnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// One table listener on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeSubscription {
    pub table: Table,
    pub filter: Option<ColumnFilter>,
}

impl ChangeSubscription {
    /// Every change on the table.
    pub fn all(table: Table) -> Self {
        Self {
            table,
            filter: None,
        }
    }

    pub fn eq(table: Table, column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            table,
            filter: Some(ColumnFilter::eq(column, value)),
        }
    }

    /// True when the change belongs to this subscription. Deletes are
    /// checked against the old row.
    pub fn matches(&self, change: &RowChange) -> bool {
        if change.table != self.table {
            return false;
        }
        match &self.filter {
            None => true,
            Some(filter) => change.row().map(|row| filter.matches(row)).unwrap_or(false),
        }
    }
}

/// A single row mutation as delivered by the change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub table: Table,
    pub kind: ChangeKind,
    pub new: Option<JsonValue>,
    pub old: Option<JsonValue>,
    pub commit_timestamp: Option<Timestamp>,
}

impl RowChange {
    /// The new row if present and non-empty, otherwise the old row.
    pub fn row(&self) -> Option<&JsonValue> {
        let non_empty = |v: &&JsonValue| match v {
            JsonValue::Object(map) => !map.is_empty(),
            JsonValue::Null => false,
            _ => true,
        };
        self.new
            .as_ref()
            .filter(non_empty)
            .or_else(|| self.old.as_ref().filter(non_empty))
    }

    /// Primary key of the affected row, when present.
    pub fn row_id(&self) -> Option<String> {
        self.row()?.get("id").and_then(|id| match id {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Null => None,
            other => Some(other.to_string()),
        })
    }

    /// String value of `column` on the new-or-old row.
    pub fn column(&self, column: &str) -> Option<&str> {
        self.row()?.get(column)?.as_str()
    }
}

/// Channel status as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    Subscribed,
    TimedOut,
    ChannelError,
    Closed,
}

impl ChannelStatus {
    /// Statuses after which the channel must be re-joined.
    pub fn needs_resubscribe(&self) -> bool {
        !matches!(self, ChannelStatus::Subscribed)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelStatus::Subscribed => "SUBSCRIBED",
            ChannelStatus::TimedOut => "TIMED_OUT",
            ChannelStatus::ChannelError => "CHANNEL_ERROR",
            ChannelStatus::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A change matched subscription `subscription` (index into the list
    /// the channel was opened with).
    Change {
        subscription: usize,
        change: RowChange,
    },
    Status(ChannelStatus),
}

/// An open realtime channel.
#[async_trait]
pub trait RealtimeChannel: Send {
    fn name(&self) -> &str;

    fn is_joined(&self) -> bool;

    /// Next change or status transition.
    ///
    /// Returns `None` once the channel has been closed for good. While the
    /// channel is not joined and has nothing buffered, this stays pending
    /// rather than spinning.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Re-joins with the original subscriptions, reconnecting the
    /// underlying socket if needed.
    async fn resubscribe(&mut self) -> Result<(), DomainError>;

    async fn close(&mut self);
}

/// Factory for realtime channels.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Access token used for subsequent joins (row level security).
    async fn set_auth(&self, access_token: &str);

    async fn open_channel(
        &self,
        name: &str,
        subscriptions: Vec<ChangeSubscription>,
    ) -> Result<Box<dyn RealtimeChannel>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(table: Table, kind: ChangeKind, new: JsonValue, old: JsonValue) -> RowChange {
        RowChange {
            table,
            kind,
            new: Some(new),
            old: Some(old),
            commit_timestamp: None,
        }
    }

    #[test]
    fn delete_matches_on_old_row() {
        let sub = ChangeSubscription::eq(Table::Wishlist, "user_id", "u-1");
        let deleted = change(
            Table::Wishlist,
            ChangeKind::Delete,
            json!({}),
            json!({ "id": "w-1", "user_id": "u-1" }),
        );

        assert!(sub.matches(&deleted));
        assert_eq!(deleted.row_id().as_deref(), Some("w-1"));
    }

    #[test]
    fn filter_rejects_other_users_and_tables() {
        let sub = ChangeSubscription::eq(Table::Swaps, "receiver_id", "u-1");
        let other_user = change(
            Table::Swaps,
            ChangeKind::Insert,
            json!({ "id": "s", "receiver_id": "u-2" }),
            JsonValue::Null,
        );
        let other_table = change(
            Table::Items,
            ChangeKind::Insert,
            json!({ "id": "i", "receiver_id": "u-1" }),
            JsonValue::Null,
        );

        assert!(!sub.matches(&other_user));
        assert!(!sub.matches(&other_table));
        assert!(ChangeSubscription::all(Table::Swaps).matches(&other_user));
    }

    #[test]
    fn filter_renders_postgrest_syntax() {
        assert_eq!(
            ColumnFilter::eq("sender_id", "abc").to_string(),
            "sender_id=eq.abc"
        );
    }

    #[test]
    fn tables_map_to_topics() {
        assert_eq!(Table::Wishlist.topic(), ChangeTopic::WishlistChanged);
        assert_eq!(Table::parse("profiles"), Some(Table::Profiles));
        assert_eq!(Table::parse("nope"), None);
        assert_eq!(ChangeKind::parse("update"), Some(ChangeKind::Update));
    }

    #[test]
    fn only_subscribed_is_healthy() {
        assert!(!ChannelStatus::Subscribed.needs_resubscribe());
        assert!(ChannelStatus::TimedOut.needs_resubscribe());
        assert!(ChannelStatus::Closed.needs_resubscribe());
    }
}
