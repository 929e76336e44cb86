//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the sync layer and the hosted backend. Adapters implement these ports.
//!
//! ## Change Ports
//!
//! - `ChangePublisher` / `ChangeSubscriber` - In-process change bus
//! - `RealtimeTransport` / `RealtimeChannel` - Backend row change feeds
//!
//! ## Backend Ports
//!
//! - `AuthProvider` - Session lifecycle
//! - `ItemRepository`, `SwapRepository`, `WishlistRepository`,
//!   `NotificationRepository`, `ProfileRepository` - Table access
//! - `ObjectStorage` - Avatar and photo uploads
//!
//! ## Device Ports
//!
//! - `ConfirmationPrompt` - Two-button dialogs before destructive actions
//! - `PushTokenProvider` - Push permission and device token

mod auth_provider;
mod change_bus;
mod confirmation;
mod item_repository;
mod notification_repository;
mod object_storage;
mod profile_repository;
mod push_token_provider;
mod realtime;
mod swap_repository;
mod wishlist_repository;

pub use auth_provider::{AuthProvider, AuthSession, Credentials};
pub use change_bus::{ChangeHandler, ChangePublisher, ChangeSubscriber, Subscription};
pub use confirmation::{ConfirmRequest, ConfirmationPrompt};
pub use item_repository::{ItemQuery, ItemRepository, ItemSort};
pub use notification_repository::NotificationRepository;
pub use object_storage::ObjectStorage;
pub use profile_repository::ProfileRepository;
pub use push_token_provider::PushTokenProvider;
pub use realtime::{
    ChangeKind, ChangeSubscription, ChannelEvent, ChannelStatus, ColumnFilter, RealtimeChannel,
    RealtimeTransport, RowChange, Table,
};
pub use swap_repository::SwapRepository;
pub use wishlist_repository::WishlistRepository;
