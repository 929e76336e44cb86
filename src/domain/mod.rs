//! Domain layer containing marketplace entities and sync vocabulary.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, timestamps, errors, lifecycle traits)
//! - `sync` - Change topics and the user-facing error taxonomy
//! - `item` - Listed items and their soft-delete lifecycle
//! - `swap` - Trade proposals and the pending/resolved state machine
//! - `wishlist` - Per-user wishlist rows
//! - `notification` - Notification rows and the merged local feed
//! - `profile` - User profiles

pub mod foundation;
pub mod item;
pub mod notification;
pub mod profile;
pub mod swap;
pub mod sync;
pub mod wishlist;
