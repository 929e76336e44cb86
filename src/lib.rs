//! swapsync - realtime synchronization core of the swap marketplace client
//!
//! Keeps locally cached projections of backend rows (items, swaps, wishlist,
//! notifications, profile) consistent with the hosted backend: row change
//! feeds become in-process change topics, views re-fetch after a debounce,
//! and user actions are applied optimistically and rolled back on failure.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
