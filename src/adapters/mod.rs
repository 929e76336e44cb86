//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the sync layer to external systems:
//! - `events` - In-process change bus
//! - `supabase` - Hosted backend over HTTP and websocket
//! - `headless` - Fixed host-shell answers for runs without a UI
//! - `memory` - In-memory implementations of every port

pub mod events;
pub mod headless;
pub mod memory;
pub mod supabase;

pub use events::InProcessEventBus;
