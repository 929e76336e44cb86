//! Application layer - sync machinery and screen views.
//!
//! `sync` holds the reusable primitives (debounce, optimistic update,
//! realtime bridge); `views` builds the screens on top of them and the
//! ports bundled in [`Services`].

mod context;
mod services;
pub mod sync;
pub mod views;

pub use context::AppContext;
pub use services::{Services, SyncSettings};
