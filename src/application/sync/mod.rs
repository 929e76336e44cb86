//! Client-side synchronization primitives.
//!
//! - `debounce` - Trailing-edge refresh coalescing and bus wiring
//! - `optimistic` - Apply, write remotely, roll back on failure
//! - `realtime_bridge` - Backend row changes to bus topics
//! - `lifecycle` - Foreground/background signal from the host shell
//! - `session_refresh` - Access token refresh ahead of expiry

mod channel;
mod debounce;
mod lifecycle;
mod optimistic;
mod realtime_bridge;
mod session_refresh;

pub(crate) use channel::{supervise, ChannelGuard, SupervisorConfig};
pub use debounce::{Debouncer, RefetchOnChange};
pub use lifecycle::{AppLifecycle, LifecycleSignal};
pub use optimistic::perform_optimistic_update;
pub use realtime_bridge::{
    user_channel_name, user_routes, BridgeRoute, RealtimeBridge, RealtimeBridgeConfig,
    DEFAULT_DEDUP_WINDOW,
};
pub use session_refresh::SessionRefresher;
