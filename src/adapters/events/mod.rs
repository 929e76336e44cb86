//! Change bus adapters.
//!
//! - `InProcessEventBus` - Synchronous in-process fan-out, the only bus the
//!   client needs since change topics never leave the process

mod in_process;

pub use in_process::InProcessEventBus;
