//! Swap proposals and their lifecycle state machine.

mod status;
mod swap;

pub use status::SwapStatus;
pub use swap::{NewSwap, Swap, SwapAction, SwapRole, SwapWithItems};
