//! Synchronization vocabulary shared by the bus, the bridge and the views.

mod error;
mod topic;

pub use error::SyncError;
pub use topic::ChangeTopic;
