//! In-memory adapters for tests and offline runs.
//!
//! - `backend` - every table repository, with the backend's guards
//! - `realtime` - scriptable change feed the backend publishes into
//! - `auth`, `storage`, `prompts` - auth, uploads and scripted confirmations

mod auth;
mod backend;
mod prompts;
mod realtime;
mod storage;

pub use auth::InMemoryAuth;
pub use backend::InMemoryBackend;
pub use prompts::ScriptedConfirm;
pub use realtime::InMemoryRealtime;
pub use storage::{InMemoryStorage, StoredObject};
