//! Session ownership
//!
//! - `store`: the one live signer session and its lifecycle flags
//! - `durable`: persistence for the "was connected" flag

pub mod durable;
pub mod store;

pub use durable::{FileFlagStore, FlagStore, MemoryFlagStore, StoreError};
pub use store::{ConnectingGuard, Lifecycle, SessionStore};
