//! External collaborator abstractions for Vigil.
//!
//! The session layer talks to the outside world through two narrow seams:
//!
//! - [`KeyValueStore`]: where credentials and session timestamps live
//!   between reloads, shared by every running instance (browser tab,
//!   process) of the console. Ships with [`MemoryStore`] and [`FileStore`].
//! - [`RefreshEndpoint`]: the auth server's token refresh call. Ships
//!   with [`HttpRefreshEndpoint`] behind the `http` feature.
//!
//! # Feature Flags
//!
//! - `http` (default): [`HttpRefreshEndpoint`] via `reqwest`

#![allow(async_fn_in_trait)]

mod error;
mod file;
#[cfg(feature = "http")]
mod http;
mod keys;
mod memory;
mod refresh;
mod store;

pub use error::{RefreshError, StoreError};
pub use file::FileStore;
#[cfg(feature = "http")]
pub use http::HttpRefreshEndpoint;
pub use keys::StorageKey;
pub use memory::MemoryStore;
pub use refresh::{RefreshEndpoint, RefreshRequest, RefreshResponse};
pub use store::{InstanceId, KeyValueStore, StoreChange, StoreWatcher};
