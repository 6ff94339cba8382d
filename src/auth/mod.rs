//! Authentication: client fingerprint, handshake, and token caching.
//!
//! This module provides:
//! - `AppFingerprint` / `DeviceIds`: the accepted-client identity the
//!   service requires on every request
//! - `Authenticator`: the `/setup` handshake that yields a token
//! - `TokenStore` and its file/memory implementations
//!
//! Tokens are persisted to scratch storage and reused across processes
//! until they near their assumed expiry.

pub mod fingerprint;
pub(crate) mod handshake;
pub mod token;

pub use fingerprint::{AppFingerprint, DeviceIds};
pub(crate) use handshake::Authenticator;
pub use token::{FileTokenStore, MemoryTokenStore, SessionToken, TokenStore};
