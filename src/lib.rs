//! Async client for the unofficial Remini image-enhancement API.
//!
//! Handles the full pipeline: authenticating a session (with an on-disk
//! token cache), uploading an image, polling the job until it completes,
//! and downloading the processed result.
//!
//! ```no_run
//! use remini::{Remini, Style};
//!
//! #[tokio::main]
//! async fn main() -> remini::Result<()> {
//!     let client = Remini::new()?;
//!
//!     // Standard enhancement
//!     client.process("photo.jpg", "photo_enhanced.jpg").await?;
//!
//!     // Stylization
//!     client.stylize("photo.jpg", Style::Toon, "photo_toon.jpg").await?;
//!     Ok(())
//! }
//! ```
//!
//! Every failure is catchable as [`ReminiError`]; match on its variants
//! for fine-grained handling. The remote protocol is undocumented and
//! unversioned — the headers it accepts live in
//! [`auth::AppFingerprint`] as configuration so they can be updated
//! without touching the pipeline.

mod api;
pub mod auth;
mod client;
pub mod config;
mod error;
pub mod models;

pub use client::Remini;
pub use config::{PollConfig, ReminiConfig, RetryPolicy};
pub use error::{ReminiError, Result, TransportCause};
pub use models::task::{JobStatus, ProcessOptions};
pub use models::Style;
