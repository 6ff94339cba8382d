//! HTTP layer: transport with retry, authenticated task client,
//! status polling, and result download.

pub(crate) mod client;
pub(crate) mod download;
pub(crate) mod poll;
pub(crate) mod transport;

pub(crate) use client::{ApiClient, ImagePayload};
pub(crate) use transport::Transport;
