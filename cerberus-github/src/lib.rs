//! Cerberus GitHub - PR state and comment surface for the Cerberus gate
//!
//! The core pipeline depends only on plain snapshot values; this crate is
//! the capability layer that fills them in from the GitHub API and writes
//! the idempotent marker comments back.

pub mod client;
pub mod comments;
pub mod error;
pub mod review;
pub mod snapshot;

pub use client::GitHubClient;
pub use error::{Error, Result};
pub use snapshot::PrSnapshot;
