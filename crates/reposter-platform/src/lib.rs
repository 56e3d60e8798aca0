//! HTTP collaborators for Reposter.
//!
//! [`MediaResolver`] turns a post reference into a downloaded video and its
//! caption. [`PlatformClient`] authenticates and publishes clips. They
//! implement the `Fetcher` and `Publisher` traits from `reposter-batch`.

mod client;
mod error;
mod resolver;
mod types;

pub use client::PlatformClient;
pub use error::PlatformError;
pub use resolver::{MediaResolver, shortcode};
pub use types::{DEFAULT_CAPTION, PostMetadata, Session};
