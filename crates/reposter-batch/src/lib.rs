//! Daily batch lifecycle for Reposter.
//!
//! - [`Selector`] picks eligible references (all minus used) at random
//! - [`Materializer`] fetches a day's selection and commits it as that day's queue
//! - [`Drainer`] publishes the head of a day's queue, one entry per call
//!
//! Fetching and publishing go through the [`Fetcher`] and [`Publisher`]
//! traits; nothing here knows about a concrete platform.

mod collaborator;
mod drainer;
mod error;
mod materializer;
mod selector;

pub use collaborator::{FetchedMedia, Fetcher, Publisher};
pub use drainer::{DrainOutcome, Drainer};
pub use error::{BatchError, FetchError, PublishError};
pub use materializer::Materializer;
pub use selector::{Selector, available, select};
