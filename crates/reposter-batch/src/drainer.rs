//! Upload draining.

use chrono::{NaiveDate, NaiveDateTime};
use reposter_store::RecordStore;
use tokio::fs;
use tracing::{info, warn};

use crate::{BatchError, PublishError, Publisher};

/// What a single drain call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// No queue for the date, or nothing left in it.
    Empty,
    /// The head entry was published and removed.
    Published { reference: String, remaining: usize },
    /// Publishing failed; the entry is back at the front of the queue.
    Requeued {
        reference: String,
        error: PublishError,
    },
}

/// Publishes the head of a day's queue.
pub struct Drainer<'a> {
    store: &'a RecordStore,
    publisher: &'a dyn Publisher,
}

impl<'a> Drainer<'a> {
    pub fn new(store: &'a RecordStore, publisher: &'a dyn Publisher) -> Self {
        Self { store, publisher }
    }

    /// Process exactly one entry of `date`'s queue.
    ///
    /// On success the ledger row is stamped with `now`, the media file is
    /// deleted and the queue is persisted without the entry. On failure the
    /// entry is put back at the front and retried on the next call.
    #[tracing::instrument(skip(self, now))]
    pub async fn drain(
        &self,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<DrainOutcome, BatchError> {
        let Some(mut queue) = self.store.load_batch(date).await? else {
            info!("no batch prepared for today");
            return Ok(DrainOutcome::Empty);
        };
        if queue.is_empty() {
            info!("all entries for today have been published");
            return Ok(DrainOutcome::Empty);
        }

        let entry = queue.remove(0);
        match self.publisher.publish(&entry.media_path, &entry.caption).await {
            Ok(()) => {
                info!(reference = %entry.reference, "published");

                match self.store.ledger().mark_uploaded(&entry.reference, now).await {
                    Ok(false) => warn!(reference = %entry.reference, "no ledger row to stamp"),
                    Ok(true) => {}
                    Err(e) => warn!(reference = %entry.reference, error = %e, "failed to stamp ledger"),
                }

                // The media goes only once the shortened queue is on disk
                self.store.save_batch(date, &queue).await?;

                match fs::remove_file(&entry.media_path).await {
                    Ok(()) => info!(path = %entry.media_path.display(), "deleted media"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %entry.media_path.display(), error = %e, "failed to delete media")
                    }
                }

                Ok(DrainOutcome::Published {
                    reference: entry.reference,
                    remaining: queue.len(),
                })
            }
            Err(error) => {
                warn!(reference = %entry.reference, error = %error, "publish failed, requeued");
                let reference = entry.reference.clone();
                queue.insert(0, entry);
                self.store.save_batch(date, &queue).await?;
                Ok(DrainOutcome::Requeued { reference, error })
            }
        }
    }
}
