//! Batch materialization.

use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;
use reposter_store::{BatchEntry, LedgerRow, RecordStore};
use tokio::fs;
use tracing::{info, warn};

use crate::{BatchError, FetchError, FetchedMedia, Fetcher, Selector};

/// Turns a random selection of eligible references into a day's queue.
pub struct Materializer<'a> {
    store: &'a RecordStore,
    fetcher: &'a dyn Fetcher,
}

impl<'a> Materializer<'a> {
    pub fn new(store: &'a RecordStore, fetcher: &'a dyn Fetcher) -> Self {
        Self { store, fetcher }
    }

    /// Select `n` references, fetch them, and commit the result as `date`'s
    /// queue.
    ///
    /// Every selected reference is marked used, including the ones whose fetch
    /// failed. Returns the entries that made it into the queue, which may be
    /// fewer than `n`. `now` stamps the ledger rows.
    #[tracing::instrument(skip(self, now, rng))]
    pub async fn materialize<R: Rng + Send + ?Sized>(
        &self,
        date: NaiveDate,
        n: usize,
        now: NaiveDateTime,
        rng: &mut R,
    ) -> Result<Vec<BatchEntry>, BatchError> {
        if self.store.has_batch(date).await? {
            return Err(BatchError::AlreadyMaterialized { date });
        }

        let selected = Selector::new(self.store).select(n, rng).await?;

        let mut entries = Vec::with_capacity(selected.len());
        for reference in &selected {
            match self.fetch_checked(reference).await {
                Ok(media) => {
                    info!(reference = %reference, path = %media.media_path.display(), "fetched");
                    entries.push(BatchEntry {
                        reference: reference.clone(),
                        media_path: media.media_path,
                        caption: media.caption,
                        source_url: media.source_url,
                    });
                }
                Err(e) => {
                    warn!(reference = %reference, error = %e, "dropping reference from batch");
                }
            }
        }

        self.store.append_used(&selected).await?;
        self.store.save_batch(date, &entries).await?;

        let rows: Vec<LedgerRow> = entries
            .iter()
            .map(|e| LedgerRow::downloaded(e.reference.clone(), e.caption.clone(), now))
            .collect();
        self.store.ledger().append(&rows).await?;

        info!(
            selected = selected.len(),
            prepared = entries.len(),
            "batch prepared"
        );
        Ok(entries)
    }

    /// Fetch and make sure the reported media actually exists.
    async fn fetch_checked(&self, reference: &str) -> Result<FetchedMedia, FetchError> {
        let media = self.fetcher.fetch(reference).await?;
        match fs::try_exists(&media.media_path).await {
            Ok(true) => Ok(media),
            Ok(false) => Err(FetchError::Failed(format!(
                "media file {} missing after fetch",
                media.media_path.display()
            ))),
            Err(e) => Err(FetchError::Failed(e.to_string())),
        }
    }
}
