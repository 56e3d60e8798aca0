//! Eligibility selection.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::index;
use reposter_store::RecordStore;

use crate::BatchError;

/// References in `all` that are not in `used`.
///
/// Order is preserved and duplicates in `all` stay distinct entries.
pub fn available(all: &[String], used: &[String]) -> Vec<String> {
    let used: HashSet<&str> = used.iter().map(String::as_str).collect();
    all.iter()
        .filter(|r| !used.contains(r.as_str()))
        .cloned()
        .collect()
}

/// Draw `n` entries from distinct positions of `pool`, uniformly at random.
pub fn select<R: Rng + ?Sized>(
    pool: &[String],
    n: usize,
    rng: &mut R,
) -> Result<Vec<String>, BatchError> {
    if pool.len() < n {
        return Err(BatchError::InsufficientPool {
            available: pool.len(),
            requested: n,
        });
    }

    Ok(index::sample(rng, pool.len(), n)
        .into_iter()
        .map(|i| pool[i].clone())
        .collect())
}

/// Store-backed eligibility queries.
pub struct Selector<'a> {
    store: &'a RecordStore,
}

impl<'a> Selector<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// All references minus used references.
    pub async fn available(&self) -> Result<Vec<String>, BatchError> {
        let all = self.store.all_items().await?;
        let used = self.store.used_items().await?;
        Ok(available(&all, &used))
    }

    /// Sample `n` eligible references without replacement.
    pub async fn select<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<String>, BatchError> {
        let pool = self.available().await?;
        select(&pool, n, rng)
    }
}
