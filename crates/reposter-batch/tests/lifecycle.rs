//! End-to-end batch lifecycle over a real store: prepare, drain with
//! failures, pool exhaustion.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::tempdir;

use reposter_batch::{
    BatchError, DrainOutcome, Drainer, FetchError, FetchedMedia, Fetcher, Materializer,
    PublishError, Publisher,
};
use reposter_store::RecordStore;

struct DirFetcher {
    media_dir: PathBuf,
}

#[async_trait]
impl Fetcher for DirFetcher {
    async fn fetch(&self, reference: &str) -> Result<FetchedMedia, FetchError> {
        let shortcode = reference.rsplit('/').next().unwrap_or(reference);
        let media_path = self.media_dir.join(format!("{shortcode}.mp4"));
        tokio::fs::write(&media_path, b"video")
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;
        Ok(FetchedMedia {
            media_path,
            caption: format!("caption for {shortcode}"),
            source_url: reference.to_string(),
        })
    }
}

/// Fails every publish of a media path listed in `failing`.
#[derive(Default)]
struct ScriptedPublisher {
    failing: Mutex<HashSet<PathBuf>>,
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(&self, media_path: &Path, _caption: &str) -> Result<(), PublishError> {
        if self.failing.lock().unwrap().contains(media_path) {
            Err(PublishError("timeout".to_string()))
        } else {
            Ok(())
        }
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    day(d).and_hms_opt(h, m, 0).unwrap()
}

#[tokio::test]
async fn ten_references_last_two_days() {
    let dir = tempdir().unwrap();
    let store = RecordStore::open(dir.path().join("data")).await.unwrap();
    let media_dir = dir.path().join("media");
    std::fs::create_dir_all(&media_dir).unwrap();

    let references: Vec<String> = (0..10)
        .map(|i| format!("https://example.com/reel/r{i}"))
        .collect();
    store.set_all_items(&references).await.unwrap();

    let fetcher = DirFetcher { media_dir };
    let publisher = ScriptedPublisher::default();
    let materializer = Materializer::new(&store, &fetcher);
    let drainer = Drainer::new(&store, &publisher);
    let mut rng = StdRng::seed_from_u64(2024);

    // Day one
    let first = materializer
        .materialize(day(6), 5, at(6, 0, 1), &mut rng)
        .await
        .unwrap();
    assert_eq!(first.len(), 5);
    assert_eq!(store.used_items().await.unwrap().len(), 5);

    // First slot fails, the head stays put
    publisher
        .failing
        .lock()
        .unwrap()
        .insert(first[0].media_path.clone());
    let outcome = drainer.drain(day(6), at(6, 7, 30)).await.unwrap();
    assert!(matches!(outcome, DrainOutcome::Requeued { .. }));
    assert_eq!(store.load_batch(day(6)).await.unwrap().unwrap(), first);

    // Remaining slots succeed
    publisher.failing.lock().unwrap().clear();
    for (slot, remaining) in [(11, 4), (13, 3), (17, 2), (21, 1)] {
        let outcome = drainer.drain(day(6), at(6, slot, 0)).await.unwrap();
        assert!(
            matches!(outcome, DrainOutcome::Published { remaining: r, .. } if r == remaining)
        );
    }
    assert_eq!(
        store.load_batch(day(6)).await.unwrap().unwrap(),
        vec![first[4].clone()]
    );

    // Day two draws from the five references left
    let second = materializer
        .materialize(day(7), 5, at(7, 0, 1), &mut rng)
        .await
        .unwrap();
    assert_eq!(second.len(), 5);

    let first_refs: HashSet<&String> = first.iter().map(|e| &e.reference).collect();
    assert!(second.iter().all(|e| !first_refs.contains(&e.reference)));
    assert_eq!(store.used_items().await.unwrap().len(), 10);

    // Day three: pool is exhausted and no queue gets written
    let err = materializer
        .materialize(day(8), 5, at(8, 0, 1), &mut rng)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BatchError::InsufficientPool {
            available: 0,
            requested: 5
        }
    ));
    assert!(!store.has_batch(day(8)).await.unwrap());
    assert_eq!(
        drainer.drain(day(8), at(8, 9, 0)).await.unwrap(),
        DrainOutcome::Empty
    );

    // Ledger: ten rows, four stamped
    let rows = store.ledger().rows().await.unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows.iter().filter(|r| r.uploaded_at.is_some()).count(), 4);
}
