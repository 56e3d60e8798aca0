//! Stateful property testing for the upload drainer.
//!
//! Drives a real store through random sequences of succeeding and failing
//! publishes and compares it against a plain queue model after every step.

use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};
use tempfile::TempDir;
use tokio::runtime::Runtime;

use reposter_batch::{DrainOutcome, Drainer, PublishError, Publisher};
use reposter_store::{BatchEntry, LedgerRow, RecordStore};

/// Operations against today's queue.
#[derive(Debug, Clone)]
pub enum DrainOperation {
    /// Drain with the publisher accepting the upload.
    DrainSucceeding,
    /// Drain with the publisher rejecting the upload.
    DrainFailing,
}

/// Reference model: the queue plus everything published so far.
#[derive(Clone, Debug, Default)]
pub struct QueueModel {
    pub queue: VecDeque<String>,
    pub published: BTreeSet<String>,
}

impl ReferenceStateMachine for QueueModel {
    type State = Self;
    type Transition = DrainOperation;

    fn init_state() -> BoxedStrategy<Self::State> {
        (0usize..6)
            .prop_map(|n| QueueModel {
                queue: (0..n).map(|i| format!("ref{i}")).collect(),
                published: BTreeSet::new(),
            })
            .boxed()
    }

    fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
        prop_oneof![
            3 => Just(DrainOperation::DrainSucceeding),
            2 => Just(DrainOperation::DrainFailing),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            DrainOperation::DrainSucceeding => {
                if let Some(head) = state.queue.pop_front() {
                    state.published.insert(head);
                }
            }
            // A failed publish leaves the queue exactly as it was
            DrainOperation::DrainFailing => {}
        }
        state
    }

    fn preconditions(_state: &Self::State, _transition: &Self::Transition) -> bool {
        // Draining is valid from any state, including an empty queue
        true
    }
}

struct TogglePublisher {
    fail: AtomicBool,
}

#[async_trait]
impl Publisher for TogglePublisher {
    async fn publish(&self, _media_path: &Path, _caption: &str) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(PublishError("rejected".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Test harness holding a store in a temp directory.
pub struct DrainHarness {
    runtime: Runtime,
    _dir: TempDir,
    store: RecordStore,
    publisher: Arc<TogglePublisher>,
    entries: Vec<BatchEntry>,
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
}

fn now() -> NaiveDateTime {
    date().and_hms_opt(7, 30, 0).unwrap()
}

impl DrainHarness {
    fn new(initial: &QueueModel) -> Self {
        let runtime = Runtime::new().expect("Failed to create tokio runtime");
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let (store, entries) = runtime.block_on(async {
            let store = RecordStore::open(dir.path().join("data"))
                .await
                .expect("Failed to open store");

            let mut entries = Vec::new();
            let mut rows = Vec::new();
            for reference in &initial.queue {
                let media_path = dir.path().join(format!("{reference}.mp4"));
                std::fs::write(&media_path, b"video").unwrap();
                entries.push(BatchEntry {
                    reference: reference.clone(),
                    media_path,
                    caption: format!("caption {reference}"),
                    source_url: reference.clone(),
                });
                rows.push(LedgerRow::downloaded(
                    reference.clone(),
                    format!("caption {reference}"),
                    date().and_hms_opt(0, 1, 0).unwrap(),
                ));
            }
            store.save_batch(date(), &entries).await.unwrap();
            store.ledger().append(&rows).await.unwrap();
            (store, entries)
        });

        Self {
            runtime,
            _dir: dir,
            store,
            publisher: Arc::new(TogglePublisher {
                fail: AtomicBool::new(false),
            }),
            entries,
        }
    }

    fn apply_operation(&self, op: &DrainOperation) -> DrainOutcome {
        let fail = matches!(op, DrainOperation::DrainFailing);
        self.publisher.fail.store(fail, Ordering::SeqCst);

        self.runtime.block_on(async {
            Drainer::new(&self.store, self.publisher.as_ref())
                .drain(date(), now())
                .await
                .expect("drain should not error")
        })
    }
}

impl StateMachineTest for DrainHarness {
    type SystemUnderTest = Self;
    type Reference = QueueModel;

    fn init_test(
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self::new(ref_state)
    }

    fn apply(
        state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        let outcome = state.apply_operation(&transition);

        // ref_state is already the post-transition model
        match (&transition, outcome) {
            (_, DrainOutcome::Empty) => {
                assert!(ref_state.queue.is_empty());
            }
            (DrainOperation::DrainSucceeding, DrainOutcome::Published { remaining, .. }) => {
                assert_eq!(remaining, ref_state.queue.len());
            }
            (DrainOperation::DrainFailing, DrainOutcome::Requeued { reference, .. }) => {
                assert_eq!(ref_state.queue.front(), Some(&reference));
            }
            (op, outcome) => panic!("unexpected outcome {outcome:?} for {op:?}"),
        }
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        let (queue, rows) = state.runtime.block_on(async {
            let queue = state.store.load_batch(date()).await.unwrap().unwrap_or_default();
            let rows = state.store.ledger().rows().await.unwrap();
            (queue, rows)
        });

        // Invariant: persisted queue matches the model, in order
        let references: Vec<String> = queue.iter().map(|e| e.reference.clone()).collect();
        let expected: Vec<String> = ref_state.queue.iter().cloned().collect();
        assert_eq!(references, expected);

        // Invariant: exactly the published references carry an upload time
        let stamped: BTreeSet<String> = rows
            .iter()
            .filter(|r| r.uploaded_at.is_some())
            .map(|r| r.reference.clone())
            .collect();
        assert_eq!(stamped, ref_state.published);

        // Invariant: media exists for queued entries and is gone once published
        for entry in &state.entries {
            let queued = ref_state.queue.contains(&entry.reference);
            assert_eq!(entry.media_path.exists(), queued, "{}", entry.reference);
        }
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 5000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn drain_state_machine_test(sequential 1..20 => DrainHarness);
}
