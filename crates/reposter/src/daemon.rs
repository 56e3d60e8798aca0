//! Daemon: startup, action context and the scheduler loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime};
use miette::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

use reposter_batch::{BatchError, DrainOutcome, Drainer, Fetcher, Materializer, Publisher};
use reposter_platform::{MediaResolver, PlatformClient, PlatformError};
use reposter_scheduler::{Action, ActionHandler, Scheduler, SchedulerError, SlotTable};
use reposter_store::RecordStore;

/// Directory under the data directory that holds downloaded media.
const MEDIA_DIR: &str = "media";

/// Configuration for the daemon.
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub api_url: String,
    pub resolver_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// References prepared per day.
    pub daily_limit: usize,
    /// Poll interval in seconds.
    pub poll_interval: u64,
}

impl DaemonConfig {
    /// Username and password, or an authentication error if either is
    /// missing or blank.
    pub fn credentials(&self) -> Result<(&str, &str), PlatformError> {
        let username = self.username.as_deref().map(str::trim).unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            return Err(PlatformError::Auth(
                "missing credentials: set REPOSTER_USERNAME and REPOSTER_PASSWORD".to_string(),
            ));
        }
        Ok((username, password))
    }
}

/// Everything an action needs, built once at startup.
pub struct Context {
    store: RecordStore,
    fetcher: Arc<dyn Fetcher>,
    publisher: Arc<dyn Publisher>,
    daily_limit: usize,
    rng: Mutex<StdRng>,
}

impl Context {
    pub fn new(
        store: RecordStore,
        fetcher: Arc<dyn Fetcher>,
        publisher: Arc<dyn Publisher>,
        daily_limit: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            fetcher,
            publisher,
            daily_limit,
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Prepare the queue for `date`.
    ///
    /// An exhausted pool or an existing queue is logged, not returned.
    pub async fn prepare(&self, date: NaiveDate) -> Result<(), BatchError> {
        let materializer = Materializer::new(&self.store, self.fetcher.as_ref());
        let mut rng = self.rng.lock().await;
        match materializer
            .materialize(date, self.daily_limit, Local::now().naive_local(), &mut *rng)
            .await
        {
            Ok(entries) => {
                info!(%date, queued = entries.len(), "batch prepared");
                Ok(())
            }
            Err(e @ BatchError::InsufficientPool { .. }) => {
                warn!(%date, error = %e, "not enough unused references, nothing queued");
                Ok(())
            }
            Err(e @ BatchError::AlreadyMaterialized { .. }) => {
                info!(%date, "{e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Publish the head of the queue for `date`.
    pub async fn publish(&self, date: NaiveDate) -> Result<DrainOutcome, BatchError> {
        let drainer = Drainer::new(&self.store, self.publisher.as_ref());
        drainer.drain(date, Local::now().naive_local()).await
    }

    /// Prepare today's queue unless one already exists.
    pub async fn prepare_if_missing(&self, today: NaiveDate) -> Result<(), BatchError> {
        if self.store.has_batch(today).await? {
            info!(%today, "batch already prepared for today");
            return Ok(());
        }
        info!(%today, "no batch for today, preparing now");
        self.prepare(today).await
    }
}

#[async_trait]
impl ActionHandler for Context {
    async fn handle(&self, action: Action, at: NaiveDateTime) -> Result<(), SchedulerError> {
        let date = at.date();
        let result = match action {
            Action::Prepare => self.prepare(date).await,
            Action::Publish => self.publish(date).await.map(|_| ()),
        };
        result.map_err(|e| SchedulerError::ExecutionFailed(e.to_string()))
    }
}

/// Prepare today's queue if needed, then run the scheduler until shutdown.
///
/// The scheduler starts covering slots before the startup prepare, so a slot
/// that falls due while it downloads still fires once it finishes.
pub async fn run_loop(
    context: &Context,
    mut scheduler: Scheduler,
    shutdown_rx: watch::Receiver<bool>,
) {
    let started = scheduler.begin();
    if let Err(e) = context.prepare_if_missing(started.date()).await {
        error!(error = %e, "startup prepare failed");
    }
    scheduler.mark_active();

    scheduler.run(shutdown_rx, context).await;
}

/// Run the daemon.
pub async fn run_with_config(config: DaemonConfig) -> Result<()> {
    info!("starting Reposter daemon");

    let (username, password) = config
        .credentials()
        .map_err(|e| miette::miette!("{}", e))?;

    let client = PlatformClient::new(&config.api_url).map_err(|e| miette::miette!("{}", e))?;
    client
        .login(username, password)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    let store = RecordStore::open(&config.data_dir)
        .await
        .map_err(|e| miette::miette!("failed to open data directory: {}", e))?;

    let media_dir = store.root().join(MEDIA_DIR);
    tokio::fs::create_dir_all(&media_dir)
        .await
        .map_err(|e| miette::miette!("failed to create media directory: {}", e))?;

    let resolver = MediaResolver::new(&config.resolver_url, media_dir)
        .map_err(|e| miette::miette!("{}", e))?;

    let context = Context::new(
        store,
        Arc::new(resolver),
        Arc::new(client),
        config.daily_limit,
        StdRng::from_entropy(),
    );

    let table = SlotTable::standard().map_err(|e| miette::miette!("{}", e))?;
    let scheduler = Scheduler::new(table, Duration::from_secs(config.poll_interval));

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    run_loop(&context, scheduler, shutdown_rx).await;

    info!("Reposter daemon stopped");
    Ok(())
}
