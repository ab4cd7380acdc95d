pub mod api;
pub mod chain;
pub mod deposit;
pub mod ingest;
pub mod state;
pub mod storage;
pub mod utils;

use crate::chain::ChainClient;
use crate::deposit::progress::ProgressHandle;
use crate::deposit::tracker::{spawn_receipt_poller, TransactionTracker};
use crate::deposit::{spawn_deposit_orchestrator, DepositOrchestrator, DepositSettings};
use crate::state::{AppSettings, AppState};
use crate::storage::Storage;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Starts file logging into `log_dir`. Keep the handle alive for as long as logs should be written.
pub fn init_logging(log_spec: &str, log_dir: &Path) -> Result<LoggerHandle, anyhow::Error> {
    let handle = Logger::try_with_env_or_str(log_spec)?
        .log_to_file(FileSpec::default().directory(log_dir).basename("token-broker"))
        .write_mode(WriteMode::Async)
        .rotate(
            Criterion::Size(10 * 1024 * 1024), // 10MB
            Naming::Timestamps,
            Cleanup::KeepLogFiles(7),
        )
        .start()?;
    Ok(handle)
}

/// Default database location in the platform data dir.
pub fn default_db_path() -> PathBuf {
    let mut db_path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    db_path.push("token-broker");
    std::fs::create_dir_all(&db_path).ok();
    db_path.push("token-broker.db");
    db_path
}

/// Running service: shared state plus the background tasks.
pub struct Service {
    pub state: AppState,
    pub settings: AppSettings,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Wires storage, tracker and orchestrator and spawns the watcher, backfill and
    /// receipt poller tasks.
    pub fn start(storage: Arc<Storage>, client: Arc<dyn ChainClient>) -> Self {
        let settings = AppSettings::load(&storage);
        log::info!(
            "Starting token broker (start block {}, tokens {:?})",
            settings.start_block,
            settings.tracked_tokens()
        );

        let (tracker, outcomes) = TransactionTracker::new(storage.clone());
        match tracker.load_from_db() {
            Ok(count) if count > 0 => log::info!("Restored {} pending transactions", count),
            Ok(_) => {}
            Err(e) => log::error!("{}", e),
        }

        let progress = ProgressHandle::new();
        let orchestrator = DepositOrchestrator::new(
            client.clone(),
            tracker.clone(),
            progress.clone(),
            storage.clone(),
            DepositSettings::from(&settings),
        );
        let (deposits, orchestrator_task) = spawn_deposit_orchestrator(orchestrator, outcomes);

        let mut tasks = ingest::start_watching(
            storage.clone(),
            client.clone(),
            &settings.tracked_tokens(),
            settings.start_block,
        );
        tasks.push(ingest::spawn_backfill_loop(
            storage.clone(),
            client.clone(),
            Duration::from_secs(settings.backfill_interval_secs),
        ));
        tasks.push(spawn_receipt_poller(
            tracker.clone(),
            client,
            Duration::from_secs(settings.receipt_poll_interval_secs),
        ));
        tasks.push(orchestrator_task);

        Service {
            state: AppState {
                storage,
                tracker,
                progress,
                deposits,
            },
            settings,
            tasks,
        }
    }
}

/// Runs the service with the observer API until `shutdown` resolves or the API server fails.
pub async fn run<F>(
    db_path: PathBuf,
    client: Arc<dyn ChainClient>,
    shutdown: F,
) -> Result<(), anyhow::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let path = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Database path is not valid UTF-8"))?;
    let storage = Arc::new(Storage::new(path)?);

    let service = Service::start(storage, client);
    let result = api::serve(
        &service.settings.api_listen_addr,
        service.state.clone(),
        shutdown,
    )
    .await;

    for task in &service.tasks {
        task.abort();
    }
    result
}
