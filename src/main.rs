use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use medseq::api::{start_server, AppState, ServerConfig};
use medseq::contracts::CounterStore;
use medseq::generator::{GeneratorConfig, IdentifierGenerator};
use medseq::metrics::MetricsRegistry;
#[cfg(feature = "rocksdb")]
use medseq::storage::RocksDbCounterStore;
use medseq::storage::{FileConfigSource, FileCounterStore, MemoryCounterStore};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("medseq=info".parse()?))
        .init();

    tracing::info!("medseq starting...");

    let data_dir =
        PathBuf::from(std::env::var("MEDSEQ_DATA_DIR").unwrap_or_else(|_| "./data".into()));
    std::fs::create_dir_all(&data_dir)?;

    let store_kind = std::env::var("MEDSEQ_STORE").unwrap_or_else(|_| default_store().into());
    match store_kind.as_str() {
        #[cfg(feature = "rocksdb")]
        "rocksdb" => {
            let path = data_dir.join("counters");
            let store = RocksDbCounterStore::open(&path)?;
            tracing::info!("Opened RocksDB counter store at {}", path.display());
            run(store, &data_dir).await
        }
        "file" => {
            let path = data_dir.join("counters.json");
            let store = FileCounterStore::open(&path)?;
            tracing::info!("Opened file counter store at {}", path.display());
            run(store, &data_dir).await
        }
        "memory" => {
            tracing::warn!("Using in-memory counter store, counters are lost on restart");
            run(MemoryCounterStore::new(), &data_dir).await
        }
        other => Err(format!("Unsupported MEDSEQ_STORE: {}", other).into()),
    }
}

fn default_store() -> &'static str {
    if cfg!(feature = "rocksdb") {
        "rocksdb"
    } else {
        "file"
    }
}

async fn run<S: CounterStore + 'static>(store: S, data_dir: &Path) -> Result<(), BoxError> {
    let config_dir = std::env::var("MEDSEQ_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("config"));
    let config_source = FileConfigSource::open(&config_dir)?;
    tracing::info!("Reading format configs from {}", config_dir.display());

    let generator_config = GeneratorConfig::from_env();
    tracing::info!(
        utc_offset = %generator_config.resolver.offset(),
        store_timeout_ms = generator_config.store_timeout.as_millis() as u64,
        families = generator_config.families.len(),
        "Generator configured"
    );

    let generator =
        IdentifierGenerator::new(Arc::new(store), Arc::new(config_source), generator_config)?;
    let state = Arc::new(AppState::new(generator, Arc::new(MetricsRegistry::new())));

    start_server(ServerConfig::from_env(), state, shutdown_signal()).await?;

    tracing::info!("medseq stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Never resolve, so the server keeps running
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
