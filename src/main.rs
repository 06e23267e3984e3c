use cellar_sort::api::{self, ApiState};
use cellar_sort::config::{AppConfig, StoreConfig};
use cellar_sort::service::PlacementService;
use cellar_sort::store::{InMemoryStore, RestStore, StoreBackend, StoreError};
use env_logger::Env;

fn build_store(config: StoreConfig) -> Result<StoreBackend, StoreError> {
    match config {
        StoreConfig::Rest(rest) => {
            log::info!("🔌 Using store at {}", rest.base_url);
            Ok(StoreBackend::Rest(RestStore::new(rest)?))
        }
        StoreConfig::InMemory { demo_data: true } => {
            log::info!("🧪 No CELLAR_STORE_URL set, serving the demo cellar from memory");
            Ok(StoreBackend::InMemory(InMemoryStore::with_demo_cellar()?))
        }
        StoreConfig::InMemory { demo_data: false } => {
            log::info!("🧪 No CELLAR_STORE_URL set, starting with an empty in-memory cellar");
            Ok(StoreBackend::InMemory(InMemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            log::warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    log::info!("🚀 Cellar placement service starting...");

    let store = match build_store(app_config.store) {
        Ok(store) => store,
        Err(err) => {
            log::error!("❌ Could not set up the store: {}", err);
            std::process::exit(1);
        }
    };

    let state = ApiState::new(PlacementService::new(store, app_config.placement));
    if let Err(err) = api::start_api_server(app_config.api, state).await {
        log::error!("❌ API server terminated with an error: {err}");
        std::process::exit(1);
    }
}
