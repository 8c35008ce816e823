use std::sync::Arc;

use tracing::{error, info};

use stash::web::WebServer;
use stash::{BlobStore, Config, Database, StashService};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    let config = match Config::load_with_env(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = stash::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        stash::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> stash::Result<()> {
    config.validate()?;

    info!("stash - multi-tenant file storage");

    let db = Database::open(&config.database.path).await?;
    info!("Database opened at {}", config.database.path);

    let blobs = BlobStore::new(&config.storage.root)?;
    tokio::fs::create_dir_all(&config.storage.staging_dir).await?;
    info!("Blob store at {}", config.storage.root);

    let service = Arc::new(StashService::new(db, blobs));
    let server = WebServer::new(&config, service)?;
    server.run().await?;

    Ok(())
}
