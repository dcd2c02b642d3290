//! Live sports ingestion service.
//!
//! Configuration comes from the environment only; see `config.rs`.

use anyhow::Result;
use tracing::{error, info, info_span, Instrument};

use live_ingestion::{logging, service, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let run_id = logging::init();
    let span = info_span!("run", run_id = %run_id);

    info!(parent: &span, "Live ingestion service v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(parent: &span, "Configuration error: {:#}", e);
            return Err(e);
        }
    };

    service::run(config).instrument(span).await
}
