use std::sync::Arc;

use tracing::warn;

use gastos_core::{config::Config, ports::ExpenseSheet};
use gastos_sheets::{GoogleSheetsGateway, SheetsSettings};

#[tokio::main]
async fn main() -> Result<(), gastos_core::Error> {
    gastos_core::logging::init("gastos")?;

    let cfg = Arc::new(Config::load()?);

    let gateway = Arc::new(GoogleSheetsGateway::new(SheetsSettings::from_config(&cfg))?);
    // Failures here are not fatal: each command reports its own gateway errors.
    if let Err(e) = gateway.connect().await {
        warn!("spreadsheet not available at startup: {e}");
    }

    let sheet: Arc<dyn ExpenseSheet> = gateway.clone();
    let res = gastos_telegram::router::run_polling(cfg, sheet).await;

    gateway.close().await;

    res.map_err(|e| gastos_core::Error::External(format!("telegram bot failed: {e}")))
}
