use std::sync::Arc;

use sw2tg_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), sw2tg_core::Error> {
    sw2tg_core::logging::init("sw2tg")?;

    let cfg = Arc::new(Config::load()?);

    sw2tg_telegram::router::run(cfg)
        .await
        .map_err(|e| sw2tg_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
