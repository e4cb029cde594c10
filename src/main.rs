use infernum_detect::{AppState, Config, Fetcher, InfernumEngine, YoloModel, serve};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter()))
        .init();

    let runtime = if config.single_threaded {
        tokio::runtime::Builder::new_current_thread()
    } else {
        tokio::runtime::Builder::new_multi_thread()
    }
    .enable_all()
    .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    log::debug!("================== STARTING ==============================");
    log::info!("Model directory: {}", config.model_dir.display());

    let model = YoloModel::load(&config.model_dir)?;
    let engine = Arc::new(InfernumEngine::new(model));
    let fetcher = Fetcher::new(config.fetch)?;

    serve(&config.bind_addr, AppState::new(engine, fetcher)).await?;

    Ok(())
}
