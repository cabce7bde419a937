use anyhow::Context;
use profit_engine::{
    api, config::Config, db::init_db, LifecycleManager, ProfitDistributor, Repository, Scheduler,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database_path))?;

    let repo = Arc::new(Repository::new(pool));
    let distributor = Arc::new(ProfitDistributor::new(
        repo.clone(),
        config.worker_concurrency,
    ));
    let lifecycle = Arc::new(LifecycleManager::new(
        repo.clone(),
        distributor.clone(),
        config.worker_concurrency,
    ));

    match config.schedule_interval {
        Some(interval) => {
            let scheduler = Scheduler::new(
                distributor.clone(),
                lifecycle.clone(),
                interval,
                config.run_timeout,
            );
            tokio::spawn(scheduler.run());
        }
        None => tracing::info!("Scheduled trigger disabled"),
    }

    let app = api::create_router(api::AppState::new(repo, distributor, lifecycle));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
