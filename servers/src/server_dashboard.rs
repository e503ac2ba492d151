use anyhow::Result;
use tokio::signal;

mod dashboard_logic;
use dashboard_logic::{config, downstream, engine, logger};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real deployments use the environment.
    let _ = dotenvy::dotenv();

    let config = config::load_config();
    logger::setup_logging(config.log_dir(), config.log_level(), "server_dashboard")?;

    let engine = engine::Engine::build(config.sync_settings())?;
    engine.start();

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let mut downstream_handle = tokio::spawn(downstream::run(
        config.clone(),
        engine.app_state(),
        shutdown_tx.subscribe(),
    ));

    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
        result = &mut downstream_handle => {
            report(result);
            engine.shutdown().await;
            return Ok(());
        }
    }

    engine.shutdown().await;
    let _ = shutdown_tx.send(());
    report(downstream_handle.await);

    log::info!("Shutdown complete.");
    Ok(())
}

fn report(result: Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!("Dashboard server failed: {:#}", e),
        Err(e) => log::error!("Dashboard server task panicked: {}", e),
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
