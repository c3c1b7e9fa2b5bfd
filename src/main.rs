use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use chatbridge::assistant;
use chatbridge::bridge::Bridge;
use chatbridge::config::Config;
use chatbridge::engine::Engine;
use chatbridge::engine::local::LocalEngine;
use chatbridge::server::{self, AppState};
use chatbridge::workflow::ChatBot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Prefer a .env next to the binary, fall back to the CWD search.
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")))
        .filter(|path| path.exists());
    match beside_exe {
        Some(path) => {
            dotenvy::from_path(&path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    tracing::info!("chatbridge starting");

    // Bad backend config stops the process here, before any request is accepted.
    let config = Config::load()?;
    let assistant = assistant::build(config.backend, config.assistant.clone())?;
    tracing::info!(backend = ?config.backend, url = %config.assistant.url, "assistant configured");

    let engine = Arc::new(LocalEngine::with_retention(config.retention()));
    let bot = ChatBot {
        activity_timeout: config.activity_timeout,
        on_failure: config.on_failure,
    };
    engine.register_worker(bot.worker(config.task_queue.clone(), assistant));

    let shutdown = CancellationToken::new();
    let state = AppState {
        bridge: Bridge::new(engine, config.task_queue.clone(), config.key_strategy),
        shutdown: shutdown.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!("server started at http://{}", listener.local_addr()?);

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;

    tracing::info!("chatbridge shutting down");
    Ok(())
}
