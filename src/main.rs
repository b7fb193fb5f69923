use std::{sync::Arc, time::Duration};

use anyhow::Context;
use message_dispatch::{
    application::{
        handlers::{message_dispatcher::MessageDispatcher, scheduler::DispatchScheduler},
        services::{delivery::DeliveryClient, recorder::SentRecorder},
        usecases::{
            list_sent_messages::ListSentMessagesUseCase, send_message::SendMessageUseCase,
        },
    },
    config::{Config, DbDriver, LogFormat},
    domain::repositories::MessageRepository,
    infrastructure::{
        cache::RedisSentRecorder,
        messaging::WebhookClient,
        repositories::{InMemoryMessageRepository, PostgresMessageRepository, postgres},
    },
    presentation::http::endpoints::root::{ApiState, build_app},
};
use poem::{Server, listener::TcpListener};
use tokio::main;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[main]
async fn main() -> anyhow::Result<()> {
    let config = Config::try_parse()?;
    init_tracing(config.log_format);

    let repo: Arc<dyn MessageRepository> = match config.db_driver {
        DbDriver::Postgres => {
            let pool = postgres::connect(&config.db_dsn, config.db_max_connections)
                .await
                .context("db connect error")?;
            PostgresMessageRepository::new(pool)
        }
        DbDriver::Memory => {
            info!("using in-memory message store");
            Arc::new(InMemoryMessageRepository::new())
        }
    };

    let recorder: Option<Arc<dyn SentRecorder>> = match &config.redis {
        Some(redis) => Some(
            RedisSentRecorder::connect(redis)
                .await
                .context("redis connect error")?,
        ),
        None => None,
    };

    let client: Arc<dyn DeliveryClient> = WebhookClient::new(config.webhook())?;

    let dispatcher = Arc::new(MessageDispatcher::new(
        repo.clone(),
        client.clone(),
        recorder.clone(),
        config.dispatch(),
    ));
    let scheduler = Arc::new(DispatchScheduler::new(dispatcher, config.ticker_interval));
    scheduler.start().await;

    let state = Arc::new(ApiState {
        send_message_usecase: Arc::new(SendMessageUseCase::new(
            repo.clone(),
            client,
            recorder,
            config.send_message(),
        )),
        list_sent_messages_usecase: Arc::new(ListSentMessagesUseCase::new(repo)),
        scheduler: scheduler.clone(),
    });

    let server_url = format!("http://{}:{}", config.http_host, config.http_port);
    info!("Starting server at {}", server_url);
    let app = build_app(state, server_url);

    Server::new(TcpListener::bind(format!(
        "{}:{}",
        config.http_host, config.http_port
    )))
    .run_with_graceful_shutdown(app, shutdown_signal(), Some(SHUTDOWN_GRACE))
    .await?;

    info!("shutting down...");
    scheduler.stop().await;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
