use config::{Env, InvalidTtlError};
use futures::future::join_all;
use notify::{HttpMailer, LogMailer, Mailer, Notifier};
use realtime::ChatHub;
use server::{ServerState, app};
use std::sync::Arc;
use storage::{FileStore, StorageError};
use studenthub_common::model::auth::JwtKeys;
use studenthub_db::client::{DbClient, DbError};
use thiserror::Error;
use tokens::TokenService;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod notify;
mod realtime;
mod server;
mod storage;
mod tokens;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid token lifetime: {0}")]
    Ttl(#[from] InvalidTtlError),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error setting up media storage: {0}")]
    Storage(#[from] StorageError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "studenthub_api=debug,\
                studenthub_db=debug,\
                studenthub_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn mailer(env: &Env) -> Arc<dyn Mailer> {
    match &env.mail_relay_url {
        Some(relay_url) => Arc::new(HttpMailer::new(relay_url.clone(), env.mail_sender.clone())),
        None => {
            info!("No MAIL_RELAY_URL set, notification mails are only logged");
            Arc::new(LogMailer)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;
    debug!(?env, "Loaded configuration");

    let db_client = DbClient::connect(&env.database_url, env.database_max_connections).await?;
    db_client.migrate().await?;

    let files = FileStore::new(env.media_root.clone()).await?;
    let tokens = TokenService::new(
        JwtKeys::from_secret(env.jwt_secret.as_bytes()),
        env.access_token_ttl()?,
        env.refresh_token_ttl()?,
    );

    let shutdown = CancellationToken::new();
    let (notifier, mail_queue) = Notifier::with_capacity(env.mail_queue_capacity);
    let mail_workers = mail_queue.spawn_workers(mailer(&env), env.mail_workers, &shutdown);

    let state = ServerState {
        db_client: Arc::new(db_client),
        tokens: Arc::new(tokens),
        notifier: Arc::new(notifier),
        hub: Arc::new(ChatHub::default()),
        files: Arc::new(files),
    };

    let server_address = env.socket_address();
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app(state, env.max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    shutdown.cancel();
    join_all(mail_workers).await;

    Ok(())
}
