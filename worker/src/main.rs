mod errors;
mod materialize;
mod sqs_client;
mod sqs_listener;
mod subscriber;

use crate::errors::ReceiveError;
use crate::materialize::Materializer;
use crate::sqs_client::SqsClient;
use crate::sqs_listener::SqsListener;
use crate::subscriber::subscribe;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use aws_sdk_sqs::error::DisplayErrorContext;
use serverless_bridge::common::config::{load_aws_config, WorkerConfig};
use serverless_bridge::common::store::DynamoStore;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{error, info, warn};

const AWS_PROFILE_DEFAULT: &str = "default";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_target(false)
        .init();

    let config = WorkerConfig::from_env()?;

    let store_config = load_worker_aws_config(config.store.endpoint_url.as_deref()).await;
    let store = DynamoStore::new(
        aws_sdk_dynamodb::Client::new(&store_config),
        config.store.table_name(),
    );
    match store.verify().await {
        Ok(()) => info!(table = store.table_name(), "store reachable"),
        Err(err) if err.is_retryable() => {
            warn!(error = %err, "could not verify store, starting anyway")
        }
        Err(err) => {
            error!(error = %err, "store misconfigured");
            return Err(err.into());
        }
    }

    let queue_config = load_worker_aws_config(config.queue.endpoint_url.as_deref()).await;
    let sqs_client = SqsClient::new(
        aws_sdk_sqs::Client::new(&queue_config),
        &config.queue.queue_url,
        &config.dead_letter_queue_url,
    );

    let (listener, mut listen_handle) =
        SqsListener::new(sqs_client.clone(), config.poll_interval, config.concurrency);
    let mut workers = subscribe(
        listener.deliveries(),
        Arc::new(Materializer::new(Arc::new(store))),
        Arc::new(sqs_client),
        config.retry.clone(),
        config.concurrency,
    );

    let outcome: Result<(), BoxError> = tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown requested");
            Ok(())
        }
        result = &mut listen_handle => listener_exit(result),
    };

    // Deliveries already in the channel are still handled and settled before the tasks exit.
    listener.close();
    listen_handle.abort();
    while let Some(result) = workers.join_next().await {
        if let Err(err) = result {
            error!(error = %err, "dispatch task failed");
        }
    }

    info!("worker stopped");
    outcome
}

/// Exit status of the worker once its listener has ended on its own.
fn listener_exit(result: Result<Result<(), ReceiveError>, JoinError>) -> Result<(), BoxError> {
    match result {
        Ok(Ok(())) => {
            info!("listener stopped");
            Ok(())
        }
        Ok(Err(err)) => {
            let err = DisplayErrorContext(&err).to_string();
            error!(error = %err, "listener failed");
            Err(format!("listener failed: {err}").into())
        }
        Err(err) => {
            error!(error = %err, "listener task failed");
            Err(err.into())
        }
    }
}

/// Shared AWS settings, optionally from a local credentials file instead of the default chain.
async fn load_worker_aws_config(endpoint_url: Option<&str>) -> SdkConfig {
    let Ok(credentials_file) = std::env::var("AWS_CREDENTIALS_FILE") else {
        return load_aws_config(endpoint_url).await;
    };

    let profile_name = std::env::var("AWS_PROFILE").unwrap_or(AWS_PROFILE_DEFAULT.into());
    let profile_files = EnvConfigFiles::builder()
        .with_file(EnvConfigFileKind::Credentials, credentials_file)
        .build();

    let loader = aws_config::defaults(BehaviorVersion::latest())
        .profile_files(profile_files)
        .profile_name(profile_name);
    match endpoint_url {
        Some(url) => loader.endpoint_url(url).load().await,
        None => loader.load().await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
