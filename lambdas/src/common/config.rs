use std::time::Duration;

use ::config::{Config, ConfigError, Environment};
use aws_config::{BehaviorVersion, SdkConfig};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// A queue destination plus the endpoint used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue_url: String,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreBinding {
    pub endpoint_url: Option<String>,
    pub database: String,
    pub collection: String,
}

impl StoreBinding {
    /// DynamoDB has no database level, so the collection lives in `<database>-<collection>`.
    pub fn table_name(&self) -> String {
        format!("{}-{}", self.database, self.collection)
    }
}

/// Settings of one ingress function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressConfig {
    pub queue: QueueBinding,
}

#[derive(Debug, Deserialize)]
struct PassThroughSettings {
    queue_url: String,
    #[serde(default)]
    queue_endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExplicitSettings {
    queue2_url: String,
    #[serde(default)]
    queue2_endpoint_url: Option<String>,
}

impl IngressConfig {
    /// Settings for the return-value binding function.
    pub fn pass_through_from_env() -> Result<Self, ConfigError> {
        Self::pass_through_from(Environment::default())
    }

    fn pass_through_from(environment: Environment) -> Result<Self, ConfigError> {
        let settings: PassThroughSettings = load(environment)?;
        Ok(Self {
            queue: QueueBinding {
                queue_url: settings.queue_url,
                endpoint_url: settings.queue_endpoint_url,
            },
        })
    }

    /// Settings for the explicit publish function.
    pub fn explicit_from_env() -> Result<Self, ConfigError> {
        Self::explicit_from(Environment::default())
    }

    fn explicit_from(environment: Environment) -> Result<Self, ConfigError> {
        let settings: ExplicitSettings = load(environment)?;
        Ok(Self {
            queue: QueueBinding {
                queue_url: settings.queue2_url,
                endpoint_url: settings.queue2_endpoint_url,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_receive_count: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the next delivery after `attempt` failed: `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_receive_count
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_receive_count: default_max_receive_count(),
            base_backoff: Duration::from_secs(default_retry_base_secs()),
            max_backoff: Duration::from_secs(default_retry_max_secs()),
        }
    }
}

/// Settings of the materialization worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub queue: QueueBinding,
    pub dead_letter_queue_url: String,
    pub store: StoreBinding,
    pub retry: RetryPolicy,
    pub concurrency: usize,
    pub poll_interval: Duration,
}

/// Flat view of the worker's environment, one field per variable.
#[derive(Debug, Deserialize)]
struct WorkerSettings {
    queue3_url: String,
    #[serde(default)]
    queue3_endpoint_url: Option<String>,
    dead_letter_queue_url: String,
    #[serde(default)]
    store_endpoint_url: Option<String>,
    #[serde(default = "default_store_database")]
    store_database: String,
    #[serde(default = "default_store_collection")]
    store_collection: String,
    #[serde(default = "default_max_receive_count")]
    max_receive_count: u32,
    #[serde(default = "default_retry_base_secs")]
    retry_base_secs: u64,
    #[serde(default = "default_retry_max_secs")]
    retry_max_secs: u64,
    #[serde(default = "default_worker_concurrency")]
    worker_concurrency: usize,
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
}

fn default_store_database() -> String {
    "ToDoItems".to_string()
}

fn default_store_collection() -> String {
    "Items".to_string()
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_retry_base_secs() -> u64 {
    2
}

fn default_retry_max_secs() -> u64 {
    300
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_poll_interval_secs() -> u64 {
    1
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::default())
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let settings: WorkerSettings = load(environment)?;
        if settings.max_receive_count == 0 {
            return Err(ConfigError::Message(
                "MAX_RECEIVE_COUNT must be at least 1".into(),
            ));
        }
        if settings.worker_concurrency == 0 {
            return Err(ConfigError::Message(
                "WORKER_CONCURRENCY must be at least 1".into(),
            ));
        }

        Ok(Self {
            queue: QueueBinding {
                queue_url: settings.queue3_url,
                endpoint_url: settings.queue3_endpoint_url,
            },
            dead_letter_queue_url: settings.dead_letter_queue_url,
            store: StoreBinding {
                endpoint_url: settings.store_endpoint_url,
                database: settings.store_database,
                collection: settings.store_collection,
            },
            retry: RetryPolicy {
                max_receive_count: settings.max_receive_count,
                base_backoff: Duration::from_secs(settings.retry_base_secs),
                max_backoff: Duration::from_secs(settings.retry_max_secs),
            },
            concurrency: settings.worker_concurrency,
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
        })
    }
}

/// Reads `environment` into `T`. Keys are matched lowercased and empty values count as unset.
fn load<T: DeserializeOwned>(environment: Environment) -> Result<T, ConfigError> {
    Config::builder()
        .add_source(environment.ignore_empty(true))
        .build()?
        .try_deserialize()
}

/// Loads the shared AWS settings, pointing the clients at `endpoint_url` when one is given.
pub async fn load_aws_config(endpoint_url: Option<&str>) -> SdkConfig {
    let loader = aws_config::defaults(BehaviorVersion::latest());
    match endpoint_url {
        Some(url) => loader.endpoint_url(url).load().await,
        None => loader.load().await,
    }
}
