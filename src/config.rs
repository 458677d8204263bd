//! Configuration types for album-zip

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Fetch-and-archive pipeline sizing
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent fetch workers (default: 4)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Number of idle buffers the pool keeps for reuse (default: 8)
    ///
    /// Bounds steady-state allocation, not concurrency. When every pooled
    /// buffer is in use, acquiring allocates a transient buffer instead of
    /// blocking.
    #[serde(default = "default_buffer_pool_capacity")]
    pub buffer_pool_capacity: usize,

    /// Depth of the queue between fetch workers and the archive writer (default: 2)
    ///
    /// This is the backpressure point: when the queue is full, workers wait
    /// before fetching anything else. `0` requests an unbuffered handoff,
    /// realised as a single-slot queue.
    #[serde(default = "default_result_queue_capacity")]
    pub result_queue_capacity: usize,

    /// Capacity reserved for a freshly allocated buffer (default: 1 MiB)
    #[serde(default = "default_buffer_initial_capacity")]
    pub buffer_initial_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            buffer_pool_capacity: default_buffer_pool_capacity(),
            result_queue_capacity: default_result_queue_capacity(),
            buffer_initial_capacity: default_buffer_initial_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Channel capacity actually used for the result queue.
    ///
    /// tokio bounded channels need at least one slot.
    pub fn effective_result_queue_capacity(&self) -> usize {
        self.result_queue_capacity.max(1)
    }
}

/// HTTP client settings for track and album requests
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout, body included (default: 120 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// TCP/TLS connect timeout (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Build a reqwest client honouring these settings.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(Error::Network)
    }
}

/// HTTP front end settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the server to (default: 0.0.0.0:8000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Directory for temporary archives (None = system temp dir)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            temp_dir: None,
        }
    }
}

/// Main configuration
///
/// Fields are organized into logical sub-configs:
/// - [`pipeline`](PipelineConfig) - worker count, buffer pool, backpressure depth
/// - [`http`](HttpConfig) - client timeouts and user agent
/// - [`api`](ApiConfig) - HTTP front end
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Pipeline sizing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// HTTP front end settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.worker_count == 0 {
            return Err(Error::Config {
                message: "worker_count must be at least 1".to_string(),
                key: Some("worker_count".to_string()),
            });
        }
        if self.pipeline.buffer_pool_capacity == 0 {
            return Err(Error::Config {
                message: "buffer_pool_capacity must be at least 1".to_string(),
                key: Some("buffer_pool_capacity".to_string()),
            });
        }
        Ok(())
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_buffer_pool_capacity() -> usize {
    8
}

fn default_result_queue_capacity() -> usize {
    2
}

fn default_buffer_initial_capacity() -> usize {
    1024 * 1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    format!("album-zip/{}", env!("CARGO_PKG_VERSION"))
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
