//! Benchmark configuration

use crate::http::connection::DEFAULT_QUEUE_DEPTH;
use crate::http::{self, Request, RequestBuilder};
use std::time::Duration;

/// Default number of concurrent connections
pub const DEFAULT_CONNECTIONS: usize = 256;

/// Default number of requests per burst
pub const DEFAULT_PIPELINE_DEPTH: usize = 8;

/// Default warmup before counting starts
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(10);

/// Default measured run time
pub const DEFAULT_DURATION: Duration = Duration::from_secs(15);

/// Default interval between throughput samples
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Pipeline depth must be at least 1")]
    ZeroPipelineDepth,

    #[error("Connection count must be at least 1")]
    ZeroConnections,

    #[error("Run duration must not be zero")]
    ZeroDuration,

    #[error("Sample interval must not be zero")]
    ZeroSampleInterval,

    #[error("Fill queue depth must be at least 1")]
    ZeroQueueDepth,

    #[error("Invalid request: {0}")]
    Request(#[from] http::Error),
}

/// Validated benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    request: Request,
    pipeline_depth: usize,
    connections: usize,
    warmup: Duration,
    duration: Duration,
    sample_interval: Duration,
    connect_timeout: Option<Duration>,
    queue_depth: usize,
}

impl BenchConfig {
    /// Create a builder targeting `url`
    pub fn builder(url: impl Into<String>) -> BenchConfigBuilder {
        BenchConfigBuilder::new(url)
    }

    /// Prebuilt request replayed by every connection
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn pipeline_depth(&self) -> usize {
        self.pipeline_depth
    }

    pub fn connections(&self) -> usize {
        self.connections
    }

    pub fn warmup(&self) -> Duration {
        self.warmup
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Read chunks a connection may buffer ahead of its parser
    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }
}

/// Builder for [`BenchConfig`]
#[derive(Debug, Clone)]
pub struct BenchConfigBuilder {
    url: String,
    headers: Vec<String>,
    pipeline_depth: usize,
    connections: usize,
    warmup: Duration,
    duration: Duration,
    sample_interval: Duration,
    connect_timeout: Option<Duration>,
    queue_depth: usize,
}

impl BenchConfigBuilder {
    /// Create a builder with the default settings
    pub fn new(url: impl Into<String>) -> Self {
        BenchConfigBuilder {
            url: url.into(),
            headers: Vec::new(),
            pipeline_depth: DEFAULT_PIPELINE_DEPTH,
            connections: DEFAULT_CONNECTIONS,
            warmup: DEFAULT_WARMUP,
            duration: DEFAULT_DURATION,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            connect_timeout: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    /// Add an extra `Name: value` request header
    pub fn header(mut self, line: impl Into<String>) -> Self {
        self.headers.push(line.into());
        self
    }

    /// Add several extra request headers
    pub fn headers<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Set the number of requests written per burst
    pub fn pipeline_depth(mut self, depth: usize) -> Self {
        self.pipeline_depth = depth;
        self
    }

    /// Set the number of concurrent connections (one worker each)
    pub fn connections(mut self, connections: usize) -> Self {
        self.connections = connections;
        self
    }

    /// Set the warmup period
    pub fn warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Set the measured run time
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the throughput sampling interval
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Set the TCP connect timeout
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set how many read chunks a connection may queue ahead of its parser
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Validate the settings and prebuild the request
    pub fn build(self) -> Result<BenchConfig, ConfigError> {
        if self.pipeline_depth == 0 {
            return Err(ConfigError::ZeroPipelineDepth);
        }
        if self.connections == 0 {
            return Err(ConfigError::ZeroConnections);
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        if self.sample_interval.is_zero() {
            return Err(ConfigError::ZeroSampleInterval);
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }

        let request = RequestBuilder::new(self.url).headers(self.headers).build()?;

        Ok(BenchConfig {
            request,
            pipeline_depth: self.pipeline_depth,
            connections: self.connections,
            warmup: self.warmup,
            duration: self.duration,
            sample_interval: self.sample_interval,
            connect_timeout: self.connect_timeout,
            queue_depth: self.queue_depth,
        })
    }
}
