use anyhow::{Context, Result};
use clap::Parser;
use pipeline_bench::bench::{BenchConfig, Benchmark};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pipeline-bench")]
#[command(about = "Pipelined HTTP/1.1 load generator")]
struct Args {
    /// Target URL
    #[arg(long, env = "SERVER_URL")]
    url: String,

    /// Requests written per burst on each connection
    #[arg(long, short = 'p', default_value = "8")]
    pipeline: usize,

    /// Concurrent connections
    #[arg(long, short = 'c', default_value = "256")]
    connections: usize,

    /// Warmup in seconds before counting starts
    #[arg(long, short = 'w', default_value = "10")]
    warmup: u64,

    /// Measured duration in seconds
    #[arg(long, short = 'd', default_value = "15")]
    duration: u64,

    /// Extra request header, e.g. "Accept: text/plain" (repeatable)
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,

    /// Throughput sample interval in milliseconds
    #[arg(long, default_value = "200")]
    sample_interval_ms: u64,

    /// TCP connect timeout in milliseconds
    #[arg(long)]
    connect_timeout_ms: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = BenchConfig::builder(&args.url)
        .pipeline_depth(args.pipeline)
        .connections(args.connections)
        .warmup(Duration::from_secs(args.warmup))
        .duration(Duration::from_secs(args.duration))
        .headers(args.headers)
        .sample_interval(Duration::from_millis(args.sample_interval_ms))
        .connect_timeout(args.connect_timeout_ms.map(Duration::from_millis))
        .build()
        .with_context(|| format!("Invalid benchmark configuration for {}", args.url))?;

    let summary = Benchmark::new(config).run()?;
    println!("{}", summary);

    Ok(())
}
