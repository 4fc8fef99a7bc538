//! Benchmark orchestration
//!
//! Spawns one worker thread per connection, lets them warm up, samples
//! throughput for the configured duration and raises the stop flag.

use super::config::BenchConfig;
use super::counters::Counters;
use super::stats::{Sampler, Summary};
use super::worker::{Worker, WorkerStats};
use super::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A configured benchmark run
pub struct Benchmark {
    config: BenchConfig,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
}

impl Benchmark {
    pub fn new(config: BenchConfig) -> Self {
        Benchmark {
            config,
            counters: Arc::new(Counters::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Counters the workers report into
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Run warmup and measurement, blocking until every worker stopped
    pub fn run(self) -> Result<Summary> {
        let config = &self.config;
        info!(
            target_url = %config.request().target(),
            connections = config.connections(),
            pipeline = config.pipeline_depth(),
            "starting benchmark"
        );

        self.running.store(true, Ordering::Release);
        let workers = match self.spawn_workers() {
            Ok(workers) => workers,
            Err(error) => {
                self.running.store(false, Ordering::Release);
                return Err(error);
            }
        };

        info!("Warming up for {:?}...", config.warmup());
        thread::sleep(config.warmup());

        info!("Running for {:?}...", config.duration());
        self.counters.reset();
        let started = Instant::now();
        let deadline = started + config.duration();
        let mut sampler = Sampler::new(started);

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(config.sample_interval().min(deadline - now));
            if let Some(rps) = sampler.sample(&self.counters, Instant::now()) {
                debug!(rps, "sample");
            }
        }

        self.running.store(false, Ordering::Release);
        let stopped = Instant::now();
        let summary = sampler.finish(&self.counters, stopped, config.connections());

        let mut totals = WorkerStats::default();
        for worker in workers {
            match worker.join() {
                Ok(stats) => {
                    totals.connections += stats.connections;
                    totals.connect_failures += stats.connect_failures;
                    totals.bursts += stats.bursts;
                }
                Err(_) => warn!("worker thread panicked"),
            }
        }
        debug!(
            connections = totals.connections,
            connect_failures = totals.connect_failures,
            bursts = totals.bursts,
            "all workers stopped"
        );

        summary.log();
        Ok(summary)
    }

    fn spawn_workers(&self) -> Result<Vec<JoinHandle<WorkerStats>>> {
        let config = &self.config;
        let mut handles = Vec::with_capacity(config.connections());

        for id in 0..config.connections() {
            let worker = Worker::new(
                id,
                config.request().clone(),
                config.pipeline_depth(),
                Arc::clone(&self.counters),
                Arc::clone(&self.running),
            )
            .connect_timeout(config.connect_timeout())
            .queue_depth(config.queue_depth());

            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker.run())
                .map_err(Error::Spawn);

            match handle {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    // Let the already started workers wind down
                    self.running.store(false, Ordering::Release);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(error);
                }
            }
        }

        Ok(handles)
    }
}
