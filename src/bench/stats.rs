//! Throughput sampling and final statistics

use super::counters::Counters;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Periodic snapshot-and-reset of the success counter
#[derive(Debug)]
pub struct Sampler {
    started: Instant,
    last: Instant,
    total_success: u64,
    samples: Vec<f64>,
}

impl Sampler {
    /// Start sampling at `now`; counters should have just been reset
    pub fn new(now: Instant) -> Self {
        Sampler {
            started: now,
            last: now,
            total_success: 0,
            samples: Vec::new(),
        }
    }

    /// Take one sample, returning the requests per second since the last.
    ///
    /// Returns `None` when no time has passed.
    pub fn sample(&mut self, counters: &Counters, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.last);
        if elapsed.is_zero() {
            return None;
        }

        let count = counters.take_success();
        self.total_success += count;
        self.last = now;

        let rps = count as f64 / elapsed.as_secs_f64();
        self.samples.push(rps);
        Some(rps)
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Close the run at `stopped` and compute the summary
    pub fn finish(mut self, counters: &Counters, stopped: Instant, connections: usize) -> Summary {
        self.total_success += counters.take_success();
        let snapshot = counters.snapshot();
        let elapsed = stopped.saturating_duration_since(self.started);

        let average_rps = if elapsed.is_zero() {
            0.0
        } else {
            self.total_success as f64 / elapsed.as_secs_f64()
        };
        let max_rps = self.samples.iter().copied().fold(0.0, f64::max);

        Summary {
            connections,
            elapsed,
            average_rps,
            max_rps,
            std_dev: trimmed_std_dev(&self.samples),
            success: self.total_success,
            application_errors: snapshot.application_errors,
            socket_errors: snapshot.socket_errors,
            samples: self.samples.len(),
        }
    }
}

/// Population standard deviation with the best and the worst sample removed.
///
/// Fewer than three samples are used as they are.
pub fn trimmed_std_dev(samples: &[f64]) -> f64 {
    let mut values = samples.to_vec();
    if values.len() >= 3 {
        values.sort_by(f64::total_cmp);
        values.remove(0);
        values.pop();
    }
    std_dev(&values)
}

/// Population standard deviation, 0 for an empty slice
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Final statistics of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub connections: usize,
    pub elapsed: Duration,
    pub average_rps: f64,
    pub max_rps: f64,
    pub std_dev: f64,
    /// 2xx responses during the measured window
    pub success: u64,
    pub application_errors: u64,
    pub socket_errors: u64,
    pub samples: usize,
}

impl Summary {
    /// Named values in reporting order
    pub fn statistics(&self) -> [(&'static str, f64); 6] {
        [
            ("rps/average", self.average_rps),
            ("rps/max", self.max_rps),
            ("rps/stddev", self.std_dev),
            ("requests/success", self.success as f64),
            ("requests/bad", self.application_errors as f64),
            ("requests/socket-errors", self.socket_errors as f64),
        ]
    }

    /// Emit every statistic as a structured event
    pub fn log(&self) {
        for (name, value) in self.statistics() {
            info!(target: "statistic", name, value);
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} Connections", self.connections)?;
        writeln!(f, "Average RPS: {:.0}", self.average_rps)?;
        writeln!(f, "Max RPS: {:.0}", self.max_rps)?;
        writeln!(f, "20x: {}", self.success)?;
        writeln!(f, "Bad Responses: {}", self.application_errors)?;
        writeln!(f, "Socket Errors: {}", self.socket_errors)?;
        write!(f, "StdDev: {:.0}", self.std_dev)
    }
}
