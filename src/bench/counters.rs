//! Outcome counters shared by all workers

use crate::http::HttpResponse;
use std::sync::atomic::{AtomicU64, Ordering};

/// Classification of one response slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Completed with a 2xx status
    Success,
    /// Completed with any other status; the connection stays usable
    ApplicationError,
    /// Protocol violation or transport failure; the connection is dropped
    SocketError,
}

/// Classify a response produced by a burst
pub fn classify(response: &HttpResponse) -> Outcome {
    if !response.is_completed() {
        Outcome::SocketError
    } else if response.is_success() {
        Outcome::Success
    } else {
        Outcome::ApplicationError
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub success: u64,
    pub application_errors: u64,
    pub socket_errors: u64,
}

impl Snapshot {
    pub fn total(&self) -> u64 {
        self.success + self.application_errors + self.socket_errors
    }
}

/// Lock-free outcome counters
#[derive(Debug, Default)]
pub struct Counters {
    success: AtomicU64,
    application_errors: AtomicU64,
    socket_errors: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one outcome
    pub fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &self.success,
            Outcome::ApplicationError => &self.application_errors,
            Outcome::SocketError => &self.socket_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            success: self.success.load(Ordering::Relaxed),
            application_errors: self.application_errors.load(Ordering::Relaxed),
            socket_errors: self.socket_errors.load(Ordering::Relaxed),
        }
    }

    /// Read and zero the success counter
    pub fn take_success(&self) -> u64 {
        self.success.swap(0, Ordering::Relaxed)
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.success.store(0, Ordering::Relaxed);
        self.application_errors.store(0, Ordering::Relaxed);
        self.socket_errors.store(0, Ordering::Relaxed);
    }
}
