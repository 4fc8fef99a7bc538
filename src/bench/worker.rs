//! Worker loop
//!
//! Each worker keeps one connection busy with pipelined bursts until the
//! shared stop flag is raised. Any response that does not complete throws
//! the connection away and the worker starts over on a fresh one.

use super::counters::{classify, Counters, Outcome};
use crate::http::{Connection, Request};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What a worker did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Connections successfully opened
    pub connections: u64,
    /// Connect attempts that failed
    pub connect_failures: u64,
    /// Bursts written
    pub bursts: u64,
}

/// One load-generating worker
pub struct Worker {
    id: usize,
    request: Request,
    pipeline_depth: usize,
    connect_timeout: Option<Duration>,
    queue_depth: usize,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        id: usize,
        request: Request,
        pipeline_depth: usize,
        counters: Arc<Counters>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Worker {
            id,
            request,
            pipeline_depth,
            connect_timeout: None,
            queue_depth: crate::http::connection::DEFAULT_QUEUE_DEPTH,
            counters,
            running,
        }
    }

    /// Set the timeout for each connect attempt
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the fill queue depth of each connection
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run until the stop flag is raised.
    ///
    /// The flag is only checked between bursts, so an in-flight burst always
    /// finishes first.
    pub fn run(&self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        while self.is_running() {
            let mut connection = Connection::new(self.request.clone(), self.pipeline_depth);
            connection.set_connect_timeout(self.connect_timeout);
            connection.set_queue_depth(self.queue_depth);

            if let Err(error) = connection.connect() {
                debug!(worker = self.id, %error, "connect failed");
                stats.connect_failures += 1;
                self.counters.record(Outcome::SocketError);
                continue;
            }
            stats.connections += 1;

            self.drive(&mut connection, &mut stats);
            connection.dispose();
        }

        debug!(
            worker = self.id,
            connections = stats.connections,
            bursts = stats.bursts,
            "worker stopped"
        );
        stats
    }

    /// Send bursts on one connection until it fails or the run stops
    fn drive(&self, connection: &mut Connection, stats: &mut WorkerStats) {
        while self.is_running() {
            let burst = match connection.send_requests() {
                Ok(burst) => burst,
                Err(error) => {
                    debug!(worker = self.id, %error, "write failed");
                    self.counters.record(Outcome::SocketError);
                    return;
                }
            };
            stats.bursts += 1;

            let mut aborted = false;
            for response in burst {
                let outcome = classify(&response);
                self.counters.record(outcome);
                aborted |= outcome == Outcome::SocketError;
            }

            if aborted {
                debug!(worker = self.id, "burst aborted, reconnecting");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RequestBuilder;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_stopped_worker_does_nothing() {
        let request = RequestBuilder::new("http://127.0.0.1:9/").build().unwrap();
        let counters = Arc::new(Counters::new());
        let running = Arc::new(AtomicBool::new(false));

        let stats = Worker::new(0, request, 4, Arc::clone(&counters), running).run();
        assert_eq!(stats, WorkerStats::default());
        assert_eq!(counters.snapshot().total(), 0);
    }

    #[test]
    fn test_refused_connections_count_as_socket_errors() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let request = RequestBuilder::new(format!("http://{}/", addr)).build().unwrap();
        let counters = Arc::new(Counters::new());
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker::new(1, request, 2, Arc::clone(&counters), Arc::clone(&running));
        let handle = thread::spawn(move || worker.run());

        while counters.snapshot().socket_errors < 3 {
            thread::yield_now();
        }
        running.store(false, Ordering::Release);
        let stats = handle.join().unwrap();

        assert_eq!(stats.connections, 0);
        assert!(stats.connect_failures >= 3);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.success, 0);
        assert_eq!(snapshot.socket_errors, stats.connect_failures);
    }
}
