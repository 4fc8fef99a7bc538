//! pipeline-bench - pipelined HTTP/1.1 load generator
//!
//! This crate measures HTTP server throughput by writing bursts of
//! pipelined GET requests over raw TCP sockets and classifying every
//! response as a success, an application error or a socket error.

pub mod bench;
pub mod http;
