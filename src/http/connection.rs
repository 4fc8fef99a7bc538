//! Pipelined connection
//!
//! A `Connection` owns one TCP socket. A background fill thread reads from
//! the socket and hands chunks over a bounded channel; the owner of the
//! connection drains that channel into its read buffer while parsing. The
//! fill thread blocks once the channel is full, so a slow consumer holds
//! back the producer instead of growing memory without bound.

use super::{Error, HttpResponse, Request, ResponseParser, Result};
use bytes::{Buf, Bytes, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Bytes requested from the socket per read
const READ_SIZE: usize = 8 * 1024;

/// Default number of filled chunks that may wait for the parser
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// One pipelined HTTP/1.1 connection
pub struct Connection {
    request: Request,
    pipeline_depth: usize,
    burst: Bytes,
    connect_timeout: Option<Duration>,
    queue_depth: usize,
    stream: Option<TcpStream>,
    incoming: Option<Receiver<io::Result<Bytes>>>,
    filler: Option<JoinHandle<()>>,
    buffer: BytesMut,
    parser: ResponseParser,
    in_sync: bool,
}

impl Connection {
    /// Create a connection that pipelines `pipeline_depth` copies of
    /// `request` per burst. Nothing is opened until [`connect`](Self::connect).
    pub fn new(request: Request, pipeline_depth: usize) -> Self {
        let pipeline_depth = pipeline_depth.max(1);
        let burst = request.as_bytes().repeat(pipeline_depth);

        Connection {
            request,
            pipeline_depth,
            burst: Bytes::from(burst),
            connect_timeout: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            stream: None,
            incoming: None,
            filler: None,
            buffer: BytesMut::new(),
            parser: ResponseParser::new(),
            in_sync: true,
        }
    }

    /// Set the timeout for establishing the TCP connection
    pub fn set_connect_timeout(&mut self, timeout: Option<Duration>) {
        self.connect_timeout = timeout;
    }

    /// Set how many read chunks may queue up ahead of the parser
    pub fn set_queue_depth(&mut self, depth: usize) {
        self.queue_depth = depth.max(1);
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn pipeline_depth(&self) -> usize {
        self.pipeline_depth
    }

    /// Whether the socket is open
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether another burst can be sent on this connection
    pub fn is_reusable(&self) -> bool {
        self.stream.is_some() && self.in_sync
    }

    /// Bytes received but not yet consumed by the parser
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Open the socket and start the fill thread.
    ///
    /// Every resolved address is tried in turn; the error of the last
    /// attempt is returned when none accepts.
    pub fn connect(&mut self) -> Result<()> {
        self.dispose();

        let addrs = self.request.target().resolve()?;
        let mut last_error = None;
        let mut connected = None;

        for addr in addrs {
            match open_socket(addr, self.connect_timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(source) => {
                    debug!(%addr, error = %source, "connect attempt failed");
                    last_error = Some(Error::Connect { addr, source });
                }
            }
        }

        let stream = match connected {
            Some(stream) => stream,
            None => return Err(last_error.unwrap_or(Error::NotConnected)),
        };

        let reader = stream.try_clone()?;
        let (tx, rx) = mpsc::sync_channel(self.queue_depth);
        let filler = thread::Builder::new()
            .name("fill".into())
            .spawn(move || fill(reader, tx))?;

        debug!(peer = ?stream.peer_addr().ok(), "connection opened");

        self.stream = Some(stream);
        self.incoming = Some(rx);
        self.filler = Some(filler);
        self.in_sync = true;
        Ok(())
    }

    /// Write one burst of pipelined requests and return the lazy sequence
    /// of their responses.
    ///
    /// All requests are on the wire before the first response is read.
    pub fn send_requests(&mut self) -> Result<Burst<'_>> {
        if !self.in_sync {
            return Err(Error::OutOfSync);
        }
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        stream.write_all(&self.burst)?;

        let remaining = self.pipeline_depth;
        Ok(Burst {
            connection: self,
            remaining,
            done: false,
        })
    }

    /// Close the socket, stop the fill thread and release the read buffer.
    ///
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        // Dropping the receiver unblocks a fill thread waiting on a full queue
        self.incoming = None;

        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("connection closed");
        }

        if let Some(filler) = self.filler.take() {
            let _ = filler.join();
        }

        self.buffer = BytesMut::new();
        self.parser.reset();
    }

    /// Parse the next response, pulling chunks from the fill thread until
    /// the record reaches a terminal state or the stream ends.
    fn read_response(&mut self) -> HttpResponse {
        let mut response = HttpResponse::new();
        self.parser.reset();

        loop {
            if !self.buffer.is_empty() {
                let consumed = self.parser.parse(&self.buffer, &mut response);
                self.buffer.advance(consumed);

                if response.state().is_terminal() {
                    if let Some(error) = response.error() {
                        debug!(%error, "protocol error");
                    }
                    return response;
                }
            }

            if let Err(error) = self.fill_buffer() {
                debug!(%error, state = %response.state(), "stream ended mid-response");
                return response;
            }
        }
    }

    /// Wait for the next chunk from the fill thread
    fn fill_buffer(&mut self) -> Result<()> {
        let incoming = self.incoming.as_ref().ok_or(Error::NotConnected)?;

        match incoming.recv() {
            Ok(Ok(chunk)) => {
                trace!(len = chunk.len(), "filled");
                self.buffer.extend_from_slice(&chunk);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::ConnectionClosed),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Responses of one pipelined burst, produced in send order.
///
/// Yields at most `pipeline_depth` records and stops right after the
/// first one that did not complete. A burst that stops early, or is dropped
/// before being drained, leaves the connection unusable for further bursts.
pub struct Burst<'a> {
    connection: &'a mut Connection,
    remaining: usize,
    done: bool,
}

impl Burst<'_> {
    /// Responses not produced yet
    pub fn remaining(&self) -> usize {
        if self.done {
            0
        } else {
            self.remaining
        }
    }
}

impl Iterator for Burst<'_> {
    type Item = HttpResponse;

    fn next(&mut self) -> Option<HttpResponse> {
        if self.done || self.remaining == 0 {
            return None;
        }

        let response = self.connection.read_response();
        self.remaining -= 1;

        if !response.is_completed() {
            self.done = true;
            self.connection.in_sync = false;
        }
        Some(response)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

impl Drop for Burst<'_> {
    fn drop(&mut self) {
        if !self.done && self.remaining > 0 {
            self.connection.in_sync = false;
        }
    }
}

fn open_socket(addr: SocketAddr, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;

    match timeout {
        Some(timeout) => socket.connect_timeout(&addr.into(), timeout)?,
        None => socket.connect(&addr.into())?,
    }

    Ok(socket.into())
}

/// Fill loop: read the socket until the peer closes, a read fails or the
/// connection drops its receiver.
fn fill(mut reader: TcpStream, tx: SyncSender<io::Result<Bytes>>) {
    let mut buf = BytesMut::new();

    loop {
        buf.resize(READ_SIZE, 0);

        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                buf.truncate(n);
                if tx.send(Ok(buf.split().freeze())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}
