// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    fmt, io,
    net::SocketAddr,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use carbonite_aggregation::{
    Aggregation, Aggregator, AggregatorBuilder, AggregatorJoinHandle, BuildError,
};
use carbonite_core::{LineFormat, Sample, SampleSink, SendError, join_prefix};

use crate::{config::Config, transport::UdpSink};

/// The error returned by [`Conn::dial`].
#[derive(Debug)]
pub enum ConnectError {
    /// The address couldn't be parsed or resolved.
    Resolve(io::Error),
    /// The address resolved to nothing.
    NoAddress(String),
    /// Resolution didn't finish within the connect timeout.
    Timeout(Duration),
    /// The local socket couldn't be set up.
    Io(io::Error),
    /// The autoflush aggregator couldn't be started.
    Autoflush(BuildError),
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve(err) => write!(f, "couldn't resolve carbon address: {err}"),
            Self::NoAddress(address) => write!(f, "`{address}` didn't resolve to any address"),
            Self::Timeout(timeout) => write!(f, "connecting to carbon timed out after {timeout:?}"),
            Self::Io(err) => write!(f, "couldn't open UDP socket: {err}"),
            Self::Autoflush(err) => write!(f, "couldn't start autoflush: {err}"),
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resolve(err) | Self::Io(err) => Some(err),
            Self::Autoflush(err) => Some(err),
            Self::NoAddress(_) | Self::Timeout(_) => None,
        }
    }
}

impl From<io::Error> for ConnectError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<BuildError> for ConnectError {
    fn from(value: BuildError) -> Self {
        Self::Autoflush(value)
    }
}

/// A connection to a Carbon collector.
///
/// Every line sent through the connection is prefixed with the configured [`Config::prefix`].
/// [`Conn::push`] always sends immediately. [`Conn::write`] does too, unless
/// [`Config::autoflush`] is set, in which case samples are aggregated and sent on an interval.
///
/// Closing (or dropping) the connection shuts down every aggregator created through it and
/// waits for their final flush before the socket is released.
///
/// ```no_run
/// use carbonite::{Aggregation, Config, Conn, Sample};
/// use std::time::Duration;
///
/// let conn = Conn::dial("localhost:2003", Config::new().prefix(["myapp"]))?;
/// conn.push(&[Sample::now("started", 1.0)])?;
///
/// let latency = conn.new_aggregation(Duration::from_secs(10), Aggregation::Mean, ["latency"])?;
/// latency.ingest(Sample::now("get", 12.5));
///
/// // sends `myapp.latency.get 12.5 <now>` before returning
/// conn.close();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Conn {
    sink: Arc<UdpSink>,
    verbose: bool,
    queue_capacity: usize,
    autoflush: Option<Aggregator>,
    aggregations: Mutex<Vec<AggregatorJoinHandle>>,
    next_id: AtomicUsize,
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("peer", &self.sink.peer_addr().ok())
            .field("autoflush", &self.autoflush.is_some())
            .finish_non_exhaustive()
    }
}

impl Conn {
    /// Open a UDP connection to the collector at `address` (`host:port`).
    ///
    /// UDP has no handshake, so this succeeds even if nothing is listening. It fails if the
    /// address can't be resolved, resolution exceeds the connect timeout, or autoflush is
    /// configured with a zero interval.
    pub fn dial(address: &str, config: Config) -> Result<Self, ConnectError> {
        let format = LineFormat::new(join_prefix(&config.prefix));
        let sink = Arc::new(UdpSink::connect(
            address,
            config.effective_connect_timeout(),
            format,
            config.verbose,
        )?);
        let mut conn = Self {
            sink,
            verbose: config.verbose,
            queue_capacity: config.queue_capacity,
            autoflush: None,
            aggregations: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        };
        if let Some(autoflush) = config.autoflush {
            if conn.verbose {
                tracing::debug!(interval = ?autoflush.interval, "enabling autoflush");
            }
            let aggregator = conn.new_aggregation(
                autoflush.interval,
                autoflush.aggregation,
                std::iter::empty::<&str>(),
            )?;
            conn.autoflush = Some(aggregator);
        }
        Ok(conn)
    }

    /// The collector address the socket is connected to.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.sink.peer_addr()
    }

    /// Returns true if [`Conn::write`] aggregates instead of sending immediately.
    pub fn autoflush_enabled(&self) -> bool {
        self.autoflush.is_some()
    }

    /// Write samples to the collector.
    ///
    /// With autoflush the samples are handed to the autoflush aggregator and this never fails.
    /// Otherwise it is the same as [`Conn::push`].
    pub fn write(&self, samples: &[Sample]) -> Result<(), SendError> {
        match &self.autoflush {
            Some(aggregator) => {
                aggregator.ingest_all(samples.iter().cloned());
                Ok(())
            }
            None => self.push(samples),
        }
    }

    /// Send samples immediately as one datagram, bypassing any aggregation.
    pub fn push(&self, samples: &[Sample]) -> Result<(), SendError> {
        self.sink.send(samples)
    }

    /// Start an aggregator that sends through this connection.
    ///
    /// `prefix` segments are prepended to every ingested name (after the connection prefix).
    /// The aggregator is shut down, and its remaining samples flushed, when the connection is
    /// closed. Dropping every clone of the returned [`Aggregator`] also flushes and stops it.
    pub fn new_aggregation<I, S>(
        &self,
        flush_interval: Duration,
        aggregation: Aggregation,
        prefix: I,
    ) -> Result<Aggregator, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.verbose {
            tracing::debug!(interval = ?flush_interval, %aggregation, "creating new aggregation");
        }
        let (aggregator, handle) = AggregatorBuilder::new(flush_interval, aggregation)
            .prefix(prefix)
            .capacity(self.queue_capacity)
            .thread_name(format!("carbon-aggregation-{id}"))
            .verbose(self.verbose)
            .build(Arc::clone(&self.sink))?;
        let mut handles = self
            .aggregations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // workers whose aggregators were all dropped already drained, joining them is immediate
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
        Ok(aggregator)
    }

    /// Flush every aggregator, wait for them to stop, and release the socket.
    ///
    /// Alias for `drop(conn)`.
    pub fn close(self) {}

    fn shut_down_aggregations(&mut self) {
        self.autoflush = None;
        let mut handles = std::mem::take(
            self.aggregations
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if handles.is_empty() {
            return;
        }
        if self.verbose {
            tracing::debug!(count = handles.len(), "waiting for all aggregations to flush");
        }
        // signal every worker first so they drain in parallel
        for handle in &mut handles {
            handle.signal_shutdown();
        }
        drop(handles);
    }
}

/// Sends every batch immediately, like [`Conn::push`], even with autoflush enabled.
impl SampleSink for Conn {
    fn send(&self, batch: &[Sample]) -> Result<(), SendError> {
        self.push(batch)
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if self.verbose {
            tracing::debug!("closing UDP connection");
        }
        self.shut_down_aggregations();
    }
}
