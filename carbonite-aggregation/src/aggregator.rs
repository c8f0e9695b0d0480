// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The background aggregation worker and its handles.

use std::{
    fmt, io,
    thread::{self, JoinHandle},
    time::Duration,
};

use carbonite_core::{FlushWait, Sample, SampleSink, join_prefix};
use crossbeam_channel::{Receiver, Sender, select};
use tokio::sync::oneshot;

use crate::{rate_limit::rate_limited, strategy::Aggregation, table::BucketTable};

/// Error returned when an aggregator can't be started.
#[derive(Debug)]
pub enum BuildError {
    /// The flush interval was zero.
    ZeroFlushInterval,
    /// The ingest channel capacity was zero.
    ZeroCapacity,
    /// The worker thread couldn't be spawned.
    Spawn(io::Error),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroFlushInterval => f.write_str("flush interval must be greater than zero"),
            Self::ZeroCapacity => f.write_str("ingest capacity must be greater than zero"),
            Self::Spawn(err) => write!(f, "couldn't spawn aggregation thread: {err}"),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

/// Builder for [`Aggregator`]
#[derive(Debug, Clone)]
pub struct AggregatorBuilder {
    flush_interval: Duration,
    aggregation: Aggregation,
    prefix: String,
    capacity: usize,
    thread_name: String,
    verbose: bool,
}

impl AggregatorBuilder {
    /// Aggregate with `aggregation`, flushing every `flush_interval`.
    pub fn new(flush_interval: Duration, aggregation: Aggregation) -> Self {
        Self {
            flush_interval,
            aggregation,
            prefix: String::new(),
            capacity: 1024,
            thread_name: "carbon-aggregation".into(),
            verbose: false,
        }
    }

    /// Prefix prepended to the name of every ingested sample, joined with
    /// [`join_prefix`](carbonite_core::join_prefix).
    pub fn prefix<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.prefix = join_prefix(segments);
        self
    }

    /// Sets how many samples can wait in the ingest channel before [`Aggregator::ingest`] blocks.
    ///
    /// Defaults to 1024. The worker moves samples into its table as fast as they arrive, so the
    /// channel only fills up while a flush is being sent.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Thread name assigned to the worker. Also used as the `name` of its tracing span.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// If true, log every received sample and every flush at `debug`/`trace` level.
    ///
    /// Flush errors are always logged.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Start the worker, which sends reduced samples to `sink`.
    ///
    /// Returns the [`Aggregator`] producers ingest through, and the [`AggregatorJoinHandle`] that
    /// shuts the worker down. Dropping the join handle drains the remaining samples and waits
    /// for the worker to exit.
    pub fn build<S>(self, sink: S) -> Result<(Aggregator, AggregatorJoinHandle), BuildError>
    where
        S: SampleSink + Send + 'static,
    {
        if self.flush_interval.is_zero() {
            return Err(BuildError::ZeroFlushInterval);
        }
        if self.capacity == 0 {
            return Err(BuildError::ZeroCapacity);
        }

        let (sender, receiver) = crossbeam_channel::bounded(self.capacity);
        // nothing is ever sent on this channel, dropping the sender is the signal
        let (shutdown_sender, shutdown_receiver) = crossbeam_channel::bounded(0);
        let worker = Worker {
            name: self.thread_name.clone(),
            aggregation: self.aggregation,
            prefix: self.prefix,
            flush_interval: self.flush_interval,
            verbose: self.verbose,
            sink,
            table: BucketTable::new(),
        };

        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || worker.run(receiver, shutdown_receiver))
            .map_err(BuildError::Spawn)?;

        Ok((
            Aggregator { sender },
            AggregatorJoinHandle {
                name: self.thread_name,
                handle: Some(handle),
                shutdown: Some(shutdown_sender),
            },
        ))
    }
}

/// Start an aggregator with default settings for everything but the prefix.
///
/// Shorthand for `AggregatorBuilder::new(flush_interval, aggregation).prefix(prefix).build(sink)`.
pub fn start<S, I, P>(
    flush_interval: Duration,
    aggregation: Aggregation,
    prefix: I,
    sink: S,
) -> Result<(Aggregator, AggregatorJoinHandle), BuildError>
where
    S: SampleSink + Send + 'static,
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    AggregatorBuilder::new(flush_interval, aggregation)
        .prefix(prefix)
        .build(sink)
}

enum Message {
    Sample(Sample),
    Flush(oneshot::Sender<()>),
}

/// The ingest side of an aggregation worker.
///
/// Cloning is cheap and still feeds the same worker. Once every clone is dropped the worker
/// flushes what it holds and exits, exactly as if it had been shut down.
#[derive(Clone)]
pub struct Aggregator {
    sender: Sender<Message>,
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("queued", &self.sender.len())
            .finish()
    }
}

impl Aggregator {
    /// Hand a sample to the worker.
    ///
    /// Blocks while the ingest channel is full. The zero value [`Sample::default`] is accepted
    /// and ignored. Samples ingested after the worker terminated are dropped.
    ///
    /// A sample ingested while the worker is shutting down is either part of the final flush or
    /// dropped, depending on whether it reached the channel before the worker stopped draining
    /// it. Anything ingested before [`AggregatorJoinHandle::signal_shutdown`] (or before the last
    /// other [`Aggregator`] was dropped) is always flushed.
    pub fn ingest(&self, sample: Sample) {
        if self.sender.send(Message::Sample(sample)).is_err() {
            rate_limited!(
                Duration::from_secs(1),
                tracing::debug!("aggregation worker has shut down, dropping sample")
            );
        }
    }

    /// Ingest every sample in order.
    pub fn ingest_all(&self, samples: impl IntoIterator<Item = Sample>) {
        for sample in samples {
            self.ingest(sample);
        }
    }

    /// Ask the worker to run a flush cycle now.
    ///
    /// The returned future resolves once every sample ingested before this call has been
    /// reduced and handed to the sink, or immediately if the worker already terminated.
    pub fn flush(&self) -> FlushWait {
        let (sender, receiver) = oneshot::channel();
        // on failure the message, and with it `sender`, is dropped, which wakes the receiver
        let _ = self.sender.send(Message::Flush(sender));
        FlushWait::from_future(async move {
            let _ = receiver.await;
        })
    }
}

/// Control handle that, when dropped, will block until the worker has flushed every remaining
/// sample and exited.
pub struct AggregatorJoinHandle {
    name: String,
    handle: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
}

impl fmt::Debug for AggregatorJoinHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorJoinHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl AggregatorJoinHandle {
    /// Ask the worker to drain and exit without waiting for it.
    ///
    /// Calling this more than once, or after the worker has exited, does nothing.
    pub fn signal_shutdown(&mut self) {
        self.shutdown.take();
    }

    /// Alias for `drop(handle)`. Signals shutdown, then blocks until the final flush is done.
    pub fn shut_down(self) {}

    /// Block until the worker exits on its own, which happens once every [`Aggregator`] has been
    /// dropped. Does not signal shutdown.
    pub fn join(mut self) {
        self.wait();
    }

    /// Returns true once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::info!(name = %self.name, "awaiting aggregation shutdown");
            if handle.join().is_err() {
                tracing::error!(name = %self.name, "aggregation thread panicked");
            } else {
                tracing::info!(name = %self.name, "aggregation shut down");
            }
        }
    }
}

impl Drop for AggregatorJoinHandle {
    fn drop(&mut self) {
        self.signal_shutdown();
        self.wait();
    }
}

// Owns the bucket table. Only ever touched from the worker thread.
struct Worker<S> {
    name: String,
    aggregation: Aggregation,
    prefix: String,
    flush_interval: Duration,
    verbose: bool,
    sink: S,
    table: BucketTable,
}

impl<S: SampleSink> Worker<S> {
    fn run(mut self, receiver: Receiver<Message>, shutdown: Receiver<()>) {
        let span = tracing::span!(tracing::Level::TRACE, "carbon aggregation", name = %self.name);
        let _enter = span.enter();

        let ticker = crossbeam_channel::tick(self.flush_interval);
        tracing::info!(
            interval = ?self.flush_interval,
            aggregation = %self.aggregation,
            "starting aggregation flush cycle"
        );

        loop {
            select! {
                recv(receiver) -> message => match message {
                    Ok(message) => self.handle(message),
                    Err(_) => {
                        tracing::info!("aggregation channel closed, flushing remaining samples");
                        break;
                    }
                },
                recv(ticker) -> _ => self.flush(),
                recv(shutdown) -> _ => {
                    tracing::info!("caught shutdown signal, flushing remaining samples");
                    break;
                }
            }
        }
        drop(ticker);

        // pick up whatever producers managed to enqueue before the signal
        let mut waiting = Vec::new();
        loop {
            for message in receiver.try_iter() {
                match message {
                    Message::Sample(sample) => self.insert(sample),
                    Message::Flush(waiter) => waiting.push(waiter),
                }
            }
            // a send may land between the last `try_recv` and here
            if receiver.is_empty() {
                break;
            }
        }
        drop(receiver);
        self.flush();
        for waiter in waiting {
            let _ = waiter.send(());
        }
        tracing::info!("aggregation has shut down");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Sample(sample) => self.insert(sample),
            Message::Flush(waiter) => {
                self.flush();
                let _ = waiter.send(());
            }
        }
    }

    fn insert(&mut self, mut sample: Sample) {
        if sample.is_empty() {
            return;
        }
        if sample.name.is_empty() {
            rate_limited!(
                Duration::from_secs(1),
                tracing::warn!(value = sample.value, "dropping sample without a name")
            );
            return;
        }
        if !sample.value.is_finite() {
            rate_limited!(
                Duration::from_secs(1),
                tracing::warn!(name = %sample.name, value = sample.value, "dropping non-finite sample")
            );
            return;
        }
        sample.name.insert_str(0, &self.prefix);
        if self.verbose {
            tracing::trace!(?sample, "sample received");
        }
        self.table.insert(sample);
    }

    fn flush(&mut self) {
        let table = self.table.take();
        if table.is_empty() {
            return;
        }
        let samples = table.sample_count();
        let reduced = table.reduce(self.aggregation);
        if self.verbose {
            tracing::debug!(samples, metrics = reduced.len(), "pushing aggregated metrics");
        }
        if let Err(err) = self.sink.send(&reduced) {
            rate_limited!(
                Duration::from_secs(1),
                tracing::error!(?err, "couldn't push aggregated metrics")
            );
        }
    }
}
