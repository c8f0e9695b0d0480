// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use crate::{Sample, SampleSink, SendError};

#[derive(Debug, Default)]
struct Recorded {
    batches: Vec<Vec<Sample>>,
    sends: usize,
    fail_next: bool,
}

/// In-memory sink that records every batch it is sent.
///
/// Cloning will provide another reference to the same recorded batches.
///
/// # Example
/// ```
/// use carbonite_core::{Sample, SampleSink, test_util::VecSink};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let sink = VecSink::default();
/// let t = UNIX_EPOCH + Duration::from_secs(60);
/// sink.send(&[Sample::new("a", 1.0, t), Sample::new("b", 2.0, t)]).unwrap();
/// assert_eq!(sink.lines(), ["a 1 60", "b 2 60"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct VecSink(Arc<Mutex<Recorded>>);

impl VecSink {
    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.0.lock().unwrap()
    }

    /// Every successfully sent batch, oldest first.
    pub fn batches(&self) -> Vec<Vec<Sample>> {
        self.lock().batches.clone()
    }

    /// Every successfully sent sample, flattened across batches.
    pub fn samples(&self) -> Vec<Sample> {
        self.lock().batches.iter().flatten().cloned().collect()
    }

    /// The protocol lines (without newlines) of every sent sample.
    pub fn lines(&self) -> Vec<String> {
        self.samples().iter().map(ToString::to_string).collect()
    }

    /// How many times `send` was called, including failed and empty sends.
    pub fn send_count(&self) -> usize {
        self.lock().sends
    }

    /// Make the next `send` fail with an IO error without recording the batch.
    pub fn fail_next(&self) {
        self.lock().fail_next = true;
    }

    /// Block until at least `count` batches were recorded.
    ///
    /// # Panics
    /// Panics if that doesn't happen within a minute.
    pub fn wait_for_batches(&self, count: usize) -> Vec<Vec<Sample>> {
        let start = Instant::now();
        loop {
            let batches = self.batches();
            if batches.len() >= count {
                return batches;
            }
            if start.elapsed() > Duration::from_secs(60) {
                panic!("only saw {} of {count} batches", batches.len());
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl SampleSink for VecSink {
    fn send(&self, batch: &[Sample]) -> Result<(), SendError> {
        let mut recorded = self.lock();
        recorded.sends += 1;
        if std::mem::take(&mut recorded.fail_next) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "injected failure").into());
        }
        if !batch.is_empty() {
            recorded.batches.push(batch.to_vec());
        }
        Ok(())
    }
}

/// Sink whose every send fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

impl SampleSink for FailingSink {
    fn send(&self, _batch: &[Sample]) -> Result<(), SendError> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused").into())
    }
}
