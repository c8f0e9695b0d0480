// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Contains the [`SampleSink`] trait, the destination for batches of samples.

use std::{fmt, future::Future, io, pin::Pin, sync::Arc};

use crate::Sample;

/// The error returned when a batch couldn't be handed to the transport.
#[derive(Debug)]
pub enum SendError {
    /// The underlying socket write failed.
    Io(io::Error),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "couldn't write metrics to carbon: {err}"),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for SendError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Serializes and transmits batches of samples.
///
/// Implementations must compose the whole batch before writing it, so that concurrent callers
/// (for example a direct write racing an aggregation flush) never interleave partial batches.
///
/// Sending an empty batch must be a harmless no-op.
pub trait SampleSink {
    /// Send every sample in `batch`, in order, as one write.
    fn send(&self, batch: &[Sample]) -> Result<(), SendError>;
}

impl<T: SampleSink + ?Sized> SampleSink for &T {
    fn send(&self, batch: &[Sample]) -> Result<(), SendError> {
        (**self).send(batch)
    }
}

impl<T: SampleSink + ?Sized> SampleSink for Box<T> {
    fn send(&self, batch: &[Sample]) -> Result<(), SendError> {
        (**self).send(batch)
    }
}

impl<T: SampleSink + ?Sized> SampleSink for Arc<T> {
    fn send(&self, batch: &[Sample]) -> Result<(), SendError> {
        (**self).send(batch)
    }
}

/// This struct contains a future that can be used to wait for a flush to complete
///
/// In synchronous code, you can use `futures::executor::block_on` to wait for it.
#[must_use = "future does nothing unless polled"]
pub struct FlushWait(Pin<Box<dyn Future<Output = ()> + Send + 'static>>);

impl Future for FlushWait {
    type Output = ();

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

impl fmt::Debug for FlushWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FlushWait").finish()
    }
}

impl FlushWait {
    /// Return a FlushWait that is ready immediately
    pub fn ready() -> Self {
        Self(Box::pin(std::future::ready(())))
    }

    /// Create a FlushWait that returns when a future is ready
    pub fn from_future(f: impl Future<Output = ()> + Send + 'static) -> Self {
        Self(Box::pin(f))
    }
}
