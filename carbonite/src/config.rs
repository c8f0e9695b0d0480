// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use carbonite_aggregation::Aggregation;

/// Batch every [`Conn::write`](crate::Conn::write) through an aggregator instead of sending it
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Autoflush {
    /// How often aggregated samples are sent.
    pub interval: Duration,
    /// How samples sharing a name and second are reduced.
    pub aggregation: Aggregation,
}

/// Options for [`Conn::dial`](crate::Conn::dial).
///
/// ```
/// use carbonite::{Aggregation, Config};
/// use std::time::Duration;
///
/// let config = Config::new()
///     .connect_timeout(Duration::from_secs(2))
///     .prefix(["prod", "web01"])
///     .autoflush(Duration::from_secs(10), Aggregation::Sum);
/// assert_eq!(config.prefix, ["prod", "web01"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Upper bound on resolving the collector address. `None` or zero means no bound.
    pub connect_timeout: Option<Duration>,
    /// Log every write and every aggregation flush. Errors are logged regardless.
    pub verbose: bool,
    /// Segments of the prefix prepended to every metric name, see
    /// [`join_prefix`](crate::join_prefix).
    pub prefix: Vec<String>,
    /// When set, [`Conn::write`](crate::Conn::write) aggregates instead of sending immediately.
    pub autoflush: Option<Autoflush>,
    /// Ingest channel capacity of every aggregator created by the connection.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            verbose: false,
            prefix: Vec::new(),
            autoflush: None,
            queue_capacity: 1024,
        }
    }
}

impl Config {
    /// Default options: no timeout, no prefix, every write sent immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the time spent resolving the collector address.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Turn diagnostic logging on or off.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Prefix every metric name with these segments.
    pub fn prefix<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix = segments.into_iter().map(Into::into).collect();
        self
    }

    /// Aggregate writes and send them every `interval`.
    pub fn autoflush(mut self, interval: Duration, aggregation: Aggregation) -> Self {
        self.autoflush = Some(Autoflush {
            interval,
            aggregation,
        });
        self
    }

    /// Ingest channel capacity for aggregators created by the connection.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub(crate) fn effective_connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.filter(|timeout| !timeout.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    #[test]
    fn defaults_send_immediately() {
        let config = Config::default();
        check!(config.autoflush.is_none());
        check!(config.prefix.is_empty());
        check!(!config.verbose);
        check!(config.effective_connect_timeout().is_none());
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        check!(Config::new().connect_timeout(Duration::ZERO).effective_connect_timeout().is_none());
        let timeout = Duration::from_secs(2);
        check!(Config::new().connect_timeout(timeout).effective_connect_timeout() == Some(timeout));
    }

    #[test]
    fn setters_fill_every_option() {
        let config = Config::new()
            .verbose(true)
            .prefix(["a", "b."])
            .autoflush(Duration::from_secs(3), Aggregation::Max)
            .queue_capacity(8);
        check!(config.verbose);
        check!(config.prefix == ["a", "b."]);
        check!(
            config.autoflush
                == Some(Autoflush {
                    interval: Duration::from_secs(3),
                    aggregation: Aggregation::Max,
                })
        );
        check!(config.queue_capacity == 8);
    }
}
