// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

/// A single observation of a named metric.
///
/// The same shape is used for the single value an aggregation reduces a bucket to, so a reduced
/// metric is also a `Sample`.
///
/// The zero value ([`Sample::default`]) is a placeholder meaning "no data yet". Aggregators
/// silently ignore it, see [`Sample::is_empty`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Dot-delimited metric path, e.g. `my.service.latency`.
    pub name: String,
    /// The observed value.
    pub value: f64,
    /// When the value was observed. Only whole seconds are sent to the collector.
    pub timestamp: SystemTime,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: String::new(),
            value: 0.0,
            timestamp: UNIX_EPOCH,
        }
    }
}

impl Sample {
    /// Create a sample observed at `timestamp`.
    pub fn new(name: impl Into<String>, value: f64, timestamp: SystemTime) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
        }
    }

    /// Create a sample observed now.
    pub fn now(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, SystemTime::now())
    }

    /// Returns true for the zero value placeholder.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.value == 0.0 && self.timestamp == UNIX_EPOCH
    }

    /// The timestamp truncated to whole seconds since the unix epoch.
    pub fn unix_seconds(&self) -> i64 {
        unix_seconds(self.timestamp)
    }
}

/// Truncates `time` to whole seconds since the unix epoch.
///
/// Times before the epoch round towards negative infinity, so every second on the wall clock maps
/// to exactly one integer.
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_secs()).unwrap_or(i64::MAX),
        Err(err) => {
            let before = err.duration();
            let secs = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
            if before.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}

/// Formats the sample as a single protocol line, without the trailing newline.
impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seconds = itoa::Buffer::new();
        write!(
            f,
            "{} {} {}",
            self.name,
            self.value,
            seconds.format(self.unix_seconds())
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert2::check;

    use super::*;

    #[test]
    fn zero_value_is_empty() {
        check!(Sample::default().is_empty());
        check!(!Sample::new("m", 0.0, UNIX_EPOCH + Duration::from_secs(1)).is_empty());
        check!(!Sample::new("m", 0.0, UNIX_EPOCH).is_empty());
        check!(!Sample::new("", 1.0, UNIX_EPOCH).is_empty());
    }

    #[test]
    fn truncates_to_whole_seconds() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_999);
        check!(unix_seconds(t) == 1_700_000_000);
        check!(unix_seconds(UNIX_EPOCH) == 0);
        check!(unix_seconds(UNIX_EPOCH - Duration::from_secs(2)) == -2);
        check!(unix_seconds(UNIX_EPOCH - Duration::from_millis(1_500)) == -2);
    }

    #[test]
    fn displays_as_protocol_line() {
        let t = UNIX_EPOCH + Duration::from_millis(1_234_567);
        check!(Sample::new("my.service.value", 4.2, t).to_string() == "my.service.value 4.2 1234");
        check!(Sample::new("m", 3.0, t).to_string() == "m 3 1234");
        check!(Sample::new("m", -0.5, t).to_string() == "m -0.5 1234");
    }
}
