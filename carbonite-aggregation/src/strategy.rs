// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Strategies for reducing a bucket of samples to a single value

use std::{fmt, str::FromStr};

use carbonite_core::Sample;
use smallvec::SmallVec;

/// Samples sharing one name and one wall-clock second, in arrival order.
///
/// A bucket is never empty: it is created from its first sample and only grows by appending.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    samples: SmallVec<[Sample; 2]>,
}

impl Bucket {
    /// Start a bucket with its first sample.
    pub fn new(first: Sample) -> Self {
        let mut samples = SmallVec::new();
        samples.push(first);
        Self { samples }
    }

    /// Build a bucket from samples in arrival order. Returns `None` if there are none.
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Option<Self> {
        let samples: SmallVec<[Sample; 2]> = samples.into_iter().collect();
        (!samples.is_empty()).then_some(Self { samples })
    }

    /// Append a later sample.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// The first sample to arrive.
    pub fn first(&self) -> &Sample {
        &self.samples[0]
    }

    /// The most recent sample to arrive.
    pub fn last(&self) -> &Sample {
        &self.samples[self.samples.len() - 1]
    }

    /// All samples in arrival order.
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }
}

/// How a bucket is reduced to the single sample that gets sent.
///
/// Reducing is pure: the bucket is only read, and exactly one sample comes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    /// Total of all values, stamped with the last sample's time.
    Sum,
    /// Arithmetic mean of all values, stamped with the last sample's time.
    Mean,
    /// The smallest sample. The earliest one wins ties.
    Min,
    /// The largest sample. The earliest one wins ties.
    Max,
    /// The first sample to arrive, unchanged.
    First,
    /// The last sample to arrive, unchanged.
    Last,
}

impl Aggregation {
    /// All strategies.
    pub const ALL: [Aggregation; 6] = [
        Aggregation::Sum,
        Aggregation::Mean,
        Aggregation::Min,
        Aggregation::Max,
        Aggregation::First,
        Aggregation::Last,
    ];

    /// Reduce `bucket` to one sample.
    pub fn reduce(self, bucket: &Bucket) -> Sample {
        let first = bucket.first();
        let last = bucket.last();
        let samples = bucket.as_slice();
        match self {
            Aggregation::Sum => Sample {
                name: first.name.clone(),
                value: samples.iter().map(|s| s.value).sum(),
                timestamp: last.timestamp,
            },
            Aggregation::Mean => Sample {
                name: first.name.clone(),
                value: samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64,
                timestamp: last.timestamp,
            },
            Aggregation::Min => samples
                .iter()
                .reduce(|best, s| if s.value < best.value { s } else { best })
                .unwrap_or(first)
                .clone(),
            Aggregation::Max => samples
                .iter()
                .reduce(|best, s| if s.value > best.value { s } else { best })
                .unwrap_or(first)
                .clone(),
            Aggregation::First => first.clone(),
            Aggregation::Last => last.clone(),
        }
    }

    /// Reduce a slice of samples assumed to share a bucket. Returns `None` for an empty slice.
    pub fn reduce_slice(self, samples: &[Sample]) -> Option<Sample> {
        Bucket::from_samples(samples.iter().cloned()).map(|bucket| self.reduce(&bucket))
    }

    /// The lowercase name of the strategy, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`Aggregation`] name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAggregationError(String);

impl fmt::Display for ParseAggregationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown aggregation `{}`, expected one of sum, mean, min, max, first, last",
            self.0
        )
    }
}

impl std::error::Error for ParseAggregationError {}

impl FromStr for Aggregation {
    type Err = ParseAggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "mean" | "avg" => Ok(Aggregation::Mean),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "first" => Ok(Aggregation::First),
            "last" => Ok(Aggregation::Last),
            _ => Err(ParseAggregationError(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use assert2::check;
    use rstest::rstest;

    use super::*;

    fn at(millis: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(1_700_000_000_000 + millis)
    }

    fn bucket(values: &[f64]) -> Bucket {
        Bucket::from_samples(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| Sample::new("test.agg", *v, at(i as u64 * 10))),
        )
        .unwrap()
    }

    #[rstest]
    #[case(Aggregation::Sum, &[10.0, 10.0], Sample::new("test.agg", 20.0, at(10)))]
    #[case(Aggregation::Mean, &[20.0, 10.0], Sample::new("test.agg", 15.0, at(10)))]
    #[case(Aggregation::Min, &[1.0, 100.0], Sample::new("test.agg", 1.0, at(0)))]
    #[case(Aggregation::Max, &[1.0, 100.0], Sample::new("test.agg", 100.0, at(10)))]
    #[case(Aggregation::First, &[100.0, 99.0], Sample::new("test.agg", 100.0, at(0)))]
    #[case(Aggregation::Last, &[99.0, 100.0], Sample::new("test.agg", 100.0, at(10)))]
    fn reduces_pairs(#[case] aggregation: Aggregation, #[case] values: &[f64], #[case] expected: Sample) {
        check!(aggregation.reduce(&bucket(values)) == expected);
    }

    #[test]
    fn sum_and_mean_use_last_timestamp() {
        let b = bucket(&[1.5, 2.5, -1.0, 4.0]);
        let sum = Aggregation::Sum.reduce(&b);
        check!(sum.value == 7.0);
        check!(sum.timestamp == at(30));
        let mean = Aggregation::Mean.reduce(&b);
        check!(mean.value == 1.75);
        check!(mean.timestamp == at(30));
    }

    #[test]
    fn extremes_prefer_earliest_on_ties() {
        let b = bucket(&[5.0, 1.0, 9.0, 1.0, 9.0]);
        check!(Aggregation::Min.reduce(&b).timestamp == at(10));
        check!(Aggregation::Max.reduce(&b).timestamp == at(20));
    }

    #[test]
    fn single_sample_reduces_to_itself() {
        let b = bucket(&[42.0]);
        for aggregation in Aggregation::ALL {
            check!(aggregation.reduce(&b) == *b.first());
        }
    }

    #[test]
    fn reduce_does_not_touch_the_bucket() {
        let b = bucket(&[3.0, 1.0, 2.0]);
        let before = b.clone();
        for aggregation in Aggregation::ALL {
            let _ = aggregation.reduce(&b);
        }
        check!(b == before);
    }

    #[test]
    fn reduce_slice_rejects_empty() {
        check!(Aggregation::Sum.reduce_slice(&[]).is_none());
        let one = [Sample::new("m", 2.0, at(0))];
        check!(Aggregation::Sum.reduce_slice(&one) == Some(one[0].clone()));
    }

    #[test]
    fn parses_names() {
        for aggregation in Aggregation::ALL {
            check!(aggregation.to_string().parse::<Aggregation>() == Ok(aggregation));
        }
        check!("AVG".parse::<Aggregation>() == Ok(Aggregation::Mean));
        check!("median".parse::<Aggregation>().is_err());
    }
}
