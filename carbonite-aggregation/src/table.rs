// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The in-flight bucket table owned by an aggregation worker

use std::hash::Hash;

use carbonite_core::Sample;
use hashbrown::{Equivalent, HashMap};

use crate::strategy::{Aggregation, Bucket};

/// Identity of a bucket: the metric name and the whole second it was observed in.
///
/// Two samples share a bucket iff both match exactly, so sub-second differences collapse
/// together while the same name one second later starts a new bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    name: String,
    seconds: i64,
}

impl BucketKey {
    /// The key `sample` is bucketed under.
    pub fn of(sample: &Sample) -> Self {
        Self {
            name: sample.name.clone(),
            seconds: sample.unix_seconds(),
        }
    }

    /// The metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whole seconds since the unix epoch.
    pub fn seconds(&self) -> i64 {
        self.seconds
    }
}

// Borrowed form used to look a sample up without cloning its name. Field order and types must
// hash exactly like `BucketKey`.
#[derive(Hash)]
struct BucketKeyRef<'a> {
    name: &'a str,
    seconds: i64,
}

impl Equivalent<BucketKey> for BucketKeyRef<'_> {
    fn equivalent(&self, key: &BucketKey) -> bool {
        self.seconds == key.seconds && self.name == key.name
    }
}

/// Buckets of samples waiting for the next flush.
///
/// Every key present has a non-empty bucket.
#[derive(Debug, Default)]
pub struct BucketTable {
    buckets: HashMap<BucketKey, Bucket>,
    samples: usize,
}

impl BucketTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `sample` to its bucket, creating the bucket if needed.
    pub fn insert(&mut self, sample: Sample) {
        self.samples += 1;
        let seconds = sample.unix_seconds();
        let lookup = BucketKeyRef {
            name: &sample.name,
            seconds,
        };
        if let Some(bucket) = self.buckets.get_mut(&lookup) {
            bucket.push(sample);
            return;
        }
        let key = BucketKey {
            name: sample.name.clone(),
            seconds,
        };
        self.buckets.insert(key, Bucket::new(sample));
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns true if nothing was inserted since the table was created or taken.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of samples across all buckets.
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// The bucket for `name` in the given second, if any.
    pub fn get(&self, name: &str, seconds: i64) -> Option<&Bucket> {
        self.buckets.get(&BucketKeyRef { name, seconds })
    }

    /// Move every bucket out, leaving this table empty for the next cycle.
    pub fn take(&mut self) -> BucketTable {
        std::mem::take(self)
    }

    /// Reduce every bucket to exactly one sample.
    pub fn reduce(self, aggregation: Aggregation) -> Vec<Sample> {
        self.buckets
            .into_values()
            .map(|bucket| aggregation.reduce(&bucket))
            .collect()
    }
}
