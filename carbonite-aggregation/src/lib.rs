// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Aggregation of carbon samples before they are sent.
//!
//! An [`Aggregator`] is the ingest side of a dedicated worker thread. The worker owns a
//! [`BucketTable`] that groups samples by name and wall-clock second. Every flush interval it
//! swaps the table for an empty one, reduces each bucket with the configured [`Aggregation`],
//! and hands the whole batch to a [`SampleSink`](carbonite_core::SampleSink) in one call.
//!
//! Producers never touch the table: they only hold a channel sender, so no lock is needed.
//!
//! ```
//! use carbonite_aggregation::{Aggregation, AggregatorBuilder};
//! use carbonite_core::{Sample, test_util::VecSink};
//! use std::time::{Duration, UNIX_EPOCH};
//!
//! let sink = VecSink::default();
//! let (aggregator, handle) = AggregatorBuilder::new(Duration::from_secs(10), Aggregation::Sum)
//!     .prefix(["api"])
//!     .build(sink.clone())
//!     .unwrap();
//!
//! let t = UNIX_EPOCH + Duration::from_secs(1_000);
//! aggregator.ingest(Sample::new("requests", 1.0, t));
//! aggregator.ingest(Sample::new("requests", 1.0, t));
//!
//! // shutting down flushes whatever is left
//! handle.shut_down();
//! assert_eq!(sink.lines(), ["api.requests 2 1000"]);
//! ```

pub mod aggregator;
mod rate_limit;
pub mod strategy;
pub mod table;

pub use aggregator::{Aggregator, AggregatorBuilder, AggregatorJoinHandle, BuildError, start};
pub use strategy::{Aggregation, Bucket, ParseAggregationError};
pub use table::{BucketKey, BucketTable};
