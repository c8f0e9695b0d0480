// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Send metrics to a Carbon (Graphite) collector over UDP, using the plaintext protocol.
//!
//! Every [`Sample`] is rendered as one `name value timestamp` line, and every batch is sent as a
//! single datagram. A [`Conn`] can send immediately ([`Conn::push`]), or aggregate samples by name
//! and second before sending them on an interval ([`Conn::new_aggregation`],
//! [`Config::autoflush`]).
//!
//! ```no_run
//! use carbonite::{Aggregation, Config, Conn, Sample};
//! use std::time::Duration;
//!
//! let conn = Conn::dial(
//!     "localhost:2003",
//!     Config::new()
//!         .prefix(["prod", "web01"])
//!         .autoflush(Duration::from_secs(10), Aggregation::Sum),
//! )?;
//!
//! // aggregated, sent as `prod.web01.requests 2 <now>` within 10 seconds
//! conn.write(&[Sample::now("requests", 1.0), Sample::now("requests", 1.0)])?;
//!
//! // waits for the final flush
//! conn.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Send failures never panic. [`Conn::push`] returns them, aggregators log them via [`tracing`]
//! and keep going.

mod config;
mod conn;
mod transport;

pub use carbonite_aggregation::{
    Aggregation, Aggregator, AggregatorBuilder, AggregatorJoinHandle, BuildError, Bucket,
    BucketTable, ParseAggregationError,
};
pub use carbonite_core::{
    FlushWait, LineFormat, Sample, SampleSink, SendError, join_prefix, unix_seconds,
};
pub use config::{Autoflush, Config};
pub use conn::{Conn, ConnectError};
