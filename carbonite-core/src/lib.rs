// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Core types shared by the carbonite crates.
//!
//! A [`Sample`] is a single named, timestamped observation. Samples are rendered to the Carbon
//! plaintext protocol (`<name> <value> <unix-seconds>\n`) by [`LineFormat`] and handed to a
//! [`SampleSink`], which is whatever actually moves bytes to the collector.
//!
//! Aggregation lives in `carbonite-aggregation`, and the UDP connection in `carbonite`.

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use crate::format::LineFormat;
pub use crate::prefix::join_prefix;
pub use crate::sample::{Sample, unix_seconds};
pub use crate::sink::{FlushWait, SampleSink, SendError};

pub mod format;
mod prefix;
mod sample;
pub mod sink;

/// Test sinks for checking what would have been sent to the collector.
#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod test_util;
