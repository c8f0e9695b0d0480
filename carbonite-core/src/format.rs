// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The Carbon plaintext line protocol.
//!
//! Every sample becomes one line, `<prefix><name> <value> <unix-seconds>\n`. A batch of samples is
//! concatenated into a single buffer so that it can be sent with one datagram write.

use std::fmt::Write;

use crate::Sample;

/// Renders samples as protocol lines, prepending a fixed prefix to every name.
///
/// The prefix is usually built with [`join_prefix`](crate::join_prefix) and therefore already ends
/// with a `.` when it is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFormat {
    prefix: String,
}

impl LineFormat {
    /// Create a format that prepends `prefix` to every metric name.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The prefix prepended to every name.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Append the line for `sample`, including the trailing newline, to `buf`.
    pub fn write_line(&self, buf: &mut String, sample: &Sample) {
        buf.push_str(&self.prefix);
        // writing into a String can't fail
        let _ = writeln!(buf, "{sample}");
    }

    /// Encode a whole batch into one buffer.
    ///
    /// The buffer is fully composed before being returned, so a caller that sends it with a single
    /// write never interleaves partial batches with other writers of the same socket.
    pub fn encode(&self, samples: &[Sample]) -> String {
        let mut buf = String::with_capacity(samples.len() * 48);
        for sample in samples {
            self.write_line(&mut buf, sample);
        }
        buf
    }
}
