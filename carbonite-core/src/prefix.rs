// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Joins prefix segments into a metric name prefix.
///
/// Empty segments are skipped. A single trailing `.` is stripped from each segment, any other `.`
/// inside a segment becomes `_` (a segment is one level of the metric path), and every segment is
/// followed by a `.`. No segments produce an empty prefix.
///
/// ```
/// use carbonite_core::join_prefix;
///
/// assert_eq!(join_prefix(["test", "nest"]), "test.nest.");
/// assert_eq!(join_prefix(["medium."]), "medium.");
/// assert_eq!(join_prefix(Vec::<String>::new()), "");
/// ```
pub fn join_prefix<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut prefix = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        let segment = segment.strip_suffix('.').unwrap_or(segment);
        prefix.push_str(&segment.replace('.', "_"));
        prefix.push('.');
    }
    prefix
}
