// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Sends aggregated request latencies to a local carbon collector.
//!
//! Listen with `nc -klu 2003` to see the datagrams.

use std::{thread, time::Duration};

use carbonite::{Aggregation, Config, Conn, Sample};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let conn = Conn::dial(
        "localhost:2003",
        Config::new()
            .connect_timeout(Duration::from_secs(2))
            .prefix(["demo", "host01"])
            .autoflush(Duration::from_millis(500), Aggregation::Sum)
            .verbose(true),
    )?;
    let latency = conn.new_aggregation(Duration::from_secs(1), Aggregation::Mean, ["latency"])?;

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let latency = latency.clone();
            thread::spawn(move || {
                for request in 0..50 {
                    latency.ingest(Sample::now("get", f64::from(worker * 10 + request % 7)));
                    thread::sleep(Duration::from_millis(20));
                }
            })
        })
        .collect();

    for _ in 0..10 {
        conn.write(&[Sample::now("requests", 1.0)])?;
        thread::sleep(Duration::from_millis(100));
    }
    for worker in workers {
        let _ = worker.join();
    }

    info!("closing connection");
    // flushes both the autoflush and the latency aggregation
    conn.close();
    Ok(())
}
