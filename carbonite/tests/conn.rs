// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    io::ErrorKind,
    net::UdpSocket,
    time::{Duration, UNIX_EPOCH},
};

use assert2::{check, let_assert};
use carbonite::{Aggregation, BuildError, Config, Conn, ConnectError, Sample, SampleSink};
use rstest::rstest;

struct Collector {
    socket: UdpSocket,
}

impl Collector {
    fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        Self { socket }
    }

    fn address(&self) -> String {
        self.socket.local_addr().unwrap().to_string()
    }

    fn recv(&self) -> String {
        let mut buf = [0; 65_536];
        let len = self.socket.recv(&mut buf).unwrap();
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    fn assert_silent(&self) {
        self.socket
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let mut buf = [0; 1024];
        let_assert!(Err(err) = self.socket.recv(&mut buf));
        check!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));
    }
}

fn at(name: &str, value: f64, secs: u64) -> Sample {
    Sample::new(name, value, UNIX_EPOCH + Duration::from_secs(secs))
}

#[test]
fn dial_succeeds_without_listener() {
    let conn = Conn::dial("localhost:2003", Config::new()).unwrap();
    check!(conn.peer_addr().unwrap().port() == 2003);
    check!(!conn.autoflush_enabled());
}

#[rstest]
#[case("localhost:100500")]
#[case("localhost")]
#[case("")]
fn dial_rejects_bad_addresses(#[case] address: &str) {
    let_assert!(Err(ConnectError::Resolve(_)) = Conn::dial(address, Config::new()));
}

#[test]
fn dial_with_timeout() {
    let config = Config::new().connect_timeout(Duration::from_secs(5));
    let conn = Conn::dial("127.0.0.1:2003", config).unwrap();
    check!(conn.peer_addr().unwrap().port() == 2003);
}

#[test]
fn zero_timeout_means_unbounded() {
    let config = Config::new().connect_timeout(Duration::ZERO);
    Conn::dial("127.0.0.1:2003", config).unwrap();
}

#[test]
fn autoflush_with_zero_interval_fails() {
    let config = Config::new().autoflush(Duration::ZERO, Aggregation::Sum);
    let_assert!(
        Err(ConnectError::Autoflush(BuildError::ZeroFlushInterval)) =
            Conn::dial("127.0.0.1:2003", config)
    );
}

#[test]
fn push_sends_one_datagram_per_batch() {
    let collector = Collector::bind();
    let conn = Conn::dial(&collector.address(), Config::new().prefix(["test", "con.n"])).unwrap();

    conn.push(&[at("a", 1.0, 10), at("b", 2.5, 11)]).unwrap();
    check!(collector.recv() == "test.con_n.a 1 10\ntest.con_n.b 2.5 11\n");
}

#[test]
fn empty_push_sends_nothing() {
    let collector = Collector::bind();
    let conn = Conn::dial(&collector.address(), Config::new()).unwrap();
    conn.push(&[]).unwrap();
    collector.assert_silent();
}

#[test]
fn write_without_autoflush_sends_immediately() {
    let collector = Collector::bind();
    let conn = Conn::dial(&collector.address(), Config::new()).unwrap();

    conn.write(&[at("m", 1.0, 5), at("m", 2.0, 5)]).unwrap();
    check!(collector.recv() == "m 1 5\nm 2 5\n");
}

#[test]
fn autoflush_aggregates_writes() {
    let collector = Collector::bind();
    let config = Config::new()
        .prefix(["app"])
        .autoflush(Duration::from_secs(3600), Aggregation::Sum);
    let conn = Conn::dial(&collector.address(), config).unwrap();
    check!(conn.autoflush_enabled());

    conn.write(&[at("m", 1.0, 5), at("m", 2.0, 5)]).unwrap();
    conn.write(&[at("m", 3.0, 5)]).unwrap();
    collector.assert_silent();

    conn.close();
    check!(collector.recv() == "app.m 6 5\n");
}

#[test]
fn conn_as_sink_sends_immediately_with_autoflush() {
    let collector = Collector::bind();
    let config = Config::new().autoflush(Duration::from_secs(3600), Aggregation::Sum);
    let conn = Conn::dial(&collector.address(), config).unwrap();

    SampleSink::send(&conn, &[at("m", 1.0, 5), at("m", 2.0, 5)]).unwrap();
    check!(collector.recv() == "m 1 5\nm 2 5\n");

    // nothing was handed to the autoflush aggregator
    conn.close();
    collector.assert_silent();
}

#[test]
fn close_flushes_every_aggregation() {
    let collector = Collector::bind();
    let conn = Conn::dial(&collector.address(), Config::new()).unwrap();

    let sums = conn
        .new_aggregation(Duration::from_secs(3600), Aggregation::Sum, ["sum"])
        .unwrap();
    let maxes = conn
        .new_aggregation(Duration::from_secs(3600), Aggregation::Max, ["max"])
        .unwrap();
    for value in [4.0, 5.0] {
        sums.ingest(at("m", value, 7));
        maxes.ingest(at("m", value, 7));
    }

    conn.close();
    let mut lines = vec![collector.recv(), collector.recv()];
    lines.sort();
    check!(lines == ["max.m 5 7\n", "sum.m 9 7\n"]);

    // the workers are gone, further samples are dropped
    sums.ingest(at("m", 1.0, 8));
    collector.assert_silent();
}

#[test]
fn dropping_the_conn_flushes() {
    let collector = Collector::bind();
    let conn = Conn::dial(&collector.address(), Config::new().prefix(["outer"])).unwrap();
    let aggregator = conn
        .new_aggregation(Duration::from_secs(3600), Aggregation::Mean, ["inner", "x.y"])
        .unwrap();
    aggregator.ingest(at("m", 1.0, 3));
    aggregator.ingest(at("m", 2.0, 3));

    drop(conn);
    check!(collector.recv() == "outer.inner.x_y.m 1.5 3\n");
}

#[test]
fn aggregation_flushes_on_interval() {
    let collector = Collector::bind();
    let conn = Conn::dial(&collector.address(), Config::new()).unwrap();
    let aggregator = conn
        .new_aggregation(Duration::from_millis(10), Aggregation::Last, [""])
        .unwrap();

    aggregator.ingest(at("m", 42.0, 9));
    check!(collector.recv() == "m 42 9\n");
}

#[test]
fn explicit_flush_sends_before_interval() {
    let collector = Collector::bind();
    let conn = Conn::dial(&collector.address(), Config::new()).unwrap();
    let aggregator = conn
        .new_aggregation(Duration::from_secs(3600), Aggregation::Min, Vec::<String>::new())
        .unwrap();

    aggregator.ingest(at("m", 3.0, 1));
    aggregator.ingest(at("m", -1.0, 1));
    futures::executor::block_on(aggregator.flush());
    check!(collector.recv() == "m -1 1\n");
}

#[test]
fn zero_interval_aggregation_fails() {
    let conn = Conn::dial("127.0.0.1:2003", Config::new()).unwrap();
    let_assert!(
        Err(BuildError::ZeroFlushInterval) =
            conn.new_aggregation(Duration::ZERO, Aggregation::Sum, ["p"])
    );
}

#[test]
fn send_without_listener_does_not_panic() {
    let conn = Conn::dial("127.0.0.1:9", Config::new()).unwrap();
    // ICMP port unreachable may surface as an error on a later send, never as a panic
    let _ = conn.push(&[at("m", 1.0, 1)]);
    let _ = conn.push(&[at("m", 1.0, 1)]);
}
