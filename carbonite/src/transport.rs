// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    sync::mpsc,
    thread,
    time::Duration,
};

use carbonite_core::{LineFormat, Sample, SampleSink, SendError};

use crate::ConnectError;

/// Connected UDP socket that writes every batch as a single datagram.
#[derive(Debug)]
pub(crate) struct UdpSink {
    socket: UdpSocket,
    format: LineFormat,
    verbose: bool,
}

impl UdpSink {
    pub(crate) fn connect(
        address: &str,
        timeout: Option<Duration>,
        format: LineFormat,
        verbose: bool,
    ) -> Result<Self, ConnectError> {
        let peer = resolve(address, timeout)?;
        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;
        if verbose {
            tracing::debug!(%peer, "connected to carbon");
        }
        Ok(Self {
            socket,
            format,
            verbose,
        })
    }

    pub(crate) fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }
}

impl SampleSink for UdpSink {
    fn send(&self, batch: &[Sample]) -> Result<(), SendError> {
        if batch.is_empty() {
            return Ok(());
        }
        // one send per batch, so concurrent writers never interleave lines
        let buf = self.format.encode(batch);
        if self.verbose {
            tracing::debug!(bytes = buf.len(), metrics = batch.len(), "writing to carbon through UDP");
        }
        self.socket.send(buf.as_bytes())?;
        Ok(())
    }
}

fn resolve(address: &str, timeout: Option<Duration>) -> Result<SocketAddr, ConnectError> {
    let Some(timeout) = timeout else {
        return first_addr(address);
    };

    // std has no resolver timeout, so resolve on a helper thread and stop waiting for it
    let (sender, receiver) = mpsc::channel();
    let owned = address.to_owned();
    thread::Builder::new()
        .name("carbon-resolve".into())
        .spawn(move || {
            let _ = sender.send(first_addr(&owned));
        })?;
    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ConnectError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ConnectError::Io(io::Error::other(
            "address resolution thread exited early",
        ))),
    }
}

fn first_addr(address: &str) -> Result<SocketAddr, ConnectError> {
    address
        .to_socket_addrs()
        .map_err(ConnectError::Resolve)?
        .next()
        .ok_or_else(|| ConnectError::NoAddress(address.to_owned()))
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use assert2::check;

    use super::*;

    #[test]
    fn resolves_literal_addresses() {
        check!(first_addr("127.0.0.1:2003").unwrap() == "127.0.0.1:2003".parse::<SocketAddr>().unwrap());
        check!(resolve("[::1]:2003", Some(Duration::from_secs(5))).unwrap().is_ipv6());
    }

    #[test]
    fn rejects_bad_ports() {
        check!(matches!(first_addr("localhost:100500"), Err(ConnectError::Resolve(_))));
        check!(matches!(first_addr("localhost"), Err(ConnectError::Resolve(_))));
    }

    #[test]
    fn sends_one_datagram_per_batch() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let sink = UdpSink::connect(&address, None, LineFormat::new("p."), false).unwrap();
        check!(sink.peer_addr().unwrap() == listener.local_addr().unwrap());

        let t: SystemTime = UNIX_EPOCH + Duration::from_secs(42);
        sink.send(&[]).unwrap();
        sink.send(&[Sample::new("a", 1.0, t), Sample::new("b", 2.5, t)]).unwrap();

        let mut buf = [0u8; 1024];
        let len = listener.recv(&mut buf).unwrap();
        check!(std::str::from_utf8(&buf[..len]).unwrap() == "p.a 1 42\np.b 2.5 42\n");
    }
}
