//! Stream socket primitive used by the connection supervisor.
//!
//! [`Connector`] is the seam between the supervisor and the network. The
//! default [`TcpConnector`] resolves the gateway host and opens a TCP stream
//! with [`SocketOptions`] applied before connecting.

use std::{io, time::Duration};

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use socket2::{SockRef, TcpKeepalive};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpSocket, TcpStream, lookup_host},
};

/// Opens byte streams to the gateway.
///
/// Implementations must be cancellation-safe: dropping a pending `connect`
/// future must not leak the socket.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced by this connector.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a stream to `host:port`.
    async fn connect(&self, host: &str, port: u16, options: &SocketOptions)
    -> io::Result<Self::Stream>;
}

/// Plain TCP connector.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        options: &SocketOptions,
    ) -> io::Result<TcpStream> {
        let mut last_error = None;
        for addr in lookup_host((host, port)).await? {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            options.apply(&socket)?;
            match socket.connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(error) => {
                    debug!("connect to {addr} failed: {error}");
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host} did not resolve to any address"),
            )
        }))
    }
}

/// Socket options applied before connecting.
///
/// Unset options keep the operating system defaults.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hvac_bridge::connection::SocketOptions;
///
/// let options = SocketOptions::default()
///     .nodelay(true)
///     .keepalive(Some(Duration::from_secs(30)));
/// assert_eq!(options, options.nodelay(true));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketOptions {
    nodelay: Option<bool>,
    /// Keepalive idle time in milliseconds, zero disables keepalive.
    keepalive_ms: Option<u64>,
    /// Linger time in milliseconds, zero disables lingering.
    linger_ms: Option<u64>,
    send_buffer_size: Option<u32>,
    recv_buffer_size: Option<u32>,
}

fn to_millis(duration: Option<Duration>) -> u64 {
    duration.map_or(0, |value| {
        u64::try_from(value.as_millis()).unwrap_or(u64::MAX).max(1)
    })
}

fn from_millis(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis))
}

impl SocketOptions {
    /// Configure `TCP_NODELAY`.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = Some(enabled);
        self
    }

    /// Configure `SO_KEEPALIVE`; `None` turns keepalive off.
    #[must_use]
    pub fn keepalive(mut self, idle: Option<Duration>) -> Self {
        self.keepalive_ms = Some(to_millis(idle));
        self
    }

    /// Configure `SO_LINGER`; `None` turns lingering off.
    #[must_use]
    pub fn linger(mut self, duration: Option<Duration>) -> Self {
        self.linger_ms = Some(to_millis(duration));
        self
    }

    /// Configure the socket send buffer size.
    #[must_use]
    pub fn send_buffer_size(mut self, size: u32) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    /// Configure the socket receive buffer size.
    #[must_use]
    pub fn recv_buffer_size(mut self, size: u32) -> Self {
        self.recv_buffer_size = Some(size);
        self
    }

    pub(crate) fn apply(&self, socket: &TcpSocket) -> io::Result<()> {
        if let Some(enabled) = self.nodelay {
            socket.set_nodelay(enabled)?;
        }
        if let Some(millis) = self.keepalive_ms {
            match from_millis(millis) {
                Some(idle) => {
                    socket.set_keepalive(true)?;
                    SockRef::from(socket).set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
                }
                None => socket.set_keepalive(false)?,
            }
        }
        if let Some(millis) = self.linger_ms {
            SockRef::from(socket).set_linger(from_millis(millis))?;
        }
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn disabled_keepalive_round_trips_through_serde() {
        let options = SocketOptions::default().keepalive(None).nodelay(true);
        let json = serde_json::to_string(&options).expect("serialize");
        let back: SocketOptions = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, options);
        assert_eq!(back.keepalive_ms, Some(0));
    }

    #[test]
    fn sub_millisecond_keepalive_is_not_disabled() {
        let options = SocketOptions::default().keepalive(Some(Duration::from_micros(10)));
        assert_eq!(options.keepalive_ms, Some(1));
    }

    #[tokio::test]
    async fn linger_is_applied_and_cleared() {
        let socket = TcpSocket::new_v4().expect("socket");
        SocketOptions::default()
            .linger(Some(Duration::from_secs(2)))
            .apply(&socket)
            .expect("apply linger");
        assert_eq!(
            SockRef::from(&socket).linger().expect("linger"),
            Some(Duration::from_secs(2))
        );

        SocketOptions::default()
            .linger(None)
            .apply(&socket)
            .expect("clear linger");
        assert_eq!(SockRef::from(&socket).linger().expect("linger"), None);
    }

    #[tokio::test]
    async fn tcp_connector_applies_options() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let options = SocketOptions::default()
            .nodelay(true)
            .keepalive(Some(Duration::from_secs(30)));

        let stream = TcpConnector
            .connect("127.0.0.1", port, &options)
            .await
            .expect("connect");
        assert!(stream.nodelay().expect("nodelay"));
    }
}
