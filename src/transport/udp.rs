//! Production UDP transport backed by `tokio::net::UdpSocket`.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::warn;

use super::{Transport, MAX_DATAGRAM_LEN};
use crate::codec::Addr;
use crate::error::TransportError;

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: Addr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await.map_err(TransportError::Io)?;
        socket.set_broadcast(true).map_err(TransportError::Io)?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn recv(&self) -> Result<(Bytes, Addr), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let (len, addr) = self.socket.recv_from(&mut buf).await.map_err(TransportError::Io)?;
        buf.truncate(len);
        Ok((Bytes::from(buf), addr))
    }

    async fn send_to(&self, data: Bytes, addr: Addr) {
        if data.len() > MAX_DATAGRAM_LEN {
            warn!(len = data.len(), %addr, "dropping outbound datagram exceeding max length");
            return;
        }
        if let Err(err) = self.socket.send_to(&data, addr).await {
            warn!(%err, %addr, "udp send failed, swallowing per transport contract");
        }
    }

    async fn broadcast(&self, data: Bytes, broadcast_addr: Addr) {
        self.send_to(data, broadcast_addr).await;
    }
}
