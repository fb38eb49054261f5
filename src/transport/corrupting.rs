//! Packet corruption injection (spec §1: "packet corruption modeling" is an
//! out-of-scope simulation concern; spec §6 still lists `packetBER` as a
//! configuration input). Grounded in `corruptPacket`'s call sites in
//! `examples/original_source/src/modules/server/MqttSNServer.cc`, which
//! corrupt outbound packets at the bit-error-rate probability before the
//! socket send — never inbound ones.

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;

use super::Transport;
use crate::codec::Addr;
use crate::error::TransportError;

/// Wraps a `Transport` and flips each outbound bit independently with
/// probability `ber`. Exists for fault-injection testing; production
/// configs leave `ber = 0.0`.
pub struct CorruptingTransport<T: Transport> {
    inner: T,
    ber: f64,
}

impl<T: Transport> CorruptingTransport<T> {
    pub fn new(inner: T, ber: f64) -> Self {
        Self { inner, ber: ber.clamp(0.0, 1.0) }
    }

    fn corrupt(&self, data: Bytes) -> Bytes {
        if self.ber <= 0.0 {
            return data;
        }
        let mut bytes = data.to_vec();
        let mut rng = rand::thread_rng();
        for byte in bytes.iter_mut() {
            for bit in 0..8u8 {
                if rng.gen_bool(self.ber) {
                    *byte ^= 1 << bit;
                }
            }
        }
        Bytes::from(bytes)
    }
}

#[async_trait]
impl<T: Transport> Transport for CorruptingTransport<T> {
    async fn recv(&self) -> Result<(Bytes, Addr), TransportError> {
        self.inner.recv().await
    }

    async fn send_to(&self, data: Bytes, addr: Addr) {
        self.inner.send_to(self.corrupt(data), addr).await;
    }

    async fn broadcast(&self, data: Bytes, broadcast_addr: Addr) {
        self.inner.broadcast(self.corrupt(data), broadcast_addr).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTransport {
        sent_len: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn recv(&self) -> Result<(Bytes, Addr), TransportError> {
            unimplemented!()
        }

        async fn send_to(&self, data: Bytes, _addr: Addr) {
            self.sent_len.store(data.len(), Ordering::SeqCst);
        }

        async fn broadcast(&self, data: Bytes, addr: Addr) {
            self.send_to(data, addr).await;
        }
    }

    #[tokio::test]
    async fn zero_ber_leaves_payload_unchanged() {
        let sent_len = Arc::new(AtomicUsize::new(0));
        let inner = CountingTransport {
            sent_len: sent_len.clone(),
        };
        let transport = CorruptingTransport::new(inner, 0.0);
        let addr: Addr = "127.0.0.1:1".parse().unwrap();
        transport.send_to(Bytes::from_static(b"hello"), addr).await;
        assert_eq!(sent_len.load(Ordering::SeqCst), 5);
    }
}
