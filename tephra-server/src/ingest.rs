// Tephra Server - UDP ingestion loop
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Receives device datagrams, decodes them and appends the readings to the
//! shared store. A bad datagram is logged and dropped; the loop only stops
//! on cancellation.

use crate::metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tephra::{ChannelStore, DecodeError, Decoder};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receive buffer size; larger than any valid packet
pub const RECV_BUFFER_SIZE: usize = 2048;

/// Decodes datagrams into the store
#[derive(Debug, Clone)]
pub struct Ingestor {
    decoder: Decoder,
    store: Arc<ChannelStore>,
}

impl Ingestor {
    /// Create an ingestor writing to `store`
    pub fn new(decoder: Decoder, store: Arc<ChannelStore>) -> Self {
        Self { decoder, store }
    }

    /// Decode one datagram and store its readings.
    ///
    /// Returns the number of readings stored.
    pub fn handle_datagram(&self, bytes: &[u8], peer: SocketAddr) -> Result<usize, DecodeError> {
        metrics::record_packet_received();

        let set = match self.decoder.decode(bytes) {
            Ok(set) => set,
            Err(e) => {
                metrics::record_packet_rejected(e.kind());
                warn!(peer = %peer, len = bytes.len(), error = %e, "dropping packet");
                debug!(peer = %peer, "packet bytes: {:02x?}", bytes);
                return Err(e);
            }
        };

        let stored = self.store.ingest(&set);
        metrics::record_ingest(&set, &self.store);
        debug!(
            peer = %peer,
            device_id = set.device_id,
            readings = stored,
            "packet stored"
        );
        Ok(stored)
    }

    /// Receive until `cancel` fires
    pub async fn run(&self, socket: UdpSocket, cancel: CancellationToken) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        info!(
            addr = ?socket.local_addr().ok(),
            revision = %self.decoder.revision(),
            "ingestion started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        // Failures are already logged and counted
                        let _ = self.handle_datagram(&buf[..len], peer);
                    }
                    Err(e) => warn!(error = %e, "UDP receive failed"),
                },
            }
        }

        info!("ingestion stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tephra::{Channel, Encoder, Packet, ProtocolRevision};

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn v2_packet(device_id: u16, temperature: f32) -> Vec<u8> {
        let packet = Packet::standard(
            ProtocolRevision::V2,
            device_id,
            90,
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0],
            0.1,
            temperature,
            1010.0,
            None,
        );
        Encoder::new(ProtocolRevision::V2).encode(&packet).unwrap()
    }

    #[test]
    fn test_rejection_returns_decode_error() {
        let store = Arc::new(ChannelStore::new(10));
        let ingestor = Ingestor::new(Decoder::new(ProtocolRevision::V2), store);
        let err = ingestor.handle_datagram(&[0x4d, 0x00, 0xff], peer()).unwrap_err();
        assert_eq!(err.kind(), "too_short");
    }

    #[test]
    fn test_malformed_then_valid() {
        let store = Arc::new(ChannelStore::new(100));
        let ingestor = Ingestor::new(Decoder::new(ProtocolRevision::V2), store.clone());

        assert!(ingestor.handle_datagram(&[1, 2, 3], peer()).is_err());
        assert!(ingestor.handle_datagram(&[0u8; 77], peer()).is_err());
        assert!(store.is_empty());

        let stored = ingestor.handle_datagram(&v2_packet(3, 21.0), peer()).unwrap();
        assert_eq!(stored, Channel::ALL.len());
        assert_eq!(
            store.read_latest(Channel::Temperature, Some(3)).unwrap().value.as_scalar(),
            Some(21.0)
        );
    }

    #[tokio::test]
    async fn test_run_survives_garbage() {
        let store = Arc::new(ChannelStore::new(100));
        let ingestor = Ingestor::new(Decoder::new(ProtocolRevision::V2), store.clone());

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { ingestor.run(socket, cancel).await })
        };

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"garbage", addr).await.unwrap();
        sender.send_to(&v2_packet(8, 30.0), addr).await.unwrap();

        for _ in 0..50 {
            if !store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(store.devices().into_iter().collect::<Vec<_>>(), vec![8]);
    }
}
