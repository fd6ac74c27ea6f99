//! Encoder module
//!
//! This module serializes [`Packet`]s into datagrams for one protocol
//! revision. It is the inverse of the [`Decoder`](crate::Decoder) and is
//! used by the device simulator and by tests.

use crate::error::EncodeError;
use crate::packet::{Packet, SensorBlock};
use crate::protocol::{ProtocolRevision, MAX_PACKET_SIZE};

/// Encoder for one protocol revision
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    revision: ProtocolRevision,
}

impl Encoder {
    /// Create an encoder for the given revision
    pub fn new(revision: ProtocolRevision) -> Self {
        Self { revision }
    }

    /// Revision this encoder writes
    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// Encode a packet into a datagram
    pub fn encode(&self, packet: &Packet) -> Result<Vec<u8>, EncodeError> {
        if packet.device_id == 0 {
            return Err(EncodeError::InvalidDeviceId(0));
        }

        if let Some(block) = packet
            .blocks
            .iter()
            .find(|b| !self.revision.supports(b.sensor_id()))
        {
            return Err(EncodeError::UnsupportedSensor {
                sensor_id: block.sensor_id() as u8,
                revision: self.revision.as_str(),
            });
        }

        let size = packet.encoded_len(self.revision);
        if size > MAX_PACKET_SIZE {
            return Err(EncodeError::PacketTooLarge {
                size,
                max: MAX_PACKET_SIZE,
            });
        }

        let mut out = Vec::with_capacity(size);
        out.push(size as u8);
        self.put_u16(&mut out, packet.device_id);
        out.push(packet.board_type);
        out.push(packet.tag_class);

        for block in &packet.blocks {
            out.push(block.sensor_id() as u8);
            match *block {
                SensorBlock::Battery(pct) => out.push(pct),
                SensorBlock::Position(q) => {
                    for v in q {
                        self.put_f32(&mut out, v);
                    }
                }
                SensorBlock::Acceleration(axes) => match self.revision {
                    ProtocolRevision::V1 => {
                        for g in axes {
                            let milli = (g * 1000.0)
                                .round()
                                .clamp(i16::MIN as f32, i16::MAX as f32)
                                as i16;
                            self.put_i16(&mut out, milli);
                        }
                    }
                    ProtocolRevision::V2 => {
                        for g in axes {
                            self.put_f32(&mut out, g);
                        }
                    }
                },
                SensorBlock::Vibration(v)
                | SensorBlock::Temperature(v)
                | SensorBlock::Pressure(v)
                | SensorBlock::Latitude(v)
                | SensorBlock::Longitude(v)
                | SensorBlock::Altitude(v)
                | SensorBlock::Co2(v)
                | SensorBlock::So2(v) => self.put_f32(&mut out, v),
            }
        }

        debug_assert_eq!(out.len(), size);
        Ok(out)
    }

    fn put_u16(&self, out: &mut Vec<u8>, v: u16) {
        if self.revision.little_endian() {
            out.extend_from_slice(&v.to_le_bytes());
        } else {
            out.extend_from_slice(&v.to_be_bytes());
        }
    }

    fn put_i16(&self, out: &mut Vec<u8>, v: i16) {
        if self.revision.little_endian() {
            out.extend_from_slice(&v.to_le_bytes());
        } else {
            out.extend_from_slice(&v.to_be_bytes());
        }
    }

    fn put_f32(&self, out: &mut Vec<u8>, v: f32) {
        if self.revision.little_endian() {
            out.extend_from_slice(&v.to_le_bytes());
        } else {
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::packet::Environment;

    fn sample(revision: ProtocolRevision) -> Packet {
        Packet::standard(
            revision,
            1234,
            85,
            [1.0, 2.0, 3.0, 4.0],
            [0.1, 0.2, 0.3],
            0.5,
            25.5,
            1013.25,
            Some(Environment::default()),
        )
    }

    #[test]
    fn test_encode_v1_layout() {
        let bytes = Encoder::new(ProtocolRevision::V1)
            .encode(&sample(ProtocolRevision::V1))
            .unwrap();
        assert_eq!(bytes.len(), 46);
        assert_eq!(bytes[0], 46);
        assert_eq!(&bytes[1..3], &1234u16.to_be_bytes());
        // accel x in milli-g, big-endian
        assert_eq!(&bytes[25..27], &100i16.to_be_bytes());
    }

    #[test]
    fn test_encode_v2_layout() {
        let bytes = Encoder::new(ProtocolRevision::V2)
            .encode(&sample(ProtocolRevision::V2))
            .unwrap();
        assert_eq!(bytes.len(), 77);
        assert_eq!(&bytes[1..3], &1234u16.to_le_bytes());
        assert_eq!(&bytes[25..29], &0.1f32.to_le_bytes());
    }

    #[test]
    fn test_encode_then_decode_v2() {
        let packet = sample(ProtocolRevision::V2);
        let bytes = Encoder::new(ProtocolRevision::V2).encode(&packet).unwrap();
        let decoded = Decoder::new(ProtocolRevision::V2)
            .decode_packet(&bytes)
            .unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_encode_rejects_v2_blocks_on_v1() {
        let err = Encoder::new(ProtocolRevision::V1)
            .encode(&sample(ProtocolRevision::V2))
            .unwrap_err();
        assert_eq!(
            err,
            EncodeError::UnsupportedSensor {
                sensor_id: 6,
                revision: "v1"
            }
        );
    }

    #[test]
    fn test_encode_rejects_zero_device() {
        let packet = Packet::new(0, 1, 2);
        assert_eq!(
            Encoder::new(ProtocolRevision::V2).encode(&packet),
            Err(EncodeError::InvalidDeviceId(0))
        );
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let mut packet = Packet::new(1, 1, 2);
        for _ in 0..20 {
            packet.blocks.push(SensorBlock::Position([0.0; 4]));
        }
        assert!(matches!(
            Encoder::new(ProtocolRevision::V2).encode(&packet),
            Err(EncodeError::PacketTooLarge { size: 345, max: 255 })
        ));
    }
}
