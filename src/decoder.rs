//! Decoder module
//!
//! This module turns raw datagrams into [`Packet`]s and [`ReadingSet`]s.
//! Decoding is pure: the only input besides the bytes is the reception
//! time, which the wire format does not carry.

use crate::error::DecodeError;
use crate::packet::{Packet, SensorBlock};
use crate::protocol::{ProtocolRevision, ReadingSet, SensorId, HEADER_SIZE};
use chrono::{DateTime, Utc};

/// Decoder for one protocol revision
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    revision: ProtocolRevision,
}

impl Decoder {
    /// Create a decoder for the given revision
    pub fn new(revision: ProtocolRevision) -> Self {
        Self { revision }
    }

    /// Revision this decoder accepts
    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// Decode a datagram, stamping readings with the current time
    pub fn decode(&self, bytes: &[u8]) -> Result<ReadingSet, DecodeError> {
        self.decode_at(bytes, Utc::now())
    }

    /// Decode a datagram, stamping readings with `received_at`
    pub fn decode_at(
        &self,
        bytes: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<ReadingSet, DecodeError> {
        let packet = self.decode_packet(bytes)?;
        let readings = packet.readings(received_at);

        Ok(ReadingSet {
            device_id: packet.device_id,
            board_type: packet.board_type,
            tag_class: packet.tag_class,
            received_at,
            revision: self.revision,
            readings,
        })
    }

    /// Decode a datagram into its header and sensor blocks
    pub fn decode_packet(&self, bytes: &[u8]) -> Result<Packet, DecodeError> {
        let min_len = self.revision.min_len();
        if bytes.len() < min_len {
            return Err(DecodeError::TooShort {
                needed: min_len,
                available: bytes.len(),
            });
        }

        let mut reader = WireReader::new(bytes, self.revision.little_endian());

        let declared = reader.read_u8()? as usize;
        if declared != bytes.len() {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }

        let device_id = reader.read_u16()?;
        if device_id == 0 {
            return Err(DecodeError::InvalidDeviceId(device_id));
        }

        let board_type = reader.read_u8()?;
        let tag_class = reader.read_u8()?;
        debug_assert_eq!(reader.offset(), HEADER_SIZE);

        let mut packet = Packet::new(device_id, board_type, tag_class);
        let mut seen: u16 = 0;

        while !reader.is_empty() {
            let offset = reader.offset();
            let raw_id = reader.read_u8()?;
            let sensor = SensorId::from_u8(raw_id)
                .filter(|s| self.revision.supports(*s))
                .ok_or(DecodeError::UnknownSensor {
                    sensor_id: raw_id,
                    offset,
                })?;

            let bit = 1u16 << raw_id;
            if seen & bit != 0 {
                return Err(DecodeError::DuplicateSensor(raw_id));
            }
            seen |= bit;

            packet.blocks.push(self.decode_block(sensor, &mut reader)?);
        }

        Ok(packet)
    }

    fn decode_block(
        &self,
        sensor: SensorId,
        reader: &mut WireReader<'_>,
    ) -> Result<SensorBlock, DecodeError> {
        let field = sensor.field_name();
        let block = match sensor {
            SensorId::Battery => {
                let pct = reader.read_u8()?;
                if pct > 100 {
                    return Err(DecodeError::OutOfRange {
                        field,
                        value: pct as f64,
                    });
                }
                SensorBlock::Battery(pct)
            }
            SensorId::Position => SensorBlock::Position([
                reader.read_finite(field)?,
                reader.read_finite(field)?,
                reader.read_finite(field)?,
                reader.read_finite(field)?,
            ]),
            SensorId::Acceleration => match self.revision {
                ProtocolRevision::V1 => SensorBlock::Acceleration([
                    milli_g(reader.read_i16()?),
                    milli_g(reader.read_i16()?),
                    milli_g(reader.read_i16()?),
                ]),
                ProtocolRevision::V2 => SensorBlock::Acceleration([
                    reader.read_finite(field)?,
                    reader.read_finite(field)?,
                    reader.read_finite(field)?,
                ]),
            },
            SensorId::Vibration => SensorBlock::Vibration(reader.read_finite(field)?),
            SensorId::Temperature => SensorBlock::Temperature(reader.read_finite(field)?),
            SensorId::Pressure => SensorBlock::Pressure(reader.read_finite(field)?),
            SensorId::Latitude => SensorBlock::Latitude(reader.read_finite(field)?),
            SensorId::Longitude => SensorBlock::Longitude(reader.read_finite(field)?),
            SensorId::Altitude => SensorBlock::Altitude(reader.read_finite(field)?),
            SensorId::Co2 => SensorBlock::Co2(reader.read_finite(field)?),
            SensorId::So2 => SensorBlock::So2(reader.read_finite(field)?),
        };
        Ok(block)
    }
}

fn milli_g(raw: i16) -> f32 {
    raw as f32 / 1000.0
}

/// Bounds-checked cursor over a datagram
struct WireReader<'a> {
    buf: &'a [u8],
    offset: usize,
    little_endian: bool,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8], little_endian: bool) -> Self {
        Self {
            buf,
            offset: 0,
            little_endian,
        }
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn is_empty(&self) -> bool {
        self.offset >= self.buf.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let available = self.buf.len().saturating_sub(self.offset);
        if available < N {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed: N,
                available,
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.offset..self.offset + N]);
        self.offset += N;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take::<2>()?;
        Ok(if self.little_endian {
            u16::from_le_bytes(bytes)
        } else {
            u16::from_be_bytes(bytes)
        })
    }

    fn read_i16(&mut self) -> Result<i16, DecodeError> {
        let bytes = self.take::<2>()?;
        Ok(if self.little_endian {
            i16::from_le_bytes(bytes)
        } else {
            i16::from_be_bytes(bytes)
        })
    }

    fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let bytes = self.take::<4>()?;
        Ok(if self.little_endian {
            f32::from_le_bytes(bytes)
        } else {
            f32::from_be_bytes(bytes)
        })
    }

    fn read_finite(&mut self, field: &'static str) -> Result<f32, DecodeError> {
        let value = self.read_f32()?;
        if !value.is_finite() {
            return Err(DecodeError::NonFinite(field));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::packet::Environment;
    use crate::protocol::{Channel, Value};

    /// Device 1234 with the full v1 block set
    fn v1_bytes() -> Vec<u8> {
        let mut b = vec![46u8];
        b.extend_from_slice(&1234u16.to_be_bytes());
        b.push(1);
        b.push(2);
        b.extend_from_slice(&[0, 85]);
        b.push(1);
        for v in [1.0f32, 2.0, 3.0, 4.0] {
            b.extend_from_slice(&v.to_be_bytes());
        }
        b.push(2);
        for v in [100i16, 200, 300] {
            b.extend_from_slice(&v.to_be_bytes());
        }
        for (id, v) in [(3u8, 0.5f32), (4, 25.5), (5, 1013.25)] {
            b.push(id);
            b.extend_from_slice(&v.to_be_bytes());
        }
        b
    }

    #[test]
    fn test_decode_v1_reference_packet() {
        let bytes = v1_bytes();
        assert_eq!(bytes.len(), 46);

        let set = Decoder::new(ProtocolRevision::V1).decode(&bytes).unwrap();
        assert_eq!(set.device_id, 1234);
        assert_eq!(set.board_type, 1);
        assert_eq!(set.tag_class, 2);
        assert_eq!(set.get(Channel::Battery).unwrap().value, Value::Scalar(85.0));
        assert_eq!(
            set.get(Channel::Temperature).unwrap().value,
            Value::Scalar(25.5)
        );
        let ax = set.get(Channel::AccelerationX).unwrap().value.as_scalar().unwrap();
        assert!((ax - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_decode_too_short() {
        let bytes = vec![10u8; 10];
        let err = Decoder::new(ProtocolRevision::V1).decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooShort {
                needed: 46,
                available: 10
            }
        );
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut bytes = v1_bytes();
        bytes[0] = 50;
        let err = Decoder::new(ProtocolRevision::V1).decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::LengthMismatch {
                declared: 50,
                actual: 46
            }
        ));
    }

    #[test]
    fn test_decode_zero_device_id() {
        let mut bytes = v1_bytes();
        bytes[1] = 0;
        bytes[2] = 0;
        let err = Decoder::new(ProtocolRevision::V1).decode(&bytes).unwrap_err();
        assert_eq!(err, DecodeError::InvalidDeviceId(0));
    }

    #[test]
    fn test_decode_unknown_and_duplicate_sensor() {
        // id 9 (co2) does not exist in v1
        let mut bytes = v1_bytes();
        bytes.extend_from_slice(&[9, 0, 0, 0, 0]);
        bytes[0] = bytes.len() as u8;
        let err = Decoder::new(ProtocolRevision::V1).decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnknownSensor {
                sensor_id: 9,
                offset: 46
            }
        ));

        let mut bytes = v1_bytes();
        bytes.extend_from_slice(&[4, 0, 0, 0, 0]);
        bytes[0] = bytes.len() as u8;
        let err = Decoder::new(ProtocolRevision::V1).decode(&bytes).unwrap_err();
        assert_eq!(err, DecodeError::DuplicateSensor(4));
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut reader = WireReader::new(&[1, 2, 3], false);
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert_eq!(
            reader.read_f32().unwrap_err(),
            DecodeError::Truncated {
                offset: 2,
                needed: 4,
                available: 1
            }
        );
    }

    #[test]
    fn test_decode_battery_out_of_range() {
        let mut bytes = v1_bytes();
        bytes[6] = 101;
        let err = Decoder::new(ProtocolRevision::V1).decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::OutOfRange {
                field: "battery",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_non_finite() {
        let mut bytes = v1_bytes();
        // vibration payload starts after header(5) + battery(2) + position(17) + accel(7) + id(1)
        let offset = 5 + 2 + 17 + 7 + 1;
        bytes[offset..offset + 4].copy_from_slice(&f32::NAN.to_be_bytes());
        let err = Decoder::new(ProtocolRevision::V1).decode(&bytes).unwrap_err();
        assert_eq!(err, DecodeError::NonFinite("vibration"));
    }

    #[test]
    fn test_bad_coordinates_drop_only_location() {
        let environment = Environment {
            latitude: 95.0,
            ..Environment::default()
        };
        let packet = Packet::standard(
            ProtocolRevision::V2,
            77,
            60,
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0],
            0.2,
            61.0,
            1009.0,
            Some(environment),
        );
        let bytes = Encoder::new(ProtocolRevision::V2).encode(&packet).unwrap();

        let set = Decoder::new(ProtocolRevision::V2).decode(&bytes).unwrap();
        assert!(set.get(Channel::Location).is_none());
        assert_eq!(set.get(Channel::Temperature).unwrap().value, Value::Scalar(61.0));
        assert_eq!(set.get(Channel::Co2).unwrap().value, Value::Scalar(420.0));
        assert_eq!(set.len(), Channel::ALL.len() - 1);
    }

    #[test]
    fn test_revisions_are_not_interchangeable() {
        let bytes = v1_bytes();
        let err = Decoder::new(ProtocolRevision::V2).decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::TooShort { needed: 77, .. }));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let bytes = v1_bytes();
        let ts = Utc::now();
        let decoder = Decoder::new(ProtocolRevision::V1);
        assert_eq!(
            decoder.decode_at(&bytes, ts).unwrap(),
            decoder.decode_at(&bytes, ts).unwrap()
        );
    }
}
