//! Structured packet representation
//!
//! A [`Packet`] is the lossless view of one datagram: header fields plus the
//! sensor blocks in wire order. The [`Decoder`](crate::Decoder) produces it,
//! the [`Encoder`](crate::Encoder) consumes it, and [`Packet::readings`]
//! turns it into per-channel [`Reading`]s.

use crate::protocol::{Channel, ProtocolRevision, Reading, SensorId, Value};
use chrono::{DateTime, Utc};

/// One sensor block.
///
/// Acceleration is always in g; the v1 codec converts to and from milli-g.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorBlock {
    Battery(u8),
    Position([f32; 4]),
    Acceleration([f32; 3]),
    Vibration(f32),
    Temperature(f32),
    Pressure(f32),
    Latitude(f32),
    Longitude(f32),
    Altitude(f32),
    Co2(f32),
    So2(f32),
}

impl SensorBlock {
    /// Wire id of this block
    pub fn sensor_id(&self) -> SensorId {
        match self {
            SensorBlock::Battery(_) => SensorId::Battery,
            SensorBlock::Position(_) => SensorId::Position,
            SensorBlock::Acceleration(_) => SensorId::Acceleration,
            SensorBlock::Vibration(_) => SensorId::Vibration,
            SensorBlock::Temperature(_) => SensorId::Temperature,
            SensorBlock::Pressure(_) => SensorId::Pressure,
            SensorBlock::Latitude(_) => SensorId::Latitude,
            SensorBlock::Longitude(_) => SensorId::Longitude,
            SensorBlock::Altitude(_) => SensorId::Altitude,
            SensorBlock::Co2(_) => SensorId::Co2,
            SensorBlock::So2(_) => SensorId::So2,
        }
    }
}

/// Header plus sensor blocks of one datagram
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Device identifier (must be non-zero)
    pub device_id: u16,
    /// Board type byte
    pub board_type: u8,
    /// Classification tag byte
    pub tag_class: u8,
    /// Sensor blocks in wire order
    pub blocks: Vec<SensorBlock>,
}

impl Packet {
    /// Create a packet with no sensor blocks
    pub fn new(device_id: u16, board_type: u8, tag_class: u8) -> Self {
        Self {
            device_id,
            board_type,
            tag_class,
            blocks: Vec::new(),
        }
    }

    /// Append a block
    pub fn with_block(mut self, block: SensorBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// Full block list a device running `revision` sends.
    ///
    /// v2-only blocks are skipped for v1.
    #[allow(clippy::too_many_arguments)]
    pub fn standard(
        revision: ProtocolRevision,
        device_id: u16,
        battery: u8,
        position: [f32; 4],
        acceleration: [f32; 3],
        vibration: f32,
        temperature: f32,
        pressure: f32,
        environment: Option<Environment>,
    ) -> Self {
        let mut packet = Packet::new(device_id, 1, 2)
            .with_block(SensorBlock::Battery(battery))
            .with_block(SensorBlock::Position(position))
            .with_block(SensorBlock::Acceleration(acceleration))
            .with_block(SensorBlock::Vibration(vibration))
            .with_block(SensorBlock::Temperature(temperature))
            .with_block(SensorBlock::Pressure(pressure));

        if revision == ProtocolRevision::V2 {
            let env = environment.unwrap_or_default();
            packet.blocks.extend([
                SensorBlock::Latitude(env.latitude),
                SensorBlock::Longitude(env.longitude),
                SensorBlock::Altitude(env.altitude),
                SensorBlock::Co2(env.co2),
                SensorBlock::So2(env.so2),
            ]);
        }
        packet
    }

    /// Encoded size for a revision
    pub fn encoded_len(&self, revision: ProtocolRevision) -> usize {
        crate::protocol::HEADER_SIZE
            + self
                .blocks
                .iter()
                .map(|b| 1 + revision.payload_len(b.sensor_id()))
                .sum::<usize>()
    }

    /// Expand into one reading per channel, all stamped with `received_at`.
    ///
    /// Acceleration splits into three axis channels, latitude/longitude/altitude
    /// merge into `location` (dropped unless both coordinates are present and
    /// within ±90/±180), and
    /// the header tag class becomes a `tag_class` reading.
    pub fn readings(&self, received_at: DateTime<Utc>) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(self.blocks.len() + 3);
        let mut latitude = None;
        let mut longitude = None;
        let mut altitude = None;

        let mut push = |channel: Channel, value: Value| {
            readings.push(Reading::new(received_at, self.device_id, channel, value));
        };

        for block in &self.blocks {
            match *block {
                SensorBlock::Battery(pct) => push(Channel::Battery, Value::Scalar(pct as f64)),
                SensorBlock::Position([x, y, z, w]) => push(
                    Channel::Position,
                    Value::Quaternion {
                        x: x as f64,
                        y: y as f64,
                        z: z as f64,
                        w: w as f64,
                    },
                ),
                SensorBlock::Acceleration([x, y, z]) => {
                    push(Channel::AccelerationX, Value::Scalar(x as f64));
                    push(Channel::AccelerationY, Value::Scalar(y as f64));
                    push(Channel::AccelerationZ, Value::Scalar(z as f64));
                }
                SensorBlock::Vibration(v) => push(Channel::Vibration, Value::Scalar(v as f64)),
                SensorBlock::Temperature(v) => push(Channel::Temperature, Value::Scalar(v as f64)),
                SensorBlock::Pressure(v) => push(Channel::Pressure, Value::Scalar(v as f64)),
                SensorBlock::Latitude(v) => latitude = Some(v as f64),
                SensorBlock::Longitude(v) => longitude = Some(v as f64),
                SensorBlock::Altitude(v) => altitude = Some(v as f64),
                SensorBlock::Co2(v) => push(Channel::Co2, Value::Scalar(v as f64)),
                SensorBlock::So2(v) => push(Channel::So2, Value::Scalar(v as f64)),
            }
        }

        match (latitude, longitude) {
            (Some(latitude), Some(longitude))
                if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) =>
            {
                push(
                    Channel::Location,
                    Value::Geo {
                        latitude,
                        longitude,
                        altitude,
                    },
                )
            }
            (None, None) => {}
            _ => {
                #[cfg(feature = "logging")]
                log::debug!(
                    "device {}: incomplete or out-of-range location dropped (lat={:?}, lon={:?})",
                    self.device_id,
                    latitude,
                    longitude
                );
            }
        }

        push(Channel::TagClass, Value::Scalar(self.tag_class as f64));
        readings
    }
}

/// Geo and gas fields carried only by v2 packets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub latitude: f32,
    pub longitude: f32,
    pub altitude: f32,
    pub co2: f32,
    pub so2: f32,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            latitude: 37.7749,
            longitude: -122.4194,
            altitude: 50.0,
            co2: 420.0,
            so2: 0.0,
        }
    }
}
