//! Protocol definitions for Tephra
//!
//! This module defines the core types shared by the codec, the store and
//! the query side:
//! - Wire revisions and sensor block ids
//! - The closed set of sensor channels
//! - Readings and decoded reading sets

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Header size in bytes: length, device id (2), board type, tag class
pub const HEADER_SIZE: usize = 5;

/// Largest packet the one-byte length field can describe
pub const MAX_PACKET_SIZE: usize = u8::MAX as usize;

/// Wire format revision.
///
/// The two revisions are not wire-compatible; a deployment picks one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolRevision {
    /// Big-endian, 46-byte packets, integer acceleration in milli-g
    V1,
    /// Little-endian, 77-byte packets, float acceleration in g, geo and gas sensors
    #[default]
    V2,
}

impl ProtocolRevision {
    /// Minimum decodable packet length
    pub fn min_len(&self) -> usize {
        match self {
            ProtocolRevision::V1 => 46,
            ProtocolRevision::V2 => 77,
        }
    }

    /// Whether multi-byte fields are little-endian
    pub fn little_endian(&self) -> bool {
        matches!(self, ProtocolRevision::V2)
    }

    /// Sensor ids this revision carries
    pub fn supports(&self, sensor: SensorId) -> bool {
        match self {
            ProtocolRevision::V1 => (sensor as u8) <= SensorId::Pressure as u8,
            ProtocolRevision::V2 => true,
        }
    }

    /// Payload width of a sensor block (excluding the id byte)
    pub fn payload_len(&self, sensor: SensorId) -> usize {
        match sensor {
            SensorId::Battery => 1,
            SensorId::Position => 16,
            SensorId::Acceleration => match self {
                ProtocolRevision::V1 => 6,
                ProtocolRevision::V2 => 12,
            },
            _ => 4,
        }
    }

    /// Short name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolRevision::V1 => "v1",
            ProtocolRevision::V2 => "v2",
        }
    }
}

impl fmt::Display for ProtocolRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolRevision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(ProtocolRevision::V1),
            "v2" | "2" => Ok(ProtocolRevision::V2),
            other => Err(format!("unknown protocol revision '{}'", other)),
        }
    }
}

/// Sensor block identifiers as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SensorId {
    /// Battery percentage (u8)
    Battery = 0,
    /// Orientation quaternion (4 × f32)
    Position = 1,
    /// Three-axis acceleration
    Acceleration = 2,
    /// Vibration magnitude (f32)
    Vibration = 3,
    /// Degrees Celsius (f32)
    Temperature = 4,
    /// Hectopascal (f32)
    Pressure = 5,
    /// Degrees (f32)
    Latitude = 6,
    /// Degrees (f32)
    Longitude = 7,
    /// Meters (f32)
    Altitude = 8,
    /// Parts per million (f32)
    Co2 = 9,
    /// Parts per billion (f32)
    So2 = 10,
}

impl SensorId {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SensorId::Battery),
            1 => Some(SensorId::Position),
            2 => Some(SensorId::Acceleration),
            3 => Some(SensorId::Vibration),
            4 => Some(SensorId::Temperature),
            5 => Some(SensorId::Pressure),
            6 => Some(SensorId::Latitude),
            7 => Some(SensorId::Longitude),
            8 => Some(SensorId::Altitude),
            9 => Some(SensorId::Co2),
            10 => Some(SensorId::So2),
            _ => None,
        }
    }

    /// Field name used in error messages
    pub fn field_name(&self) -> &'static str {
        match self {
            SensorId::Battery => "battery",
            SensorId::Position => "position",
            SensorId::Acceleration => "acceleration",
            SensorId::Vibration => "vibration",
            SensorId::Temperature => "temperature",
            SensorId::Pressure => "pressure",
            SensorId::Latitude => "latitude",
            SensorId::Longitude => "longitude",
            SensorId::Altitude => "altitude",
            SensorId::Co2 => "co2",
            SensorId::So2 => "so2",
        }
    }
}

/// One named kind of sensor measurement
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Battery,
    /// Orientation quaternion; named `position` on the wire and in the API
    Position,
    AccelerationX,
    AccelerationY,
    AccelerationZ,
    Vibration,
    Temperature,
    Pressure,
    /// Latitude / longitude / altitude merged from three sensor blocks
    Location,
    Co2,
    So2,
    /// Classification tag from the packet header
    TagClass,
}

impl Channel {
    /// Every channel, in display order
    pub const ALL: [Channel; 12] = [
        Channel::Battery,
        Channel::Position,
        Channel::AccelerationX,
        Channel::AccelerationY,
        Channel::AccelerationZ,
        Channel::Vibration,
        Channel::Temperature,
        Channel::Pressure,
        Channel::Location,
        Channel::Co2,
        Channel::So2,
        Channel::TagClass,
    ];

    /// API name
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Battery => "battery",
            Channel::Position => "position",
            Channel::AccelerationX => "acceleration_x",
            Channel::AccelerationY => "acceleration_y",
            Channel::AccelerationZ => "acceleration_z",
            Channel::Vibration => "vibration",
            Channel::Temperature => "temperature",
            Channel::Pressure => "pressure",
            Channel::Location => "location",
            Channel::Co2 => "co2",
            Channel::So2 => "so2",
            Channel::TagClass => "tag_class",
        }
    }

    /// Comma-separated list of valid names, for error messages
    pub fn supported_names() -> String {
        Channel::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidChannel(s.to_string()))
    }
}

/// Value carried by a reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Plain number
    Scalar(f64),
    /// Orientation quaternion
    Quaternion { x: f64, y: f64, z: f64, w: f64 },
    /// Geographic position
    Geo {
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        altitude: Option<f64>,
    },
}

impl Value {
    /// The scalar, if this is one
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Scalar projection used by aggregation and rules.
    ///
    /// Quaternions project to their Euclidean norm; positions have none.
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Quaternion { x, y, z, w } => Some((x * x + y * y + z * z + w * w).sqrt()),
            Value::Geo { .. } => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{}", v),
            Value::Quaternion { x, y, z, w } => write!(f, "({}, {}, {}, {})", x, y, z, w),
            Value::Geo {
                latitude,
                longitude,
                altitude: Some(alt),
            } => write!(f, "{}, {} @ {}m", latitude, longitude, alt),
            Value::Geo {
                latitude,
                longitude,
                altitude: None,
            } => write!(f, "{}, {}", latitude, longitude),
        }
    }
}

/// One timestamped, device-attributed value for a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Reception time (the wire format carries no timestamp)
    pub timestamp: DateTime<Utc>,
    /// Originating device
    pub device_id: u16,
    /// Channel the value belongs to
    pub channel: Channel,
    /// The measured value
    pub value: Value,
}

impl Reading {
    /// Create a new reading
    pub fn new(timestamp: DateTime<Utc>, device_id: u16, channel: Channel, value: Value) -> Self {
        Self {
            timestamp,
            device_id,
            channel,
            value,
        }
    }

    /// Create a scalar reading
    pub fn scalar(timestamp: DateTime<Utc>, device_id: u16, channel: Channel, value: f64) -> Self {
        Self::new(timestamp, device_id, channel, Value::Scalar(value))
    }
}

/// Everything decoded from one packet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSet {
    /// Originating device
    pub device_id: u16,
    /// Board type byte from the header
    pub board_type: u8,
    /// Classification tag byte from the header
    pub tag_class: u8,
    /// Reception time stamped on every reading
    pub received_at: DateTime<Utc>,
    /// Revision the packet was decoded with
    pub revision: ProtocolRevision,
    /// One reading per decoded channel
    pub readings: Vec<Reading>,
}

impl ReadingSet {
    /// Reading for a channel, if the packet carried one
    pub fn get(&self, channel: Channel) -> Option<&Reading> {
        self.readings.iter().find(|r| r.channel == channel)
    }

    /// Number of readings
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Check if no reading was decoded
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
