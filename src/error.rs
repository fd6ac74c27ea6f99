//! Error types for Tephra
//!
//! This module defines all error types used throughout the library. Each
//! operation returns the narrowest one: decoding, encoding or request
//! validation.

use thiserror::Error;

/// Errors during packet decoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Buffer shorter than the minimum packet for the revision
    #[error("Packet too short: need at least {needed} bytes, got {available}")]
    TooShort { needed: usize, available: usize },

    /// Declared length field disagrees with the datagram size
    #[error("Length mismatch: header declares {declared} bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Device id zero
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(u16),

    /// Read past the end of the buffer
    #[error("Truncated packet at offset {offset}: need {needed} bytes, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Sensor id not defined for the active revision
    #[error("Unknown sensor id {sensor_id} at offset {offset}")]
    UnknownSensor { sensor_id: u8, offset: usize },

    /// Same sensor block twice in one packet
    #[error("Duplicate sensor id {0}")]
    DuplicateSensor(u8),

    /// Field outside its physical range
    #[error("Field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    /// NaN or infinite float payload
    #[error("Non-finite value in field {0}")]
    NonFinite(&'static str),
}

impl DecodeError {
    /// Stable short name, used as a metric label
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::TooShort { .. } => "too_short",
            DecodeError::LengthMismatch { .. } => "length_mismatch",
            DecodeError::InvalidDeviceId(_) => "invalid_device_id",
            DecodeError::Truncated { .. } => "truncated",
            DecodeError::UnknownSensor { .. } => "unknown_sensor",
            DecodeError::DuplicateSensor(_) => "duplicate_sensor",
            DecodeError::OutOfRange { .. } => "out_of_range",
            DecodeError::NonFinite(_) => "non_finite",
        }
    }
}

/// Errors during packet encoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// Block kind not carried by the revision
    #[error("Sensor id {sensor_id} is not supported by protocol {revision}")]
    UnsupportedSensor { sensor_id: u8, revision: &'static str },

    /// Packet does not fit the one-byte length field
    #[error("Packet too large: {size} bytes exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    /// Device id zero
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(u16),
}

/// Errors raised while validating caller-supplied parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Channel name outside the closed set
    #[error("Unknown channel '{0}'")]
    InvalidChannel(String),

    /// Bad or incomplete time range
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    /// Device filter that is not a positive integer
    #[error("Invalid device id '{0}': must be a positive integer")]
    InvalidDeviceId(String),

    /// Unknown aggregation metric
    #[error("Unknown metric '{0}': expected average, peak or rms")]
    InvalidMetric(String),

    /// Unknown notification channel
    #[error("Unknown notification channel '{0}'")]
    UnknownNotificationChannel(String),

    /// Unknown comparison operator
    #[error("Unknown comparison '{0}': expected higher or lower")]
    InvalidComparison(String),

    /// Rule rejected for another reason
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
}

impl ValidationError {
    /// Short human-readable category, used as the `error` field of API replies
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::InvalidChannel(_) => "Invalid sensor type",
            ValidationError::InvalidTimeRange(_) => "Invalid date format",
            ValidationError::InvalidDeviceId(_) => "Invalid device ID",
            ValidationError::InvalidMetric(_) => "Invalid metric",
            ValidationError::UnknownNotificationChannel(_) => "Invalid notification channel",
            ValidationError::InvalidComparison(_) => "Invalid comparison",
            ValidationError::InvalidRule(_) => "Invalid rule",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DecodeError::LengthMismatch {
            declared: 77,
            actual: 46,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Length mismatch"));
        assert!(msg.contains("77"));
        assert!(msg.contains("46"));
    }

    #[test]
    fn test_validation_kind_labels() {
        let err = ValidationError::InvalidChannel("humidity".to_string());
        assert_eq!(err.kind(), "Invalid sensor type");
        assert!(err.to_string().contains("humidity"));
    }

    #[test]
    fn test_decode_error_kind() {
        assert_eq!(DecodeError::InvalidDeviceId(0).kind(), "invalid_device_id");
        assert_eq!(DecodeError::NonFinite("temperature").kind(), "non_finite");
    }
}
