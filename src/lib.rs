//! # Tephra - Telemetry ingestion and time-series engine
//!
//! Decodes the binary UDP packets sent by remote environmental sensor
//! devices, keeps a bounded recent history per sensor channel, and answers
//! queries, aggregations and threshold rules over that history.
//!
//! ## Key Features
//!
//! - **Two wire revisions**: `v1` (big-endian, 6 sensors) and `v2`
//!   (little-endian, adds location and gas sensors)
//! - **Bounded storage**: FIFO eviction per channel, safe to share across threads
//! - **Queries**: time/device filtered series, newest-first history, latest values
//! - **Aggregation**: average, peak and RMS over a recent window
//! - **Rules**: threshold alerts evaluated against the latest value of a channel
//!
//! ## Quick Start
//!
//! ```rust
//! use tephra::{ChannelStore, Channel, Decoder, Encoder, Packet, ProtocolRevision};
//!
//! let packet = Packet::standard(
//!     ProtocolRevision::V1,
//!     1234,
//!     85,
//!     [0.0, 0.0, 0.0, 1.0],
//!     [0.0, 0.0, 1.0],
//!     0.2,
//!     25.5,
//!     1013.25,
//!     None,
//! );
//! let bytes = Encoder::new(ProtocolRevision::V1).encode(&packet).unwrap();
//!
//! let set = Decoder::new(ProtocolRevision::V1).decode(&bytes).unwrap();
//! let store = ChannelStore::new(1000);
//! store.ingest(&set);
//!
//! let latest = store.read_latest(Channel::Temperature, None).unwrap();
//! assert_eq!(latest.value.as_scalar(), Some(25.5));
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Revisions, sensor ids, channels, readings
//! - [`packet`]: Structured packet representation
//! - [`decoder`]: Datagram decoding
//! - [`encoder`]: Datagram encoding
//! - [`store`]: Bounded per-channel store
//! - [`query`]: Series, history and latest-value queries
//! - [`aggregate`]: Windowed statistics
//! - [`rules`]: Threshold rules and their evaluation

// Modules
pub mod aggregate;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod packet;
pub mod protocol;
pub mod query;
pub mod rules;
pub mod store;

// Re-exports for convenient access
pub use aggregate::{aggregate, ChannelSummary, Metric, MetricSet};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{DecodeError, EncodeError, ValidationError};
pub use packet::{Environment, Packet, SensorBlock};
pub use protocol::{Channel, ProtocolRevision, Reading, ReadingSet, SensorId, Value};
pub use query::{HistoryQuery, QueryEngine, SeriesQuery, TimeRangePolicy};
pub use rules::{
    Alert, AutomatedRule, Comparison, Evaluation, NotificationChannel, RuleBook, RuleRequest,
    UpsertOutcome,
};
pub use store::{ChannelStore, StoreStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
