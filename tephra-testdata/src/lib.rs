// Tephra Testdata - Device simulation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Tephra Testdata
//!
//! Simulated sensor boards for exercising a Tephra deployment without
//! hardware.
//!
//! ## Example
//!
//! ```rust
//! use tephra::{Encoder, ProtocolRevision};
//! use tephra_testdata::{DeviceSimulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new()
//!     .with_revision(ProtocolRevision::V1)
//!     .with_device_id(7)
//!     .with_seed(42);
//! let mut sim = DeviceSimulator::new(config);
//!
//! let packet = sim.next_packet();
//! let bytes = Encoder::new(ProtocolRevision::V1).encode(&packet).unwrap();
//! assert_eq!(bytes.len(), 46);
//! ```

pub mod generator;
pub mod patterns;

pub use generator::{DeviceSimulator, SimulatorConfig};
pub use patterns::{Signal, SignalPattern};
