// Tephra Testdata - Device simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Simulated field devices.
//!
//! A [`DeviceSimulator`] produces a stream of [`Packet`]s whose values move
//! the way a sensor board on a volcano flank would: slow temperature cycles,
//! drifting pressure and gas levels, noisy motion. Every value is clamped to
//! a range the decoder accepts.

use crate::patterns::{Signal, SignalPattern};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tephra::{Environment, Packet, ProtocolRevision};

/// Simulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Wire revision of the generated packets.
    pub revision: ProtocolRevision,
    /// Device id stamped into every packet.
    pub device_id: u16,
    /// Interval between samples in milliseconds.
    pub sample_interval_ms: u64,
    /// Site the device sits at, as (latitude, longitude).
    pub site: (f64, f64),
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            revision: ProtocolRevision::V2,
            device_id: 1,
            sample_interval_ms: 1_000,
            site: (37.7749, -122.4194),
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// Create a new simulator config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set wire revision.
    pub fn with_revision(mut self, revision: ProtocolRevision) -> Self {
        self.revision = revision;
        self
    }

    /// Set device id.
    pub fn with_device_id(mut self, device_id: u16) -> Self {
        self.device_id = device_id;
        self
    }

    /// Set sample interval.
    pub fn with_sample_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sample_interval_ms = interval_ms;
        self
    }

    /// Set the device site.
    pub fn with_site(mut self, latitude: f64, longitude: f64) -> Self {
        self.site = (latitude, longitude);
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Packet source for one simulated device.
#[derive(Debug, Clone)]
pub struct DeviceSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    sample: u64,
    battery: Signal,
    temperature: Signal,
    pressure: Signal,
    vibration: Signal,
    acceleration: [Signal; 3],
    latitude: Signal,
    longitude: Signal,
    altitude: Signal,
    co2: Signal,
    so2: Signal,
}

impl DeviceSimulator {
    /// Create a simulator. Without a seed the RNG is seeded from entropy.
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (lat, lon) = config.site;

        Self {
            rng,
            sample: 0,
            battery: Signal::walk(95.0, 0.2, 0.0, 100.0),
            temperature: Signal::new(
                SignalPattern::Sine {
                    mean: 25.0,
                    amplitude: 8.0,
                    period_ms: 3_600_000,
                    phase: 0.0,
                },
                15.0,
                35.0,
            ),
            pressure: Signal::walk(1000.0, 0.5, 980.0, 1020.0),
            vibration: Signal::uniform(0.0, 5.0),
            acceleration: std::array::from_fn(|_| Signal::uniform(-1.0, 1.0)),
            latitude: Signal::walk(
                lat,
                0.0001,
                (lat - 0.01).max(-90.0),
                (lat + 0.01).min(90.0),
            ),
            longitude: Signal::walk(
                lon,
                0.0001,
                (lon - 0.01).max(-180.0),
                (lon + 0.01).min(180.0),
            ),
            altitude: Signal::uniform(10.0, 100.0),
            co2: Signal::walk(420.0, 25.0, 400.0, 2000.0),
            so2: Signal::walk(5.0, 5.0, 0.0, 500.0),
            config,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Number of packets produced so far.
    pub fn samples(&self) -> u64 {
        self.sample
    }

    /// Produce the next packet.
    pub fn next_packet(&mut self) -> Packet {
        let t = self.sample * self.config.sample_interval_ms;
        self.sample += 1;
        let rng = &mut self.rng;

        let battery = self.battery.next(t, rng).round() as u8;
        let position = random_unit_quaternion(rng);
        let acceleration = [
            self.acceleration[0].next(t, rng) as f32,
            self.acceleration[1].next(t, rng) as f32,
            self.acceleration[2].next(t, rng) as f32,
        ];
        let vibration = self.vibration.next(t, rng) as f32;
        let temperature = self.temperature.next(t, rng) as f32;
        let pressure = self.pressure.next(t, rng) as f32;

        let environment = (self.config.revision == ProtocolRevision::V2).then(|| Environment {
            latitude: self.latitude.next(t, rng) as f32,
            longitude: self.longitude.next(t, rng) as f32,
            altitude: self.altitude.next(t, rng) as f32,
            co2: self.co2.next(t, rng) as f32,
            so2: self.so2.next(t, rng) as f32,
        });

        Packet::standard(
            self.config.revision,
            self.config.device_id,
            battery,
            position,
            acceleration,
            vibration,
            temperature,
            pressure,
            environment,
        )
    }

    /// Produce `n` packets.
    pub fn generate(&mut self, n: usize) -> Vec<Packet> {
        (0..n).map(|_| self.next_packet()).collect()
    }
}

impl Iterator for DeviceSimulator {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        Some(self.next_packet())
    }
}

fn random_unit_quaternion(rng: &mut StdRng) -> [f32; 4] {
    let q: [f64; 4] = std::array::from_fn(|_| rng.gen_range(-1.0..1.0));
    let norm = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm < 1e-6 {
        return [0.0, 0.0, 0.0, 1.0];
    }
    q.map(|v| (v / norm) as f32)
}
