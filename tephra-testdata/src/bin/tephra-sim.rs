// Tephra Testdata - Simulator binary
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sends simulated device packets to a Tephra server over UDP.

use clap::Parser;
use std::net::{SocketAddr, UdpSocket};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use tephra::{Encoder, ProtocolRevision};
use tephra_testdata::{DeviceSimulator, SimulatorConfig};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tephra-sim", version, about = "Simulated Tephra sensor device")]
struct Args {
    /// Server UDP address
    #[arg(long, default_value = "127.0.0.1:6000")]
    target: SocketAddr,

    /// Wire revision (v1 or v2)
    #[arg(long, default_value = "v2")]
    protocol: ProtocolRevision,

    /// Device id of the first simulated device
    #[arg(long, default_value_t = 1)]
    device_id: u16,

    /// Number of simulated devices
    #[arg(long, default_value_t = 1)]
    devices: u16,

    /// Delay between rounds in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Rounds to send; 0 runs forever
    #[arg(long, default_value_t = 0)]
    count: u64,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&args) {
        Ok(sent) => {
            info!(sent, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, addr = %args.target, "simulator failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> std::io::Result<u64> {
    if args.device_id == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "device id must be positive",
        ));
    }

    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    let encoder = Encoder::new(args.protocol);

    let mut simulators: Vec<DeviceSimulator> = (0..args.devices.max(1))
        .map_while(|i| args.device_id.checked_add(i))
        .map(|device_id| {
            let mut config = SimulatorConfig::new()
                .with_revision(args.protocol)
                .with_device_id(device_id)
                .with_sample_interval_ms(args.interval_ms);
            if let Some(seed) = args.seed {
                config = config.with_seed(seed.wrapping_add(device_id as u64));
            }
            DeviceSimulator::new(config)
        })
        .collect();

    info!(
        addr = %args.target,
        revision = %args.protocol,
        devices = simulators.len(),
        "simulator started"
    );

    let mut sent = 0u64;
    let mut round = 0u64;
    while args.count == 0 || round < args.count {
        for sim in &mut simulators {
            let packet = sim.next_packet();
            match encoder.encode(&packet) {
                Ok(bytes) => {
                    socket.send_to(&bytes, args.target)?;
                    sent += 1;
                    debug!(device_id = packet.device_id, len = bytes.len(), "packet sent");
                }
                Err(e) => warn!(device_id = packet.device_id, error = %e, "encode failed"),
            }
        }
        round += 1;
        thread::sleep(Duration::from_millis(args.interval_ms));
    }

    Ok(sent)
}
