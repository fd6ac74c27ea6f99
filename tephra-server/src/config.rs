// Tephra Server - Command line and environment configuration
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Server settings.
//!
//! Every option can be given on the command line or through the matching
//! environment variable; the command line wins.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tephra::query::TimeRangePolicy;
use tephra::ProtocolRevision;
use tracing::Level;

/// Tephra telemetry server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Settings {
    /// Address both listeners bind to
    #[arg(long, env = "BIND_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// UDP port receiving device packets
    #[arg(long, env = "UDP_PORT", default_value_t = 6000)]
    pub udp_port: u16,

    /// HTTP port serving the query API
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Wire revision the devices speak (v1 or v2)
    #[arg(long, env = "PROTOCOL_REVISION", default_value_t = ProtocolRevision::V2)]
    pub protocol: ProtocolRevision,

    /// Readings retained per channel
    #[arg(long, env = "MAX_READINGS", default_value_t = tephra::store::DEFAULT_CAPACITY)]
    pub max_readings: usize,

    /// Seconds between rule evaluations
    #[arg(long, env = "RULE_INTERVAL_SECS", default_value_t = 60)]
    pub rule_interval_secs: u64,

    /// Accept series queries with only one time bound
    #[arg(long, env = "ALLOW_OPEN_TIME_RANGE")]
    pub allow_open_time_range: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            udp_port: 6000,
            http_port: 8080,
            protocol: ProtocolRevision::V2,
            max_readings: tephra::store::DEFAULT_CAPACITY,
            rule_interval_secs: 60,
            allow_open_time_range: false,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// UDP listen address
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.udp_port)
    }

    /// HTTP listen address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.http_port)
    }

    /// Rule evaluation period, at least one second
    pub fn rule_interval(&self) -> Duration {
        Duration::from_secs(self.rule_interval_secs.max(1))
    }

    /// Policy applied to half-open time ranges
    pub fn time_range_policy(&self) -> TimeRangePolicy {
        if self.allow_open_time_range {
            TimeRangePolicy::AllowOpen
        } else {
            TimeRangePolicy::RequireBoth
        }
    }

    /// Fallback log level when `RUST_LOG` is unset
    pub fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}
