//! Command-line arguments shared by the console and GUI programs

use crate::capture::{CaptureConfig, NoiseParameters};
use crate::common::parse_hex_u16;
use crate::link::{LinkConfig, DEFAULT_BAUD};
use crate::stats::StatsConfig;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "Live I/Q constellation capture from a serial test instrument",
    long_about = None
)]
pub struct Args {
    /// Serial port of the instrument (e.g. /dev/ttyUSB0 or COM2)
    #[arg(short, long)]
    pub port: String,

    /// Baud rate of the control link
    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// AWGN injection level (hexadecimal, 16-bit)
    #[arg(long, default_value = "0800", value_parser = parse_hex_u16)]
    pub awgn: u16,

    /// Phase-noise injection level (hexadecimal, 16-bit)
    #[arg(long, default_value = "0100", value_parser = parse_hex_u16)]
    pub pn: u16,

    /// Number of points kept on display
    #[arg(short, long, default_value_t = 1500)]
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub max_points: u32,

    /// Display refresh period in milliseconds
    #[arg(short, long, default_value_t = 80)]
    #[arg(value_parser = clap::value_parser!(u64).range(10..=5000))]
    pub tick_ms: u64,

    /// Seed for the address generator (random if omitted)
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Args {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            baud: self.baud,
            ..LinkConfig::new(self.port.clone())
        }
    }

    pub fn noise(&self) -> NoiseParameters {
        NoiseParameters {
            awgn: self.awgn,
            pn: self.pn,
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig::default()
    }

    pub fn stats_config(&self) -> StatsConfig {
        StatsConfig {
            max_points: self.max_points as usize,
            ..StatsConfig::default()
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
