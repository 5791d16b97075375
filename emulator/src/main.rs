mod bench;

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use bench::{Bench, BenchOptions, DEFAULT_PORT, HostInstant, TcpLinkListener};
use clap::{Parser, ValueEnum};
use stand_core::sequencer::SamplingProfile;
use tracing::info;

/// Runs the test stand controller on the host with simulated sensors.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// TCP port for the ground station
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Telemetry sampling profile
    #[arg(long, value_enum, default_value_t = Rate::High)]
    rate: Rate,

    /// Thermocouple channel (0-5) that reads as an open circuit
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..6))]
    faulty_channel: Option<u8>,

    /// Control-loop period in milliseconds
    #[arg(long, default_value_t = 1)]
    tick_ms: u64,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Rate {
    /// 4 Hz
    Low,
    /// 80 Hz
    High,
}

impl From<Rate> for SamplingProfile {
    fn from(rate: Rate) -> Self {
        match rate {
            Rate::Low => SamplingProfile::LowRate,
            Rate::High => SamplingProfile::HighRate,
        }
    }
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let options = BenchOptions {
        sampling: cli.rate.into(),
        faulty_channel: cli.faulty_channel.map(usize::from),
    };

    let listener = TcpLinkListener::bind(SocketAddr::new(cli.bind, cli.port))?;
    info!(
        addr = %listener.local_addr()?,
        rate = options.sampling.label(),
        faulty_channel = ?options.faulty_channel,
        "stand emulator listening"
    );

    let mut bench = Bench::new(listener, options);
    let period = Duration::from_millis(cli.tick_ms.max(1));
    loop {
        bench.tick(HostInstant::now());
        thread::sleep(period);
    }
}
