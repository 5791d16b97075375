//! Minimal ground-station client: connects to the stand, sends `GO`, prints
//! every telemetry packet to stdout, and optionally aborts.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use clap::Parser;
use stand_core::protocol::{Command, ControlLine};
use tracing::{info, warn};

/// Connects to the test stand and records a run.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Stand address
    #[arg(long, default_value = "127.0.0.1:5050")]
    addr: SocketAddr,

    /// Send ABORT this many seconds after GO
    #[arg(long)]
    abort_after: Option<f64>,

    /// Disconnect after this many seconds
    #[arg(long, default_value_t = 50.0)]
    duration: f64,

    /// Only watch; never send GO
    #[arg(long)]
    no_go: bool,
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stream = TcpStream::connect(cli.addr)?;
    stream.set_read_timeout(Some(Duration::from_millis(50)))?;
    info!(addr = %cli.addr, "connected to stand");

    let started = Instant::now();
    let deadline = Duration::from_secs_f64(cli.duration.max(0.0));
    let mut abort_at = cli.abort_after.map(|secs| Duration::from_secs_f64(secs.max(0.0)));
    let mut go_sent_at: Option<Instant> = None;
    let mut pending = Vec::new();
    let mut chunk = [0u8; 512];
    let stdout = io::stdout();
    let mut out = stdout.lock();

    while started.elapsed() < deadline {
        match stream.read(&mut chunk) {
            Ok(0) => {
                warn!("stand closed the connection");
                break;
            }
            Ok(count) => pending.extend_from_slice(&chunk[..count]),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => return Err(err),
        }

        while let Some(end) = pending.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            match ControlLine::from_keyword(line) {
                Some(ControlLine::Connected) if !cli.no_go && go_sent_at.is_none() => {
                    info!("stand ready, sending GO");
                    stream.write_all(Command::Go.as_line().as_bytes())?;
                    go_sent_at = Some(Instant::now());
                }
                Some(control) => info!(%control, t = started.elapsed().as_secs_f64(), "control"),
                None => writeln!(out, "{line}")?,
            }
        }

        if let (Some(after), Some(go_at)) = (abort_at, go_sent_at)
            && go_at.elapsed() >= after
        {
            warn!("sending ABORT");
            stream.write_all(Command::Abort.as_line().as_bytes())?;
            abort_at = None;
        }
    }

    out.flush()?;
    info!("session finished");
    Ok(())
}
