//! Entry point for `hdlc-link`.
//!
//! Sends or receives one file over a serial device. All protocol work is
//! delegated to the library; `main.rs` owns only process setup (logging,
//! argument parsing) and the minimal size-then-chunks file framing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hdlc_link::{LinkConfig, LinkError, Role, Session, StreamTransport};
use serialport::SerialPort;
use thiserror::Error;

/// How long one byte read may block before the retransmission deadline is checked
const READ_POLL: Duration = Duration::from_millis(50);

/// Failures of the file transfer driver
#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("serial device: {0}")]
    Serial(#[from] serialport::Error),

    #[error("file: {0}")]
    File(#[from] io::Error),

    #[error("expected an 8-byte size packet, got {0} bytes")]
    BadSizePacket(usize),
}

/// Reliable file transfer over a serial line
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Serial device to use
    #[arg(short, long, default_value = "/dev/ttyS0")]
    device: String,

    /// Line speed
    #[arg(short, long, default_value_t = 38400)]
    baud: u32,

    /// Retransmissions allowed per frame
    #[arg(short, long, default_value_t = hdlc_link::DEFAULT_RETRY_BUDGET)]
    retries: u32,

    /// Seconds to wait for a reply before retransmitting
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Log link statistics on close
    #[arg(long)]
    stats: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file
    Tx {
        /// File to send
        file: PathBuf,
    },
    /// Receive a file
    Rx {
        /// Where to write the received file
        file: PathBuf,
    },
}

type Link = Session<StreamTransport<Box<dyn SerialPort>>>;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let role = match cli.mode {
        Mode::Tx { .. } => Role::Transmitter,
        Mode::Rx { .. } => Role::Receiver,
    };
    log::info!(
        "{role} on {} at {} baud ({} retries, {}s timeout)",
        cli.device,
        cli.baud,
        cli.retries,
        cli.timeout
    );

    let config = LinkConfig::new(role)
        .with_retry_budget(cli.retries)
        .with_ack_timeout(Duration::from_secs(cli.timeout));
    // Raw mode, and reads that give up after READ_POLL so deadlines get polled.
    let device = serialport::new(cli.device.as_str(), cli.baud)
        .timeout(READ_POLL)
        .open()?;
    let mut link = Session::open(StreamTransport::new(device), config)?;

    let transfer = match &cli.mode {
        Mode::Tx { file } => send_file(&mut link, file),
        Mode::Rx { file } => receive_file(&mut link, file),
    };
    let closed = link.close(cli.stats);
    transfer?;
    closed.map_err(AppError::from)
}

fn send_file(link: &mut Link, path: &Path) -> Result<(), AppError> {
    let data = fs::read(path)?;
    link.write(&(data.len() as u64).to_be_bytes())?;

    let chunk = link.config().max_payload().max(1);
    for piece in data.chunks(chunk) {
        link.write(piece)?;
    }
    log::info!("sent {} ({} bytes)", path.display(), data.len());
    Ok(())
}

fn receive_file(link: &mut Link, path: &Path) -> Result<(), AppError> {
    let header = link.read()?;
    let size: [u8; 8] = header
        .as_slice()
        .try_into()
        .map_err(|_| AppError::BadSizePacket(header.len()))?;
    let size = u64::from_be_bytes(size);

    let mut data = Vec::new();
    while (data.len() as u64) < size {
        data.extend(link.read()?);
    }
    fs::write(path, &data)?;
    log::info!("received {} ({} bytes)", path.display(), data.len());
    Ok(())
}
