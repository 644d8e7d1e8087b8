//! Standalone page server: a flat file served over the page protocol.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sectorcache::server::{PageServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "page-server", version, about = "File-backed page server for cached block devices")]
struct Args {
    /// Backing file path (created if missing).
    #[arg(short, long)]
    file: PathBuf,

    /// Listen port.
    #[arg(short, long, default_value_t = 8964)]
    port: u16,

    /// Listen address.
    #[arg(short, long, default_value = "0.0.0.0")]
    addr: String,

    /// Size of a newly created backing file; accepts K/M/G suffixes.
    /// Required when the file does not exist, forbidden when it does.
    #[arg(short, long)]
    size: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_size(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.as_bytes().last() {
        Some(b'k' | b'K') => (&raw[..raw.len() - 1], 1u64 << 10),
        Some(b'm' | b'M') => (&raw[..raw.len() - 1], 1u64 << 20),
        Some(b'g' | b'G') => (&raw[..raw.len() - 1], 1u64 << 30),
        _ => (raw, 1),
    };
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid size {raw:?}"))?;
    value
        .checked_mul(multiplier)
        .with_context(|| format!("size {raw:?} overflows"))
}

fn run(args: Args) -> Result<()> {
    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let size = args.size.as_deref().map(parse_size).transpose()?;
    let config = ServerConfig {
        file: args.file,
        addr: args.addr,
        port: args.port,
        size,
    };
    let server = PageServer::bind(&config).context("failed to start page server")?;
    server.run().context("server terminated")
}

fn main() -> ExitCode {
    // argument errors exit with code 1, like any other setup failure;
    // --help and --version still exit 0
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        },
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        },
    }
}
