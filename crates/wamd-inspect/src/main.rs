//! wamd-inspect binary.
//!
//! # Usage
//!
//! ```bash
//! # Decode and verify a patch
//! wamd-inspect patch --file patch.pb --collection regular_high \
//!     --key-id AAAAAQ== --key-hex 0707...07
//!
//! # Decode a snapshot without checking MACs
//! wamd-inspect snapshot --file snapshot.pb --collection regular \
//!     --key-id AAAAAQ== --key-hex 0707...07 --no-verify
//! ```

use std::io::Write;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wamd_core::CollectionName;
use wamd_inspect::{InputKind, inspect, parse_key};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    /// A single SyncdPatch
    Patch,
    /// A SyncdSnapshot
    Snapshot,
}

/// App-state patch and snapshot inspector
#[derive(Parser, Debug)]
#[command(name = "wamd-inspect")]
#[command(about = "Decode and verify WhatsApp app-state patches and snapshots")]
#[command(version)]
struct Args {
    /// What the file contains
    kind: Kind,

    /// Protobuf-encoded input file
    #[arg(short, long)]
    file: String,

    /// Collection name (critical_block, regular_high, ...)
    #[arg(short, long)]
    collection: CollectionName,

    /// Base64 app-state key id
    #[arg(long)]
    key_id: String,

    /// Hex app-state key data (32 bytes)
    #[arg(long)]
    key_hex: String,

    /// Skip MAC verification
    #[arg(long)]
    no_verify: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let kind = match args.kind {
        Kind::Patch => InputKind::Patch,
        Kind::Snapshot => InputKind::Snapshot,
    };
    let key = parse_key(&args.key_id, &args.key_hex)?;
    let bytes = std::fs::read(&args.file)?;
    let size = bytes.len();
    tracing::info!(file = %args.file, bytes = size, collection = %args.collection, "decoding");

    let inspection = inspect(kind, &bytes, args.collection, key, !args.no_verify).await?;

    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{inspection}")?;
    Ok(())
}
