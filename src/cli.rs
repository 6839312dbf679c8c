use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "email-waterfall")]
#[command(about = "Waterfall email enrichment across multiple data providers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Enrich a contact CSV and write the result next to it
    Enrich {
        /// Input CSV with at least a name and a domain column
        input: PathBuf,

        /// Output CSV (default: <input>_waterfall.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seconds to wait between contacts (default: CONTACT_DELAY_MS)
        #[arg(short, long, value_parser = parse_delay)]
        delay: Option<Duration>,

        /// Dotenv-style file holding <PROVIDER>_API_KEY entries
        #[arg(short, long)]
        secrets: Option<PathBuf>,

        /// Only process the first N contacts
        #[arg(long)]
        limit: Option<usize>,

        /// Contacts enriched in parallel
        #[arg(long)]
        concurrency: Option<usize>,

        /// Re-validate an inconclusive original email when no finder has a match
        #[arg(long)]
        retain_original: bool,
    },

    /// Run the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,

        #[arg(short, long)]
        secrets: Option<PathBuf>,
    },
}

/// Parses a non-negative, possibly fractional number of seconds.
fn parse_delay(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", raw))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("'{}' is not a valid delay in seconds", raw))
}

/// `contacts.csv` -> `contacts_waterfall.csv`, in the same directory.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "contacts".to_string());
    input.with_file_name(format!("{}_waterfall.csv", stem))
}
