use std::path::PathBuf;
use std::time::Duration;

use crate::adapter::{AdapterOptions, RetryPolicy};
use crate::transport::DeviceSelector;

pub const RETRY_INTERVAL_MS: u64 = 200;
pub const KEY_RECORD_VERSION: u8 = 1;
pub const TOKEN_STATE_VERSION: u8 = 1;

#[derive(clap::Parser, Debug, Clone)]
#[command(name = "u2fkey", about = "Use a U2F token as a P-256 signer")]
pub struct Config {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Software token state file. Defaults to the XDG data dir.
    #[arg(long, global = true)]
    pub token_state: Option<PathBuf>,
    #[arg(long, default_value_t = 0, global = true)]
    pub device: usize,
    #[arg(long, value_enum, default_value_t = PresenceMode::Always, global = true)]
    pub presence: PresenceMode,
    #[arg(long, default_value = "pinentry", global = true)]
    pub pinentry: String,
    #[arg(long, default_value_t = RETRY_INTERVAL_MS, global = true)]
    pub retry_interval_ms: u64,
    /// Give up waiting for a touch after this many seconds.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceMode {
    Always,
    Pinentry,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Register a new key for ORIGIN and write its key record.
    Register {
        origin: String,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Sign a digest with a registered key; prints the raw response as hex.
    Sign {
        #[arg(short, long)]
        key: PathBuf,
        #[command(flatten)]
        input: DigestInput,
    },
    /// Check a hex authentication response against a key record.
    Verify {
        #[arg(short, long)]
        key: PathBuf,
        #[command(flatten)]
        input: DigestInput,
        #[arg(long)]
        signature: String,
    },
    /// Delete the software token state, invalidating every key handle it issued.
    Reset,
}

#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct DigestInput {
    /// Message to hash with SHA-256.
    #[arg(long)]
    pub message: Option<String>,
    /// Precomputed 32-byte digest, hex encoded.
    #[arg(long)]
    pub digest: Option<String>,
}

impl DigestInput {
    pub fn resolve(&self) -> anyhow::Result<[u8; 32]> {
        use sha2::Digest;
        match (&self.message, &self.digest) {
            (Some(message), _) => Ok(sha2::Sha256::digest(message.as_bytes()).into()),
            (None, Some(digest)) => {
                let bytes = hex::decode(digest.trim())
                    .map_err(|e| anyhow::anyhow!("invalid --digest: {e}"))?;
                bytes
                    .try_into()
                    .map_err(|b: Vec<u8>| anyhow::anyhow!("--digest must be 32 bytes, got {}", b.len()))
            }
            (None, None) => anyhow::bail!("one of --message or --digest is required"),
        }
    }
}

impl Config {
    pub fn adapter_options(&self) -> AdapterOptions {
        let mut retry =
            RetryPolicy::default().with_interval(Duration::from_millis(self.retry_interval_ms));
        if let Some(secs) = self.timeout_secs {
            retry = retry.with_deadline(Duration::from_secs(secs));
        }
        AdapterOptions::new(retry)
    }

    pub fn device_selector(&self) -> DeviceSelector {
        match self.device {
            0 => DeviceSelector::First,
            n => DeviceSelector::Index(n),
        }
    }
}
