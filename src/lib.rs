pub mod adapter;
pub mod capability;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod store;
pub mod transport;
pub mod u2f;
pub mod up;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use adapter::{AdapterOptions, CancelFlag, KeyAdapter, RetryPolicy};
pub use capability::{Signer, Verifier};
pub use error::{Error, Result};
pub use store::KeyRecord;
pub use transport::{DeviceSelector, SoftToken, SoftTokenOpener, TokenOpener, TokenTransport, TransportError};
pub use u2f::{ApplicationParameter, KeyHandle, MalformedResponse, PublicKey, TranscriptVerifier};

use config::{Command, Config, PresenceMode};
use up::{AlwaysPresent, PinentryPresence, PresenceCheck};

pub fn default_state_path() -> anyhow::Result<PathBuf> {
    Ok(directories::ProjectDirs::from("", "", "u2fkey")
        .ok_or_else(|| anyhow::anyhow!("cannot determine XDG data dir"))?
        .data_dir()
        .join("token.cbor"))
}

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    let level = match cfg.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let state_path = match &cfg.token_state {
        Some(path) => path.clone(),
        None => default_state_path()?,
    };

    // Preflight checks
    diagnostics::check(&cfg, &state_path)?;

    // Single user of the token state at a time
    let lock_path = state_path.with_extension("lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _guard = lock.try_write().map_err(|_| {
        anyhow::anyhow!("token state is in use (lock: {})", lock_path.display())
    })?;

    let device = cfg.device_selector();
    let options = cfg.adapter_options();

    // Ctrl-C stops a pending presence wait
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            cancel.cancel();
        }
    });

    match cfg.command {
        Command::Register { origin, out } => {
            let opener = open_token(cfg.presence, &cfg.pinentry, &state_path)?;
            let record = tokio::task::spawn_blocking(move || -> Result<KeyRecord> {
                let adapter = KeyAdapter::generate(&opener, &device, &origin, options)?;
                Ok(KeyRecord::from_adapter(&adapter))
            })
            .await??;
            store::write_record(&out, &record)?;
            tracing::info!(path = %out.display(), origin = %record.origin, "Key record saved");
            println!("{}", hex::encode(&record.public_key));
        }
        Command::Sign { key, input } => {
            let record = store::read_record(&key)?;
            let digest = input.resolve()?;
            let (key_handle, point) = record.key_material()?;
            let opener = open_token(cfg.presence, &cfg.pinentry, &state_path)?;
            let response = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
                let adapter =
                    KeyAdapter::load(&opener, &device, &record.origin, key_handle, point, options)?;
                adapter.sign(&digest)
            })
            .await??;
            println!("{}", hex::encode(response));
        }
        Command::Verify { key, input, signature } => verify(&key, &input.resolve()?, &signature)?,
        Command::Reset => reset(&state_path)?,
    }
    Ok(())
}

fn open_token(mode: PresenceMode, pinentry: &str, state_path: &Path) -> anyhow::Result<SoftTokenOpener> {
    let presence: Arc<dyn PresenceCheck> = match mode {
        PresenceMode::Always => Arc::new(AlwaysPresent),
        PresenceMode::Pinentry => Arc::new(PinentryPresence::new(pinentry)),
    };
    SoftTokenOpener::open_state(state_path, presence)
        .map_err(|e| anyhow::anyhow!("Failed to open software token: {e}"))
}

fn verify(key: &Path, digest: &[u8; 32], signature: &str) -> anyhow::Result<()> {
    let record = store::read_record(key)?;
    let public_key = record.public_key()?;
    let response = hex::decode(signature.trim())
        .map_err(|e| anyhow::anyhow!("invalid --signature: {e}"))?;
    if !TranscriptVerifier.verify(&public_key, digest, &response) {
        anyhow::bail!("signature does not verify for {}", record.origin);
    }
    println!("OK");
    Ok(())
}

fn reset(state_path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(state_path) {
        Ok(()) => println!("Deleted token state {}", state_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("No token state at {}", state_path.display())
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
