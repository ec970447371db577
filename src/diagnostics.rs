use std::path::Path;

use crate::config::{Config, PresenceMode};

pub fn check(cfg: &Config, state_path: &Path) -> anyhow::Result<()> {
    let mut errors: Vec<String> = Vec::new();

    // Check 1: token state directory exists or can be created
    if let Some(dir) = state_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            errors.push(format!(
                "cannot create token state directory {}: {e}\n  \
                 → pass --token-state with a writable location",
                dir.display()
            ));
        }
    }

    // Check 2: pinentry binary found, only when it confirms presence
    if cfg.presence == PresenceMode::Pinentry {
        if let Err(e) = std::process::Command::new(&cfg.pinentry)
            .arg("--version")
            .output()
        {
            errors.push(format!(
                "pinentry binary not found: '{}': {e}\n  \
                 → install pinentry or use --presence always",
                cfg.pinentry
            ));
        }
    }

    if errors.is_empty() {
        return Ok(());
    }

    for err in &errors {
        eprintln!("ERROR: {err}");
    }
    anyhow::bail!("{} preflight check(s) failed", errors.len());
}
