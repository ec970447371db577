use super::{PresenceCheck, PresencePrompt};

/// Confirms presence through a pinentry dialog. OK counts as a touch; Cancel,
/// a closed dialog or a missing binary count as absence.
#[derive(Debug, Clone)]
pub struct PinentryPresence {
    binary: String,
}

impl PinentryPresence {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl PresenceCheck for PinentryPresence {
    fn confirm(&self, prompt: &PresencePrompt) -> bool {
        let result = match pinentry::PassphraseInput::with_binary(&self.binary) {
            None => Err(pinentry::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "pinentry binary not found",
            ))),
            Some(mut input) => input
                .with_title(&prompt.title)
                .with_description(&prompt.description)
                .with_ok("Confirm")
                .with_cancel("Deny")
                .interact(),
        };
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Presence not confirmed via pinentry");
                false
            }
        }
    }
}
